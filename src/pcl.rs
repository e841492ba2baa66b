//! The PCL token stream the translator emits, plus the canonical writer that
//! turns assembled files into formatted text. The writer owns all spacing and
//! indentation decisions so the translation code only deals in tokens.

use crate::lexer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokKind {
    Ident,
    /// `for`, `in`, `if`, `else`: spaced like words even before brackets.
    Keyword,
    Number,
    /// A complete quoted string literal, quotes included.
    Quoted,
    OQuote,
    CQuote,
    OHeredoc,
    CHeredoc,
    StringLit,
    /// `${`
    TemplateInterp,
    /// `}` closing an interpolation.
    TemplateSeqEnd,
    /// `%{`
    ControlStart,
    /// `~}` or `}` closing a template directive.
    ControlEnd,
    OBrace,
    CBrace,
    OBrack,
    CBrack,
    OParen,
    CParen,
    Comma,
    Dot,
    Assign,
    FatArrow,
    Ellipsis,
    /// Binary operators and the standalone splat star.
    Op,
    /// Unary prefix operators: `!` and negation.
    Unary,
    Comment,
    Newline,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tok {
    pub kind: TokKind,
    pub text: String,
}

pub type Tokens = Vec<Tok>;

pub fn tok(kind: TokKind, text: impl Into<String>) -> Tok {
    Tok {
        kind,
        text: text.into(),
    }
}

pub fn ident(name: impl Into<String>) -> Tok {
    tok(TokKind::Ident, name)
}

pub fn keyword(name: &str) -> Tok {
    tok(TokKind::Keyword, name)
}

pub fn quoted(text: &str) -> Tok {
    tok(TokKind::Quoted, format!("\"{}\"", escape_string(text)))
}

pub fn newline() -> Tok {
    tok(TokKind::Newline, "\n")
}

/// Escape a string for inclusion in a quoted PCL literal. Literal `${` and
/// `%{` sequences are escaped so they do not read as interpolations.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.replace("${", "$${").replace("%{", "%%{")
}

pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Tokens for an object key: a bare identifier when possible, else quoted.
pub fn key_tokens(name: &str) -> Tokens {
    if is_valid_identifier(name) {
        vec![ident(name)]
    } else {
        vec![quoted(name)]
    }
}

pub fn tokens_for_value(value: &hcl::Value) -> Tokens {
    let mut out = Tokens::new();
    value_tokens(value, &mut out);
    out
}

fn value_tokens(value: &hcl::Value, out: &mut Tokens) {
    match value {
        hcl::Value::Null => out.push(ident("null")),
        hcl::Value::Bool(b) => out.push(ident(b.to_string())),
        hcl::Value::Number(n) => out.push(tok(TokKind::Number, n.to_string())),
        hcl::Value::String(s) => out.push(quoted(s)),
        hcl::Value::Array(values) => {
            out.push(tok(TokKind::OBrack, "["));
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    out.push(tok(TokKind::Comma, ","));
                }
                value_tokens(v, out);
            }
            out.push(tok(TokKind::CBrack, "]"));
        }
        hcl::Value::Object(map) => {
            if map.is_empty() {
                out.push(tok(TokKind::OBrace, "{"));
                out.push(tok(TokKind::CBrace, "}"));
                return;
            }
            out.push(tok(TokKind::OBrace, "{"));
            out.push(newline());
            for (k, v) in map {
                out.extend(key_tokens(k));
                out.push(tok(TokKind::Assign, "="));
                value_tokens(v, out);
                out.push(newline());
            }
            out.push(tok(TokKind::CBrace, "}"));
        }
    }
}

pub fn tokens_for_function_call(name: &str, args: Vec<Tokens>) -> Tokens {
    let mut out = vec![ident(name), tok(TokKind::OParen, "(")];
    for (i, arg) in args.into_iter().enumerate() {
        if i > 0 {
            out.push(tok(TokKind::Comma, ","));
        }
        out.extend(arg);
    }
    out.push(tok(TokKind::CParen, ")"));
    out
}

pub fn tokens_for_tuple(elems: Vec<Tokens>) -> Tokens {
    let mut out = vec![tok(TokKind::OBrack, "[")];
    for (i, elem) in elems.into_iter().enumerate() {
        if i > 0 {
            out.push(tok(TokKind::Comma, ","));
        }
        out.extend(elem);
    }
    out.push(tok(TokKind::CBrack, "]"));
    out
}

/// An object literal from name/value token pairs; one attribute per line.
pub fn tokens_for_object(attrs: Vec<(Tokens, Tokens)>) -> Tokens {
    if attrs.is_empty() {
        return vec![tok(TokKind::OBrace, "{"), tok(TokKind::CBrace, "}")];
    }
    let mut out = vec![tok(TokKind::OBrace, "{"), newline()];
    for (name, value) in attrs {
        out.extend(name);
        out.push(tok(TokKind::Assign, "="));
        out.extend(value);
        out.push(newline());
    }
    out.push(tok(TokKind::CBrace, "}"));
    out
}

/// Convert lexed source trivia into output tokens, normalizing line endings.
pub fn trivia_tokens(trivia: &[lexer::Token]) -> Tokens {
    trivia
        .iter()
        .map(|t| match t.kind {
            lexer::TokenKind::Comment => tok(TokKind::Comment, t.text.replace("\r\n", "\n")),
            _ => newline(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Assembled output files

#[derive(Clone, Debug, Default)]
pub struct File {
    pub items: Vec<Item>,
}

#[derive(Clone, Debug)]
pub enum Item {
    /// Comments and blank lines between declarations.
    Trivia(Tokens),
    Attribute(Attribute),
    Block(Block),
}

#[derive(Clone, Debug)]
pub struct Attribute {
    pub leading: Tokens,
    pub name: String,
    pub value: Tokens,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: Tokens) -> Self {
        Self {
            leading: Tokens::new(),
            name: name.into(),
            value,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Block {
    pub kind: String,
    pub labels: Vec<String>,
    pub items: Vec<Item>,
}

impl Block {
    pub fn new(kind: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            kind: kind.into(),
            labels,
            items: Vec::new(),
        }
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Tokens) {
        self.items.push(Item::Attribute(Attribute::new(name, value)));
    }
}

impl File {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_trivia(&mut self, tokens: Tokens) {
        if !tokens.is_empty() {
            self.items.push(Item::Trivia(tokens));
        }
    }
}

/// Render a file to its canonical textual form.
pub fn render(file: &File) -> String {
    let mut out = String::new();
    for item in &file.items {
        write_item(&mut out, item, 0);
    }
    out
}

/// Render a bare token stream; used by tests and diagnostics.
pub fn render_tokens(tokens: &Tokens) -> String {
    let mut out = String::new();
    write_tokens(&mut out, tokens, 0);
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_item(out: &mut String, item: &Item, depth: usize) {
    match item {
        Item::Trivia(tokens) => write_trivia(out, tokens, depth),
        Item::Attribute(attr) => {
            write_trivia(out, &attr.leading, depth);
            indent(out, depth);
            out.push_str(&attr.name);
            out.push_str(" = ");
            write_tokens(out, &attr.value, depth);
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        Item::Block(block) => {
            indent(out, depth);
            out.push_str(&block.kind);
            for label in &block.labels {
                out.push_str(" \"");
                out.push_str(&escape_string(label));
                out.push('"');
            }
            if block.items.is_empty() {
                out.push_str(" {}\n");
                return;
            }
            out.push_str(" {\n");
            for item in &block.items {
                write_item(out, item, depth + 1);
            }
            indent(out, depth);
            out.push_str("}\n");
        }
    }
}

fn write_trivia(out: &mut String, tokens: &Tokens, depth: usize) {
    for t in tokens {
        match t.kind {
            TokKind::Comment => {
                indent(out, depth);
                out.push_str(&t.text);
                if !t.text.ends_with('\n') {
                    out.push('\n');
                }
            }
            _ => out.push('\n'),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Code,
    Str,
}

fn write_tokens(out: &mut String, tokens: &Tokens, base_depth: usize) {
    let mut modes = vec![Mode::Code];
    let mut depth = 0usize;
    let mut pending_indent = false;
    let mut prev: Option<&Tok> = None;

    for t in tokens {
        let mode = *modes.last().unwrap();
        if mode == Mode::Str {
            out.push_str(&t.text);
        } else {
            if matches!(t.kind, TokKind::CBrace | TokKind::CBrack) {
                depth = depth.saturating_sub(1);
            }
            if t.kind == TokKind::Newline {
                out.push('\n');
                pending_indent = true;
                prev = Some(t);
                continue;
            }
            if pending_indent {
                indent(out, base_depth + depth);
                pending_indent = false;
            } else if let Some(p) = prev {
                if space_between(p, t) {
                    out.push(' ');
                }
            }
            out.push_str(&t.text);
            if t.kind == TokKind::Comment && t.text.ends_with('\n') {
                pending_indent = true;
            }
            if matches!(t.kind, TokKind::OBrace | TokKind::OBrack) {
                depth += 1;
            }
        }
        match t.kind {
            TokKind::OQuote | TokKind::OHeredoc => modes.push(Mode::Str),
            TokKind::CQuote | TokKind::CHeredoc => {
                modes.pop();
            }
            TokKind::TemplateInterp | TokKind::ControlStart => modes.push(Mode::Code),
            TokKind::TemplateSeqEnd | TokKind::ControlEnd => {
                modes.pop();
            }
            _ => {}
        }
        prev = Some(t);
    }
}

fn space_between(prev: &Tok, next: &Tok) -> bool {
    use TokKind::*;

    match prev.kind {
        OParen | OBrack | OBrace | Dot | TemplateInterp | ControlStart | Unary | Newline => {
            return false
        }
        _ => {}
    }
    match next.kind {
        CParen | CBrack | CBrace | Comma | Dot | Ellipsis | TemplateSeqEnd | ControlEnd => {
            return false
        }
        // Function calls bind tightly to their name.
        OParen => return prev.kind != Ident,
        // Indexing binds tightly; a list literal after a word or operator
        // does not.
        OBrack => return !matches!(prev.kind, Ident | CBrack | CParen | Quoted),
        _ => {}
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_empty_block_inline() {
        let mut file = File::new();
        file.items.push(Item::Block(Block::new(
            "resource",
            vec!["foo".into(), "aws:index:bucket".into()],
        )));
        assert_eq!(render(&file), "resource \"foo\" \"aws:index:bucket\" {}\n");
    }

    #[test]
    fn renders_attributes_with_indent() {
        let mut block = Block::new("resource", vec!["web".into(), "aws:index:instance".into()]);
        block.set_attribute("ami", vec![quoted("abc")]);
        let mut file = File::new();
        file.items.push(Item::Block(block));
        assert_eq!(
            render(&file),
            "resource \"web\" \"aws:index:instance\" {\n  ami = \"abc\"\n}\n"
        );
    }

    #[test]
    fn renders_objects_multiline() {
        let value = tokens_for_object(vec![
            (vec![ident("name")], vec![quoted("web")]),
            (vec![ident("count")], vec![tok(TokKind::Number, "2")]),
        ]);
        let mut file = File::new();
        file.items.push(Item::Attribute(Attribute::new("tags", value)));
        assert_eq!(
            render(&file),
            "tags = {\n  name = \"web\"\n  count = 2\n}\n"
        );
    }

    #[test]
    fn renders_function_calls_tight() {
        let call = tokens_for_function_call(
            "invoke",
            vec![vec![quoted("aws:index:getAmi")], tokens_for_object(vec![])],
        );
        assert_eq!(render_tokens(&call), "invoke(\"aws:index:getAmi\", {})");
    }

    #[test]
    fn renders_templates_without_extra_spaces() {
        let tokens = vec![
            tok(TokKind::OQuote, "\""),
            tok(TokKind::StringLit, "prefix-"),
            tok(TokKind::TemplateInterp, "${"),
            ident("name"),
            tok(TokKind::Op, "+"),
            tok(TokKind::Number, "1"),
            tok(TokKind::TemplateSeqEnd, "}"),
            tok(TokKind::StringLit, "-suffix"),
            tok(TokKind::CQuote, "\""),
        ];
        assert_eq!(render_tokens(&tokens), "\"prefix-${name + 1}-suffix\"");
    }

    #[test]
    fn renders_indexing_tight_and_lists_spaced() {
        let tokens = vec![
            ident("coll"),
            tok(TokKind::OBrack, "["),
            tok(TokKind::Number, "0"),
            tok(TokKind::CBrack, "]"),
            tok(TokKind::Dot, "."),
            ident("attr"),
        ];
        assert_eq!(render_tokens(&tokens), "coll[0].attr");

        let list = tokens_for_tuple(vec![
            vec![tok(TokKind::Number, "1")],
            vec![tok(TokKind::Number, "2")],
        ]);
        assert_eq!(render_tokens(&list), "[1, 2]");
    }

    #[test]
    fn escapes_interpolation_markers() {
        assert_eq!(escape_string("a ${b}"), "a $${b}");
        assert_eq!(escape_string("line\nbreak"), "line\\nbreak");
    }

    #[test]
    fn value_tokens_quote_non_identifier_keys() {
        let mut map = hcl::Map::new();
        map.insert("Environment".to_string(), hcl::Value::from("prod"));
        map.insert("app:tier".to_string(), hcl::Value::from(1));
        let rendered = render_tokens(&tokens_for_value(&hcl::Value::Object(map)));
        assert!(rendered.contains("Environment = \"prod\""));
        assert!(rendered.contains("\"app:tier\" = 1"));
    }
}
