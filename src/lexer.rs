//! Re-lexing utilities over raw TF source bytes.
//!
//! The typed configuration tree the parser produces carries no source spans,
//! comments or blank lines. Everything positional is recovered here: a small
//! lexer tokenizes each file once, a structural scanner derives byte ranges
//! for every declaration and attribute, and the trivia helpers slice
//! comment/newline runs back out of the token stream.

use crate::diag::{Pos, Range};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Heredoc,
    Comment,
    Newline,
    LBrace,
    RBrace,
    LBrack,
    RBrack,
    LParen,
    RParen,
    Comma,
    Dot,
    Assign,
    Op,
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: Pos,
    pub end: Pos,
}

/// Returns true if the token is trivia (a comment or a newline).
pub fn is_trivia(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::Comment | TokenKind::Newline)
}

struct Lexer {
    chars: Vec<(usize, char)>,
    len: usize, // total byte length
    idx: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self {
            chars: text.char_indices().collect(),
            len: text.len(),
            idx: 0,
            line: 1,
            column: 1,
        }
    }

    fn pos(&self) -> Pos {
        let byte = self
            .chars
            .get(self.idx)
            .map(|(b, _)| *b)
            .unwrap_or(self.len);
        Pos::new(byte, self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).map(|(_, c)| *c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn text_between(&self, start: &Pos, end: &Pos, src: &str) -> String {
        src[start.byte..end.byte].to_string()
    }

    fn lex(mut self, src: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            let start = self.pos();
            match c {
                ' ' | '\t' => {
                    self.bump();
                }
                '\r' => {
                    self.bump();
                    if self.peek() == Some('\n') {
                        self.bump();
                    }
                    tokens.push(Token {
                        kind: TokenKind::Newline,
                        text: "\n".into(),
                        start,
                        end: self.pos(),
                    });
                }
                '\n' => {
                    self.bump();
                    tokens.push(Token {
                        kind: TokenKind::Newline,
                        text: "\n".into(),
                        start,
                        end: self.pos(),
                    });
                }
                '#' => tokens.push(self.line_comment(start, src)),
                '/' if self.peek_at(1) == Some('/') => tokens.push(self.line_comment(start, src)),
                '/' if self.peek_at(1) == Some('*') => tokens.push(self.block_comment(start, src)),
                '"' => {
                    self.quoted_string();
                    let end = self.pos();
                    tokens.push(Token {
                        kind: TokenKind::Str,
                        text: self.text_between(&start, &end, src),
                        start,
                        end,
                    });
                }
                '<' if self.peek_at(1) == Some('<') && self.heredoc_ahead() => {
                    tokens.push(self.heredoc(start, src));
                }
                c if c.is_ascii_digit() => {
                    while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E')
                    {
                        if matches!(self.peek(), Some('e') | Some('E'))
                            && matches!(self.peek_at(1), Some('+') | Some('-'))
                        {
                            self.bump();
                        }
                        self.bump();
                    }
                    let end = self.pos();
                    tokens.push(Token {
                        kind: TokenKind::Number,
                        text: self.text_between(&start, &end, src),
                        start,
                        end,
                    });
                }
                c if c.is_alphabetic() || c == '_' => {
                    while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '-')
                    {
                        self.bump();
                    }
                    let end = self.pos();
                    tokens.push(Token {
                        kind: TokenKind::Ident,
                        text: self.text_between(&start, &end, src),
                        start,
                        end,
                    });
                }
                _ => tokens.push(self.punct(start, src)),
            }
        }
        tokens
    }

    fn line_comment(&mut self, start: Pos, src: &str) -> Token {
        while let Some(c) = self.peek() {
            self.bump();
            // Line comments own their terminating newline, mirroring the way
            // the TF lexer attaches it; trivia slicing depends on this.
            if c == '\n' {
                break;
            }
        }
        let end = self.pos();
        Token {
            kind: TokenKind::Comment,
            text: self.text_between(&start, &end, src),
            start,
            end,
        }
    }

    fn block_comment(&mut self, start: Pos, src: &str) -> Token {
        self.bump();
        self.bump();
        while let Some(c) = self.peek() {
            if c == '*' && self.peek_at(1) == Some('/') {
                self.bump();
                self.bump();
                break;
            }
            self.bump();
        }
        let end = self.pos();
        Token {
            kind: TokenKind::Comment,
            text: self.text_between(&start, &end, src),
            start,
            end,
        }
    }

    /// Consume a quoted string including any `${`/`%{` template sequences.
    fn quoted_string(&mut self) {
        self.bump(); // opening quote
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.bump();
                    self.bump();
                }
                '"' => {
                    self.bump();
                    return;
                }
                '$' | '%' if self.peek_at(1) == Some('{') => {
                    // Escaped sequences ($${, %%{) are literal text.
                    self.bump();
                    if self.peek() == Some(c) {
                        self.bump();
                        continue;
                    }
                    self.bump(); // '{'
                    self.template_code();
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Consume the interior of a template sequence up to its closing brace.
    fn template_code(&mut self) {
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            match c {
                '"' => self.quoted_string(),
                '{' => {
                    depth += 1;
                    self.bump();
                }
                '}' => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return;
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn heredoc_ahead(&self) -> bool {
        let mut i = 2;
        if self.peek_at(i) == Some('-') {
            i += 1;
        }
        let mut seen_letter = false;
        while let Some(c) = self.peek_at(i) {
            if c.is_alphabetic() {
                seen_letter = true;
                i += 1;
            } else {
                break;
            }
        }
        seen_letter && matches!(self.peek_at(i), Some('\n') | Some('\r'))
    }

    fn heredoc(&mut self, start: Pos, src: &str) -> Token {
        self.bump();
        self.bump();
        if self.peek() == Some('-') {
            self.bump();
        }
        let mut delim = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphabetic() {
                delim.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // Consume lines until one whose trimmed content equals the delimiter.
        let mut end = self.pos();
        loop {
            // consume up to and including the newline
            loop {
                match self.bump() {
                    Some('\n') | None => break,
                    _ => {}
                }
            }
            if self.peek().is_none() {
                end = self.pos();
                break;
            }
            // check whether this line is the terminator
            let mut i = 0;
            while matches!(self.peek_at(i), Some(' ') | Some('\t')) {
                i += 1;
            }
            let mut word = String::new();
            while let Some(c) = self.peek_at(i) {
                if c.is_alphabetic() {
                    word.push(c);
                    i += 1;
                } else {
                    break;
                }
            }
            if word == delim {
                for _ in 0..i {
                    self.bump();
                }
                end = self.pos();
                break;
            }
        }
        Token {
            kind: TokenKind::Heredoc,
            text: self.text_between(&start, &end, src),
            start,
            end,
        }
    }

    fn punct(&mut self, start: Pos, src: &str) -> Token {
        let c = self.bump().expect("punct called at end of input");
        let two = self.peek();
        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBrack,
            ']' => TokenKind::RBrack,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '.' => {
                if two == Some('.') && self.peek_at(1) == Some('.') {
                    self.bump();
                    self.bump();
                    TokenKind::Op
                } else {
                    TokenKind::Dot
                }
            }
            '=' => match two {
                Some('=') | Some('>') => {
                    self.bump();
                    TokenKind::Op
                }
                _ => TokenKind::Assign,
            },
            '!' | '<' | '>' => {
                if two == Some('=') {
                    self.bump();
                }
                TokenKind::Op
            }
            '&' | '|' => {
                if two == Some(c) {
                    self.bump();
                }
                TokenKind::Op
            }
            '+' | '-' | '*' | '/' | '%' | '?' | ':' => TokenKind::Op,
            _ => TokenKind::Other,
        };
        let end = self.pos();
        Token {
            kind,
            text: self.text_between(&start, &end, src),
            start,
            end,
        }
    }
}

pub fn lex(text: &str) -> Vec<Token> {
    Lexer::new(text).lex(text)
}

/// One lexed source file.
pub struct SourceFile {
    pub name: String,
    pub text: String,
    pub tokens: Vec<Token>,
}

/// The raw sources of every file in the module being translated. Retained
/// after parsing because trivia and exact source bytes can only be recovered
/// from here.
#[derive(Default)]
pub struct Sources {
    files: HashMap<String, SourceFile>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let text = text.into();
        let tokens = lex(&text);
        self.files.insert(
            name.clone(),
            SourceFile {
                name,
                text,
                tokens,
            },
        );
    }

    pub fn get(&self, name: &str) -> &SourceFile {
        // Ranges only ever come from files we lexed earlier; a miss is a
        // corrupted source map.
        self.files
            .get(name)
            .unwrap_or_else(|| panic!("could not read '{}' to parse trivia", name))
    }

    /// The trivia immediately before and after `range`. `block_like` treats
    /// newlines and braces as semantically significant so adjacent items in a
    /// block do not double-count each other's comments.
    pub fn trivia_around(&self, range: &Range, block_like: bool) -> (Vec<Token>, Vec<Token>) {
        let tokens = &self.get(&range.filename).tokens;
        let (first, last) = token_bounds(tokens, range);
        trivia_from_index(tokens, first, last, block_like)
    }

    /// Expand an attribute expression range leftward to include the
    /// identifier that introduces the attribute.
    pub fn attribute_range(&self, range: &Range) -> Range {
        let tokens = &self.get(&range.filename).tokens;
        let (first, _) = token_bounds(tokens, range);
        let mut i = first;
        while i > 0 {
            i -= 1;
            if tokens[i].kind == TokenKind::Ident {
                return Range::new(range.filename.clone(), tokens[i].start, range.end);
            }
        }
        range.clone()
    }

    /// The lexed tokens covering exactly `range`.
    pub fn tokens_for_range(&self, range: &Range) -> Vec<Token> {
        let tokens = &self.get(&range.filename).tokens;
        let mut out = Vec::new();
        let mut found_first = false;
        for token in tokens {
            if token.start.byte == range.start.byte {
                found_first = true;
            }
            if found_first {
                out.push(token.clone());
            }
            if token.end.byte == range.end.byte {
                break;
            }
        }
        out
    }

    /// If `range` opens with a heredoc marker, returns the opening delimiter
    /// (including its newline) and the closing delimiter word.
    pub fn detect_heredoc(&self, range: &Range) -> Option<(String, String)> {
        let file = self.get(&range.filename);
        let rest = &file.text[range.start.byte..];
        let mut chars = rest.chars().peekable();
        let mut open = String::new();
        if chars.next() != Some('<') || chars.next() != Some('<') {
            return None;
        }
        open.push_str("<<");
        if chars.peek() == Some(&'-') {
            open.push('-');
            chars.next();
        }
        let mut delim = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_alphabetic() {
                delim.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if delim.is_empty() {
            return None;
        }
        if chars.peek() == Some(&'\r') {
            chars.next();
        }
        if chars.peek() != Some(&'\n') {
            return None;
        }
        open.push_str(&delim);
        open.push('\n');
        Some((open, delim))
    }

    /// The original bytes for `range` with line endings normalized.
    pub fn source_code(&self, range: &Range) -> String {
        let file = self.get(&range.filename);
        file.text[range.start.byte..range.end.byte].replace("\r\n", "\n")
    }
}

fn token_bounds(tokens: &[Token], range: &Range) -> (usize, usize) {
    let mut first = 0;
    let mut last = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.start.byte == range.start.byte {
            first = i;
        }
        if token.end.byte == range.end.byte {
            last = i;
        }
    }
    (first, last)
}

/// Collect the trivia before `first` and after `last` (inclusive indices).
pub fn trivia_from_index(
    tokens: &[Token],
    first: usize,
    last: usize,
    block_like: bool,
) -> (Vec<Token>, Vec<Token>) {
    assert!(first <= last, "first ({first}) must be <= last ({last})");

    // Work backwards from first to build up leading trivia.
    let mut leading: Vec<Token> = Vec::new();
    let mut i = first as isize - 1;
    let mut newline_index: isize = -1;
    let mut hit_brace = false;
    while i >= 0 {
        let token = &tokens[i as usize];
        if token.kind == TokenKind::Newline {
            newline_index = leading.len() as isize;
        }
        if is_trivia(token.kind) {
            leading.push(token.clone());
            i -= 1;
        } else {
            hit_brace = token.kind == TokenKind::LBrace;
            break;
        }
    }
    // In block mode, trivia beyond the last newline belongs to the previous
    // item in the block, unless we ran into the opening brace.
    if block_like && !hit_brace && newline_index != -1 {
        leading.truncate(newline_index as usize);
    }
    if leading.first().map(|t| t.kind) == Some(TokenKind::Newline) {
        leading.remove(0);
    }
    leading.reverse();

    // Now work forwards from last to build up trailing trivia.
    let mut trailing: Vec<Token> = Vec::new();
    let mut i = last + 1;
    let mut newline_index: isize = -1;
    let mut hit_brace = false;
    while i < tokens.len() {
        let token = &tokens[i];
        if newline_index == -1 && token.kind == TokenKind::Newline {
            newline_index = trailing.len() as isize;
        }
        if is_trivia(token.kind) {
            trailing.push(token.clone());
            i += 1;
        } else {
            hit_brace = token.kind == TokenKind::RBrace;
            break;
        }
    }
    if block_like && !hit_brace && newline_index != -1 {
        trailing.truncate(newline_index as usize);
    }
    if trailing.last().map(|t| t.kind) == Some(TokenKind::Newline) {
        trailing.pop();
    }

    (leading, trailing)
}

/// The structural shadow of a parsed body: the same attributes and blocks, in
/// the same order, but carrying byte ranges instead of expressions.
#[derive(Clone, Debug, Default)]
pub struct RawBody {
    pub items: Vec<RawItem>,
}

#[derive(Clone, Debug)]
pub enum RawItem {
    Attr(RawAttribute),
    Block(RawBlock),
}

#[derive(Clone, Debug)]
pub struct RawAttribute {
    pub name: String,
    /// Identifier through end of expression.
    pub range: Range,
    /// Just the expression.
    pub expr_range: Range,
}

#[derive(Clone, Debug)]
pub struct RawBlock {
    pub kind: String,
    pub labels: Vec<String>,
    /// Introducer identifier through the last label.
    pub decl_range: Range,
    /// Whole block including the closing brace.
    pub range: Range,
    pub body: RawBody,
}

/// Scan the top level of a lexed file into a [`RawBody`]. The file is known
/// to be valid (the parser already accepted it), so structural surprises are
/// internal assertions.
pub fn scan_file(file: &SourceFile) -> RawBody {
    let mut idx = 0;
    scan_body(&file.tokens, &mut idx, &file.name, false)
}

fn scan_body(tokens: &[Token], idx: &mut usize, filename: &str, terminated: bool) -> RawBody {
    let mut items = Vec::new();
    loop {
        while *idx < tokens.len() && is_trivia(tokens[*idx].kind) {
            *idx += 1;
        }
        if *idx >= tokens.len() {
            assert!(!terminated, "unterminated block in {filename}");
            break;
        }
        if tokens[*idx].kind == TokenKind::RBrace && terminated {
            break;
        }
        let name_tok = &tokens[*idx];
        assert!(
            name_tok.kind == TokenKind::Ident,
            "expected identifier at {}:{}:{}",
            filename,
            name_tok.start.line,
            name_tok.start.column
        );
        *idx += 1;

        if *idx < tokens.len() && tokens[*idx].kind == TokenKind::Assign {
            *idx += 1;
            let (expr_start, expr_end) = scan_expression(tokens, idx);
            items.push(RawItem::Attr(RawAttribute {
                name: name_tok.text.clone(),
                range: Range::new(filename, name_tok.start, expr_end),
                expr_range: Range::new(filename, expr_start, expr_end),
            }));
            continue;
        }

        // A block: zero or more labels then a brace-delimited body.
        let mut labels = Vec::new();
        let mut decl_end = name_tok.end;
        while *idx < tokens.len()
            && matches!(tokens[*idx].kind, TokenKind::Str | TokenKind::Ident)
        {
            let label = &tokens[*idx];
            labels.push(unquote_label(&label.text));
            decl_end = label.end;
            *idx += 1;
        }
        assert!(
            *idx < tokens.len() && tokens[*idx].kind == TokenKind::LBrace,
            "expected '{{' after block header at {}:{}",
            filename,
            name_tok.start.line
        );
        *idx += 1;
        let body = scan_body(tokens, idx, filename, true);
        assert!(
            *idx < tokens.len() && tokens[*idx].kind == TokenKind::RBrace,
            "unterminated block at {}:{}",
            filename,
            name_tok.start.line
        );
        let close = &tokens[*idx];
        *idx += 1;
        items.push(RawItem::Block(RawBlock {
            kind: name_tok.text.clone(),
            labels,
            decl_range: Range::new(filename, name_tok.start, decl_end),
            range: Range::new(filename, name_tok.start, close.end),
            body,
        }));
    }
    RawBody { items }
}

/// Consume one attribute expression, returning its start and end positions.
/// The expression ends at the first newline, line comment, or closing brace
/// at bracket depth zero.
fn scan_expression(tokens: &[Token], idx: &mut usize) -> (Pos, Pos) {
    let start = tokens[*idx].start;
    let mut end = tokens[*idx].end;
    let mut depth = 0i32;
    while *idx < tokens.len() {
        let token = &tokens[*idx];
        if depth == 0 {
            match token.kind {
                TokenKind::Newline | TokenKind::Comment | TokenKind::RBrace => break,
                TokenKind::Comma => break,
                _ => {}
            }
        }
        match token.kind {
            TokenKind::LBrace | TokenKind::LBrack | TokenKind::LParen => depth += 1,
            TokenKind::RBrace | TokenKind::RBrack | TokenKind::RParen => depth -= 1,
            _ => {}
        }
        end = token.end;
        *idx += 1;
    }
    (start, end)
}

fn unquote_label(text: &str) -> String {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
        .to_string()
}
