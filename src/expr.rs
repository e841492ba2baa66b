//! The expression translator: every TF expression kind is rewritten into a
//! PCL token stream. Traversal roots are resolved through [`Scopes`] so that
//! renamed declarations are referenced by their PCL names, and schema
//! knowledge drives object-key renaming and singleton projection.

use crate::pcl::{self, TokKind, Tokens};
use crate::scopes::{camel_case_name, Scopes};
use crate::state::ConvertState;
use hcl::expr::{
    BinaryOperator, Conditional, ForExpr, FuncCall, ObjectKey, Operation, TemplateExpr, Traversal,
    TraversalOperator, UnaryOperator,
};
use hcl::template::{Directive, Element, Template};
use hcl::Expression;
use std::collections::HashMap;

/// Append a part to a fully qualified dot-separated path. An empty root or
/// part collapses the whole path to unknown.
pub fn append_path(root: &str, part: &str) -> String {
    if root.is_empty() || part.is_empty() {
        return String::new();
    }
    format!("{root}.{part}")
}

/// Append an array descent to a fully qualified path.
pub fn append_path_array(root: &str) -> String {
    if root.is_empty() {
        return String::new();
    }
    format!("{root}[]")
}

/// `notImplemented("<source>")` for constructs with no PCL equivalent.
pub fn not_implemented(text: &str) -> Tokens {
    pcl::tokens_for_function_call("notImplemented", vec![vec![pcl::quoted(text)]])
}

fn expression_source(expr: &Expression) -> String {
    format!("{expr}")
}

/// A literal string if the expression is a static string or identifier.
/// The second value reports whether it was an identifier.
fn match_static_string(expr: &Expression) -> Option<(String, bool)> {
    match expr {
        Expression::String(s) => Some((s.clone(), false)),
        Expression::Variable(v) => Some((v.as_str().to_string(), true)),
        Expression::Parenthesis(inner) => match_static_string(inner),
        Expression::TemplateExpr(t) => {
            let template = Template::from_expr(t).ok()?;
            match template.elements() {
                [Element::Literal(s)] => Some((s.clone(), false)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn static_object_key(key: &ObjectKey) -> Option<(String, bool)> {
    match key {
        ObjectKey::Identifier(id) => Some((id.as_str().to_string(), true)),
        ObjectKey::Expression(expr) => match_static_string(expr),
        _ => None,
    }
}

/// The dotted type path of a traversal expression, for checking whether the
/// right-hand side of an assignment is itself a singleton-projected field.
fn expression_type_path(expr: &Expression) -> String {
    let Expression::Traversal(traversal) = expr else {
        return String::new();
    };
    let Expression::Variable(root) = &traversal.expr else {
        return String::new();
    };
    let mut path = root.as_str().to_string();
    for op in &traversal.operators {
        if let TraversalOperator::GetAttr(attr) = op {
            path.push('.');
            path.push_str(attr.as_str());
        }
    }
    path
}

/// Translate one expression into PCL tokens. `path` is the fully qualified
/// schema path of the value being produced, or empty when unknown.
pub fn convert_expression(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    path: &str,
    expr: &Expression,
) -> Tokens {
    match expr {
        Expression::Null => vec![pcl::ident("null")],
        Expression::Bool(b) => vec![pcl::ident(b.to_string())],
        Expression::Number(n) => vec![pcl::tok(TokKind::Number, n.to_string())],
        Expression::String(s) => vec![pcl::quoted(s)],
        Expression::Array(exprs) => {
            let elem_path = append_path_array(path);
            let elems = exprs
                .iter()
                .map(|e| convert_expression(state, scopes, &elem_path, e))
                .collect();
            pcl::tokens_for_tuple(elems)
        }
        Expression::Object(object) => convert_object_cons(state, scopes, path, object),
        Expression::TemplateExpr(template) => convert_template_expr(state, scopes, template),
        Expression::Variable(v) => rewrite_traversal(state, scopes, path, v.as_str(), &[]),
        Expression::Traversal(traversal) => convert_traversal(state, scopes, path, traversal),
        Expression::FuncCall(call) => convert_function_call(state, scopes, call),
        Expression::Parenthesis(inner) => {
            let mut tokens = vec![pcl::tok(TokKind::OParen, "(")];
            tokens.extend(convert_expression(state, scopes, "", inner));
            tokens.push(pcl::tok(TokKind::CParen, ")"));
            tokens
        }
        Expression::Conditional(conditional) => {
            convert_conditional(state, scopes, conditional)
        }
        Expression::Operation(operation) => match operation.as_ref() {
            Operation::Unary(unary) => {
                let text = match unary.operator {
                    UnaryOperator::Not => "!",
                    UnaryOperator::Neg => "-",
                };
                let mut tokens = vec![pcl::tok(TokKind::Unary, text)];
                tokens.extend(convert_expression(state, scopes, path, &unary.expr));
                tokens
            }
            Operation::Binary(binary) => {
                let mut tokens = convert_expression(state, scopes, path, &binary.lhs_expr);
                tokens.push(pcl::tok(TokKind::Op, binary_operator_text(binary.operator)));
                tokens.extend(convert_expression(state, scopes, path, &binary.rhs_expr));
                tokens
            }
        },
        Expression::ForExpr(for_expr) => convert_for_expr(state, scopes, for_expr),
        other => panic!("unhandled expression kind: {other:?}"),
    }
}

fn binary_operator_text(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Or => "||",
        BinaryOperator::And => "&&",
        BinaryOperator::Eq => "==",
        BinaryOperator::NotEq => "!=",
        BinaryOperator::Greater => ">",
        BinaryOperator::GreaterEq => ">=",
        BinaryOperator::Less => "<",
        BinaryOperator::LessEq => "<=",
        BinaryOperator::Plus => "+",
        BinaryOperator::Minus => "-",
        BinaryOperator::Mul => "*",
        BinaryOperator::Div => "/",
        BinaryOperator::Mod => "%",
    }
}

fn convert_conditional(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    conditional: &Conditional,
) -> Tokens {
    let mut tokens = convert_expression(state, scopes, "", &conditional.cond_expr);
    tokens.push(pcl::tok(TokKind::Op, "?"));
    tokens.extend(convert_expression(state, scopes, "", &conditional.true_expr));
    tokens.push(pcl::tok(TokKind::Op, ":"));
    tokens.extend(convert_expression(state, scopes, "", &conditional.false_expr));
    tokens
}

fn convert_object_cons(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    path: &str,
    object: &hcl::expr::Object<ObjectKey, Expression>,
) -> Tokens {
    // If the object has at least one key that is not an identifier, it must
    // be a map.
    let mut has_non_identifier_key = false;
    for (key, _) in object {
        if !matches!(static_object_key(key), Some((_, true))) {
            has_non_identifier_key = true;
            break;
        }
    }

    let mut items = Vec::new();
    for (key, value) in object {
        let static_key = static_object_key(key);
        let mut name_tokens: Option<Tokens> = None;
        let mut sub_path = String::new();

        // Keys might need renaming when translating for an object type; that
        // needs a statically known key and a known path.
        if !path.is_empty() {
            if let Some((name, is_identifier)) = &static_key {
                let is_map = scopes.is_map(path);
                let mut name = name.clone();
                if matches!(is_map, Some(true)) || has_non_identifier_key {
                    // A map type: leave the keys alone.
                } else {
                    sub_path = append_path(path, &name);
                    if state.rewrite_object_keys {
                        name = scopes.pulumi_name(&name, &sub_path);
                    }
                }
                name_tokens = Some(if *is_identifier {
                    vec![pcl::ident(name)]
                } else {
                    vec![pcl::quoted(&name)]
                });
            }
        }
        if name_tokens.is_none() {
            if let (Some((name, _)), false) = (&static_key, state.rewrite_object_keys) {
                name_tokens = Some(vec![pcl::quoted(name)]);
            }
        }
        let name_tokens = match name_tokens {
            Some(tokens) => tokens,
            None => match key {
                ObjectKey::Identifier(id) => vec![pcl::ident(id.as_str())],
                ObjectKey::Expression(expr) => convert_expression(state, scopes, "", expr),
                _ => vec![],
            },
        };

        let value_tokens = convert_expression(state, scopes, &sub_path, value);
        items.push((name_tokens, value_tokens));
    }
    pcl::tokens_for_object(items)
}

struct InvokeSpec {
    name: &'static str,
    token: &'static str,
    inputs: &'static [&'static str],
    output: &'static str,
    /// True for functions with a variable number of arguments; trailing
    /// arguments are packed into a single list under the last formal, since
    /// invokes do not support variadic arguments.
    param_args: bool,
}

macro_rules! invoke {
    ($name:literal, [$($input:literal),*]) => {
        InvokeSpec {
            name: $name,
            token: concat!("std:index:", $name),
            inputs: &[$($input),*],
            output: "result",
            param_args: false,
        }
    };
    ($name:literal, [$($input:literal),*], variadic) => {
        InvokeSpec {
            name: $name,
            token: concat!("std:index:", $name),
            inputs: &[$($input),*],
            output: "result",
            param_args: true,
        }
    };
}

/// Functions translated to `std` invokes, sorted by name.
static TF_FUNCTION_STD: &[InvokeSpec] = &[
    invoke!("abs", ["input"]),
    invoke!("abspath", ["input"]),
    invoke!("alltrue", ["input"]),
    invoke!("anytrue", ["input"]),
    invoke!("base64decode", ["input"]),
    invoke!("base64encode", ["input"]),
    invoke!("base64gzip", ["input"]),
    invoke!("base64sha256", ["input"]),
    invoke!("base64sha512", ["input"]),
    invoke!("basename", ["input"]),
    invoke!("bcrypt", ["input", "cost"]),
    invoke!("ceil", ["input"]),
    invoke!("chomp", ["input"]),
    invoke!("chunklist", ["input", "size"]),
    invoke!("cidrhost", ["input", "host"]),
    invoke!("cidrnetmask", ["input"]),
    invoke!("cidrsubnet", ["input", "newbits", "netnum"]),
    invoke!("cidrsubnets", ["input", "newbits"], variadic),
    invoke!("coalesce", ["input"], variadic),
    invoke!("coalescelist", ["input"], variadic),
    invoke!("compact", ["input"]),
    invoke!("concat", ["input"], variadic),
    invoke!("contains", ["input", "element"]),
    invoke!("csvdecode", ["input"]),
    invoke!("dirname", ["input"]),
    invoke!("distinct", ["input"]),
    invoke!("endswith", ["input", "suffix"]),
    invoke!("file", ["input"]),
    invoke!("filebase64", ["input"]),
    invoke!("filebase64sha256", ["input"]),
    invoke!("filebase64sha512", ["input"]),
    invoke!("fileexists", ["input"]),
    invoke!("filemd5", ["input"]),
    invoke!("filesha1", ["input"]),
    invoke!("filesha256", ["input"]),
    invoke!("filesha512", ["input"]),
    invoke!("flatten", ["input"]),
    invoke!("floor", ["input"]),
    invoke!("format", ["input", "args"], variadic),
    invoke!("formatlist", ["input", "args"], variadic),
    invoke!("indent", ["spaces", "input"]),
    invoke!("join", ["separator", "input"]),
    invoke!("jsondecode", ["input"]),
    invoke!("keys", ["input"]),
    invoke!("log", ["base", "input"]),
    invoke!("lookup", ["map", "key", "default"]),
    invoke!("lower", ["input"]),
    invoke!("max", ["input"], variadic),
    invoke!("md5", ["input"]),
    invoke!("merge", ["input"], variadic),
    invoke!("min", ["input"], variadic),
    invoke!("parseint", ["input", "base"]),
    invoke!("pathexpand", ["input"]),
    invoke!("pow", ["base", "exponent"]),
    invoke!("range", ["limit", "start", "step"]),
    invoke!("regex", ["pattern", "string"]),
    invoke!("regexall", ["pattern", "string"]),
    invoke!("replace", ["text", "search", "replace"]),
    invoke!("rsadecrypt", ["cipherText", "key"]),
    invoke!("setintersection", ["input"], variadic),
    invoke!("sha1", ["input"]),
    invoke!("sha256", ["input"]),
    invoke!("sha512", ["input"]),
    invoke!("signum", ["input"]),
    invoke!("slice", ["list", "from", "to"]),
    invoke!("sort", ["input"]),
    invoke!("split", ["separator", "text"]),
    invoke!("startswith", ["input", "prefix"]),
    invoke!("strrev", ["input"]),
    invoke!("substr", ["input", "offset", "length"]),
    invoke!("sum", ["input"]),
    invoke!("timeadd", ["duration", "timestamp"]),
    invoke!("timecmp", ["timestampa", "timestampb"]),
    invoke!("timestamp", []),
    invoke!("title", ["input"]),
    invoke!("tobool", ["input"]),
    invoke!("toset", ["input"]),
    invoke!("transpose", ["input"]),
    invoke!("trim", ["input", "cutset"]),
    invoke!("trimprefix", ["input", "prefix"]),
    invoke!("trimspace", ["input"]),
    invoke!("trimsuffix", ["input", "suffix"]),
    invoke!("upper", ["input"]),
    invoke!("urlencode", ["input"]),
    invoke!("uuid", []),
];

fn invoke_spec(name: &str) -> Option<&'static InvokeSpec> {
    TF_FUNCTION_STD
        .binary_search_by(|spec| spec.name.cmp(name))
        .ok()
        .map(|idx| &TF_FUNCTION_STD[idx])
}

/// Plain renames; the identity entries keep the function from being reported
/// as unsupported.
fn function_rename(name: &str) -> Option<&'static str> {
    match name {
        "sensitive" => Some("secret"),
        "jsonencode" => Some("toJSON"),
        "length" => Some("length"),
        "element" => Some("element"),
        _ => None,
    }
}

fn tracking_issue(name: &str) -> &'static str {
    match name {
        "formatdate" => "tf2pcl#196",
        "templatefile" => "tf2pcl#192",
        "try" => "tf2pcl#16",
        "yamlencode" => "tf2pcl#190",
        _ => "tf2pcl#65 (catch all issue)",
    }
}

fn convert_function_call(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    call: &FuncCall,
) -> Tokens {
    let name = call.name.name.as_str();

    let mut args: Vec<Tokens> = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        if name == "jsonencode" {
            // Embedded documents (e.g. policy JSON) keep their verbatim keys.
            let tokens = state
                .with_object_keys_disabled(|state| convert_expression(state, scopes, "", arg));
            args.push(tokens);
        } else {
            args.push(convert_expression(state, scopes, "", arg));
        }
    }

    // `list(...)` is just a tuple.
    if name == "list" {
        return pcl::tokens_for_tuple(args);
    }

    // `tolist(x)` normalizes sets to lists; everything is a list on the PCL
    // side already, so pass the argument through.
    if name == "tolist" && args.len() == 1 {
        return args.remove(0);
    }

    if let Some(renamed) = function_rename(name) {
        return pcl::tokens_for_function_call(renamed, args);
    }

    if let Some(spec) = invoke_spec(name) {
        let mut invoke_args: Vec<(Tokens, Tokens)> = Vec::new();

        // With `param_args`, trailing arguments pack into a list under the
        // last formal. A spread call (`f(a, xs...)`) arrives pre-packed, so
        // the final value is used as-is.
        if spec.param_args && !call.expand_final {
            let fixed = spec.inputs.len() - 1;
            for (i, formal) in spec.inputs.iter().take(fixed).enumerate() {
                if let Some(arg) = args.get(i) {
                    invoke_args.push((vec![pcl::ident(*formal)], arg.clone()));
                }
            }
            let rest = args.split_off(fixed.min(args.len()));
            invoke_args.push((
                vec![pcl::ident(spec.inputs[fixed])],
                pcl::tokens_for_tuple(rest),
            ));
        } else {
            if args.len() > spec.inputs.len() {
                state.diag_at_current(
                    crate::Severity::Warning,
                    "Unexpected argument count to function",
                    format!(
                        "Got {} arguments to function {}, expected {}",
                        args.len(),
                        name,
                        spec.inputs.len()
                    ),
                );
            }
            for (i, arg) in args.into_iter().enumerate() {
                let formal = match spec.inputs.get(i) {
                    Some(formal) => formal.to_string(),
                    None => format!("arg{i}"),
                };
                invoke_args.push((vec![pcl::ident(formal)], arg));
            }
        }

        let object: Vec<(Tokens, Tokens)> = invoke_args;
        let mut tokens = pcl::tokens_for_function_call(
            "invoke",
            vec![vec![pcl::quoted(spec.token)], pcl::tokens_for_object(object)],
        );
        if !spec.output.is_empty() {
            tokens.push(pcl::tok(TokKind::Dot, "."));
            tokens.push(pcl::ident(spec.output));
        }
        return tokens;
    }

    state.diag_at_current(
        crate::Severity::Warning,
        "Function not yet implemented",
        format!("Function {} not yet implemented, see {}", name, tracking_issue(name)),
    );
    not_implemented(&expression_source(&Expression::FuncCall(Box::new(call.clone()))))
}

fn convert_template_expr(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    template_expr: &TemplateExpr,
) -> Tokens {
    let heredoc = match template_expr {
        TemplateExpr::Heredoc(heredoc) => {
            let strip = match heredoc.strip {
                hcl::expr::HeredocStripMode::Indent => "-",
                _ => "",
            };
            Some((
                format!("<<{strip}{}\n", heredoc.delimiter.as_str()),
                heredoc.delimiter.as_str().to_string(),
            ))
        }
        _ => None,
    };

    let template = match Template::from_expr(template_expr) {
        Ok(template) => template,
        Err(err) => {
            state.diag_at_current(
                crate::Severity::Error,
                "Failed to parse template",
                err.to_string(),
            );
            return Vec::new();
        }
    };

    let mut tokens = Tokens::new();
    match &heredoc {
        Some((open, _)) => tokens.push(pcl::tok(TokKind::OHeredoc, open.clone())),
        None => tokens.push(pcl::tok(TokKind::OQuote, "\"")),
    }
    convert_template_elements(state, scopes, template.elements(), heredoc.is_some(), &mut tokens);
    match &heredoc {
        Some((_, close)) => {
            let ends_with_newline = tokens
                .last()
                .map(|t| {
                    matches!(t.kind, TokKind::StringLit | TokKind::OHeredoc)
                        && t.text.ends_with('\n')
                })
                .unwrap_or(false);
            if !ends_with_newline {
                tokens.push(pcl::tok(TokKind::StringLit, "\n"));
            }
            tokens.push(pcl::tok(TokKind::CHeredoc, close.clone()));
        }
        None => tokens.push(pcl::tok(TokKind::CQuote, "\"")),
    }
    tokens
}

fn convert_template_elements(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    elements: &[Element],
    heredoc: bool,
    tokens: &mut Tokens,
) {
    for element in elements {
        match element {
            Element::Literal(literal) => {
                if heredoc {
                    // Newlines remain real newlines in heredocs.
                    let parts: Vec<&str> = literal.split('\n').collect();
                    for (i, part) in parts.iter().enumerate() {
                        if !part.is_empty() {
                            tokens.push(pcl::tok(TokKind::StringLit, *part));
                        }
                        if i < parts.len() - 1 {
                            tokens.push(pcl::tok(TokKind::StringLit, "\n"));
                        }
                    }
                } else {
                    tokens.push(pcl::tok(TokKind::StringLit, pcl::escape_string(literal)));
                }
            }
            Element::Interpolation(interpolation) => {
                tokens.push(pcl::tok(TokKind::TemplateInterp, "${"));
                tokens.extend(convert_expression(state, scopes, "", &interpolation.expr));
                tokens.push(pcl::tok(TokKind::TemplateSeqEnd, "}"));
            }
            Element::Directive(directive) => {
                convert_template_directive(state, scopes, directive, heredoc, tokens);
            }
        }
    }
}

fn convert_template_directive(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    directive: &Directive,
    heredoc: bool,
    tokens: &mut Tokens,
) {
    match directive {
        Directive::For(for_directive) => {
            // The collection doesn't yet have access to the key/value scopes.
            let coll = convert_expression(state, scopes, "", &for_directive.collection_expr);

            let mut locals = HashMap::new();
            let value_name = camel_case_name(for_directive.value_var.as_str());
            locals.insert(
                for_directive.value_var.as_str().to_string(),
                value_name.clone(),
            );
            let key_name = for_directive.key_var.as_ref().map(|key_var| {
                let name = camel_case_name(key_var.as_str());
                locals.insert(key_var.as_str().to_string(), name.clone());
                name
            });
            scopes.push(locals);

            tokens.push(pcl::tok(TokKind::ControlStart, "%{"));
            tokens.push(pcl::keyword("for"));
            if let Some(key_name) = key_name {
                tokens.push(pcl::ident(key_name));
                tokens.push(pcl::tok(TokKind::Comma, ","));
            }
            tokens.push(pcl::ident(value_name));
            tokens.push(pcl::keyword("in"));
            tokens.extend(coll);
            tokens.push(pcl::tok(TokKind::ControlEnd, "~}"));

            convert_template_elements(
                state,
                scopes,
                for_directive.template.elements(),
                heredoc,
                tokens,
            );
            scopes.pop();

            tokens.push(pcl::tok(TokKind::ControlStart, "%{"));
            tokens.push(pcl::ident("endfor"));
            tokens.push(pcl::tok(TokKind::ControlEnd, "~}"));
        }
        Directive::If(if_directive) => {
            tokens.push(pcl::tok(TokKind::ControlStart, "%{"));
            tokens.push(pcl::keyword("if"));
            tokens.extend(convert_expression(state, scopes, "", &if_directive.cond_expr));
            tokens.push(pcl::tok(TokKind::ControlEnd, "~}"));
            convert_template_elements(
                state,
                scopes,
                if_directive.true_template.elements(),
                heredoc,
                tokens,
            );
            if let Some(false_template) = &if_directive.false_template {
                tokens.push(pcl::tok(TokKind::ControlStart, "%{"));
                tokens.push(pcl::keyword("else"));
                tokens.push(pcl::tok(TokKind::ControlEnd, "~}"));
                convert_template_elements(state, scopes, false_template.elements(), heredoc, tokens);
            }
            tokens.push(pcl::tok(TokKind::ControlStart, "%{"));
            tokens.push(pcl::ident("endif"));
            tokens.push(pcl::tok(TokKind::ControlEnd, "~}"));
        }
    }
}

fn convert_for_expr(state: &mut ConvertState, scopes: &mut Scopes, for_expr: &ForExpr) -> Tokens {
    // The collection doesn't yet have access to the key/value scopes.
    let coll = convert_expression(state, scopes, "", &for_expr.collection_expr);

    let mut locals = HashMap::new();
    let value_name = camel_case_name(for_expr.value_var.as_str());
    locals.insert(for_expr.value_var.as_str().to_string(), value_name.clone());
    let key_name = for_expr.key_var.as_ref().map(|key_var| {
        let name = camel_case_name(key_var.as_str());
        locals.insert(key_var.as_str().to_string(), name.clone());
        name
    });
    scopes.push(locals);

    let key_tokens = for_expr
        .key_expr
        .as_ref()
        .map(|e| convert_expression(state, scopes, "", e));
    let value_tokens = convert_expression(state, scopes, "", &for_expr.value_expr);
    let cond_tokens = for_expr
        .cond_expr
        .as_ref()
        .map(|e| convert_expression(state, scopes, "", e));

    scopes.pop();

    let object = key_tokens.is_some();
    let mut tokens = Tokens::new();
    tokens.push(if object {
        pcl::tok(TokKind::OBrace, "{")
    } else {
        pcl::tok(TokKind::OBrack, "[")
    });

    tokens.push(pcl::keyword("for"));
    if let Some(key_name) = key_name {
        tokens.push(pcl::ident(key_name));
        tokens.push(pcl::tok(TokKind::Comma, ","));
    }
    tokens.push(pcl::ident(value_name));
    tokens.push(pcl::keyword("in"));
    tokens.extend(coll);
    tokens.push(pcl::tok(TokKind::Op, ":"));

    if let Some(key_tokens) = key_tokens {
        tokens.extend(key_tokens);
        tokens.push(pcl::tok(TokKind::FatArrow, "=>"));
    }
    tokens.extend(value_tokens);
    if for_expr.grouping {
        tokens.push(pcl::tok(TokKind::Ellipsis, "..."));
    }
    if let Some(cond_tokens) = cond_tokens {
        tokens.push(pcl::keyword("if"));
        tokens.extend(cond_tokens);
    }

    tokens.push(if object {
        pcl::tok(TokKind::CBrace, "}")
    } else {
        pcl::tok(TokKind::CBrack, "]")
    });
    tokens
}

fn convert_traversal(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    path: &str,
    traversal: &Traversal,
) -> Tokens {
    match &traversal.expr {
        Expression::Variable(root) => {
            // Sandboxed module outputs keep their casing; only the module
            // name itself is rewritten.
            if root.as_str() == "module" {
                if let Some(TraversalOperator::GetAttr(attr)) = traversal.operators.first() {
                    if let Some(name) = state.sandboxed_module_names.get(attr.as_str()).cloned() {
                        let mut tokens = vec![pcl::ident(name)];
                        verbatim_traversal(state, scopes, &traversal.operators[1..], &mut tokens);
                        return tokens;
                    }
                }
            }
            rewrite_traversal(state, scopes, path, root.as_str(), &traversal.operators)
        }
        other => {
            // A traversal whose root is itself an expression: translate the
            // source, then rewrite the relative part.
            let mut tokens = convert_expression(state, scopes, "", other);
            tokens.extend(rewrite_relative_traversal(
                state,
                scopes,
                path.to_string(),
                &traversal.operators,
            ));
            tokens
        }
    }
}

fn verbatim_traversal(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    operators: &[TraversalOperator],
    tokens: &mut Tokens,
) {
    for op in operators {
        match op {
            TraversalOperator::GetAttr(attr) => {
                tokens.push(pcl::tok(TokKind::Dot, "."));
                tokens.push(pcl::ident(attr.as_str()));
            }
            TraversalOperator::Index(key) => {
                tokens.push(pcl::tok(TokKind::OBrack, "["));
                tokens.extend(convert_expression(state, scopes, "", key));
                tokens.push(pcl::tok(TokKind::CBrack, "]"));
            }
            TraversalOperator::LegacyIndex(n) => {
                tokens.push(pcl::tok(TokKind::OBrack, "["));
                tokens.push(pcl::tok(TokKind::Number, n.to_string()));
                tokens.push(pcl::tok(TokKind::CBrack, "]"));
            }
            TraversalOperator::AttrSplat | TraversalOperator::FullSplat => {
                tokens.push(pcl::tok(TokKind::OBrack, "["));
                tokens.push(pcl::tok(TokKind::Op, "*"));
                tokens.push(pcl::tok(TokKind::CBrack, "]"));
            }
            _ => {}
        }
    }
}

fn traversal_source(root: &str, operators: &[TraversalOperator]) -> String {
    let mut out = root.to_string();
    for op in operators {
        match op {
            TraversalOperator::GetAttr(attr) => {
                out.push('.');
                out.push_str(attr.as_str());
            }
            TraversalOperator::Index(key) => {
                out.push('[');
                out.push_str(&format!("{key}"));
                out.push(']');
            }
            TraversalOperator::LegacyIndex(n) => {
                out.push_str(&format!("[{n}]"));
            }
            TraversalOperator::AttrSplat => out.push_str(".*"),
            TraversalOperator::FullSplat => out.push_str("[*]"),
            _ => {}
        }
    }
    out
}

fn first_attr(operators: &[TraversalOperator]) -> Option<&str> {
    match operators.first() {
        Some(TraversalOperator::GetAttr(attr)) => Some(attr.as_str()),
        _ => None,
    }
}

fn second_attr(operators: &[TraversalOperator]) -> Option<&str> {
    match operators.get(1) {
        Some(TraversalOperator::GetAttr(attr)) => Some(attr.as_str()),
        _ => None,
    }
}

/// Rewrite a root traversal: the first segment decides whether this is a
/// config value, local, data source, resource, iteration variable, special
/// builtin, or an unresolved name that passes through camel-cased.
fn rewrite_traversal(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    path: &str,
    root: &str,
    operators: &[TraversalOperator],
) -> Tokens {
    let first = first_attr(operators);
    let second = second_attr(operators);
    let matches = |root_name: &str, attr_name: &str| root == root_name && first == Some(attr_name);

    if matches("terraform", "workspace")
        || matches("terraform", "applying")
        || matches("path", "module")
    {
        state.diag_at_current(
            crate::Severity::Warning,
            "Terraform input not yet implemented",
            root.to_string(),
        );
        return not_implemented(&traversal_source(root, operators));
    }
    if matches("path", "root") {
        return pcl::tokens_for_function_call("rootDirectory", Vec::new());
    }
    if matches("path", "cwd") {
        state.diag_at_current(
            crate::Severity::Warning,
            "Converting the builtin variable path.cwd with differing behavior",
            "The builtin variable path.cwd is being converted, but cwd will start at the \
             project program directory, not the execution directory"
                .to_string(),
        );
        return pcl::tokens_for_function_call("cwd", Vec::new());
    }

    let mut tokens = Tokens::new();
    if root == "var" && first.is_some() {
        let name = scopes.get_or_add_name(&format!("var.{}", first.unwrap()), "", "Config");
        tokens.push(pcl::ident(name));
        tokens.extend(rewrite_relative_traversal(
            state,
            scopes,
            String::new(),
            &operators[1..],
        ));
    } else if root == "local" && first.is_some() {
        let name = scopes.get_or_add_name(&format!("local.{}", first.unwrap()), "their", "");
        tokens.push(pcl::ident(name));
        tokens.extend(rewrite_relative_traversal(
            state,
            scopes,
            String::new(),
            &operators[1..],
        ));
    } else if root == "data" && first.is_some() && second.is_some() {
        let data_path = format!("data.{}.{}", first.unwrap(), second.unwrap());
        let root_name = scopes.lookup(&data_path);
        if !root_name.is_empty() {
            let suffix = format!("data{}", camel_case_name(&root_name));
            let name = scopes.get_or_add_name(&data_path, "", &suffix);
            tokens.push(pcl::ident(name));
            tokens.extend(rewrite_relative_traversal(
                state,
                scopes,
                data_path,
                &operators[2..],
            ));
        } else {
            // Unbound data source usage: data.{type}.{name}.{rest} becomes
            // {name}{Type}.{rest}.
            let suffix = camel_case_name(first.unwrap());
            let name = scopes.get_or_add_name(&data_path, "", &suffix);
            tokens.push(pcl::ident(name));
            tokens.extend(rewrite_relative_traversal(
                state,
                scopes,
                String::new(),
                &operators[2..],
            ));
        }
    } else if root == "count" && first.is_some() {
        if first == Some("index") {
            match scopes.count_index.clone() {
                Some(replacement) => {
                    tokens.extend(replacement);
                    tokens.extend(rewrite_relative_traversal(
                        state,
                        scopes,
                        String::new(),
                        &operators[1..],
                    ));
                }
                None => {
                    state.diag_at_current(
                        crate::Severity::Error,
                        "Reference to \"count\" in non-counted context",
                        "The \"count\" object can only be used in \"module\", \"resource\", and \
                         \"data\" blocks, and only when the \"count\" argument is set."
                            .to_string(),
                    );
                    return Vec::new();
                }
            }
        } else {
            state.diag_at_current(
                crate::Severity::Error,
                "Invalid \"count\" attribute",
                format!(
                    "The \"count\" object does not have an attribute named {:?}. The only \
                     supported attribute is count.index.",
                    first.unwrap()
                ),
            );
            return Vec::new();
        }
    } else if root == "each" && first.is_some() {
        // This might be the special "each" value or just a local.
        let local_name = scopes.lookup("each");
        if !local_name.is_empty() {
            tokens.push(pcl::ident(local_name));
            tokens.extend(rewrite_relative_traversal(state, scopes, String::new(), operators));
        } else if first == Some("key") {
            match scopes.each_key.clone() {
                Some(replacement) => {
                    tokens.extend(replacement);
                    tokens.extend(rewrite_relative_traversal(
                        state,
                        scopes,
                        String::new(),
                        &operators[1..],
                    ));
                }
                None => {
                    state.diag_at_current(
                        crate::Severity::Error,
                        "Reference to \"each\" in context without for_each",
                        "The \"each\" object can be used only in \"module\" or \"resource\" \
                         blocks, and only when the \"for_each\" argument is set."
                            .to_string(),
                    );
                    return Vec::new();
                }
            }
        } else if first == Some("value") {
            match scopes.each_value.clone() {
                Some(replacement) => {
                    tokens.extend(replacement);
                    tokens.extend(rewrite_relative_traversal(
                        state,
                        scopes,
                        path.to_string(),
                        &operators[1..],
                    ));
                }
                None => {
                    state.diag_at_current(
                        crate::Severity::Error,
                        "each.value cannot be used in this context",
                        "A reference to \"each.value\" has been used in a context in which it is \
                         unavailable. Remove this reference to each.value in your configuration \
                         to work around this error."
                            .to_string(),
                    );
                    return Vec::new();
                }
            }
        } else {
            state.diag_at_current(
                crate::Severity::Error,
                "Invalid \"each\" attribute",
                format!(
                    "The \"each\" object does not have an attribute named {:?}. The supported \
                     attributes are each.key and each.value.",
                    first.unwrap()
                ),
            );
            return Vec::new();
        }
    } else if let Some(first) = first {
        // A resource lookup, or an attribute access on a local variable.
        let rewritten = state.renamed_name(first);
        let resource_path = format!("{root}.{rewritten}");
        let resource_name = scopes.lookup(&resource_path);
        if !resource_name.is_empty() {
            // A local variable would never be recorded with a "." in it, so
            // this is a resource.
            tokens.push(pcl::ident(resource_name));
            tokens.extend(rewrite_relative_traversal(
                state,
                scopes,
                resource_path,
                &operators[1..],
            ));
        } else {
            let local_name = scopes.lookup(root);
            if !local_name.is_empty() {
                tokens.push(pcl::ident(local_name));
                tokens.extend(rewrite_relative_traversal(state, scopes, String::new(), operators));
            } else {
                // An undeclared resource: {type}.{name}.{rest} becomes
                // {name}{Type}.{rest}, memoized for later references.
                let suffix = camel_case_name(root);
                let name = scopes.get_or_add_name(&resource_path, "", &suffix);
                tokens.push(pcl::ident(name));
                tokens.extend(rewrite_relative_traversal(
                    state,
                    scopes,
                    String::new(),
                    &operators[1..],
                ));
            }
        }
    } else {
        // A bare variable reference.
        let name = scopes.lookup(root);
        if !name.is_empty() {
            tokens.push(pcl::ident(name));
        } else {
            // An object key or an undeclared variable; match PCL style.
            tokens.push(pcl::ident(camel_case_name(root)));
        }
        tokens.extend(rewrite_relative_traversal(state, scopes, String::new(), operators));
    }
    tokens
}

/// Rewrite the relative part of a traversal, consulting the schema for
/// attribute renames, singleton suppression, and index-to-attribute
/// rewriting.
pub fn rewrite_relative_traversal(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    path: String,
    operators: &[TraversalOperator],
) -> Tokens {
    let Some(op) = operators.first() else {
        return Vec::new();
    };

    let mut tokens = Tokens::new();
    match op {
        TraversalOperator::GetAttr(attr) => {
            let (name, new_path) = if !path.is_empty() {
                let new_path = append_path(&path, attr.as_str());
                (scopes.pulumi_name(attr.as_str(), &new_path), new_path)
            } else {
                (camel_case_name(attr.as_str()), String::new())
            };
            tokens.push(pcl::tok(TokKind::Dot, "."));
            tokens.push(pcl::ident(name));
            tokens.extend(rewrite_relative_traversal(
                state,
                scopes,
                new_path,
                &operators[1..],
            ));
        }
        TraversalOperator::Index(key) => {
            if scopes.is_property_path(&path) && scopes.max_items_one(&path) {
                // Indexing a singleton field: skip the index altogether.
                tokens.extend(rewrite_relative_traversal(state, scopes, path, &operators[1..]));
                return tokens;
            }
            // If the key is a static string and the container is an object
            // (not a map), prefer attribute access.
            if let Some((name, _)) = match_static_string(key) {
                if !path.is_empty()
                    && scopes.is_property_path(&path)
                    && !matches!(scopes.is_map(&path), Some(true))
                    && state.rewrite_object_keys
                {
                    let new_path = append_path(&path, &name);
                    let renamed = scopes.pulumi_name(&name, &new_path);
                    tokens.push(pcl::tok(TokKind::Dot, "."));
                    tokens.push(pcl::ident(renamed));
                    tokens.extend(rewrite_relative_traversal(
                        state,
                        scopes,
                        new_path,
                        &operators[1..],
                    ));
                    return tokens;
                }
            }
            tokens.push(pcl::tok(TokKind::OBrack, "["));
            tokens.extend(convert_expression(state, scopes, "", key));
            tokens.push(pcl::tok(TokKind::CBrack, "]"));
            tokens.extend(rewrite_relative_traversal(state, scopes, path, &operators[1..]));
        }
        TraversalOperator::LegacyIndex(n) => {
            tokens.push(pcl::tok(TokKind::OBrack, "["));
            tokens.push(pcl::tok(TokKind::Number, n.to_string()));
            tokens.push(pcl::tok(TokKind::CBrack, "]"));
            tokens.extend(rewrite_relative_traversal(state, scopes, path, &operators[1..]));
        }
        TraversalOperator::AttrSplat | TraversalOperator::FullSplat => {
            tokens.push(pcl::tok(TokKind::OBrack, "["));
            tokens.push(pcl::tok(TokKind::Op, "*"));
            tokens.push(pcl::tok(TokKind::CBrack, "]"));
            tokens.extend(rewrite_relative_traversal(
                state,
                scopes,
                String::new(),
                &operators[1..],
            ));
        }
        _ => {}
    }
    tokens
}

/// Project a translated list expression to its single element: literal lists
/// drop their brackets, anything else is indexed at zero.
pub fn project_list_to_singleton(tokens: Tokens) -> Tokens {
    let open = tokens
        .iter()
        .position(|t| !matches!(t.kind, TokKind::Comment | TokKind::Newline))
        .filter(|&i| tokens[i].kind == TokKind::OBrack);
    let close = tokens
        .iter()
        .rposition(|t| !matches!(t.kind, TokKind::Comment | TokKind::Newline))
        .filter(|&i| tokens[i].kind == TokKind::CBrack);

    match (open, close) {
        (Some(open), Some(close)) => tokens
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i != open && *i != close)
            .map(|(_, t)| t)
            .collect(),
        _ => {
            let mut tokens = tokens;
            tokens.push(pcl::tok(TokKind::OBrack, "["));
            tokens.push(pcl::tok(TokKind::Number, "0"));
            tokens.push(pcl::tok(TokKind::CBrack, "]"));
            tokens
        }
    }
}

/// Whether an attribute assignment needs singleton projection: the target is
/// `MaxItemsOne` and the source expression is not already a singleton field.
pub fn needs_singleton_projection(scopes: &Scopes, attr_path: &str, expr: &Expression) -> bool {
    if !scopes.max_items_one(attr_path) {
        return false;
    }
    let source_path = expression_type_path(expr);
    if scopes.is_property_path(&source_path) && scopes.max_items_one(&source_path) {
        return false;
    }
    true
}
