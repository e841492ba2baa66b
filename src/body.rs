//! The body translator: typed declaration bodies (resources, data sources,
//! variables, locals, outputs, module calls) become PCL blocks and
//! attributes, with schema-directed renaming, block-to-list collection,
//! dynamic block rewriting, and singleton projection.

use crate::diag::Severity;
use crate::expr::{
    append_path, append_path_array, convert_expression, needs_singleton_projection,
    not_implemented, project_list_to_singleton,
};
use crate::parser::{self, Local, ModuleCall, Output, Provisioner, Resource, Variable};
use crate::pcl::{self, TokKind, Tokens};
use crate::scopes::{camel_case_name, Scopes};
use crate::state::ConvertState;
use anyhow::{bail, Result};
use std::collections::{BTreeMap, HashMap};

/// The provider implied by a resource type name: the prefix before the first
/// underscore.
pub fn implied_provider(type_name: &str) -> &str {
    match type_name.find('_') {
        Some(under) => &type_name[..under],
        None => type_name,
    }
}

/// Best guess at a PCL token for a TF type name: `aws_bucket` becomes
/// `aws:index:bucket`.
pub fn implied_token(type_name: &str) -> String {
    match type_name.find('_') {
        Some(under) => {
            let provider = &type_name[..under];
            let rest = &type_name[under + 1..];
            format!("{provider}:index:{}", camel_case_name(rest))
        }
        None => camel_case_name(type_name),
    }
}

/// One converted attribute of a body, with enough position information to
/// re-sort into source order.
#[derive(Clone, Debug)]
pub struct BodyAttr {
    pub line: usize,
    pub name: String,
    pub trivia: Tokens,
    pub value: Tokens,
}

/// Assemble converted body attributes into an object literal.
pub fn tokens_for_body(attrs: Vec<BodyAttr>) -> Tokens {
    let items = attrs
        .into_iter()
        .map(|attr| {
            let mut name = attr.trivia;
            name.push(pcl::ident(attr.name));
            (name, attr.value)
        })
        .collect();
    pcl::tokens_for_object(items)
}

/// Convert a declaration body, treating nested blocks as attributes.
pub fn convert_body(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    path: &str,
    body: &parser::ConfigBody,
) -> Vec<BodyAttr> {
    assert!(!path.is_empty(), "path should not be empty");

    let mut new_attributes: Vec<BodyAttr> = Vec::new();
    // Blocks that repeat become lists keyed by name.
    let mut block_lists: BTreeMap<String, Vec<(usize, Vec<BodyAttr>)>> = BTreeMap::new();
    let mut pushed_scopes = 0usize;

    for block in body.blocks() {
        if block.kind == "timeouts" {
            // A resource option block with no equivalent on the PCL side.
            continue;
        }

        let mut block_path = append_path(path, &block.kind);
        let mut name = block.kind.clone();
        if block.kind == "dynamic" {
            // For dynamic blocks the path is the first label, not "dynamic".
            name = block.labels.first().cloned().unwrap_or_default();
            block_path = append_path(path, &name);
        }
        let is_list = !scopes.max_items_one(&block_path) && !scopes.is_resource(&block_path);
        name = scopes.pulumi_name(&name, &block_path);
        if is_list {
            block_path = append_path_array(&block_path);
        }

        if block.kind == "dynamic" {
            // The block might carry an "iterator" entry naming the variable.
            let tf_each_var = block
                .body
                .find_attr("iterator")
                .and_then(|attr| parser::literal_string(&attr.expr))
                .or_else(|| {
                    block.body.find_attr("iterator").and_then(|attr| match &attr.expr {
                        hcl::Expression::Variable(v) => Some(v.as_str().to_string()),
                        _ => None,
                    })
                })
                .unwrap_or_else(|| block.labels.first().cloned().unwrap_or_default());

            let pulumi_each_var = scopes.add_nested_unique("entry", "", "");
            pushed_scopes += 1;

            let Some(for_each_attr) = block.body.find_attr("for_each") else {
                continue;
            };
            let for_each_tokens = convert_expression(state, scopes, path, &for_each_attr.expr);

            let mut dynamic_tokens = vec![
                pcl::tok(TokKind::OBrack, "["),
                pcl::keyword("for"),
                pcl::ident(pulumi_each_var.clone()),
                pcl::keyword("in"),
            ];
            // Wrap the collection in entries() so each item has key/value.
            dynamic_tokens.extend(pcl::tokens_for_function_call(
                "entries",
                vec![for_each_tokens],
            ));
            dynamic_tokens.push(pcl::tok(TokKind::Op, ":"));

            let mut body_tokens = vec![
                pcl::tok(TokKind::OBrace, "{"),
                pcl::tok(TokKind::CBrace, "}"),
            ];
            for inner in block.body.blocks() {
                if inner.kind == "content" {
                    scopes.push(HashMap::from([(
                        tf_each_var.clone(),
                        pulumi_each_var.clone(),
                    )]));
                    let content = convert_body(state, scopes, &block_path, &inner.body);
                    body_tokens = tokens_for_body(content);
                    scopes.pop();
                }
            }
            dynamic_tokens.extend(body_tokens);
            dynamic_tokens.push(pcl::tok(TokKind::CBrack, "]"));

            if !is_list {
                // A singleton block attribute rather than a list.
                dynamic_tokens =
                    pcl::tokens_for_function_call("singleOrNone", vec![dynamic_tokens]);
            }

            new_attributes.push(BodyAttr {
                line: 0,
                name,
                trivia: Tokens::new(),
                value: dynamic_tokens,
            });
        } else if !is_list {
            let content = convert_body(state, scopes, &block_path, &block.body);
            new_attributes.push(BodyAttr {
                line: block.def_range.start.line,
                name,
                trivia: Tokens::new(),
                value: tokens_for_body(content),
            });
        } else {
            let content = convert_body(state, scopes, &block_path, &block.body);
            block_lists
                .entry(name)
                .or_default()
                .push((block.def_range.start.line, content));
        }
    }

    // Assemble repeated blocks; names iterate in sorted order so state
    // mutation stays deterministic, the final sort below restores source
    // order.
    for (name, items) in block_lists {
        let mut line = usize::MAX;
        let mut list_tokens = vec![pcl::tok(TokKind::OBrack, "[")];
        for (i, (item_line, item)) in items.into_iter().enumerate() {
            if i > 0 {
                list_tokens.push(pcl::tok(TokKind::Comma, ","));
            }
            line = line.min(item_line);
            list_tokens.extend(tokens_for_body(item));
        }
        list_tokens.push(pcl::tok(TokKind::CBrack, "]"));
        new_attributes.push(BodyAttr {
            line,
            name,
            trivia: Tokens::new(),
            value: list_tokens,
        });
    }

    // Attributes, again iterated in name order for deterministic mutation.
    let mut attrs: Vec<&parser::ConfigAttr> = body.attrs().collect();
    attrs.sort_by_key(|a| a.name.clone());
    for attr in attrs {
        let attr_path = append_path(path, &attr.name);
        let name = if state.rewrite_object_keys {
            scopes.pulumi_name(&attr.name, &attr_path)
        } else {
            attr.name.clone()
        };

        let full_range = state.sources.attribute_range(&attr.expr_range);
        let (leading, _) = state.sources.trivia_around(&full_range, true);
        let (_, trailing) = state.sources.trivia_around(&attr.expr_range, true);

        state.current_subject = Some(attr.range.clone());
        let mut value = convert_expression(state, scopes, &attr_path, &attr.expr);

        // A MaxItemsOne property is a list in TF but a single value in PCL;
        // project unless the source is itself such a field.
        if needs_singleton_projection(scopes, &attr_path, &attr.expr) {
            value = project_list_to_singleton(value);
        }

        if let Some(asset) = scopes.is_asset(&attr_path) {
            let call = if asset.is_archive() {
                "fileArchive"
            } else {
                "fileAsset"
            };
            value = pcl::tokens_for_function_call(call, vec![value]);
        }

        value.extend(pcl::trivia_tokens(&trailing));
        new_attributes.push(BodyAttr {
            line: attr.range.start.line,
            name,
            trivia: pcl::trivia_tokens(&leading),
            value,
        });
    }

    new_attributes.sort_by_key(|attr| attr.line);
    for _ in 0..pushed_scopes {
        scopes.pop();
    }
    new_attributes
}

/// Evaluate a pure literal expression. Anything that needs scope or provider
/// state fails, and the caller decides how to degrade.
pub fn eval_literal(expr: &hcl::Expression) -> Result<hcl::Value> {
    eval_value(expr, None)
}

/// Evaluate a provider-config expression: pure literals, plus references to
/// locals whose defining expressions are themselves evaluable.
pub fn eval_config_value(scopes: &Scopes, expr: &hcl::Expression) -> Result<hcl::Value> {
    eval_value(expr, Some(scopes))
}

fn eval_value(expr: &hcl::Expression, scopes: Option<&Scopes>) -> Result<hcl::Value> {
    use hcl::Expression;
    match expr {
        Expression::Null => Ok(hcl::Value::Null),
        Expression::Bool(b) => Ok(hcl::Value::Bool(*b)),
        Expression::Number(n) => Ok(hcl::Value::Number(n.clone())),
        Expression::String(s) => Ok(hcl::Value::String(s.clone())),
        Expression::TemplateExpr(t) => match parser::literal_string(expr) {
            Some(s) => Ok(hcl::Value::String(s)),
            None => bail!("template with interpolation is not a literal: {t}"),
        },
        Expression::Parenthesis(inner) => eval_value(inner, scopes),
        Expression::Array(exprs) => {
            let mut out = Vec::with_capacity(exprs.len());
            for e in exprs {
                out.push(eval_value(e, scopes)?);
            }
            Ok(hcl::Value::Array(out))
        }
        Expression::Object(object) => {
            let mut map = hcl::Map::new();
            for (key, value) in object {
                let key: String = key.clone().into();
                map.insert(key, eval_value(value, scopes)?);
            }
            Ok(hcl::Value::Object(map))
        }
        Expression::Conditional(conditional) => match eval_value(&conditional.cond_expr, scopes)? {
            hcl::Value::Bool(true) => eval_value(&conditional.true_expr, scopes),
            hcl::Value::Bool(false) => eval_value(&conditional.false_expr, scopes),
            other => bail!("conditional must evaluate to bool, got {other:?}"),
        },
        Expression::Traversal(traversal) => {
            let Some(scopes) = scopes else {
                bail!("expression is not a literal: {expr}");
            };
            let hcl::Expression::Variable(root) = &traversal.expr else {
                bail!("cannot evaluate traversal: {expr}");
            };
            let [hcl::expr::TraversalOperator::GetAttr(attr)] = traversal.operators.as_slice()
            else {
                bail!("cannot evaluate traversal: {expr}");
            };
            if root.as_str() != "local" {
                bail!("cannot evaluate traversal: {expr}");
            }
            let defining = scopes
                .root(&format!("local.{}", attr.as_str()))
                .and_then(|info| info.expression.clone());
            match defining {
                Some(inner) => eval_value(&inner, Some(scopes)),
                None => bail!("local {} not found", attr.as_str()),
            }
        }
        other => bail!("expression is not a literal: {other}"),
    }
}

/// Rewrite object keys of a literal value to camelCase, recursively. The top
/// level is kept verbatim for map-typed variables.
pub fn camel_case_object_keys(value: hcl::Value, skip_top: bool) -> hcl::Value {
    match value {
        hcl::Value::Object(map) => {
            let mut out = hcl::Map::new();
            for (key, inner) in map {
                let key = if skip_top { key } else { camel_case_name(&key) };
                out.insert(key, camel_case_object_keys(inner, false));
            }
            hcl::Value::Object(out)
        }
        hcl::Value::Array(values) => hcl::Value::Array(
            values
                .into_iter()
                .map(|v| camel_case_object_keys(v, false))
                .collect(),
        ),
        other => other,
    }
}

/// Convert a TF type expression (`list(string)`, `object({a = string})`) to
/// the PCL type syntax, camel-casing object attribute names.
pub fn convert_type_expr(expr: &hcl::Expression) -> String {
    use hcl::Expression;
    match expr {
        Expression::Variable(v) => match v.as_str() {
            "string" => "string".to_string(),
            "number" => "number".to_string(),
            "bool" => "bool".to_string(),
            _ => "any".to_string(),
        },
        Expression::FuncCall(call) => {
            let inner = |args: &[Expression]| {
                args.first()
                    .map(convert_type_expr)
                    .unwrap_or_else(|| "any".to_string())
            };
            match call.name.name.as_str() {
                // Sets are represented as lists.
                "list" | "set" => format!("list({})", inner(&call.args)),
                "map" => format!("map({})", inner(&call.args)),
                "optional" => inner(&call.args),
                "object" => {
                    let Some(Expression::Object(object)) = call.args.first() else {
                        return "any".to_string();
                    };
                    let mut attrs: Vec<String> = Vec::new();
                    for (key, value) in object {
                        let key: String = key.clone().into();
                        attrs.push(format!(
                            "{}={}",
                            camel_case_name(&key),
                            convert_type_expr(value)
                        ));
                    }
                    if attrs.is_empty() {
                        // An empty object is just dynamic.
                        return "any".to_string();
                    }
                    attrs.sort();
                    format!("object({{{}}})", attrs.join(", "))
                }
                _ => "any".to_string(),
            }
        }
        _ => "any".to_string(),
    }
}

fn infer_primitive_type(expr: &hcl::Expression, default: &str) -> String {
    use hcl::Expression;
    match expr {
        Expression::String(_) => "string".to_string(),
        Expression::Number(_) => "number".to_string(),
        Expression::Bool(_) => "bool".to_string(),
        Expression::TemplateExpr(_) if parser::literal_string(expr).is_some() => {
            "string".to_string()
        }
        _ => default.to_string(),
    }
}

/// Variables become `config` blocks.
pub fn convert_variable(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    variable: &Variable,
) -> (Tokens, pcl::Block, Tokens) {
    state.current_subject = Some(variable.decl_range.clone());
    let pulumi_name = scopes
        .root(&format!("var.{}", variable.name))
        .map(|root| root.name.clone())
        .unwrap_or_else(|| camel_case_name(&variable.name));

    let mut pulumi_type = variable
        .type_expr
        .as_ref()
        .map(convert_type_expr)
        .unwrap_or_else(|| "any".to_string());
    if pulumi_type == "any" {
        if let Some(default) = &variable.default {
            if !matches!(default, hcl::Expression::Null) {
                // No explicit type, but a primitive default pins one.
                pulumi_type = infer_primitive_type(default, &pulumi_type);
            }
        }
    }

    let mut labels = vec![pulumi_name];
    // "any" is the default and stays implicit.
    if pulumi_type != "any" {
        labels.push(pulumi_type);
    }
    let mut block = pcl::Block::new("config", labels);

    if let Some(default) = &variable.default {
        let skip_top = matches!(
            &variable.type_expr,
            Some(hcl::Expression::FuncCall(call)) if call.name.name.as_str() == "map"
        );
        let value = match eval_literal(default) {
            // Object-typed config camel-cases its members, so defaults
            // follow suit.
            Ok(value) => pcl::tokens_for_value(&camel_case_object_keys(value, skip_top)),
            Err(_) => convert_expression(state, scopes, "", default),
        };
        block.set_attribute("default", value);
    }
    if let Some(description) = &variable.description {
        block.set_attribute("description", vec![pcl::quoted(description)]);
    }
    if let Some(nullable) = variable.nullable {
        block.set_attribute("nullable", vec![pcl::ident(nullable.to_string())]);
    }

    let (leading, trailing) = state.sources.trivia_around(&variable.decl_range, false);
    (pcl::trivia_tokens(&leading), block, pcl::trivia_tokens(&trailing))
}

/// Locals become top-level assignments.
pub fn convert_local(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    local: &Local,
) -> (Tokens, String, Tokens) {
    state.current_subject = Some(local.decl_range.clone());
    let name = scopes
        .root(&format!("local.{}", local.name))
        .map(|root| root.name.clone())
        .unwrap_or_else(|| camel_case_name(&local.name));

    let (leading, trailing) = state.sources.trivia_around(&local.decl_range, true);
    let mut value = convert_expression(state, scopes, "", &local.expr);
    value.extend(pcl::trivia_tokens(&trailing));
    (pcl::trivia_tokens(&leading), name, value)
}

/// Data resources become invoke expressions, wrapped in a comprehension when
/// `count` or `for_each` is set.
pub fn convert_data_resource(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    data: &Resource,
) -> (Tokens, String, Tokens) {
    state.current_subject = Some(data.decl_range.clone());
    let path = format!("data.{}.{}", data.type_, data.name);
    let root = scopes
        .root(&path)
        .unwrap_or_else(|| panic!("data resource {path} not found"));
    let pulumi_name = root.name.clone();

    let (leading, trailing) = state.sources.trivia_around(&data.decl_range, false);
    let leading = pcl::trivia_tokens(&leading);
    let trailing = pcl::trivia_tokens(&trailing);

    // The template provider is deprecated; its data source has no mapping.
    if data.type_ == "template_file" {
        let mut value = not_implemented("The template_file data resource is not yet supported.");
        value.extend(trailing);
        return (leading, pulumi_name, value);
    }

    let invoke_token = root
        .resource
        .as_ref()
        .map(|r| r.tok.clone())
        .filter(|tok| !tok.is_empty())
        .unwrap_or_else(|| implied_token(&data.type_));

    let mut count_tokens = None;
    if let Some(count) = &data.count {
        count_tokens = Some(convert_expression(state, scopes, "", &count.expr));
        scopes.count_index = Some(vec![pcl::ident("__index")]);
    }
    let mut for_each_tokens = None;
    if let Some(for_each) = &data.for_each {
        for_each_tokens = Some(convert_expression(state, scopes, "", &for_each.expr));
        scopes.each_key = Some(vec![pcl::ident("__key")]);
        scopes.each_value = Some(vec![pcl::ident("__value")]);
    }

    let invoke_args = convert_body(state, scopes, &path, &data.config);
    let function_call = pcl::tokens_for_function_call(
        "invoke",
        vec![vec![pcl::quoted(&invoke_token)], tokens_for_body(invoke_args)],
    );

    let mut value = function_call.clone();
    if let Some(count_tokens) = count_tokens {
        value = vec![
            pcl::tok(TokKind::OBrack, "["),
            pcl::keyword("for"),
            pcl::ident("__index"),
            pcl::keyword("in"),
        ];
        value.extend(pcl::tokens_for_function_call("range", vec![count_tokens]));
        value.push(pcl::tok(TokKind::Op, ":"));
        value.extend(function_call.clone());
        value.push(pcl::tok(TokKind::CBrack, "]"));
    }
    if let Some(for_each_tokens) = for_each_tokens {
        value = vec![
            pcl::tok(TokKind::OBrace, "{"),
            pcl::keyword("for"),
            pcl::ident("__key"),
            pcl::tok(TokKind::Comma, ","),
            pcl::ident("__value"),
            pcl::keyword("in"),
        ];
        value.extend(for_each_tokens);
        value.push(pcl::tok(TokKind::Op, ":"));
        value.push(pcl::ident("__key"));
        value.push(pcl::tok(TokKind::FatArrow, "=>"));
        value.extend(function_call);
        value.push(pcl::tok(TokKind::CBrace, "}"));
    }

    scopes.count_index = None;
    scopes.each_key = None;
    scopes.each_value = None;

    value.extend(trailing);
    (leading, pulumi_name, value)
}

/// Managed resources become `resource` blocks, plus companion command
/// resources for their provisioners.
pub fn convert_managed_resource(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    resource: &Resource,
) -> Vec<pcl::Item> {
    state.current_subject = Some(resource.decl_range.clone());
    let path = format!("{}.{}", resource.type_, resource.name);
    let root = scopes
        .root(&path)
        .unwrap_or_else(|| panic!("resource {path} not found"));
    let pulumi_name = root.name.clone();

    let resource_token = root
        .resource
        .as_ref()
        .map(|r| r.tok.clone())
        .filter(|tok| !tok.is_empty())
        .unwrap_or_else(|| implied_token(&resource.type_));

    let mut block = pcl::Block::new("resource", vec![pulumi_name.clone(), resource_token]);

    // Keep the original name in state when the PCL name had to change.
    if pulumi_name != resource.name {
        let logical_name = state.original_name(&resource.name);
        block.set_attribute("__logicalName", vec![pcl::quoted(&logical_name)]);
    }

    let mut options: Option<pcl::Block> = None;

    if !resource.depends_on.is_empty() {
        let mut depends_on = vec![pcl::tok(TokKind::OBrack, "[")];
        for (idx, dep) in resource.depends_on.iter().enumerate() {
            if idx > 0 {
                depends_on.push(pcl::tok(TokKind::Comma, ","));
            }
            depends_on.extend(convert_expression(state, scopes, "", dep));
        }
        depends_on.push(pcl::tok(TokKind::CBrack, "]"));
        let mut opts = pcl::Block::new("options", Vec::new());
        opts.set_attribute("dependsOn", depends_on);
        options = Some(opts);
    }

    if resource.create_before_destroy_set {
        state.diag_at_current(
            Severity::Warning,
            "converting create_before_destroy lifecycle hook is not supported",
            "resources are always created before destroy unless the resource is created with \
             the resource option deleteBeforeReplace; if this behavior is desired, it must be set"
                .to_string(),
        );
    }
    if resource.triggers_replacement {
        state.diag_at_current(
            Severity::Warning,
            "converting replace_triggered_by lifecycle hook is not supported",
            String::new(),
        );
    }

    if let Some(count) = &resource.count {
        let count_tokens = convert_expression(state, scopes, "", &count.expr);
        scopes.count_index = Some(vec![
            pcl::ident("range"),
            pcl::tok(TokKind::Dot, "."),
            pcl::ident("value"),
        ]);
        options
            .get_or_insert_with(|| pcl::Block::new("options", Vec::new()))
            .set_attribute("range", count_tokens);
    }
    if let Some(for_each) = &resource.for_each {
        let for_each_tokens = convert_expression(state, scopes, "", &for_each.expr);
        scopes.each_key = Some(vec![
            pcl::ident("range"),
            pcl::tok(TokKind::Dot, "."),
            pcl::ident("key"),
        ]);
        scopes.each_value = Some(vec![
            pcl::ident("range"),
            pcl::tok(TokKind::Dot, "."),
            pcl::ident("value"),
        ]);
        options
            .get_or_insert_with(|| pcl::Block::new("options", Vec::new()))
            .set_attribute("range", for_each_tokens);
    }

    if let Some(options) = options {
        block.items.push(pcl::Item::Block(options));
    }

    for arg in convert_body(state, scopes, &path, &resource.config) {
        block.items.push(pcl::Item::Attribute(pcl::Attribute {
            leading: arg.trivia,
            name: arg.name,
            value: arg.value,
        }));
    }

    scopes.count_index = None;
    scopes.each_key = None;
    scopes.each_value = None;

    let (leading, trailing) = state.sources.trivia_around(&resource.decl_range, false);

    let mut items = Vec::new();
    if !leading.is_empty() {
        items.push(pcl::Item::Trivia(pcl::trivia_tokens(&leading)));
    }
    items.push(pcl::Item::Block(block));
    if !trailing.is_empty() {
        items.push(pcl::Item::Trivia(pcl::trivia_tokens(&trailing)));
    }

    // Companion command resources for provisioners.
    for (idx, provisioner) in resource.provisioners.iter().enumerate() {
        items.push(convert_provisioner(
            state,
            scopes,
            provisioner,
            &pulumi_name,
            idx,
            resource.for_each.as_ref().map(|a| &a.expr),
        ));
    }
    items
}

fn convert_provisioner(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    provisioner: &Provisioner,
    resource_name: &str,
    index: usize,
    for_each: Option<&hcl::Expression>,
) -> pcl::Item {
    if provisioner.type_ != "local-exec" {
        return pcl::Item::Trivia(vec![pcl::tok(
            TokKind::Comment,
            format!("// Unsupported provisioner type {}\n", provisioner.type_),
        )]);
    }

    let provisioner_name = format!("{resource_name}Provisioner{index}");
    let mut block = pcl::Block::new(
        "resource",
        vec![provisioner_name, "command:local:Command".to_string()],
    );
    let mut options = pcl::Block::new("options", Vec::new());

    if let Some(for_each) = for_each {
        let for_each_tokens = convert_expression(state, scopes, "", for_each);
        scopes.each_key = Some(vec![
            pcl::ident("range"),
            pcl::tok(TokKind::Dot, "."),
            pcl::ident("key"),
        ]);
        scopes.each_value = Some(vec![
            pcl::ident("range"),
            pcl::tok(TokKind::Dot, "."),
            pcl::ident("value"),
        ]);
        options.set_attribute("range", for_each_tokens);
    }

    // The first provisioner depends on the resource itself; each one after
    // that depends on the previous provisioner.
    let dependency = if index == 0 {
        resource_name.to_string()
    } else {
        format!("{resource_name}Provisioner{}", index - 1)
    };
    let mut depends_on = Tokens::new();
    if for_each.is_none() {
        depends_on.push(pcl::tok(TokKind::OBrack, "["));
    }
    depends_on.push(pcl::ident(dependency));
    if for_each.is_none() {
        depends_on.push(pcl::tok(TokKind::CBrack, "]"));
    }
    options.set_attribute("dependsOn", depends_on);
    block.items.push(pcl::Item::Block(options));

    let mut command = None;
    let mut interpreter = None;
    let mut environment = None;
    for attr in provisioner.config.attrs() {
        state.current_subject = Some(attr.range.clone());
        match attr.name.as_str() {
            "command" => command = Some(convert_expression(state, scopes, "", &attr.expr)),
            "interpreter" => {
                interpreter = Some(convert_expression(state, scopes, "", &attr.expr))
            }
            "environment" => {
                environment = Some(convert_expression(state, scopes, "", &attr.expr))
            }
            _ => {}
        }
    }

    let command = command.unwrap_or_else(|| vec![pcl::quoted("")]);
    if provisioner.when_destroy {
        // Destroy-time provisioners map to the delete operation, with no-op
        // create and update commands.
        block.set_attribute("create", vec![pcl::quoted("true")]);
        block.set_attribute("update", vec![pcl::quoted("true")]);
        block.set_attribute("delete", command);
    } else {
        block.set_attribute("create", command);
    }
    if let Some(interpreter) = interpreter {
        block.set_attribute("interpreter", interpreter);
    }
    if let Some(environment) = environment {
        block.set_attribute("environment", environment);
    }

    scopes.each_key = None;
    scopes.each_value = None;

    pcl::Item::Block(block)
}

/// A sandboxed module call: an opaque module-runner resource instead of an
/// inlined component.
pub fn convert_sandboxed_module_call(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    call: &ModuleCall,
    package_name: &str,
) -> (Tokens, pcl::Block, Tokens) {
    state.current_subject = Some(call.decl_range.clone());
    let path = format!("module.{}", call.name);
    let pulumi_name = scopes
        .root(&path)
        .map(|root| root.name.clone())
        .unwrap_or_else(|| camel_case_name(&call.name));

    let token = format!("{package_name}:index:Module");
    let mut block = pcl::Block::new("resource", vec![pulumi_name, token]);

    install_call_range(state, scopes, call, &mut block);

    // Sandboxed modules keep their inputs and outputs without rewriting.
    let args = state.with_object_keys_disabled(|state| {
        convert_body(state, scopes, &path, &call.config)
    });
    for arg in args {
        block.items.push(pcl::Item::Attribute(pcl::Attribute {
            leading: arg.trivia,
            name: arg.name,
            value: arg.value,
        }));
    }

    scopes.count_index = None;
    scopes.each_key = None;
    scopes.each_value = None;

    let (leading, trailing) = state.sources.trivia_around(&call.decl_range, false);
    (
        pcl::trivia_tokens(&leading),
        block,
        pcl::trivia_tokens(&trailing),
    )
}

/// A module call whose translated sources live at `component_path` relative
/// to the current output directory.
pub fn convert_module_call(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    call: &ModuleCall,
    component_path: &str,
) -> (Tokens, pcl::Block, Tokens) {
    state.current_subject = Some(call.decl_range.clone());
    let path = format!("module.{}", call.name);
    let pulumi_name = scopes
        .root(&path)
        .map(|root| root.name.clone())
        .unwrap_or_else(|| camel_case_name(&call.name));

    let mut block = pcl::Block::new(
        "component",
        vec![pulumi_name, component_path.to_string()],
    );

    install_call_range(state, scopes, call, &mut block);

    for arg in convert_body(state, scopes, &path, &call.config) {
        block.items.push(pcl::Item::Attribute(pcl::Attribute {
            leading: arg.trivia,
            name: arg.name,
            value: arg.value,
        }));
    }

    scopes.count_index = None;
    scopes.each_key = None;
    scopes.each_value = None;

    let (leading, trailing) = state.sources.trivia_around(&call.decl_range, false);
    (
        pcl::trivia_tokens(&leading),
        block,
        pcl::trivia_tokens(&trailing),
    )
}

/// Install `range` options for a module call's count/for_each, binding the
/// iteration variables.
fn install_call_range(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    call: &ModuleCall,
    block: &mut pcl::Block,
) {
    if let Some(count) = &call.count {
        let count_tokens = convert_expression(state, scopes, "", &count.expr);
        scopes.count_index = Some(vec![
            pcl::ident("range"),
            pcl::tok(TokKind::Dot, "."),
            pcl::ident("value"),
        ]);
        let mut options = pcl::Block::new("options", Vec::new());
        options.set_attribute("range", count_tokens);
        block.items.push(pcl::Item::Block(options));
    }
    if let Some(for_each) = &call.for_each {
        let for_each_tokens = convert_expression(state, scopes, "", &for_each.expr);
        scopes.each_key = Some(vec![
            pcl::ident("range"),
            pcl::tok(TokKind::Dot, "."),
            pcl::ident("key"),
        ]);
        scopes.each_value = Some(vec![
            pcl::ident("range"),
            pcl::tok(TokKind::Dot, "."),
            pcl::ident("value"),
        ]);
        let mut options = pcl::Block::new("options", Vec::new());
        options.set_attribute("range", for_each_tokens);
        block.items.push(pcl::Item::Block(options));
    }
}

/// Outputs become `output` blocks.
pub fn convert_output(
    state: &mut ConvertState,
    scopes: &mut Scopes,
    output: &Output,
) -> (Tokens, pcl::Block, Tokens) {
    state.current_subject = Some(output.decl_range.clone());
    let name = scopes
        .root(&format!("output.{}", output.name))
        .map(|root| root.name.clone())
        .unwrap_or_else(|| camel_case_name(&output.name));

    let mut block = pcl::Block::new("output", vec![name]);

    let full_range = state.sources.attribute_range(&output.expr_range);
    let (attr_leading, _) = state.sources.trivia_around(&full_range, true);
    if !attr_leading.is_empty() {
        block
            .items
            .push(pcl::Item::Trivia(pcl::trivia_tokens(&attr_leading)));
    }
    let value = convert_expression(state, scopes, "", &output.expr);
    block.set_attribute("value", value);

    let (leading, trailing) = state.sources.trivia_around(&output.decl_range, false);
    (
        pcl::trivia_tokens(&leading),
        block,
        pcl::trivia_tokens(&trailing),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::lexer::Sources;
    use crate::scopes::PathInfo;
    use crate::MemoryFs;
    use std::path::Path;

    fn parse_expr(src: &str) -> hcl::Expression {
        let body = hcl::parse(&format!("x = {src}")).unwrap();
        body.into_attributes().next().unwrap().expr
    }

    fn load(src: &str) -> (parser::Module, ConvertState) {
        let fs = MemoryFs::with_files([("/main.tf", src)]);
        let mut sources = Sources::new();
        let mut diags = Diagnostics::new();
        let module =
            parser::load_module(&fs, Path::new("/"), &mut sources, &mut diags).unwrap();
        let mut state = ConvertState::new(sources);
        state.diagnostics = diags;
        (module, state)
    }

    #[test]
    fn implied_names() {
        assert_eq!(implied_provider("aws_bucket"), "aws");
        assert_eq!(implied_provider("random"), "random");
        assert_eq!(implied_token("aws_bucket"), "aws:index:bucket");
        assert_eq!(implied_token("aws_s3_bucket"), "aws:index:s3Bucket");
        assert_eq!(implied_token("thing"), "thing");
    }

    #[test]
    fn type_expressions() {
        let t: hcl::Expression = parse_expr("list(string)");
        assert_eq!(convert_type_expr(&t), "list(string)");
        let t: hcl::Expression = parse_expr("map(number)");
        assert_eq!(convert_type_expr(&t), "map(number)");
        let t: hcl::Expression = parse_expr("object({first_key = string, other = number})");
        assert_eq!(
            convert_type_expr(&t),
            "object({firstKey=string, other=number})"
        );
        let t: hcl::Expression = parse_expr("object({})");
        assert_eq!(convert_type_expr(&t), "any");
        let t: hcl::Expression = parse_expr("set(string)");
        assert_eq!(convert_type_expr(&t), "list(string)");
    }

    #[test]
    fn literal_evaluation() {
        let e: hcl::Expression = parse_expr("{ a = [1, true, \"x\"] }");
        let v = eval_literal(&e).unwrap();
        assert!(matches!(v, hcl::Value::Object(_)));
        let e: hcl::Expression = parse_expr("var.nope");
        assert!(eval_literal(&e).is_err());
        let e: hcl::Expression = parse_expr("true ? 1 : 2");
        assert_eq!(eval_literal(&e).unwrap(), hcl::Value::from(1));
    }

    #[test]
    fn config_values_resolve_locals() {
        let mut scopes = Scopes::new();
        scopes.get_or_add_name("local.region", "my", "");
        let mut root = scopes.root("local.region").unwrap().clone();
        root.expression = Some(parse_expr("\"us-east-1\""));
        scopes.set_root("local.region", root);

        let e: hcl::Expression = parse_expr("local.region");
        assert_eq!(
            eval_config_value(&scopes, &e).unwrap(),
            hcl::Value::from("us-east-1")
        );

        // A local defined by something inevaluable still fails.
        let e: hcl::Expression = parse_expr("local.missing");
        assert!(eval_config_value(&scopes, &e).is_err());
    }

    #[test]
    fn camel_cases_default_object_keys() {
        let e: hcl::Expression = parse_expr("{ first_key = { nested_key = 1 } }");
        let v = camel_case_object_keys(eval_literal(&e).unwrap(), false);
        let hcl::Value::Object(map) = v else { panic!() };
        assert!(map.contains_key("firstKey"));
        let hcl::Value::Object(nested) = &map["firstKey"] else { panic!() };
        assert!(nested.contains_key("nestedKey"));

        let e: hcl::Expression = parse_expr("{ keep_key = 1 }");
        let v = camel_case_object_keys(eval_literal(&e).unwrap(), true);
        let hcl::Value::Object(map) = v else { panic!() };
        assert!(map.contains_key("keep_key"));
    }

    #[test]
    fn variable_becomes_config_block() {
        let (module, mut state) = load(
            r#"
variable "instance_count" {
  type        = number
  default     = 2
  description = "how many"
}
"#,
        );
        let mut scopes = Scopes::new();
        scopes.get_or_add_name("var.instance_count", "", "Config");
        let (_, block, _) = convert_variable(&mut state, &mut scopes, &module.variables[0]);
        assert_eq!(block.kind, "config");
        assert_eq!(block.labels, vec!["instanceCount", "number"]);
        let mut file = pcl::File::new();
        file.items.push(pcl::Item::Block(block));
        let out = pcl::render(&file);
        assert!(out.contains("default = 2"), "{out}");
        assert!(out.contains("description = \"how many\""), "{out}");
    }

    #[test]
    fn variable_type_inferred_from_default() {
        let (module, mut state) = load("variable \"name\" { default = \"web\" }\n");
        let mut scopes = Scopes::new();
        scopes.get_or_add_name("var.name", "", "Config");
        let (_, block, _) = convert_variable(&mut state, &mut scopes, &module.variables[0]);
        assert_eq!(block.labels, vec!["name", "string"]);
    }

    #[test]
    fn compound_defaults_stay_any() {
        let (module, mut state) = load("variable \"tags\" { default = { a_key = 1 } }\n");
        let mut scopes = Scopes::new();
        scopes.get_or_add_name("var.tags", "", "Config");
        let (_, block, _) = convert_variable(&mut state, &mut scopes, &module.variables[0]);
        assert_eq!(block.labels, vec!["tags"]);
        let mut file = pcl::File::new();
        file.items.push(pcl::Item::Block(block));
        assert!(pcl::render(&file).contains("aKey = 1"));
    }

    #[test]
    fn resource_with_count_gets_options_range() {
        let (module, mut state) = load(
            r#"
resource "aws_instance" "web" {
  ami   = "abc"
  count = 3
}
"#,
        );
        let mut scopes = Scopes::new();
        scopes.set_root(
            "aws_instance.web",
            PathInfo {
                name: "web".to_string(),
                ..Default::default()
            },
        );
        let items = convert_managed_resource(&mut state, &mut scopes, &module.managed_resources[0]);
        let mut file = pcl::File::new();
        file.items = items;
        let out = pcl::render(&file);
        assert!(out.contains("resource \"web\" \"aws:index:instance\""), "{out}");
        assert!(out.contains("options {"), "{out}");
        assert!(out.contains("range = 3"), "{out}");
        assert!(out.contains("ami = \"abc\""), "{out}");
        // count/each bindings are cleared between declarations
        assert!(scopes.count_index.is_none());
    }

    #[test]
    fn renamed_resource_carries_logical_name() {
        let (module, mut state) = load("resource \"aws_instance\" \"my_server\" {}\n");
        let mut scopes = Scopes::new();
        scopes.set_root(
            "aws_instance.my_server",
            PathInfo {
                name: "myServer".to_string(),
                ..Default::default()
            },
        );
        let items = convert_managed_resource(&mut state, &mut scopes, &module.managed_resources[0]);
        let mut file = pcl::File::new();
        file.items = items;
        let out = pcl::render(&file);
        assert!(out.contains("__logicalName = \"my_server\""), "{out}");
    }

    #[test]
    fn provisioners_chain_depends_on() {
        let (module, mut state) = load(
            r#"
resource "aws_instance" "web" {
  provisioner "local-exec" {
    command = "echo one"
  }
  provisioner "local-exec" {
    command = "echo two"
  }
  provisioner "file" {
    destination = "/tmp/x"
  }
}
"#,
        );
        let mut scopes = Scopes::new();
        scopes.set_root(
            "aws_instance.web",
            PathInfo {
                name: "web".to_string(),
                ..Default::default()
            },
        );
        let items = convert_managed_resource(&mut state, &mut scopes, &module.managed_resources[0]);
        let mut file = pcl::File::new();
        file.items = items;
        let out = pcl::render(&file);
        assert!(out.contains("resource \"webProvisioner0\" \"command:local:Command\""), "{out}");
        assert!(out.contains("dependsOn = [web]"), "{out}");
        assert!(out.contains("resource \"webProvisioner1\" \"command:local:Command\""), "{out}");
        assert!(out.contains("dependsOn = [webProvisioner0]"), "{out}");
        assert!(out.contains("create = \"echo one\""), "{out}");
        assert!(out.contains("// Unsupported provisioner type file"), "{out}");
    }

    #[test]
    fn destroy_provisioner_maps_to_delete() {
        let (module, mut state) = load(
            r#"
resource "aws_instance" "web" {
  provisioner "local-exec" {
    when    = destroy
    command = "echo bye"
  }
}
"#,
        );
        let mut scopes = Scopes::new();
        scopes.set_root(
            "aws_instance.web",
            PathInfo {
                name: "web".to_string(),
                ..Default::default()
            },
        );
        let items = convert_managed_resource(&mut state, &mut scopes, &module.managed_resources[0]);
        let mut file = pcl::File::new();
        file.items = items;
        let out = pcl::render(&file);
        assert!(out.contains("create = \"true\""), "{out}");
        assert!(out.contains("update = \"true\""), "{out}");
        assert!(out.contains("delete = \"echo bye\""), "{out}");
    }

    #[test]
    fn timeouts_blocks_are_skipped() {
        let (module, mut state) = load(
            r#"
resource "aws_instance" "web" {
  ami = "abc"
  timeouts {
    create = "10m"
  }
}
"#,
        );
        let mut scopes = Scopes::new();
        scopes.set_root(
            "aws_instance.web",
            PathInfo {
                name: "web".to_string(),
                ..Default::default()
            },
        );
        let items = convert_managed_resource(&mut state, &mut scopes, &module.managed_resources[0]);
        let mut file = pcl::File::new();
        file.items = items;
        let out = pcl::render(&file);
        assert!(!out.contains("timeouts"), "{out}");
        assert!(!out.contains("10m"), "{out}");
    }

    #[test]
    fn dynamic_blocks_become_comprehensions() {
        let (module, mut state) = load(
            r#"
resource "aws_instance" "web" {
  dynamic "setting" {
    for_each = var.settings
    content {
      name = setting.value.name
    }
  }
}
"#,
        );
        let mut scopes = Scopes::new();
        scopes.get_or_add_name("var.settings", "", "Config");
        scopes.set_root(
            "aws_instance.web",
            PathInfo {
                name: "web".to_string(),
                ..Default::default()
            },
        );
        let items = convert_managed_resource(&mut state, &mut scopes, &module.managed_resources[0]);
        let mut file = pcl::File::new();
        file.items = items;
        let out = pcl::render(&file);
        assert!(out.contains("setting = [for entry in entries(settings)"), "{out}");
        assert!(out.contains("name = entry.value.name"), "{out}");
    }

    #[test]
    fn output_block() {
        let (module, mut state) = load("output \"ip\" { value = \"x\" }\n");
        let mut scopes = Scopes::new();
        scopes.get_or_add_output("output.ip");
        let (_, block, _) = convert_output(&mut state, &mut scopes, &module.outputs[0]);
        let mut file = pcl::File::new();
        file.items.push(pcl::Item::Block(block));
        assert_eq!(pcl::render(&file), "output \"ip\" {\n  value = \"x\"\n}\n");
    }
}
