//! Repairing documentation-derived examples: code snippets frequently refer
//! to resources they never declare. The visitor here finds those dangling
//! references so canonical definitions can be appended before translation.

use crate::diag::Diagnostics;
use crate::lexer::Sources;
use crate::parser::{self, ConfigBody, Resource};
use crate::{MemoryFs, Vfs};
use anyhow::{bail, Result};
use hcl::expr::TraversalOperator;
use hcl::template::{Element, Template};
use hcl::Expression;
use std::collections::BTreeSet;
use std::path::Path;

/// Provides canonical example definitions for resources and data sources.
pub trait AutoFiller {
    /// True if `token` has a plausible example definition.
    fn can_auto_fill(&self, token: &str) -> bool;

    /// A suggested definition for the given resource type and name, or the
    /// empty string.
    fn auto_fill(&self, token: &str, name: &str) -> String;
}

/// An [`AutoFiller`] backed by a directory of `<token>.tf` snippets.
pub struct FolderBasedAutoFiller<'a> {
    pub dir: &'a dyn Vfs,
}

impl AutoFiller for FolderBasedAutoFiller<'_> {
    fn can_auto_fill(&self, token: &str) -> bool {
        self.dir
            .read_to_string(Path::new(&format!("/{token}.tf")))
            .is_ok()
    }

    fn auto_fill(&self, token: &str, _name: &str) -> String {
        self.dir
            .read_to_string(Path::new(&format!("/{token}.tf")))
            .unwrap_or_default()
    }
}

/// Examine an example snippet for references to undeclared resources and
/// append canonical definitions for any the filler knows about.
pub fn auto_fill(filler: &dyn AutoFiller, source: &str) -> Result<String> {
    let fs = MemoryFs::with_files([("/infra.tf", source)]);
    let mut sources = Sources::new();
    let mut diags = Diagnostics::new();
    let module = parser::load_module(&fs, Path::new("/"), &mut sources, &mut diags)?;
    if diags.has_errors() {
        bail!("failed to parse example");
    }

    let mut visitor = Visitor::default();
    for resource in &module.managed_resources {
        visitor.visit_managed_resource(resource);
    }

    let mut out = format!("{source}\n");
    for (token, name) in visitor.dangling() {
        if !filler.can_auto_fill(&token) {
            continue;
        }
        out.push('\n');
        out.push_str(&filler.auto_fill(&token, &name));
        out.push('\n');
    }
    Ok(out)
}

#[derive(Default)]
struct Visitor {
    defined: BTreeSet<(String, String)>,
    referenced: BTreeSet<(String, String)>,
}

impl Visitor {
    fn visit_managed_resource(&mut self, resource: &Resource) {
        self.defined
            .insert((resource.type_.clone(), resource.name.clone()));
        self.visit_body(&resource.config);
        if let Some(count) = &resource.count {
            self.visit_expr(&count.expr);
        }
        if let Some(for_each) = &resource.for_each {
            self.visit_expr(&for_each.expr);
        }
        for dep in &resource.depends_on {
            self.visit_expr(dep);
        }
    }

    fn visit_body(&mut self, body: &ConfigBody) {
        for block in body.blocks() {
            self.visit_body(&block.body);
        }
        for attr in body.attrs() {
            self.visit_expr(&attr.expr);
        }
    }

    fn visit_expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Traversal(traversal) => {
                if let Expression::Variable(root) = &traversal.expr {
                    if let Some(TraversalOperator::GetAttr(attr)) = traversal.operators.first() {
                        self.referenced
                            .insert((root.as_str().to_string(), attr.as_str().to_string()));
                    }
                } else {
                    self.visit_expr(&traversal.expr);
                }
                for op in &traversal.operators {
                    if let TraversalOperator::Index(key) = op {
                        self.visit_expr(key);
                    }
                }
            }
            Expression::Array(exprs) => {
                for e in exprs {
                    self.visit_expr(e);
                }
            }
            Expression::Object(object) => {
                for (_, value) in object {
                    self.visit_expr(value);
                }
            }
            Expression::FuncCall(call) => {
                for arg in &call.args {
                    self.visit_expr(arg);
                }
            }
            Expression::Parenthesis(inner) => self.visit_expr(inner),
            Expression::Conditional(conditional) => {
                self.visit_expr(&conditional.cond_expr);
                self.visit_expr(&conditional.true_expr);
                self.visit_expr(&conditional.false_expr);
            }
            Expression::Operation(operation) => match operation.as_ref() {
                hcl::expr::Operation::Unary(unary) => self.visit_expr(&unary.expr),
                hcl::expr::Operation::Binary(binary) => {
                    self.visit_expr(&binary.lhs_expr);
                    self.visit_expr(&binary.rhs_expr);
                }
            },
            Expression::ForExpr(for_expr) => {
                self.visit_expr(&for_expr.collection_expr);
                if let Some(key_expr) = &for_expr.key_expr {
                    self.visit_expr(key_expr);
                }
                self.visit_expr(&for_expr.value_expr);
                if let Some(cond_expr) = &for_expr.cond_expr {
                    self.visit_expr(cond_expr);
                }
            }
            Expression::TemplateExpr(template_expr) => {
                if let Ok(template) = Template::from_expr(template_expr) {
                    self.visit_template(&template);
                }
            }
            _ => {}
        }
    }

    fn visit_template(&mut self, template: &Template) {
        for element in template.elements() {
            match element {
                Element::Interpolation(interpolation) => self.visit_expr(&interpolation.expr),
                Element::Directive(hcl::template::Directive::For(for_directive)) => {
                    self.visit_expr(&for_directive.collection_expr);
                    self.visit_template(&for_directive.template);
                }
                Element::Directive(hcl::template::Directive::If(if_directive)) => {
                    self.visit_expr(&if_directive.cond_expr);
                    self.visit_template(&if_directive.true_template);
                    if let Some(false_template) = &if_directive.false_template {
                        self.visit_template(false_template);
                    }
                }
                Element::Literal(_) => {}
            }
        }
    }

    /// References with no matching definition, in stable order.
    fn dangling(&self) -> Vec<(String, String)> {
        self.referenced
            .difference(&self.defined)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_definitions_for_dangling_references() {
        let fills = MemoryFs::with_files([(
            "/aws_vpc.tf",
            "resource \"aws_vpc\" \"main\" {\n  cidr_block = \"10.0.0.0/16\"\n}",
        )]);
        let filler = FolderBasedAutoFiller { dir: &fills };

        let source = r#"
resource "aws_subnet" "a" {
  vpc_id = aws_vpc.main.id
}
"#;
        let filled = auto_fill(&filler, source).unwrap();
        assert!(filled.contains("resource \"aws_subnet\" \"a\""));
        assert!(filled.contains("resource \"aws_vpc\" \"main\""));
    }

    #[test]
    fn declared_resources_are_not_filled() {
        let fills = MemoryFs::with_files([("/aws_vpc.tf", "resource \"aws_vpc\" \"main\" {}")]);
        let filler = FolderBasedAutoFiller { dir: &fills };

        let source = r#"
resource "aws_vpc" "main" {
  cidr_block = "10.0.0.0/16"
}

resource "aws_subnet" "a" {
  vpc_id = aws_vpc.main.id
}
"#;
        let filled = auto_fill(&filler, source).unwrap();
        assert_eq!(filled.matches("resource \"aws_vpc\"").count(), 1);
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let fills = MemoryFs::new();
        let filler = FolderBasedAutoFiller { dir: &fills };
        let source = "resource \"aws_subnet\" \"a\" {\n  vpc_id = aws_vpc.main.id\n}\n";
        let filled = auto_fill(&filler, source).unwrap();
        assert_eq!(filled, format!("{source}\n"));
    }

    #[test]
    fn references_inside_templates_count() {
        let fills = MemoryFs::with_files([("/aws_vpc.tf", "resource \"aws_vpc\" \"main\" {}")]);
        let filler = FolderBasedAutoFiller { dir: &fills };
        let source = "resource \"aws_subnet\" \"a\" {\n  tags = \"${aws_vpc.main.id}-sub\"\n}\n";
        let filled = auto_fill(&filler, source).unwrap();
        assert!(filled.contains("resource \"aws_vpc\" \"main\""));
    }
}
