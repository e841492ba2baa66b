//! Loads a directory of `.tf` files into a typed [`Module`]. The `hcl` crate
//! does the actual parsing; this module zips the typed tree with the span
//! scanner from [`crate::lexer`] so every declaration and attribute carries
//! its source range, then decodes the seven declaration kinds.

use crate::diag::{Diagnostic, Diagnostics, Pos, Range};
use crate::lexer::{self, RawBody, RawItem, Sources};
use crate::version::Constraints;
use anyhow::{anyhow, bail, Context, Result};
use hcl::template::{Element, Template};
use hcl::Structure;
use std::collections::BTreeMap;
use std::path::Path;

/// A body with positional information: the same attributes and blocks the
/// parser saw, in source order, each carrying its byte range.
#[derive(Clone, Debug, Default)]
pub struct ConfigBody {
    pub items: Vec<ConfigItem>,
}

#[derive(Clone, Debug)]
pub enum ConfigItem {
    Attr(ConfigAttr),
    Block(ConfigBlock),
}

#[derive(Clone, Debug)]
pub struct ConfigAttr {
    pub name: String,
    pub expr: hcl::Expression,
    /// Identifier through end of expression.
    pub range: Range,
    /// Just the expression.
    pub expr_range: Range,
}

#[derive(Clone, Debug)]
pub struct ConfigBlock {
    pub kind: String,
    pub labels: Vec<String>,
    pub body: ConfigBody,
    /// Introducer identifier through the last label.
    pub def_range: Range,
}

impl ConfigBody {
    pub fn attrs(&self) -> impl Iterator<Item = &ConfigAttr> {
        self.items.iter().filter_map(|item| match item {
            ConfigItem::Attr(attr) => Some(attr),
            _ => None,
        })
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ConfigBlock> {
        self.items.iter().filter_map(|item| match item {
            ConfigItem::Block(block) => Some(block),
            _ => None,
        })
    }

    pub fn find_attr(&self, name: &str) -> Option<&ConfigAttr> {
        self.attrs().find(|a| a.name == name)
    }

    /// Remove and return the named attribute, if present.
    pub fn take_attr(&mut self, name: &str) -> Option<ConfigAttr> {
        let idx = self.items.iter().position(
            |item| matches!(item, ConfigItem::Attr(attr) if attr.name == name),
        )?;
        match self.items.remove(idx) {
            ConfigItem::Attr(attr) => Some(attr),
            _ => unreachable!(),
        }
    }

    /// Remove and return every block of the given kind.
    pub fn take_blocks(&mut self, kind: &str) -> Vec<ConfigBlock> {
        let mut taken = Vec::new();
        self.items.retain_mut(|item| match item {
            ConfigItem::Block(block) if block.kind == kind => {
                taken.push(block.clone());
                false
            }
            _ => true,
        });
        taken
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub type_expr: Option<hcl::Expression>,
    pub default: Option<hcl::Expression>,
    pub description: Option<String>,
    pub nullable: Option<bool>,
    pub decl_range: Range,
}

#[derive(Clone, Debug)]
pub struct Local {
    pub name: String,
    pub expr: hcl::Expression,
    pub decl_range: Range,
}

#[derive(Clone, Debug)]
pub struct Resource {
    pub type_: String,
    pub name: String,
    pub config: ConfigBody,
    pub count: Option<ConfigAttr>,
    pub for_each: Option<ConfigAttr>,
    pub depends_on: Vec<hcl::Expression>,
    pub provisioners: Vec<Provisioner>,
    pub create_before_destroy_set: bool,
    pub triggers_replacement: bool,
    pub decl_range: Range,
}

#[derive(Clone, Debug)]
pub struct Provisioner {
    pub type_: String,
    pub when_destroy: bool,
    pub config: ConfigBody,
    pub def_range: Range,
}

#[derive(Clone, Debug)]
pub struct ModuleCall {
    pub name: String,
    pub source: ModuleSource,
    pub source_str: String,
    pub version: Constraints,
    pub version_str: String,
    pub config: ConfigBody,
    pub count: Option<ConfigAttr>,
    pub for_each: Option<ConfigAttr>,
    pub decl_range: Range,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleSource {
    /// A `./` or `../` relative path inside the same package.
    Local(String),
    /// A direct remote package address (git, archive, ...).
    Remote { package: String, subdir: String },
    /// A module registry address.
    Registry(RegistrySource),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrySource {
    pub host: Option<String>,
    pub namespace: String,
    pub name: String,
    pub target_system: String,
    pub subdir: String,
}

impl std::fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(host) = &self.host {
            write!(f, "{host}/")?;
        }
        write!(f, "{}/{}/{}", self.namespace, self.name, self.target_system)
    }
}

#[derive(Clone, Debug)]
pub struct Output {
    pub name: String,
    pub expr: hcl::Expression,
    pub expr_range: Range,
    pub decl_range: Range,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub name: String,
    pub alias: Option<String>,
    pub config: ConfigBody,
    pub decl_range: Range,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequiredProvider {
    pub name: String,
    pub source: String,
    pub version: String,
}

/// A directory of TF files parsed as a unit.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub variables: Vec<Variable>,
    pub locals: Vec<Local>,
    pub data_resources: Vec<Resource>,
    pub managed_resources: Vec<Resource>,
    pub module_calls: Vec<ModuleCall>,
    pub outputs: Vec<Output>,
    pub provider_configs: Vec<ProviderConfig>,
    pub required_providers: BTreeMap<String, RequiredProvider>,
}

/// One declaration, for source-order processing across every kind.
#[derive(Clone, Debug)]
pub enum Declaration {
    Variable(Variable),
    Local(Local),
    Data(Resource),
    ModuleCall(ModuleCall),
    Resource(Resource),
    Output(Output),
    Provider(ProviderConfig),
}

impl Declaration {
    pub fn decl_range(&self) -> &Range {
        match self {
            Declaration::Variable(v) => &v.decl_range,
            Declaration::Local(l) => &l.decl_range,
            Declaration::Data(d) => &d.decl_range,
            Declaration::ModuleCall(m) => &m.decl_range,
            Declaration::Resource(r) => &r.decl_range,
            Declaration::Output(o) => &o.decl_range,
            Declaration::Provider(p) => &p.decl_range,
        }
    }
}

/// Parse every `.tf` file in `dir` through the filesystem abstraction.
/// Parse failures abort the module with an error diagnostic already pushed.
pub fn load_module(
    fs: &dyn crate::Vfs,
    dir: &Path,
    sources: &mut Sources,
    diags: &mut Diagnostics,
) -> Result<Module> {
    let mut files: Vec<_> = fs
        .read_dir(dir)?
        .into_iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("tf"))
        .collect();
    files.sort();

    let mut module = Module::default();
    for path in files {
        let name = path.to_string_lossy().into_owned();
        let text = fs.read_to_string(&path)?;
        sources.add(name.clone(), text.clone());

        let body: hcl::Body = match hcl::parse(&text) {
            Ok(body) => body,
            Err(err) => {
                diags.push(
                    Diagnostic::error("Failed to parse file", format!("{name}: {err}"))
                        .with_subject(&Range::new(
                            name.clone(),
                            Pos::new(0, 1, 1),
                            Pos::new(0, 1, 1),
                        )),
                );
                bail!("parse error in {name}");
            }
        };

        let raw = lexer::scan_file(sources.get(&name));
        let config = zip_body(&body, &raw);
        decode_file(config, &mut module, diags)?;
    }
    Ok(module)
}

/// Pair the typed body with its structural shadow. Both walked the same
/// bytes, so a mismatch is an internal assertion.
fn zip_body(body: &hcl::Body, raw: &RawBody) -> ConfigBody {
    let structures: Vec<&Structure> = body.iter().collect();
    assert_eq!(
        structures.len(),
        raw.items.len(),
        "parsed body and lexed body disagree on item count"
    );

    let mut items = Vec::with_capacity(structures.len());
    for (structure, raw_item) in structures.iter().zip(raw.items.iter()) {
        match (structure, raw_item) {
            (Structure::Attribute(attr), RawItem::Attr(raw_attr)) => {
                assert_eq!(attr.key(), raw_attr.name, "attribute order mismatch");
                items.push(ConfigItem::Attr(ConfigAttr {
                    name: attr.key().to_string(),
                    expr: attr.expr().clone(),
                    range: raw_attr.range.clone(),
                    expr_range: raw_attr.expr_range.clone(),
                }));
            }
            (Structure::Block(block), RawItem::Block(raw_block)) => {
                assert_eq!(block.identifier(), raw_block.kind, "block order mismatch");
                items.push(ConfigItem::Block(ConfigBlock {
                    kind: block.identifier().to_string(),
                    labels: block.labels().iter().map(|l| l.as_str().to_string()).collect(),
                    body: zip_body(block.body(), &raw_block.body),
                    def_range: raw_block.decl_range.clone(),
                }));
            }
            _ => panic!("parsed body and lexed body disagree on item kinds"),
        }
    }
    ConfigBody { items }
}

fn decode_file(config: ConfigBody, module: &mut Module, diags: &mut Diagnostics) -> Result<()> {
    for item in config.items {
        let block = match item {
            ConfigItem::Block(block) => block,
            ConfigItem::Attr(attr) => {
                diags.push(
                    Diagnostic::warning(
                        "Unexpected top-level attribute",
                        format!("Attribute {} is not a declaration, ignoring", attr.name),
                    )
                    .with_subject(&attr.range),
                );
                continue;
            }
        };
        match block.kind.as_str() {
            "variable" => module.variables.push(decode_variable(block)?),
            "locals" => {
                for item in block.body.items {
                    if let ConfigItem::Attr(attr) = item {
                        module.locals.push(Local {
                            name: attr.name,
                            expr: attr.expr,
                            decl_range: attr.range,
                        });
                    }
                }
            }
            "output" => {
                if let Some(output) = decode_output(block, diags)? {
                    module.outputs.push(output);
                }
            }
            "resource" => module
                .managed_resources
                .push(decode_resource(block, diags)?),
            "data" => module.data_resources.push(decode_resource(block, diags)?),
            "module" => {
                if let Some(call) = decode_module_call(block, diags)? {
                    module.module_calls.push(call);
                }
            }
            "provider" => module.provider_configs.push(decode_provider(block)?),
            "terraform" => decode_terraform_settings(block, module),
            other => {
                diags.push(
                    Diagnostic::warning(
                        "Unsupported block",
                        format!("Block type {other:?} is not supported, ignoring"),
                    )
                    .with_subject(&block.def_range),
                );
            }
        }
    }
    Ok(())
}

fn decode_variable(mut block: ConfigBlock) -> Result<Variable> {
    let name = label(&block, 0, "variable")?;
    let type_expr = block.body.take_attr("type").map(|a| a.expr);
    let default = block.body.take_attr("default").map(|a| a.expr);
    let description = block
        .body
        .take_attr("description")
        .and_then(|a| literal_string(&a.expr));
    let nullable = block
        .body
        .take_attr("nullable")
        .and_then(|a| literal_bool(&a.expr));
    Ok(Variable {
        name,
        type_expr,
        default,
        description,
        nullable,
        decl_range: block.def_range,
    })
}

fn decode_output(mut block: ConfigBlock, diags: &mut Diagnostics) -> Result<Option<Output>> {
    let name = label(&block, 0, "output")?;
    let Some(value) = block.body.take_attr("value") else {
        diags.push(
            Diagnostic::error(
                "Missing output value",
                format!("Output {name:?} has no \"value\" attribute"),
            )
            .with_subject(&block.def_range),
        );
        return Ok(None);
    };
    Ok(Some(Output {
        name,
        expr: value.expr,
        expr_range: value.expr_range,
        decl_range: block.def_range,
    }))
}

fn decode_resource(mut block: ConfigBlock, diags: &mut Diagnostics) -> Result<Resource> {
    let type_ = label(&block, 0, &block.kind.clone())?;
    let name = label(&block, 1, &block.kind.clone())?;
    let count = block.body.take_attr("count");
    let for_each = block.body.take_attr("for_each");
    block.body.take_attr("provider");
    let depends_on = block
        .body
        .take_attr("depends_on")
        .map(|a| decode_depends_on(a, diags))
        .unwrap_or_default();

    let mut create_before_destroy_set = false;
    let mut triggers_replacement = false;
    for lifecycle in block.body.take_blocks("lifecycle") {
        if lifecycle.body.find_attr("create_before_destroy").is_some() {
            create_before_destroy_set = true;
        }
        if lifecycle.body.find_attr("replace_triggered_by").is_some() {
            triggers_replacement = true;
        }
    }

    let mut provisioners = Vec::new();
    for mut prov in block.body.take_blocks("provisioner") {
        let type_ = label(&prov, 0, "provisioner")?;
        let when_destroy = prov
            .body
            .take_attr("when")
            .map(|a| matches!(&a.expr, hcl::Expression::Variable(v) if v.as_str() == "destroy"))
            .unwrap_or(false);
        prov.body.take_attr("on_failure");
        prov.body.take_blocks("connection");
        provisioners.push(Provisioner {
            type_,
            when_destroy,
            config: prov.body,
            def_range: prov.def_range,
        });
    }
    block.body.take_blocks("connection");

    Ok(Resource {
        type_,
        name,
        config: block.body,
        count,
        for_each,
        depends_on,
        provisioners,
        create_before_destroy_set,
        triggers_replacement,
        decl_range: block.def_range,
    })
}

fn decode_depends_on(attr: ConfigAttr, diags: &mut Diagnostics) -> Vec<hcl::Expression> {
    match attr.expr {
        hcl::Expression::Array(exprs) => exprs,
        other => {
            diags.push(
                Diagnostic::warning(
                    "Invalid depends_on",
                    "depends_on must be a list of references, ignoring",
                )
                .with_subject(&attr.range),
            );
            let _ = other;
            Vec::new()
        }
    }
}

fn decode_module_call(
    mut block: ConfigBlock,
    diags: &mut Diagnostics,
) -> Result<Option<ModuleCall>> {
    let name = label(&block, 0, "module")?;
    let Some(source_attr) = block.body.take_attr("source") else {
        diags.push(
            Diagnostic::error(
                "Missing module source",
                format!("Module {name:?} has no \"source\" attribute"),
            )
            .with_subject(&block.def_range),
        );
        return Ok(None);
    };
    let Some(source_str) = literal_string(&source_attr.expr) else {
        diags.push(
            Diagnostic::error(
                "Invalid module source",
                format!("Module {name:?} has a non-literal \"source\" attribute"),
            )
            .with_subject(&source_attr.range),
        );
        return Ok(None);
    };

    let version_str = block
        .body
        .take_attr("version")
        .and_then(|a| literal_string(&a.expr))
        .unwrap_or_default();
    let version = match Constraints::parse(&version_str) {
        Ok(version) => version,
        Err(err) => {
            diags.push(
                Diagnostic::warning(
                    "Invalid module version constraint",
                    format!("Module {name:?}: {err}"),
                )
                .with_subject(&block.def_range),
            );
            Constraints::default()
        }
    };

    let count = block.body.take_attr("count");
    let for_each = block.body.take_attr("for_each");
    block.body.take_attr("providers");
    block.body.take_attr("depends_on");

    Ok(Some(ModuleCall {
        name,
        source: parse_module_source(&source_str),
        source_str,
        version,
        version_str,
        config: block.body,
        count,
        for_each,
        decl_range: block.def_range,
    }))
}

fn decode_provider(mut block: ConfigBlock) -> Result<ProviderConfig> {
    let name = label(&block, 0, "provider")?;
    let alias = block
        .body
        .take_attr("alias")
        .and_then(|a| literal_string(&a.expr));
    block.body.take_attr("version");
    Ok(ProviderConfig {
        name,
        alias,
        config: block.body,
        decl_range: block.def_range,
    })
}

fn decode_terraform_settings(block: ConfigBlock, module: &mut Module) {
    for required in block.body.blocks().filter(|b| b.kind == "required_providers") {
        for attr in required.body.attrs() {
            let name = attr.name.clone();
            let mut source = String::new();
            let mut version = String::new();
            match &attr.expr {
                hcl::Expression::Object(object) => {
                    for (key, value) in object {
                        let key: String = key.clone().into();
                        match key.as_str() {
                            "source" => source = literal_string(value).unwrap_or_default(),
                            "version" => version = literal_string(value).unwrap_or_default(),
                            _ => {}
                        }
                    }
                }
                other => {
                    // Legacy form: just a version constraint string.
                    version = literal_string(other).unwrap_or_default();
                }
            }
            if source.is_empty() {
                source = format!("hashicorp/{name}");
            }
            module
                .required_providers
                .insert(name.clone(), RequiredProvider { name, source, version });
        }
    }
}

fn label(block: &ConfigBlock, index: usize, kind: &str) -> Result<String> {
    block
        .labels
        .get(index)
        .cloned()
        .ok_or_else(|| anyhow!("{kind} block missing label {index}"))
        .with_context(|| format!("at {}", block.def_range))
}

/// A literal string value: a plain string or a template with one literal
/// element.
pub fn literal_string(expr: &hcl::Expression) -> Option<String> {
    match expr {
        hcl::Expression::String(s) => Some(s.clone()),
        hcl::Expression::TemplateExpr(t) => {
            let template = Template::from_expr(t).ok()?;
            let elements: Vec<&Element> = template.elements().iter().collect();
            match elements.as_slice() {
                [Element::Literal(s)] => Some(s.clone()),
                [] => Some(String::new()),
                _ => None,
            }
        }
        _ => None,
    }
}

pub fn literal_bool(expr: &hcl::Expression) -> Option<bool> {
    match expr {
        hcl::Expression::Bool(b) => Some(*b),
        _ => None,
    }
}

/// Classify a module source address the way the native tool's address parser
/// does: explicit relative paths are local, anything with a scheme or a
/// forced-getter prefix is remote, and `[host/]namespace/name/system` shapes
/// are registry addresses.
pub fn parse_module_source(source: &str) -> ModuleSource {
    if source.starts_with("./") || source.starts_with("../") {
        return ModuleSource::Local(source.to_string());
    }

    let (package, subdir) = split_package_subdir(source);

    let forced = package.contains("::") || package.contains("://") || package.starts_with("git@");
    let known_host = package.starts_with("github.com/") || package.starts_with("bitbucket.org/");
    if forced || known_host {
        return ModuleSource::Remote {
            package: package.to_string(),
            subdir: subdir.to_string(),
        };
    }

    let parts: Vec<&str> = package.split('/').collect();
    match parts.as_slice() {
        [namespace, name, system] => ModuleSource::Registry(RegistrySource {
            host: None,
            namespace: namespace.to_string(),
            name: name.to_string(),
            target_system: system.to_string(),
            subdir: subdir.to_string(),
        }),
        [host, namespace, name, system] if host.contains('.') => {
            ModuleSource::Registry(RegistrySource {
                host: Some(host.to_string()),
                namespace: namespace.to_string(),
                name: name.to_string(),
                target_system: system.to_string(),
                subdir: subdir.to_string(),
            })
        }
        _ => ModuleSource::Remote {
            package: package.to_string(),
            subdir: subdir.to_string(),
        },
    }
}

/// Split `addr//subdir` into package and subdir, ignoring the `//` that
/// follows a URL scheme.
fn split_package_subdir(addr: &str) -> (&str, &str) {
    let mut search_from = 0;
    if let Some(scheme) = addr.find("://") {
        search_from = scheme + 3;
    }
    match addr[search_from..].find("//") {
        Some(idx) => {
            let at = search_from + idx;
            (&addr[..at], &addr[at + 2..])
        }
        None => (addr, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryFs;

    fn load(src: &str) -> (Module, Sources, Diagnostics) {
        let fs = MemoryFs::with_files([("/main.tf", src)]);
        let mut sources = Sources::new();
        let mut diags = Diagnostics::new();
        let module = load_module(&fs, Path::new("/"), &mut sources, &mut diags).unwrap();
        (module, sources, diags)
    }

    #[test]
    fn loads_every_declaration_kind() {
        let src = r#"
terraform {
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }
  }
}

variable "region" {
  type    = string
  default = "us-east-1"
}

locals {
  bucket_name = "${var.region}-logs"
}

data "aws_ami" "ubuntu" {
  most_recent = true
}

resource "aws_instance" "web" {
  ami   = data.aws_ami.ubuntu.id
  count = 2
}

module "consumer" {
  source = "./consumer"
  name   = local.bucket_name
}

output "instance_id" {
  value = aws_instance.web[0].id
}

provider "aws" {
  region = var.region
}
"#;
        let (module, _, diags) = load(src);
        assert!(!diags.has_errors(), "{diags:?}");
        assert_eq!(module.variables.len(), 1);
        assert_eq!(module.locals.len(), 1);
        assert_eq!(module.data_resources.len(), 1);
        assert_eq!(module.managed_resources.len(), 1);
        assert_eq!(module.module_calls.len(), 1);
        assert_eq!(module.outputs.len(), 1);
        assert_eq!(module.provider_configs.len(), 1);

        let required = &module.required_providers["aws"];
        assert_eq!(required.source, "hashicorp/aws");
        assert_eq!(required.version, "~> 5.0");

        let web = &module.managed_resources[0];
        assert!(web.count.is_some());
        assert!(web.config.find_attr("count").is_none());
        assert!(web.config.find_attr("ami").is_some());

        let call = &module.module_calls[0];
        assert_eq!(call.source, ModuleSource::Local("./consumer".to_string()));
        assert!(call.config.find_attr("source").is_none());
    }

    #[test]
    fn resource_lifecycle_and_provisioners_are_extracted() {
        let src = r#"
resource "aws_instance" "web" {
  ami = "abc"

  lifecycle {
    create_before_destroy = true
  }

  provisioner "local-exec" {
    command = "echo created"
  }

  provisioner "local-exec" {
    when    = destroy
    command = "echo destroyed"
  }
}
"#;
        let (module, _, diags) = load(src);
        assert!(!diags.has_errors());
        let web = &module.managed_resources[0];
        assert!(web.create_before_destroy_set);
        assert_eq!(web.provisioners.len(), 2);
        assert!(!web.provisioners[0].when_destroy);
        assert!(web.provisioners[1].when_destroy);
        assert!(web.config.blocks().next().is_none());
    }

    #[test]
    fn parse_errors_abort_the_module() {
        let fs = MemoryFs::with_files([("/main.tf", "resource \"unclosed\" {")]);
        let mut sources = Sources::new();
        let mut diags = Diagnostics::new();
        let result = load_module(&fs, Path::new("/"), &mut sources, &mut diags);
        assert!(result.is_err());
        assert!(diags.has_errors());
    }

    #[test]
    fn declaration_ranges_cover_headers() {
        let (module, sources, _) = load("resource aws_bucket foo { }\n");
        let range = &module.managed_resources[0].decl_range;
        assert_eq!(sources.source_code(range), "resource aws_bucket foo");
        assert_eq!(range.start.byte, 0);
        assert_eq!(range.end.byte, 23);
    }

    #[test]
    fn classifies_module_sources() {
        assert_eq!(
            parse_module_source("./nested"),
            ModuleSource::Local("./nested".to_string())
        );
        assert_eq!(
            parse_module_source("git::https://example.com/repo.git//sub"),
            ModuleSource::Remote {
                package: "git::https://example.com/repo.git".to_string(),
                subdir: "sub".to_string(),
            }
        );
        assert_eq!(
            parse_module_source("github.com/acme/infra"),
            ModuleSource::Remote {
                package: "github.com/acme/infra".to_string(),
                subdir: String::new(),
            }
        );
        let registry = parse_module_source("terraform-aws-modules/s3-bucket/aws");
        match registry {
            ModuleSource::Registry(source) => {
                assert_eq!(source.namespace, "terraform-aws-modules");
                assert_eq!(source.name, "s3-bucket");
                assert_eq!(source.target_system, "aws");
                assert_eq!(source.host, None);
            }
            other => panic!("expected registry source, got {other:?}"),
        }
        let hosted = parse_module_source("registry.example.com/ns/mod/aws//sub");
        match hosted {
            ModuleSource::Registry(source) => {
                assert_eq!(source.host.as_deref(), Some("registry.example.com"));
                assert_eq!(source.subdir, "sub");
            }
            other => panic!("expected registry source, got {other:?}"),
        }
    }

    #[test]
    fn literal_strings_unwrap_templates() {
        let expr: hcl::Expression = hcl::Expression::String("plain".to_string());
        assert_eq!(literal_string(&expr), Some("plain".to_string()));
        assert_eq!(literal_bool(&hcl::Expression::Bool(true)), Some(true));
    }
}
