//! Symbol tables and naming: every TF root (variable, local, resource, data
//! source, module call, output) is assigned a unique PCL name here, and
//! schema questions about fully qualified paths are answered by descending
//! the provider info tree.

use crate::pcl::Tokens;
use crate::schema::{AssetTranslation, Elem, ResourceInfo, Schema, SchemaType};
use std::collections::HashMap;
use std::rc::Rc;

/// Everything known about one fully qualified path.
#[derive(Clone, Default)]
pub struct PathInfo {
    /// The assigned PCL name for the final path segment.
    pub name: String,
    /// Schema for the resource or data source rooted here, if any.
    pub resource: Option<Rc<ResourceInfo>>,
    /// The defining expression, for locals.
    pub expression: Option<hcl::Expression>,
}

/// The result of resolving a path against the schema tree.
pub struct FieldInfo<'a> {
    pub name: String,
    pub schema: Option<&'a Schema>,
    /// Set when the path lands on a nested object with its own fields.
    pub resource_fields: Option<&'a std::collections::BTreeMap<String, Schema>>,
    /// Set when the path is a registered resource/data root with a schema.
    pub is_root: bool,
}

#[derive(Default)]
pub struct Scopes {
    /// All known roots, keyed by fully qualified path, e.g. `data.aws_ami.x`.
    roots: HashMap<String, PathInfo>,

    /// Local variables in scope from for expressions and dynamic blocks.
    locals: Vec<HashMap<String, String>>,

    /// Replacement tokens for `count.index` / `each.key` / `each.value`,
    /// installed while translating a counted or for-each declaration.
    pub count_index: Option<Tokens>,
    pub each_key: Option<Tokens>,
    pub each_value: Option<Tokens>,
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search the local scope stack innermost-first, then the root table.
    /// Returns the empty string when the name is unknown.
    pub fn lookup(&self, name: &str) -> String {
        for scope in self.locals.iter().rev() {
            if let Some(found) = scope.get(name) {
                if !found.is_empty() {
                    return found.clone();
                }
            }
        }
        if let Some(root) = self.roots.get(name) {
            return root.name.clone();
        }
        String::new()
    }

    pub fn push(&mut self, locals: HashMap<String, String>) {
        self.locals.push(locals);
    }

    pub fn pop(&mut self) {
        self.locals.pop();
    }

    pub fn root(&self, path: &str) -> Option<&PathInfo> {
        self.roots.get(path)
    }

    pub fn set_root(&mut self, path: impl Into<String>, info: PathInfo) {
        self.roots.insert(path.into(), info);
    }

    /// Returns whether any root currently uses `name`.
    fn is_used(&self, name: &str) -> bool {
        // There are a few keywords in PCL that are easier if we just never
        // emit them as names.
        if name == "range" {
            return true;
        }
        self.roots.values().any(|info| info.name == name)
    }

    /// Make `name` unique among the roots: first by applying `prefix` and
    /// `suffix`, then by appending an incrementing counter starting at 2.
    fn generate_unique_name(&self, name: &str, prefix: &str, suffix: &str) -> String {
        if !self.is_used(name) {
            return name.to_string();
        }
        let mut name = name.to_string();
        if !prefix.is_empty() {
            name = format!("{prefix}{}", uppercase_first(&name));
        }
        if !suffix.is_empty() {
            name = format!("{name}{}", uppercase_first(suffix));
        }
        if !self.is_used(&name) {
            return name;
        }
        let base = name;
        let mut counter = 2;
        loop {
            let candidate = format!("{base}{counter}");
            if !self.is_used(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Add a name to a fresh nested scope, making it unique against every
    /// root and every local already in scope. The caller pops the scope when
    /// the nested body is done.
    pub fn add_nested_unique(&mut self, name: &str, prefix: &str, suffix: &str) -> String {
        let used_anywhere = |scopes: &Self, name: &str| {
            scopes.is_used(name)
                || scopes
                    .locals
                    .iter()
                    .any(|l| l.get(name).map(|v| !v.is_empty()).unwrap_or(false))
        };

        let mut candidate = name.to_string();
        if used_anywhere(self, &candidate) {
            if !prefix.is_empty() {
                candidate = format!("{prefix}{}", uppercase_first(&candidate));
            }
            if !suffix.is_empty() {
                candidate = format!("{candidate}{}", uppercase_first(suffix));
            }
            let base = candidate.clone();
            let mut counter = 2;
            while used_anywhere(self, &candidate) {
                candidate = format!("{base}{counter}");
                counter += 1;
            }
        }
        self.push(HashMap::from([(candidate.clone(), candidate.clone())]));
        candidate
    }

    /// Outputs live in their own namespace and keep a plain camel-cased name.
    pub fn get_or_add_output(&mut self, path: &str) -> String {
        if let Some(root) = self.roots.get(path) {
            return root.name.clone();
        }
        let tf_name = path.rsplit('.').next().unwrap_or(path);
        let name = camel_case_name(tf_name);
        self.roots.insert(
            path.to_string(),
            PathInfo {
                name: name.clone(),
                ..Default::default()
            },
        );
        name
    }

    /// Assign and memoize a unique PCL name for `path`.
    pub fn get_or_add_name(&mut self, path: &str, prefix: &str, suffix: &str) -> String {
        if let Some(root) = self.roots.get(path) {
            return root.name.clone();
        }
        let tf_name = path.rsplit('.').next().unwrap_or(path);
        let name = self.generate_unique_name(&camel_case_name(tf_name), prefix, suffix);
        self.roots.insert(
            path.to_string(),
            PathInfo {
                name: name.clone(),
                ..Default::default()
            },
        );
        name
    }

    /// Resolve a fully qualified path (e.g. `data.simple_data_source.d.f`)
    /// against the registered roots and their schemas. Array descent is
    /// spelled by appending `[]` to a segment.
    pub fn get_info(&self, path: &str) -> Option<FieldInfo<'_>> {
        let parts: Vec<&str> = path.split('.').collect();
        assert!(
            parts.len() >= 2 && !parts[0].is_empty() && !parts[1].is_empty(),
            "short path passed into get_info: {path}"
        );

        let (root_key, rest) = if parts[0] == "data" {
            assert!(parts.len() >= 3, "short data path passed into get_info: {path}");
            (parts[..3].join("."), &parts[3..])
        } else {
            (parts[..2].join("."), &parts[2..])
        };

        let root = self.roots.get(&root_key);
        if rest.is_empty() {
            return Some(match root {
                Some(info) => FieldInfo {
                    name: info.name.clone(),
                    schema: None,
                    resource_fields: None,
                    is_root: info.resource.is_some(),
                },
                None => FieldInfo {
                    name: parts.last().unwrap().to_string(),
                    schema: None,
                    resource_fields: None,
                    is_root: false,
                },
            });
        }

        let fields = root.and_then(|r| r.resource.as_ref()).map(|r| &r.fields);
        get_inner(fields, rest)
    }

    /// The renamed PCL field name for `name` at `path`: an explicit override
    /// wins, otherwise camel-casing.
    pub fn pulumi_name(&self, name: &str, path: &str) -> String {
        let Some(info) = self.get_info(path) else {
            return camel_case_name(name);
        };
        if let Some(schema) = info.schema {
            if let Some(renamed) = &schema.name {
                if !renamed.is_empty() {
                    return renamed.clone();
                }
            }
        }
        camel_case_name(&info.name)
    }

    /// Whether the schema says the path is a map. `None` when unknown.
    pub fn is_map(&self, path: &str) -> Option<bool> {
        let info = self.get_info(path)?;
        if self.is_resource(path) {
            return Some(false);
        }
        info.schema.map(|s| s.type_ == SchemaType::Map)
    }

    /// Whether the path denotes a nested object rather than a plain field.
    pub fn is_resource(&self, path: &str) -> bool {
        let Some(info) = self.get_info(path) else {
            return false;
        };
        if let Some(schema) = info.schema {
            // A map of resources is how the schema spells a sub-object.
            if schema.type_ == SchemaType::Map
                && matches!(schema.elem.as_deref(), Some(Elem::Resource(_)))
            {
                return true;
            }
        }
        info.resource_fields.is_some()
    }

    /// Whether the path is a list-typed field limited to a single element.
    pub fn max_items_one(&self, path: &str) -> bool {
        let Some(info) = self.get_info(path) else {
            return false;
        };
        let Some(schema) = info.schema else {
            return false;
        };
        if let Some(explicit) = schema.max_items_one {
            return explicit;
        }
        schema.single_element_collection()
    }

    /// Asset translation info for the path, if the schema declares any.
    pub fn is_asset(&self, path: &str) -> Option<AssetTranslation> {
        self.get_info(path)?.schema.and_then(|s| s.asset)
    }

    /// Whether the path points at a property rather than a resource root or
    /// nested object.
    pub fn is_property_path(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        match self.get_info(path) {
            Some(info) => !info.is_root && info.resource_fields.is_none(),
            None => false,
        }
    }
}

fn get_inner<'a>(
    fields: Option<&'a std::collections::BTreeMap<String, Schema>>,
    parts: &[&str],
) -> Option<FieldInfo<'a>> {
    assert!(!parts[0].is_empty(), "empty path part passed into get_inner");

    // The leading segment may carry one or more `[]` indexers.
    let (part, rest) = match parts[0].split_once("[]") {
        Some((part, rest)) => (part, Some(rest)),
        None => (parts[0], None),
    };

    let current = fields.and_then(|f| f.get(part));

    if rest.is_none() {
        if parts.len() == 1 {
            return Some(FieldInfo {
                name: part.to_string(),
                schema: current,
                resource_fields: None,
                is_root: false,
            });
        }
        // Simple recurse on the element fields of this part.
        let next = current.and_then(|s| match s.elem.as_deref() {
            Some(Elem::Resource(fields)) => Some(fields),
            _ => None,
        });
        return get_inner(next, &parts[1..]);
    }

    // The part was indexed, so look at elements rather than fields.
    let elem = current.and_then(|s| s.elem.as_deref());
    if rest == Some("") && parts.len() == 1 {
        return Some(match elem {
            Some(Elem::Resource(fields)) => FieldInfo {
                name: part.to_string(),
                schema: None,
                resource_fields: Some(fields),
                is_root: false,
            },
            Some(Elem::Schema(schema)) => FieldInfo {
                name: part.to_string(),
                schema: Some(&**schema),
                resource_fields: None,
                is_root: false,
            },
            None => FieldInfo {
                name: part.to_string(),
                schema: None,
                resource_fields: None,
                is_root: false,
            },
        });
    } else if rest == Some("") {
        let next = match elem {
            Some(Elem::Resource(fields)) => Some(fields),
            _ => None,
        };
        return get_inner(next, &parts[1..]);
    }

    // A complex indexer (e.g. `foo[][]bar`); the caller falls back to
    // camel-casing.
    None
}

/// Camel-case a TF name. All-uppercase names are assumed intentional and
/// pass through unchanged.
pub fn camel_case_name(name: &str) -> String {
    if name.is_empty() || name.to_uppercase() == name {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    lowercase_first(&out)
}

pub fn pascal_case_name(name: &str) -> String {
    uppercase_first(&camel_case_name(name))
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn uppercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ProviderInfo;

    #[test]
    fn camel_casing() {
        assert_eq!(camel_case_name("a_field"), "aField");
        assert_eq!(camel_case_name("instance_type"), "instanceType");
        assert_eq!(camel_case_name("ARN"), "ARN");
        assert_eq!(camel_case_name("Name"), "name");
        assert_eq!(pascal_case_name("s3_bucket"), "S3Bucket");
    }

    #[test]
    fn unique_names_use_suffix_then_counter() {
        let mut scopes = Scopes::new();
        assert_eq!(scopes.get_or_add_name("var.web", "", "Config"), "web");
        assert_eq!(scopes.get_or_add_name("aws_instance.web", "", "Instance"), "webInstance");
        assert_eq!(
            scopes.get_or_add_name("aws_eip.web", "", "Instance"),
            "webInstance2"
        );
        // Memoized on repeat lookups.
        assert_eq!(scopes.get_or_add_name("var.web", "", "Config"), "web");
    }

    #[test]
    fn keywordish_names_are_always_evicted() {
        let mut scopes = Scopes::new();
        assert_eq!(scopes.get_or_add_name("var.range", "", "Config"), "rangeConfig");
    }

    #[test]
    fn lookup_prefers_innermost_scope() {
        let mut scopes = Scopes::new();
        scopes.get_or_add_name("local.x", "my", "");
        scopes.push(HashMap::from([("x".to_string(), "outer".to_string())]));
        scopes.push(HashMap::from([("x".to_string(), "inner".to_string())]));
        assert_eq!(scopes.lookup("x"), "inner");
        scopes.pop();
        assert_eq!(scopes.lookup("x"), "outer");
        scopes.pop();
        assert_eq!(scopes.lookup("x"), "");
        assert_eq!(scopes.lookup("local.x"), "x");
    }

    #[test]
    fn nested_unique_names_count_up() {
        let mut scopes = Scopes::new();
        let first = scopes.add_nested_unique("entry", "", "");
        assert_eq!(first, "entry");
        let second = scopes.add_nested_unique("entry", "", "");
        assert_eq!(second, "entry2");
        scopes.pop();
        scopes.pop();
    }

    fn sample_scopes() -> Scopes {
        let payload = br#"{
            "name": "simple",
            "resources": {
                "simple_resource": {
                    "tok": "simple:index:Resource",
                    "fields": {
                        "a_field": {"name": "renamedField", "type": "string"},
                        "a_map": {"type": "map", "elem": {"schema": {"type": "string"}}},
                        "settings": {
                            "type": "list",
                            "maxItems": 1,
                            "elem": {"resource": {"inner_field": {"type": "string"}}}
                        },
                        "rules": {
                            "type": "list",
                            "elem": {"resource": {"rule_name": {"type": "string"}}}
                        },
                        "source_file": {"type": "string", "asset": "file"}
                    }
                }
            }
        }"#;
        let info = ProviderInfo::from_mapping(payload).unwrap();
        let mut scopes = Scopes::new();
        scopes.set_root(
            "simple_resource.main",
            PathInfo {
                name: "main".to_string(),
                resource: Some(Rc::new(info.resources["simple_resource"].clone())),
                expression: None,
            },
        );
        scopes
    }

    #[test]
    fn schema_predicates_follow_the_tree() {
        let scopes = sample_scopes();
        assert_eq!(
            scopes.pulumi_name("a_field", "simple_resource.main.a_field"),
            "renamedField"
        );
        assert_eq!(scopes.is_map("simple_resource.main.a_map"), Some(true));
        assert_eq!(scopes.is_map("simple_resource.main.a_field"), Some(false));
        assert!(scopes.max_items_one("simple_resource.main.settings"));
        assert!(!scopes.max_items_one("simple_resource.main.rules"));
        assert_eq!(
            scopes.is_asset("simple_resource.main.source_file"),
            Some(AssetTranslation::File)
        );
    }

    #[test]
    fn array_descent_reaches_element_fields() {
        let scopes = sample_scopes();
        assert_eq!(
            scopes.pulumi_name("rule_name", "simple_resource.main.rules[].rule_name"),
            "ruleName"
        );
        assert!(scopes.is_resource("simple_resource.main.rules[]"));
        assert!(scopes.is_property_path("simple_resource.main.rules[].rule_name"));
        assert!(!scopes.is_property_path("simple_resource.main.rules[]"));
    }

    #[test]
    fn unknown_paths_fall_back_to_camel_case() {
        let scopes = Scopes::new();
        assert_eq!(
            scopes.pulumi_name("some_field", "aws_thing.unknown.some_field"),
            "someField"
        );
        assert_eq!(scopes.is_map("aws_thing.unknown.some_field"), None);
    }
}
