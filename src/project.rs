//! The project manifest written next to translated programs. Config values
//! arrive as JSON values (provider-config literals round-tripped through
//! JSON) so the YAML serializer emits plain scalars and mappings.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

pub const PROJECT_FILENAME: &str = "Pulumi.yaml";

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Project {
    pub name: String,
    pub runtime: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            // The CLI errors when loading a project without a runtime, even
            // though it overwrites this.
            runtime: "terraform".to_string(),
            config: BTreeMap::new(),
        }
    }

    pub fn set_config(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.config.insert(key.into(), value);
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_name_and_runtime() {
        let project = Project::new("my-module");
        let yaml = project.to_yaml().unwrap();
        assert!(yaml.contains("name: my-module"));
        assert!(yaml.contains("runtime: terraform"));
        assert!(!yaml.contains("config"));
    }

    #[test]
    fn serializes_config_values() {
        let mut project = Project::new("m");
        project.set_config("aws:region", serde_json::json!("us-east-1"));
        project.set_config("aws:maxRetries", serde_json::json!(5));
        let yaml = project.to_yaml().unwrap();
        assert!(yaml.contains("aws:region: us-east-1"));
        assert!(yaml.contains("aws:maxRetries: 5"));
    }
}
