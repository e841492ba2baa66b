//! The provider information source: turns raw mapper payloads into typed
//! [`ProviderInfo`], deciding along the way whether a provider is served by a
//! first-class package or must be dynamically bridged.

use crate::mapper::{Mapper, MapperPackageHint, Parameterization};
use crate::parser::RequiredProvider;
use crate::pulumiverse::{is_terraform_provider, renamed_provider};
use crate::schema::ProviderInfo;
use crate::version::{Constraints, Version};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Retrieves information about a bridged TF provider.
pub trait ProviderInfoSource: Sync {
    fn get_provider_info(
        &self,
        tf_provider: &str,
        required_provider: Option<&RequiredProvider>,
    ) -> Result<ProviderInfo>;
}

/// Collapse a required-provider constraint to one concrete version without a
/// registry round trip: an exact pin wins, else the lower bound.
pub fn resolve_required_version(required: &RequiredProvider) -> Option<Version> {
    if required.version.trim().is_empty() {
        return None;
    }
    let constraints = Constraints::parse(&required.version).ok()?;
    constraints.base_version().cloned()
}

/// Build the hint telling the mapper which plugin serves this provider's
/// mapping: the package name for known providers, or the dynamically bridged
/// `terraform-provider` plugin parameterized with the provider's source.
pub fn package_hint(
    tf_provider: &str,
    required_provider: Option<&RequiredProvider>,
) -> MapperPackageHint {
    let pulumi_provider = renamed_provider(tf_provider).unwrap_or(tf_provider);

    if is_terraform_provider(pulumi_provider) {
        if let Some(required) = required_provider {
            if let Some(version) = resolve_required_version(required) {
                let value = format!(
                    "{{\"remote\":{{\"url\":\"{}\",\"version\":\"{}\"}}}}",
                    required.source, version
                );
                return MapperPackageHint {
                    plugin_name: "terraform-provider".to_string(),
                    parameterization: Some(Parameterization {
                        name: tf_provider.to_string(),
                        version,
                        value: value.into_bytes(),
                    }),
                };
            }
        }
    }

    MapperPackageHint {
        plugin_name: pulumi_provider.to_string(),
        parameterization: None,
    }
}

/// Wraps a [`Mapper`] to return decoded provider info.
pub struct MapperProviderInfoSource {
    mapper: Box<dyn Mapper>,
}

impl MapperProviderInfoSource {
    pub fn new(mapper: Box<dyn Mapper>) -> Self {
        Self { mapper }
    }
}

impl ProviderInfoSource for MapperProviderInfoSource {
    fn get_provider_info(
        &self,
        tf_provider: &str,
        required_provider: Option<&RequiredProvider>,
    ) -> Result<ProviderInfo> {
        let hint = package_hint(tf_provider, required_provider);
        // The mapper always gets the TF provider name; the hint carries the
        // package name to load.
        let mapping = self.mapper.get_mapping(tf_provider, Some(&hint))?;

        if mapping.is_empty() {
            bail!(
                "could not find mapping information for provider {tf_provider}; try installing a \
                 pulumi plugin that supports this terraform provider"
            );
        }

        ProviderInfo::from_mapping(&mapping)
            .with_context(|| format!("could not decode mapping information for provider {tf_provider}"))
    }
}

/// Wraps a [`ProviderInfoSource`] in a read-write-locked cache keyed by
/// provider name. Concurrent first-time misses may both query the underlying
/// source; the first stored result wins.
pub struct CachingProviderInfoSource {
    source: Box<dyn ProviderInfoSource>,
    entries: RwLock<HashMap<String, ProviderInfo>>,
}

impl CachingProviderInfoSource {
    pub fn new(source: Box<dyn ProviderInfoSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get_from_cache(&self, provider: &str) -> Option<ProviderInfo> {
        self.entries.read().unwrap().get(provider).cloned()
    }
}

impl ProviderInfoSource for CachingProviderInfoSource {
    fn get_provider_info(
        &self,
        tf_provider: &str,
        required_provider: Option<&RequiredProvider>,
    ) -> Result<ProviderInfo> {
        if let Some(info) = self.get_from_cache(tf_provider) {
            return Ok(info);
        }

        let mut entries = self.entries.write().unwrap();
        if let Some(info) = entries.get(tf_provider) {
            return Ok(info.clone());
        }
        let info = self.source.get_provider_info(tf_provider, required_provider)?;
        entries.insert(tf_provider.to_string(), info.clone());
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct RecordingMapper {
        seen: Mutex<HashMap<String, MapperPackageHint>>,
        payload: Vec<u8>,
    }

    impl Mapper for RecordingMapper {
        fn get_mapping(
            &self,
            provider: &str,
            hint: Option<&MapperPackageHint>,
        ) -> Result<Vec<u8>> {
            self.seen
                .lock()
                .unwrap()
                .insert(provider.to_string(), hint.unwrap().clone());
            Ok(self.payload.clone())
        }
    }

    fn required(name: &str, source: &str, version: &str) -> RequiredProvider {
        RequiredProvider {
            name: name.to_string(),
            source: source.to_string(),
            version: version.to_string(),
        }
    }

    #[test]
    fn known_providers_get_plain_hints() {
        let hint = package_hint("google", Some(&required("google", "hashicorp/google", "4.0.0")));
        assert_eq!(hint.plugin_name, "gcp");
        assert!(hint.parameterization.is_none());
    }

    #[test]
    fn unknown_providers_get_parameterized_hints() {
        let hint = package_hint(
            "planetscale",
            Some(&required("planetscale", "planetscale/planetscale", "0.1.0")),
        );
        assert_eq!(hint.plugin_name, "terraform-provider");
        let parameterization = hint.parameterization.unwrap();
        assert_eq!(parameterization.name, "planetscale");
        assert_eq!(parameterization.version.to_string(), "0.1.0");
        assert_eq!(
            String::from_utf8(parameterization.value).unwrap(),
            "{\"remote\":{\"url\":\"planetscale/planetscale\",\"version\":\"0.1.0\"}}"
        );
    }

    #[test]
    fn unknown_provider_without_descriptor_gets_plain_hint() {
        let hint = package_hint("planetscale", None);
        assert_eq!(hint.plugin_name, "planetscale");
        assert!(hint.parameterization.is_none());
    }

    #[test]
    fn empty_mapping_is_a_recoverable_error() {
        let source = MapperProviderInfoSource::new(Box::new(RecordingMapper {
            seen: Mutex::new(HashMap::new()),
            payload: Vec::new(),
        }));
        let err = source.get_provider_info("aws", None).unwrap_err();
        assert!(err
            .to_string()
            .contains("could not find mapping information for provider aws"));
    }

    #[test]
    fn decodes_mapping_payloads() {
        let source = MapperProviderInfoSource::new(Box::new(RecordingMapper {
            seen: Mutex::new(HashMap::new()),
            payload: br#"{"name": "simple"}"#.to_vec(),
        }));
        let info = source.get_provider_info("simple", None).unwrap();
        assert_eq!(info.name, "simple");
    }

    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    impl ProviderInfoSource for CountingSource {
        fn get_provider_info(
            &self,
            tf_provider: &str,
            _required: Option<&RequiredProvider>,
        ) -> Result<ProviderInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderInfo {
                name: tf_provider.to_string(),
                ..Default::default()
            })
        }
    }

    #[test]
    fn caching_source_calls_inner_once_per_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let caching = CachingProviderInfoSource::new(Box::new(CountingSource {
            calls: calls.clone(),
        }));
        assert_eq!(caching.get_provider_info("aws", None).unwrap().name, "aws");
        assert_eq!(caching.get_provider_info("aws", None).unwrap().name, "aws");
        assert_eq!(caching.get_provider_info("gcp", None).unwrap().name, "gcp");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
