//! The mapper transport: where raw provider mapping payloads come from, and
//! the cache that keeps repeated lookups from hitting the network.

use crate::version::Version;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// A hint telling the mapper which plugin serves the mapping, and how to
/// parameterize a dynamically bridged provider.
#[derive(Clone, Debug, PartialEq)]
pub struct MapperPackageHint {
    pub plugin_name: String,
    pub parameterization: Option<Parameterization>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameterization {
    pub name: String,
    pub version: Version,
    pub value: Vec<u8>,
}

/// Fetches raw mapping bytes for a TF provider. Empty bytes mean "no mapping
/// available" and are a recoverable condition, never a transport error.
pub trait Mapper: Send + Sync {
    fn get_mapping(&self, provider: &str, hint: Option<&MapperPackageHint>) -> Result<Vec<u8>>;
}

/// Wraps a mapper in a cache keyed by `(provider, pulumi provider)`. One
/// mutex guards both lookup and fill; the work behind a miss dwarfs the
/// critical section. Empty payloads are cached, errors are not.
pub struct CachingMapper {
    inner: Box<dyn Mapper>,
    cache: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl CachingMapper {
    pub fn new(inner: Box<dyn Mapper>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Mapper for CachingMapper {
    fn get_mapping(&self, provider: &str, hint: Option<&MapperPackageHint>) -> Result<Vec<u8>> {
        let pulumi_provider = hint
            .map(|h| h.plugin_name.clone())
            .unwrap_or_else(|| provider.to_string());
        let key = (provider.to_string(), pulumi_provider);

        let mut cache = self.cache.lock().unwrap();
        if let Some(cached) = cache.get(&key) {
            return Ok(cached.clone());
        }
        let mapping = self.inner.get_mapping(provider, hint)?;
        cache.insert(key, mapping.clone());
        Ok(mapping)
    }
}

/// A mapper backed by a directory of `<provider>.json` payloads. A missing
/// file reads as "no mapping available".
pub struct FileMapper {
    pub dir: PathBuf,
}

impl FileMapper {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Mapper for FileMapper {
    fn get_mapping(&self, provider: &str, _hint: Option<&MapperPackageHint>) -> Result<Vec<u8>> {
        let path = self.dir.join(format!("{provider}.json"));
        if !path.exists() {
            return Ok(Vec::new());
        }
        std::fs::read(&path).with_context(|| format!("reading mapping {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingMapper {
        calls: Arc<AtomicUsize>,
    }

    impl Mapper for CountingMapper {
        fn get_mapping(&self, provider: &str, _hint: Option<&MapperPackageHint>) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match provider {
                "myprov" => Ok(b"myprov-mappings".to_vec()),
                "empty" => Ok(Vec::new()),
                _ => Err(anyhow!("unknown provider")),
            }
        }
    }

    fn counting_mapper() -> (CachingMapper, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mapper = CachingMapper::new(Box::new(CountingMapper {
            calls: calls.clone(),
        }));
        (mapper, calls)
    }

    fn hint(plugin: &str) -> MapperPackageHint {
        MapperPackageHint {
            plugin_name: plugin.to_string(),
            parameterization: None,
        }
    }

    #[test]
    fn caches_hits_without_calling_inner() {
        let (cm, calls) = counting_mapper();
        let first = cm.get_mapping("myprov", Some(&hint("q"))).unwrap();
        assert_eq!(first, b"myprov-mappings");
        let second = cm.get_mapping("myprov", Some(&hint("q"))).unwrap();
        assert_eq!(second, b"myprov-mappings");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let (cm, calls) = counting_mapper();
        assert!(cm.get_mapping("unknown", None).is_err());
        // A retry hits the transport again rather than a cached error.
        assert!(cm.get_mapping("unknown", None).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_payloads_are_cached() {
        let (cm, calls) = counting_mapper();
        assert!(cm.get_mapping("empty", None).unwrap().is_empty());
        assert!(cm.get_mapping("empty", None).unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_pulumi_providers_are_distinct_keys() {
        let (cm, calls) = counting_mapper();
        cm.get_mapping("myprov", Some(&hint("a"))).unwrap();
        cm.get_mapping("myprov", Some(&hint("b"))).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
