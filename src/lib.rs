pub mod autofill;
pub mod body;
pub mod diag;
pub mod examples;
pub mod expr;
pub mod info;
pub mod lexer;
pub mod mapper;
pub mod par;
pub mod parser;
pub mod pcl;
pub mod project;
pub mod pulumiverse;
pub mod schema;
pub mod scopes;
pub mod state;
pub mod translate;
pub mod version;

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// Public re-exports
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use info::{CachingProviderInfoSource, MapperProviderInfoSource, ProviderInfoSource};
pub use mapper::{CachingMapper, FileMapper, Mapper, MapperPackageHint};
pub use translate::{translate_module, translate_module_with, Externals, PackageFetcher, RegistryClient};

/// Filesystem abstraction: lets callers control where sources are read from
/// and where translated artifacts are written to. The bulk-examples mode and
/// the test suite run entirely against [`MemoryFs`].
pub trait Vfs {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Write a file, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// List the files (not directories) directly inside `path`.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;
}

/// An in-memory filesystem keyed by normalized absolute paths.
#[derive(Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, P, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, S)>,
        P: Into<PathBuf>,
        S: Into<Vec<u8>>,
    {
        let fs = Self::new();
        {
            let mut map = fs.files.lock().unwrap();
            for (path, contents) in files {
                map.insert(clean_path(&path.into()), contents.into());
            }
        }
        fs
    }

    /// Every file currently stored, in path order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

impl Vfs for MemoryFs {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap();
        let bytes = files
            .get(&clean_path(path))
            .ok_or_else(|| anyhow!("missing file: {}", path.display()))?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        files.insert(clean_path(path), contents.to_vec());
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let dir = clean_path(path);
        let files = self.files.lock().unwrap();
        Ok(files
            .keys()
            .filter(|p| p.parent() == Some(dir.as_path()))
            .cloned()
            .collect())
    }

    fn create_dir_all(&self, _path: &Path) -> Result<()> {
        // Directories are implicit in the in-memory store.
        Ok(())
    }
}

/// A real filesystem rooted at a base directory, so that translation output
/// can never escape the target directory it was given.
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let rel = path.strip_prefix("/").unwrap_or(path);
        self.root.join(rel)
    }
}

impl Vfs for OsFs {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let full = self.resolve(path);
        std::fs::read_to_string(&full).with_context(|| format!("reading {}", full.display()))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&full, contents).with_context(|| format!("writing {}", full.display()))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let full = self.resolve(path);
        let mut out = Vec::new();
        for entry in
            std::fs::read_dir(&full).with_context(|| format!("reading {}", full.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                out.push(path.join(entry.file_name()));
            }
        }
        out.sort();
        Ok(out)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path);
        std::fs::create_dir_all(&full).with_context(|| format!("creating {}", full.display()))
    }
}

/// Lexically normalize a path: resolve `.` and `..` segments without touching
/// the filesystem. Relative paths are rooted at `/` so that the in-memory
/// store has a single spelling for every file.
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(p) => parts.push(p.to_os_string()),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    let mut out = PathBuf::from("/");
    for p in parts {
        out.push(p);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fs_round_trips_files() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/a/b.tf"), b"hello").unwrap();
        assert_eq!(fs.read_to_string(Path::new("/a/b.tf")).unwrap(), "hello");
        assert_eq!(fs.read_to_string(Path::new("/a/./b.tf")).unwrap(), "hello");
        assert!(fs.read_to_string(Path::new("/a/missing.tf")).is_err());
    }

    #[test]
    fn memory_fs_lists_only_direct_children() {
        let fs = MemoryFs::with_files([
            ("/main.tf", "x"),
            ("/other.tf", "y"),
            ("/mod/nested.tf", "z"),
        ]);
        let listed = fs.read_dir(Path::new("/")).unwrap();
        assert_eq!(
            listed,
            vec![PathBuf::from("/main.tf"), PathBuf::from("/other.tf")]
        );
        let nested = fs.read_dir(Path::new("/mod")).unwrap();
        assert_eq!(nested, vec![PathBuf::from("/mod/nested.tf")]);
    }

    #[test]
    fn clean_path_resolves_dots() {
        assert_eq!(clean_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean_path(Path::new("a/b")), PathBuf::from("/a/b"));
        assert_eq!(clean_path(Path::new("/../x")), PathBuf::from("/x"));
    }
}
