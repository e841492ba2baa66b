//! Bulk-examples mode: translate a JSON map of named example programs in one
//! run, each against a fresh in-memory filesystem, fanning the work out over
//! the worker pool. Diagnostics never bubble up; they ride inside each
//! example's result.

use crate::diag::Diagnostics;
use crate::info::ProviderInfoSource;
use crate::par::par_transform_map;
use crate::project::PROJECT_FILENAME;
use crate::translate::translate_module;
use crate::{MemoryFs, Vfs};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedExample {
    pub pcl: String,
    pub pulumi_yaml: String,
    pub diagnostics: Diagnostics,
}

/// Translate every example in a JSON object mapping names to TF source.
pub fn convert_examples(
    examples_json: &str,
    info: &dyn ProviderInfoSource,
    generated_project_dir: &Path,
    workers: i64,
) -> Result<BTreeMap<String, TranslatedExample>> {
    let examples: HashMap<String, String> = serde_json::from_str(examples_json)
        .context("unmarshal examples, expected a map of example name to source")?;

    let results = par_transform_map(
        examples,
        |name, example| translate_example(name, &example, info, generated_project_dir),
        workers,
    )?;
    Ok(results.into_iter().collect())
}

fn translate_example(
    name: &str,
    example: &str,
    info: &dyn ProviderInfoSource,
    generated_project_dir: &Path,
) -> Result<TranslatedExample> {
    let safe_name = name.replace('/', "-");

    let source = MemoryFs::new();
    source
        .write(&PathBuf::from(format!("/{safe_name}.tf")), example.as_bytes())
        .with_context(|| format!("write example {name} to memory store"))?;
    let destination = MemoryFs::new();

    let diagnostics = translate_module(
        &source,
        Path::new("/"),
        &destination,
        info,
        generated_project_dir,
    );

    let pcl = destination
        .read_to_string(Path::new(&format!("/{safe_name}.pp")))
        .unwrap_or_default();
    let pulumi_yaml = destination
        .read_to_string(&Path::new("/").join(PROJECT_FILENAME))
        .unwrap_or_default();

    Ok(TranslatedExample {
        pcl,
        pulumi_yaml,
        diagnostics,
    })
}

/// CLI entry: read `<source>/<examples>`, translate, write the results under
/// the same basename into `target`.
pub fn convert_examples_file(
    source_dir: &Path,
    target_dir: &Path,
    examples: &str,
    info: &dyn ProviderInfoSource,
    generated_project_dir: &Path,
) -> Result<()> {
    let examples_path = source_dir.join(examples);
    let json = std::fs::read_to_string(&examples_path)
        .with_context(|| format!("read {}", examples_path.display()))?;

    let results = convert_examples(&json, info, generated_project_dir, -1)?;

    let basename = Path::new(examples)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(examples));
    std::fs::create_dir_all(target_dir)
        .with_context(|| format!("create {}", target_dir.display()))?;
    let out_path = target_dir.join(basename);
    let encoded = serde_json::to_vec(&results).context("marshal results")?;
    std::fs::write(&out_path, encoded).with_context(|| format!("write {}", out_path.display()))?;
    Ok(())
}
