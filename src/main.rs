use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use tf2pcl::{
    examples, translate_module, CachingMapper, CachingProviderInfoSource, FileMapper,
    MapperProviderInfoSource, OsFs, Severity,
};

#[derive(Parser)]
#[command(name = "tf2pcl")]
#[command(about = "Translate Terraform-dialect configuration into PCL programs", long_about = None)]
struct Cli {
    /// Source directory containing .tf files
    #[arg(long, default_value = ".")]
    source: PathBuf,

    /// Target directory for translated .pp files and Pulumi.yaml
    #[arg(long, default_value = "out")]
    target: PathBuf,

    /// Directory the final project will be generated into; used to compute
    /// relative paths for local sandboxed modules (defaults to target)
    #[arg(long)]
    generated_project_dir: Option<PathBuf>,

    /// Directory of <provider>.json mapping payloads
    #[arg(long)]
    mappings: Option<PathBuf>,

    /// Bulk mode: translate a JSON map of example names to sources found at
    /// this path relative to the source directory
    #[arg(long)]
    convert_examples: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate arguments for a state-file import
    ConvertState {
        /// Path to the state file
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Some(Commands::ConvertState { args }) = &cli.command {
        if args.len() != 1 {
            bail!("expected exactly one argument");
        }
        bail!("state translation requires the state importer, which this tool does not bundle");
    }

    // A missing mappings directory reads as "no mapping available" for every
    // provider, which surfaces as per-resource warnings.
    let mappings_dir = cli
        .mappings
        .clone()
        .unwrap_or_else(|| PathBuf::from("mappings"));
    let mapper = CachingMapper::new(Box::new(FileMapper::new(mappings_dir)));
    let info_source = CachingProviderInfoSource::new(Box::new(MapperProviderInfoSource::new(
        Box::new(mapper),
    )));

    let generated_project_dir = cli
        .generated_project_dir
        .clone()
        .unwrap_or_else(|| cli.target.clone());

    if let Some(examples_rel) = &cli.convert_examples {
        examples::convert_examples_file(
            &cli.source,
            &cli.target,
            examples_rel,
            &info_source,
            &generated_project_dir,
        )?;
        info!("Wrote translated examples to {}", cli.target.display());
        return Ok(());
    }

    let source_fs = OsFs::new(&cli.source);
    let target_fs = OsFs::new(&cli.target);
    let diagnostics = translate_module(
        &source_fs,
        Path::new("/"),
        &target_fs,
        &info_source,
        &generated_project_dir,
    );

    for diagnostic in diagnostics.iter() {
        match diagnostic.severity {
            Severity::Error => error!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
        }
    }
    if diagnostics.has_errors() {
        std::process::exit(1);
    }
    info!("Translated {} to {}", cli.source.display(), cli.target.display());
    Ok(())
}
