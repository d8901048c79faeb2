//! marionette CLI
//!
//! Exports a captured character resource-graph snapshot as a glTF scene
//! with baked PNG textures.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use marionette_core::ResourceTree;
use marionette_export::{CancelFlag, CharacterExporter, ExportOptions, ExportOutcome};
use marionette_formats::{AssetLibrary, DeformRegistry, DiskSource};

/// marionette - character resource-graph to glTF converter
#[derive(Parser)]
#[command(name = "marionette")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Resource-graph snapshot (JSON)
    snapshot: PathBuf,

    /// Root directory resolving game-relative asset paths
    #[arg(short, long)]
    assets: PathBuf,

    /// Output root; each export creates a timestamped directory below it
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Body-deformer container snapshot (JSON); omitting it disables
    /// race deformation
    #[arg(long)]
    deformers: Option<PathBuf>,

    /// Export only these top-level node indices (default: all)
    #[arg(short = 'n', long = "node")]
    nodes: Vec<usize>,

    /// Enable verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn,marionette=info",
        1 => "info,marionette=debug",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let snapshot = std::fs::read(&cli.snapshot)
        .with_context(|| format!("reading snapshot {}", cli.snapshot.display()))?;
    let tree: ResourceTree =
        serde_json::from_slice(&snapshot).context("parsing resource-graph snapshot")?;

    info!(
        tree = %tree.name,
        nodes = tree.nodes.len(),
        body = %tree.body(),
        "Loaded resource graph"
    );

    let deformers = match &cli.deformers {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading deformer container {}", path.display()))?;
            let registry: DeformRegistry =
                serde_json::from_slice(&bytes).context("parsing deformer container")?;
            Arc::new(registry)
        }
        None => Arc::new(DeformRegistry::empty()),
    };

    let enabled = selection(&tree, &cli.nodes)?;

    let library = AssetLibrary::snapshot(Arc::new(DiskSource::new(&cli.assets)));
    let options = match cli.output {
        Some(output_root) => ExportOptions { output_root },
        None => ExportOptions::default(),
    };
    let exporter = CharacterExporter::new(library, deformers, options);

    match exporter.export(&tree, &enabled, &CancelFlag::new())? {
        ExportOutcome::Completed(summary) => {
            println!(
                "Exported {} mesh(es), {} material(s) to {}",
                summary.meshes,
                summary.materials,
                summary.directory.display()
            );
            if summary.skipped_models > 0 {
                println!("Skipped {} unresolvable model(s)", summary.skipped_models);
            }
            Ok(())
        }
        ExportOutcome::Cancelled => {
            warn!("Export cancelled");
            Ok(())
        }
        ExportOutcome::Busy => bail!("another export is already in progress"),
    }
}

/// Build the top-level selection vector from explicit indices, or select all
fn selection(tree: &ResourceTree, indices: &[usize]) -> Result<Vec<bool>> {
    if indices.is_empty() {
        return Ok(vec![true; tree.nodes.len()]);
    }
    let mut enabled = vec![false; tree.nodes.len()];
    for &index in indices {
        let Some(slot) = enabled.get_mut(index) else {
            bail!(
                "node index {index} out of range ({} top-level nodes)",
                tree.nodes.len()
            );
        };
        *slot = true;
    }
    Ok(enabled)
}
