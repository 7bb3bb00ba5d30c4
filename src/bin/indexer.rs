//! Builds a sealed index from a JSON-lines feature file.
//!
//! Each input line is one feature: `{"properties": {...}, "polygons":
//! [[lng, lat, ...], ...]}` with every polygon a flat closed ring.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use clap::Parser;
use polyfence::{CoverConfig, Indexer, IndexerConfig, InputFeature, Store};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON-lines feature file to index.
    #[arg(long)]
    file_path: PathBuf,

    /// Output database path.
    #[arg(long, default_value = "out.seg")]
    db_path: PathBuf,

    /// Max cell level for the interior cover.
    #[arg(long, default_value_t = 16)]
    inside_max_level: u8,

    /// Min cell level for the interior cover.
    #[arg(long, default_value_t = 0)]
    inside_min_level: u8,

    /// Max cell count for the interior cover.
    #[arg(long, default_value_t = 16)]
    inside_max_cells: usize,

    /// Max cell level for the exterior cover.
    #[arg(long, default_value_t = 13)]
    outside_max_level: u8,

    /// Min cell level for the exterior cover.
    #[arg(long, default_value_t = 0)]
    outside_min_level: u8,

    /// Max cell count for the exterior cover.
    #[arg(long, default_value_t = 16)]
    outside_max_cells: usize,

    /// Drop a polygon when its cover exceeds this many cells (0 disables).
    #[arg(long, default_value_t = 1000)]
    warning_cells_cover: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polyfence=info,info".into()),
        )
        .init();

    let args = Args::parse();

    let filename = args
        .file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.file_path.display().to_string());

    let cfg = IndexerConfig::new(filename)
        .with_inside(CoverConfig {
            min_level: args.inside_min_level,
            max_level: args.inside_max_level,
            max_cells: args.inside_max_cells,
        })
        .with_outside(CoverConfig {
            min_level: args.outside_min_level,
            max_level: args.outside_max_level,
            max_cells: args.outside_max_cells,
        })
        .with_warn_cells(args.warning_cells_cover);

    let mut indexer = Indexer::new(Store::create(&args.db_path), cfg)?;

    let file = File::open(&args.file_path)?;
    let reader = BufReader::new(file);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let feature: InputFeature = match serde_json::from_str(&line) {
            Ok(f) => f,
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "skipping unparsable feature");
                continue;
            }
        };
        indexer.add_feature(&feature)?;
    }

    let (_store, stats) = indexer.seal()?;
    info!(
        indexed = stats.indexed,
        skipped = stats.skipped,
        polygons_dropped = stats.polygons_dropped,
        db = %args.db_path.display(),
        "index build complete"
    );
    Ok(())
}
