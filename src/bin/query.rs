//! One-shot `within` query against a sealed index, printing JSON.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use polyfence::{Engine, EngineConfig, QueryOptions, Store, StrategyKind};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Sealed database path.
    #[arg(long, default_value = "out.seg")]
    db_path: PathBuf,

    /// Lookup strategy: insidetree, shapeindex or db.
    #[arg(long, default_value = "insidetree")]
    strategy: String,

    /// Stop at the first certain hit (non-overlapping corpora).
    #[arg(long, default_value_t = false)]
    stop_on_first_found: bool,

    /// Order responses by ascending admin_level.
    #[arg(long, default_value_t = false)]
    sort_by_admin_level: bool,

    /// Omit coordinate arrays from the reply.
    #[arg(long, default_value_t = false)]
    remove_geometries: bool,

    lat: f64,
    lng: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polyfence=warn".into()),
        )
        .init();

    let args = Args::parse();
    let strategy: StrategyKind = args.strategy.parse()?;

    let store = Store::open_read_only(&args.db_path)?;
    let engine = Engine::open(
        Arc::new(store),
        EngineConfig::default()
            .with_strategy(strategy)
            .with_stop_on_inside_found(args.stop_on_first_found)
            .with_sort_by_admin_level(args.sort_by_admin_level),
    )?;

    let resp = engine.within(
        args.lat,
        args.lng,
        QueryOptions {
            remove_geometries: args.remove_geometries,
            deadline: None,
        },
    )?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}
