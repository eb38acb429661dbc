use std::path::PathBuf;

use clap::Parser;
use ioncore::algorithm::strategy::{Strategy, DEFAULT_STRATEGY};
use ioncore::generate::ThumbnailSettings;
use ioncore::ThumbnailError;
use ionstore::batch::generate_for_datasets;
use ionstore::config::load_settings;
use ionstore::{FsImageStore, StoreError};
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

/// Generate ion image thumbnails for datasets
#[derive(Parser, Debug)]
#[command(name = "ionstore")]
#[command(version, about = "Generate ion image thumbnails for datasets")]
struct Cli {
    /// SQLite annotation database
    #[arg(long, required_unless_present = "list_algorithms")]
    db: Option<PathBuf>,

    /// Image store root directory
    #[arg(long, required_unless_present = "list_algorithms")]
    store: Option<PathBuf>,

    /// Thumbnail algorithm
    #[arg(short, long, default_value_t = DEFAULT_STRATEGY.name().to_string())]
    algorithm: String,

    /// Skip datasets that already have a thumbnail
    #[arg(long)]
    only_missing: bool,

    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the k-means seed
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads, 0 for one per core
    #[arg(long, default_value_t = 0)]
    num_threads: usize,

    /// Print the available algorithms and exit
    #[arg(long)]
    list_algorithms: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dataset ids
    ds_ids: Vec<String>,
}

fn run(cli: &Cli) -> Result<(), StoreError> {
    let (Some(db), Some(store_root)) = (&cli.db, &cli.store) else {
        return Ok(());
    };

    let mut settings = match &cli.config {
        Some(path) => load_settings(path)?,
        None => ThumbnailSettings::default(),
    };
    if let Some(seed) = cli.seed {
        settings.kmeans.seed = seed;
    }

    let store = FsImageStore::new(store_root)?;
    let summary = generate_for_datasets(
        db,
        &store,
        &cli.algorithm,
        cli.only_missing,
        &settings,
        &cli.ds_ids,
        cli.num_threads,
    )?;

    for outcome in &summary.results {
        match &outcome.thumbnail {
            Some(handle) => println!("{}\t{}", outcome.ds_id, handle),
            None => println!("{}\t-", outcome.ds_id),
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    if cli.list_algorithms {
        for name in Strategy::names() {
            println!("{}", name);
        }
        return;
    }

    let exit_code = match run(&cli) {
        Ok(()) => 0,
        Err(StoreError::Core(ThumbnailError::UnsupportedAlgorithm(name))) => {
            error!("unsupported algorithm {:?}, expected one of: {}", name, Strategy::names().collect::<Vec<_>>().join(", "));
            2
        }
        Err(e) => {
            error!("{}", e);
            1
        }
    };

    std::process::exit(exit_code);
}
