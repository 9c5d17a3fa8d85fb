use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use room_finder::config::{FileConfig, Settings, SourceSettings};
use room_finder::report::{render_html, select_rows, write_report, ReportFilter};
use room_finder::scrapers::{build_adapters, SourceAdapter};
use room_finder::{JsonFileStorage, ListingStore, ReconcileOptions, Reconciler, RunMode, Scorer, Source, Storage};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "room-finder")]
#[command(about = "Find, score and report rooms to rent")]
#[command(version)]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = "settings.toml", global = true)]
    config: PathBuf,

    /// Only run these sources (defaults to those enabled in the settings)
    #[arg(short, long = "source", value_enum, global = true)]
    sources: Vec<SourceArg>,

    /// Log progress
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log every request and score
    #[arg(short, long, global = true)]
    debug: bool,

    /// Re-fetch listings that are already stored
    #[arg(short, long, global = true)]
    force: bool,

    /// Build listings from search results without fetching each one
    #[arg(long, global = true)]
    fast: bool,

    /// Mark stored listings as seen before running
    #[arg(long, global = true)]
    mark_old: bool,

    /// Maximum rows in the report
    #[arg(long, global = true)]
    max_rooms: Option<usize>,

    /// Maximum search pages per area
    #[arg(long, global = true)]
    max_pages: Option<u32>,

    /// Seconds to wait before every request
    #[arg(long, global = true)]
    sleep: Option<f64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search every area for new listings (default)
    Discover,

    /// Re-score stored listings
    Rate {
        /// Fetch every stored listing again before scoring it
        #[arg(long)]
        refresh: bool,
    },

    /// Fetch one listing, score it and print the result
    Room {
        /// Listing id
        id: String,
    },

    /// Only render the report
    Report,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Spareroom,
    Gumtree,
}

impl From<SourceArg> for Source {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Spareroom => Source::SpareRoom,
            SourceArg::Gumtree => Source::Gumtree,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let settings = load_settings(&cli)?;
    let scorer = Scorer::new(settings.preferences.clone(), settings.weights.clone());
    let reconciler = Reconciler::new(
        &scorer,
        ReconcileOptions {
            max_pages: settings.search.max_pages,
            force: settings.search.force,
            fast: settings.search.fast,
            mark_old: settings.search.mark_old,
        },
    );

    // Every adapter is set up before the first request goes out
    let adapters = build_adapters(&settings)?;

    for (source, adapter) in settings.sources.iter().zip(&adapters) {
        let storage = JsonFileStorage::new(&source.store);
        let mut store = reconciler.load_store(&storage).await;
        info!(source = %source.source, count = store.len(), "loaded {}", storage.location().display());

        match &cli.command {
            None | Some(Commands::Discover) => {
                reconciler
                    .run(RunMode::Discover, &mut store, adapter.as_ref(), &storage, &settings.preferences.areas)
                    .await;
            }
            Some(Commands::Rate { refresh }) => {
                let mode = if *refresh { RunMode::RateWithRefresh } else { RunMode::Rate };
                reconciler
                    .run(mode, &mut store, adapter.as_ref(), &storage, &settings.preferences.areas)
                    .await;
            }
            Some(Commands::Room { id }) => {
                show_room(&reconciler, &mut store, adapter.as_ref(), &storage, id).await?;
                continue;
            }
            Some(Commands::Report) => {}
        }

        generate_report(source, &settings, &store, &storage).await;
    }

    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{level},reqwest=warn,hyper=warn").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Read the settings file and apply command-line overrides before validating.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut config = FileConfig::load(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;

    if !cli.sources.is_empty() {
        let sources: Vec<Source> = cli.sources.iter().map(|s| Source::from(*s)).collect();
        config.select_sources(&sources);
    }
    if let Some(max_pages) = cli.max_pages {
        config.search.max_pages = max_pages;
    }
    if let Some(sleep) = cli.sleep {
        config.search.delay_secs = sleep;
    }
    if let Some(max_rooms) = cli.max_rooms {
        config.report.max_rows = Some(max_rooms);
    }
    config.search.force |= cli.force;
    config.search.fast |= cli.fast;
    config.search.mark_old |= cli.mark_old;

    config.validate().context("Invalid settings")
}

async fn show_room(
    reconciler: &Reconciler<'_>,
    store: &mut ListingStore,
    adapter: &dyn SourceAdapter,
    storage: &JsonFileStorage,
    id: &str,
) -> Result<()> {
    let breakdown = reconciler
        .refresh_one(store, adapter, storage, id)
        .await
        .with_context(|| format!("Failed to fetch listing {id} from {}", adapter.source()))?;

    if let Some(record) = store.get(id) {
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    match breakdown {
        Some(breakdown) => println!("{breakdown}"),
        None => warn!(listing_id = %id, "listing has no rent and was not scored"),
    }
    Ok(())
}

async fn generate_report(
    source: &SourceSettings,
    settings: &Settings,
    store: &ListingStore,
    storage: &JsonFileStorage,
) {
    let filter = ReportFilter {
        pref_ids: &source.pref_ids,
        max_rows: settings.report.max_rows,
        min_available: settings
            .report
            .hide_before_move_in
            .then_some(settings.preferences.move_in),
        areas: &settings.preferences.areas,
    };
    let sorted = store.get_sorted();
    let rows = select_rows(&sorted, &filter);
    let html = render_html(source.source.name(), &rows, &settings.report.fields);

    let path = storage.location().with_extension("html");
    match write_report(&path, &html).await {
        Ok(()) => info!(source = %source.source, rows = rows.len(), "report written to {}", path.display()),
        Err(e) => error!(source = %source.source, op = "report", error = %e, "failed to write {}", path.display()),
    }
}
