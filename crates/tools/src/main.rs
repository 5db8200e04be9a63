use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use boundaries::{BoundaryCache, HttpBoundaryFetcher};
use catalog::{ContentUrlFactory, InMemorySessionStore, content_id};
use clap::{Args, Parser, Subcommand, ValueEnum};
use foundation::{Granularity, LonLat};
use layers::{ClusterSource, InMemoryMapEngine, RenderedFeature};
use memories::{FilterEngine, FilterState, GeoCounts, RecordCollection, Statistics, Timing};
use runtime::TimerQueue;
use serde::Serialize;
use serde_json::json;
use session::{Session, ViewerConfig};
use timeline::{TimelinePlayer, entries_for};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline inspection of a BeReal memories export")]
struct Cli {
    /// Viewer configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// Keep only these years (repeatable)
    #[arg(long = "year")]
    years: Vec<String>,

    /// Keep only these months, 1-12 (repeatable)
    #[arg(long = "month")]
    months: Vec<u32>,

    #[arg(long, value_enum, default_value_t = TimingArg::All)]
    timing: TimingArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
enum TimingArg {
    #[default]
    All,
    Ontime,
    Late,
    Bonus,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum GranularityArg {
    Day,
    Month,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record counts, filter result and statistics without geo attribution
    Summary {
        /// Path to memories.json
        file: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Timeline buckets with cumulative counts
    Timeline {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = GranularityArg::Day)]
        granularity: GranularityArg,
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Markers visible for a camera position
    Clusters {
        file: PathBuf,
        #[arg(long, default_value_t = 2.21)]
        lon: f64,
        #[arg(long, default_value_t = 46.22)]
        lat: f64,
        #[arg(long, default_value_t = 5.5)]
        zoom: f64,
        #[arg(long, default_value_t = 1280.0)]
        width: f64,
        #[arg(long, default_value_t = 800.0)]
        height: f64,
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Full statistics including countries and regions (downloads boundaries)
    Attribute { file: PathBuf },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ViewerConfig::from_path(path)?,
        None => ViewerConfig::default(),
    };

    match cli.command {
        Command::Summary { file, filters } => cmd_summary(&file, &filters),
        Command::Timeline {
            file,
            granularity,
            filters,
        } => cmd_timeline(&config, &file, granularity, &filters),
        Command::Clusters {
            file,
            lon,
            lat,
            zoom,
            width,
            height,
            filters,
        } => cmd_clusters(config, &file, LonLat::new(lon, lat), zoom, [width, height], &filters),
        Command::Attribute { file } => cmd_attribute(config, &file).await,
    }
}

fn read(path: &Path) -> Result<Vec<u8>, Box<dyn Error>> {
    fs::read(path).map_err(|e| format!("read {}: {e}", path.display()).into())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn filter_state(args: &FilterArgs) -> Result<FilterState, Box<dyn Error>> {
    let mut state = FilterState::new();
    for year in &args.years {
        state.toggle_year(year);
    }
    for &month in &args.months {
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range: {month}").into());
        }
        state.toggle_month(month - 1);
    }
    state.select_timing(match args.timing {
        TimingArg::All => Timing::All,
        TimingArg::Ontime => Timing::OnTime,
        TimingArg::Late => Timing::Late,
        TimingArg::Bonus => Timing::Bonus,
    });
    Ok(state)
}

fn cmd_summary(file: &Path, args: &FilterArgs) -> Result<(), Box<dyn Error>> {
    let bytes = read(file)?;
    let collection = RecordCollection::from_json_slice(&bytes)?;
    let filter = filter_state(args)?;
    let mut engine = FilterEngine::new();
    let selection = engine.apply(&collection, &filter);
    let stats = Statistics::compute(collection.records(), GeoCounts::default());
    info!(records = collection.len(), filtered = selection.len(), "summary");

    print_json(&json!({
        "contentId": content_id(&bytes),
        "records": collection.len(),
        "filtered": selection.len(),
        "availableYears": engine.available_years(&collection),
        "filterSummary": filter.summary(),
        "statistics": stats,
    }))
}

fn cmd_timeline(
    config: &ViewerConfig,
    file: &Path,
    granularity: GranularityArg,
    args: &FilterArgs,
) -> Result<(), Box<dyn Error>> {
    let collection = RecordCollection::from_json_slice(&read(file)?)?;
    let filter = filter_state(args)?;
    let mut engine = FilterEngine::new();
    let selection = engine.apply(&collection, &filter);

    let mut player = TimelinePlayer::new(config.timeline.clone());
    player.set_granularity(match granularity {
        GranularityArg::Day => Granularity::Day,
        GranularityArg::Month => Granularity::Month,
    });
    let mut timers: TimerQueue<()> = TimerQueue::new();
    player.open(entries_for(&selection, engine.facts(&collection)), &mut timers);

    let rows: Vec<_> = (0..player.buckets().len())
        .map(|i| {
            player.seek(i);
            json!({
                "cursor": i,
                "key": player.buckets()[i].as_str(),
                "label": player.label(),
                "cumulative": player.cumulative_count(),
                "progress": player.progress_percent(),
            })
        })
        .collect();
    print_json(&rows)
}

fn cmd_clusters(
    config: ViewerConfig,
    file: &Path,
    center: LonLat,
    zoom: f64,
    viewport: [f64; 2],
    args: &FilterArgs,
) -> Result<(), Box<dyn Error>> {
    let bytes = read(file)?;
    let filter = filter_state(args)?;
    let source_id = config.cluster.source_id.clone();
    let engine = InMemoryMapEngine::new(center, zoom, viewport);
    let mut session = Session::new(
        config,
        engine,
        Box::new(InMemorySessionStore::new()),
        ContentUrlFactory::new(),
    );
    session.import(bytes, Vec::new())?;
    for year in &filter.years {
        session.toggle_year(year)?;
    }
    for &month in &filter.months {
        session.toggle_month(month)?;
    }
    session.select_timing(filter.timing)?;
    session.on_zoom_end()?;
    let pass = session.on_render(0);

    let markers: Vec<_> = session
        .reconciler()
        .engine()
        .rendered_features(&source_id)
        .iter()
        .map(|f| {
            let p = f.position();
            let count = match f {
                RenderedFeature::Cluster { count, .. } => *count,
                RenderedFeature::Point { .. } => 1,
            };
            json!({
                "id": f.marker_id(),
                "cluster": matches!(f, RenderedFeature::Cluster { .. }),
                "count": count,
                "position": [p.lon, p.lat],
            })
        })
        .collect();

    print_json(&json!({
        "displayed": session.displayed().len(),
        "radiusPx": session.reconciler().radius_px(),
        "live": pass.live,
        "markers": markers,
    }))
}

async fn cmd_attribute(config: ViewerConfig, file: &Path) -> Result<(), Box<dyn Error>> {
    let bytes = read(file)?;
    let boundaries = BoundaryCache::new(HttpBoundaryFetcher::new(), config.boundaries.clone());
    let mut session = Session::new(
        config,
        InMemoryMapEngine::default(),
        Box::new(InMemorySessionStore::new()),
        ContentUrlFactory::new(),
    );
    session.import(bytes, Vec::new())?;
    let stats = session.statistics(&boundaries).await;
    print_json(&stats)
}
