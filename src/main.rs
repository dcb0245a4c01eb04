//! LabelScan - command line front end
//!
//! Runs the ingredient matcher and the scan session coordinator against
//! recorded OCR output, and inspects the saved scan history.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{bounded, select, Receiver};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use label_scan::catalog::{self, CatalogHandle, ReferenceIngredient, ScanMode};
use label_scan::config::{self, AppConfig};
use label_scan::session::{ScanPipeline, SessionCoordinator, TokioScheduler};
use label_scan::storage::{self, SqliteHistory};
use label_scan::{FrameThrottle, IngredientMatcher, RecognitionBatch, SessionSignal};

/// LabelScan - hazardous ingredient detection for noisy label text
#[derive(Parser, Debug)]
#[command(name = "label-scan")]
#[command(about = "Match OCR text against a hazardous ingredient catalog")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match lines of text against the catalog once
    Match {
        #[arg(long)]
        catalog: Option<PathBuf>,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Recognized text lines
        #[arg(required = true)]
        lines: Vec<String>,
    },
    /// Feed a recorded frame transcript through the live session pipeline
    Replay {
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// JSON-lines transcript: {"lines": [...], "delay_ms": n, "latency_ms": n}
        #[arg(long)]
        frames: PathBuf,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Answer to the result popup for hazardous sessions
        #[arg(long, value_enum, default_value = "save")]
        on_hazard: Decision,
        /// Forward one of every N frames (overrides configuration)
        #[arg(long)]
        stride: Option<u32>,
    },
    /// List saved scans, newest first
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Only scans taken in this mode
        #[arg(long, value_enum)]
        category: Option<ModeArg>,
        /// Match product or ingredient names, including localized names
        #[arg(long)]
        query: Option<String>,
        /// Catalog providing localized names for --query
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Search the catalog by name or description
    Search {
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Locale used for display names, e.g. "el"
        #[arg(long, default_value = "en")]
        locale: String,
        /// Functional category, e.g. "Preservative" ("All" for every entry)
        #[arg(long)]
        category: Option<String>,
        /// Print the functional categories instead of searching
        #[arg(long)]
        list_categories: bool,
        #[arg(default_value = "")]
        query: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Food,
    Cosmetics,
}

impl From<ModeArg> for ScanMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Food => ScanMode::Food,
            ModeArg::Cosmetics => ScanMode::Cosmetics,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Decision {
    Save,
    Discard,
}

/// One captured frame in a replay transcript
#[derive(Debug, Deserialize)]
struct TranscriptFrame {
    #[serde(default)]
    lines: Vec<String>,
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    latency_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_or_create_config(args.config.as_deref());

    match args.command {
        Command::Match {
            catalog,
            mode,
            lines,
        } => run_match(&config, catalog, mode, &lines),
        Command::Replay {
            catalog,
            frames,
            mode,
            on_hazard,
            stride,
        } => run_replay(&config, catalog, &frames, mode, on_hazard, stride).await,
        Command::History {
            limit,
            category,
            query,
            catalog,
        } => run_history(&config, limit, category, query.as_deref(), catalog),
        Command::Search {
            catalog,
            locale,
            category,
            list_categories,
            query,
        } => {
            if list_categories {
                run_list_categories(&config, catalog)
            } else {
                run_search(&config, catalog, &locale, category.as_deref(), &query)
            }
        }
    }
}

/// Load configuration from file or fall back to defaults
fn load_or_create_config(explicit: Option<&Path>) -> AppConfig {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => storage::get_config_dir()
            .ok()
            .map(|dir| dir.join("config.toml")),
    };

    if let Some(path) = path {
        if path.exists() {
            match config::load_config(&path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    return config;
                }
                Err(e) => warn!("Ignoring unreadable configuration {:?}: {}", path, e),
            }
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

/// Load the catalog; a missing or broken file yields an empty catalog
fn load_catalog_or_empty(
    config: &AppConfig,
    explicit: Option<PathBuf>,
) -> Vec<ReferenceIngredient> {
    let Some(path) = explicit.or_else(|| config.storage.catalog_path.clone()) else {
        warn!("No catalog configured; nothing will match");
        return Vec::new();
    };
    match catalog::load_catalog(&path) {
        Ok(ingredients) => ingredients,
        Err(e) => {
            warn!("Could not load catalog {:?}: {}", path, e);
            Vec::new()
        }
    }
}

fn open_history(config: &AppConfig) -> Result<SqliteHistory> {
    let path = match &config.storage.history_db {
        Some(path) => path.clone(),
        None => storage::get_data_dir()?.join("history.sqlite3"),
    };
    SqliteHistory::open(&path).with_context(|| format!("opening history at {:?}", path))
}

fn run_match(
    config: &AppConfig,
    catalog_path: Option<PathBuf>,
    mode: Option<ModeArg>,
    lines: &[String],
) -> Result<()> {
    let ingredients = load_catalog_or_empty(config, catalog_path);
    let mode = mode.map(ScanMode::from).unwrap_or(config.session.default_mode);
    let candidates = catalog::filter_for_mode(&ingredients, mode);

    let matches = IngredientMatcher::new(config.matching).match_lines(lines, &candidates);
    if matches.is_empty() {
        println!("No {} ingredients matched", mode);
        return Ok(());
    }
    for ingredient in &matches {
        println!("[{}] {}", ingredient.hazard_level, ingredient.name);
    }
    Ok(())
}

async fn run_replay(
    config: &AppConfig,
    catalog_path: Option<PathBuf>,
    frames_path: &Path,
    mode: Option<ModeArg>,
    on_hazard: Decision,
    stride: Option<u32>,
) -> Result<()> {
    let frames = read_transcript(frames_path)?;
    let catalog = CatalogHandle::new(load_catalog_or_empty(config, catalog_path));
    let history = Arc::new(open_history(config)?);

    let (coordinator, signals) = SessionCoordinator::new(
        catalog,
        history,
        Arc::new(TokioScheduler::current()),
        config.session,
        config.matching,
    );
    if let Some(mode) = mode {
        coordinator.on_mode_change(mode.into());
    }

    let (stop_tx, stop_rx) = bounded::<()>(1);
    let listener = {
        let coordinator = coordinator.clone();
        std::thread::spawn(move || {
            listen(signals, stop_rx, |signal| {
                report(&coordinator, signal, on_hazard)
            })
        })
    };

    let pipeline = ScanPipeline::spawn(coordinator);
    let mut throttle = FrameThrottle::new(stride.unwrap_or(config.capture.frame_stride));

    info!("Replaying {} frames from {:?}", frames.len(), frames_path);
    for frame in frames {
        tokio::time::sleep(Duration::from_millis(frame.delay_ms)).await;
        if throttle.admit() {
            pipeline.publish(RecognitionBatch::new(
                frame.lines,
                Duration::from_millis(frame.latency_ms),
            ));
        }
    }

    // Let the last session run through its gap check and banner
    let settle =
        config.session.strong_gap() + config.session.clean_banner() + Duration::from_millis(100);
    tokio::time::sleep(settle).await;

    let processed = pipeline.shutdown().await;
    let _ = stop_tx.send(());
    if listener.join().is_err() {
        warn!("Signal listener panicked");
    }
    println!("Processed {} batches", processed);
    Ok(())
}

/// Hand session signals to `handle` until told to stop
///
/// Signals still queued when the stop request arrives are handled first.
fn listen<F>(signals: Receiver<SessionSignal>, stop: Receiver<()>, mut handle: F)
where
    F: FnMut(SessionSignal),
{
    loop {
        select! {
            recv(signals) -> signal => {
                let Ok(signal) = signal else { return };
                handle(signal);
            }
            recv(stop) -> _ => {
                signals.try_iter().for_each(&mut handle);
                return;
            }
        }
    }
}

/// Print a session signal and answer result popups

fn report(coordinator: &SessionCoordinator, signal: SessionSignal, on_hazard: Decision) {
    match signal {
        SessionSignal::SessionStarted { session_id, mode } => {
            println!("-- session {} started ({})", session_id, mode);
        }
        SessionSignal::IngredientsDiscovered { ingredients, .. } => {
            for ingredient in ingredients {
                println!("   + [{}] {}", ingredient.hazard_level, ingredient.name);
            }
        }
        SessionSignal::CompletionBannerShown { ingredients } => {
            println!("   scan complete: {} safe ingredients", ingredients.len());
        }
        SessionSignal::ResultPopupShown { ingredients } => {
            let flagged = ingredients
                .iter()
                .filter(|i| i.hazard_level.is_harmful())
                .count();
            println!(
                "   hazardous result: {} of {} ingredients flagged",
                flagged,
                ingredients.len()
            );
            match on_hazard {
                Decision::Save => {
                    if let Err(e) = coordinator.on_save() {
                        warn!("Save failed: {}", e);
                        coordinator.on_discard();
                    }
                }
                Decision::Discard => {
                    coordinator.on_discard();
                }
            }
        }
        SessionSignal::RecordSaved(record) => {
            println!(
                "   saved \"{}\" with {} ingredients",
                record.product_name,
                record.matched_ingredients.len()
            );
        }
        SessionSignal::SessionCleared { reason } => {
            println!("-- session cleared ({:?})", reason);
        }
        SessionSignal::MatchesUpdated { .. }
        | SessionSignal::CompletionBannerHidden
        | SessionSignal::ResultPopupHidden => {}
    }
}

fn read_transcript(path: &Path) -> Result<Vec<TranscriptFrame>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {:?}", path))?;
    let mut frames = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: TranscriptFrame = serde_json::from_str(&line)
            .with_context(|| format!("{:?} line {}", path, number + 1))?;
        frames.push(frame);
    }
    Ok(frames)
}

fn run_history(
    config: &AppConfig,
    limit: usize,
    category: Option<ModeArg>,
    query: Option<&str>,
    catalog_path: Option<PathBuf>,
) -> Result<()> {
    let history = open_history(config)?;
    let catalog = match query {
        Some(_) => load_catalog_or_empty(config, catalog_path),
        None => Vec::new(),
    };
    let records =
        history.recent_filtered(limit, category.map(ScanMode::from), query, &catalog)?;
    if records.is_empty() {
        println!("No saved scans");
        return Ok(());
    }
    for record in records {
        println!(
            "{} {} [{}] {}: {}",
            record.timestamp_ms,
            record.category,
            if record.is_clean { "clean" } else { "flagged" },
            record.product_name,
            record.matched_ingredients.join(", ")
        );
    }
    Ok(())
}

fn run_search(
    config: &AppConfig,
    catalog_path: Option<PathBuf>,
    locale: &str,
    category: Option<&str>,
    query: &str,
) -> Result<()> {
    let ingredients = load_catalog_or_empty(config, catalog_path);
    let hits = catalog::search(&ingredients, query, category);
    if hits.is_empty() {
        println!("No ingredients found");
    }
    for ingredient in hits {
        println!(
            "[{}] {} - {}",
            ingredient.hazard_level,
            ingredient.display_name(locale),
            ingredient.display_description(locale)
        );
    }
    Ok(())
}

fn run_list_categories(config: &AppConfig, catalog_path: Option<PathBuf>) -> Result<()> {
    let ingredients = load_catalog_or_empty(config, catalog_path);
    println!("{}", catalog::ALL_CATEGORIES);
    for category in catalog::functional_categories(&ingredients) {
        println!("{}", category);
    }
    Ok(())
}
