//! Command-line interface for voxflow.
//!
//! Provides commands for running the pipeline, scheduling it, classifying and
//! routing ad-hoc text, and maintaining the persisted session config.

use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::assistant::{AssistantProvider, OpenAiProvider, SessionManager};
use crate::calendar::{CalendarService, HttpCalendar};
use crate::classify::Classifier;
use crate::config::{self, ModuleConfig};
use crate::db::Store;
use crate::handlers::{self, SharedStore};
use crate::ingest::OpenAiTranscriber;
use crate::pipeline::Pipeline;
use crate::prompts::PromptStore;
use crate::router::{RouteMetadata, Router};
use crate::scheduler::{Scheduler, SchedulerState};

/// Module owning the classifier assistant's config and prompts
const CLASSIFICATION_MODULE: &str = "classification";

/// voxflow - voice note ingestion pipeline
#[derive(Parser, Debug)]
#[command(name = "voxflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process the inbox once
    Run {
        /// Inbox directory (defaults to $VOXFLOW_HOME/inbox)
        #[arg(short, long)]
        inbox: Option<PathBuf>,
    },

    /// Run the pipeline on a timer
    Schedule {
        /// Pipeline passes per day
        #[arg(long, default_value = "4")]
        runs_per_day: u32,

        /// Inbox directory (defaults to $VOXFLOW_HOME/inbox)
        #[arg(short, long)]
        inbox: Option<PathBuf>,
    },

    /// Classify text without routing it
    Classify {
        /// Text to classify (reads stdin if neither --input nor --file given)
        #[arg(short, long)]
        input: Option<String>,

        /// Read the text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Use a one-shot thread instead of the persistent one
        #[arg(long)]
        new_thread: bool,

        /// Pretty-print the result
        #[arg(short, long)]
        pretty: bool,
    },

    /// Classify text and dispatch it to its category handler
    Route {
        /// Text to route (reads stdin if neither --input nor --file given)
        #[arg(short, long)]
        input: Option<String>,

        /// Read the text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Skip classification and route to this category directly
        #[arg(short, long)]
        category: Option<String>,

        /// Transcription row to correlate the result with
        #[arg(long)]
        id: Option<i64>,
    },

    /// Prune old or temporary thread sessions from a module's config
    Cleanup {
        /// Module whose sessions to prune
        #[arg(short, long, default_value = CLASSIFICATION_MODULE)]
        module: String,

        /// Retention horizon in days
        #[arg(long, default_value = "30")]
        keep_days: i64,

        /// Keep one-shot sessions instead of removing them
        #[arg(long)]
        keep_temporary: bool,
    },

    /// Show resolved paths and the last scheduler run
    Config,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { inbox } => run_pipeline(inbox).await,
            Commands::Schedule {
                runs_per_day,
                inbox,
            } => schedule(runs_per_day, inbox).await,
            Commands::Classify {
                input,
                file,
                new_thread,
                pretty,
            } => classify_text(input, file, new_thread, pretty).await,
            Commands::Route {
                input,
                file,
                category,
                id,
            } => route_text(input, file, category, id).await,
            Commands::Cleanup {
                module,
                keep_days,
                keep_temporary,
            } => cleanup(&module, keep_days, keep_temporary).await,
            Commands::Config => show_config(),
        }
    }
}

/// Resolve input text from --input, --file, or stdin
fn read_input(input: Option<String>, file: Option<PathBuf>) -> Result<String> {
    let text = match (input, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading input file {}", path.display()))?,
        (None, None) => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("reading stdin")?;
            buffer
        }
    };

    let text = text.trim().to_string();
    anyhow::ensure!(!text.is_empty(), "input text is empty");
    Ok(text)
}

fn provider() -> Result<Arc<dyn AssistantProvider>> {
    Ok(Arc::new(OpenAiProvider::from_env()?))
}

fn open_store() -> Result<SharedStore> {
    Ok(Arc::new(Mutex::new(Store::open(&config::db_path()?)?)))
}

fn calendar_from_env() -> Option<Arc<dyn CalendarService>> {
    let endpoint = std::env::var("VOXFLOW_CALENDAR_URL").ok()?;
    let token = std::env::var("VOXFLOW_CALENDAR_TOKEN").ok();
    Some(Arc::new(HttpCalendar::new(endpoint, token)))
}

fn build_classifier(provider: Arc<dyn AssistantProvider>) -> Result<Classifier> {
    let module_config = ModuleConfig::open_module(CLASSIFICATION_MODULE)?;
    let prompts =
        PromptStore::from_file(&config::module_prompts_path(CLASSIFICATION_MODULE)?)?;
    Ok(Classifier::new(provider, module_config, prompts)?)
}

fn build_router(provider: Arc<dyn AssistantProvider>, store: SharedStore) -> Result<Router> {
    let table = handlers::build_route_table(provider, store, calendar_from_env())?;
    Ok(Router::new(table))
}

fn build_pipeline(inbox: Option<PathBuf>) -> Result<Pipeline> {
    let provider = provider()?;
    let store = open_store()?;
    let inbox_dir = match inbox {
        Some(dir) => dir,
        None => config::inbox_dir()?,
    };

    Ok(Pipeline::new(
        inbox_dir,
        Arc::new(OpenAiTranscriber::from_env()?),
        build_classifier(provider.clone())?,
        build_router(provider, store.clone())?,
        store,
    ))
}

async fn run_pipeline(inbox: Option<PathBuf>) -> Result<()> {
    let mut pipeline = build_pipeline(inbox)?;
    let report = pipeline.run_once().await?;

    println!("Processed {}/{} inbox items", report.processed, report.total);
    for (file, error) in &report.failures {
        eprintln!("  {}: {}", file, error);
    }

    anyhow::ensure!(report.all_ok(), "{} item(s) failed", report.failures.len());
    Ok(())
}

async fn schedule(runs_per_day: u32, inbox: Option<PathBuf>) -> Result<()> {
    let pipeline = build_pipeline(inbox)?;
    let scheduler = Scheduler::new(pipeline, config::state_file_path()?, runs_per_day);
    scheduler.run().await
}

async fn classify_text(
    input: Option<String>,
    file: Option<PathBuf>,
    new_thread: bool,
    pretty: bool,
) -> Result<()> {
    let text = read_input(input, file)?;
    let mut classifier = build_classifier(provider()?)?;

    let record = classifier.classify(&text, new_thread).await?;

    let output = serde_json::json!({
        "category": record.category,
        "text": record.text,
        "raw": record.raw,
    });
    if pretty {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", output);
    }
    Ok(())
}

async fn route_text(
    input: Option<String>,
    file: Option<PathBuf>,
    category: Option<String>,
    id: Option<i64>,
) -> Result<()> {
    let text = read_input(input, file)?;
    let provider = provider()?;
    let store = open_store()?;
    let router = build_router(provider.clone(), store)?;

    let (category, text) = match category {
        Some(category) => (category, text),
        None => {
            let mut classifier = build_classifier(provider)?;
            let record = classifier.classify(&text, false).await?;
            let category = record
                .category
                .ok_or_else(|| anyhow::anyhow!("classifier produced no category"))?;
            (category, record.text)
        }
    };

    let metadata = RouteMetadata {
        db_id: id,
        source_file: None,
    };
    let outcome = router.route(&category, &text, &metadata).await;

    anyhow::ensure!(outcome.is_success(), "routing failed: {:?}", outcome);
    println!("Routed '{}' successfully", category);
    Ok(())
}

async fn cleanup(module: &str, keep_days: i64, keep_temporary: bool) -> Result<()> {
    let module_config = ModuleConfig::open_module(module)?;
    let mut session = SessionManager::from_config(provider()?, module_config)?;

    let removed = session.cleanup_thread_config(keep_days, !keep_temporary);
    if removed {
        println!("Removed stale thread sessions from '{}'", module);
    } else {
        println!("Nothing to remove for '{}'", module);
    }
    Ok(())
}

fn show_config() -> Result<()> {
    println!("home:    {}", config::voxflow_home()?.display());
    println!("inbox:   {}", config::inbox_dir()?.display());
    println!("modules: {}", config::modules_dir()?.display());
    println!("db:      {}", config::db_path()?.display());

    let state_path = config::state_file_path()?;
    let state = SchedulerState::load(&state_path)?;
    match state.last_run_status {
        Some(status) => {
            println!(
                "last run: {} ({})",
                state.last_run_time.unwrap_or_default(),
                status
            );
            if let Some(message) = state.error_message {
                println!("  {}", message);
            }
        }
        None => println!("last run: never"),
    }
    Ok(())
}
