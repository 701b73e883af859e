use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use doodle_contracts::{GalleryStore, SoundResolver};
use doodle_engine::{EngineConfig, GenerationPipeline, PipelineError};
use tracing_subscriber::EnvFilter;

mod dotenv;
mod server;

#[derive(Debug, Parser)]
#[command(name = "doodle-rs", version, about = "Doodle to 3D render server")]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the gallery API.
    Serve(ServeArgs),
    /// Run one generation for an image file and print the record.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long)]
    vision_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    /// Append generation events to this JSONL file.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:5000")]
    bind: String,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    image: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("doodle-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let applied = dotenv::load_dotenv(Path::new(".env"));
    init_tracing(cli.log_level.as_deref());
    if !applied.is_empty() {
        tracing::debug!("loaded from .env: {}", applied.join(", "));
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    match cli.command {
        Command::Serve(args) => {
            runtime.block_on(run_serve(args))?;
            Ok(0)
        }
        Command::Run(args) => runtime.block_on(run_once(args)),
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn build_pipeline(args: EngineArgs) -> Result<GenerationPipeline> {
    let mut config = EngineConfig::from_env()?;
    if args.vision_model.is_some() {
        config.vision_model = args.vision_model;
    }
    if args.image_model.is_some() {
        config.image_model = args.image_model;
    }
    config.events_path = args.events;
    config.build_pipeline(Arc::new(GalleryStore::new()))
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let pipeline = build_pipeline(args.engine)?;
    let state = server::AppState::new(pipeline, SoundResolver::builtin());
    server::serve(&args.bind, state).await
}

async fn run_once(args: RunArgs) -> Result<i32> {
    let bytes = fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let image_data = format!(
        "data:{};base64,{}",
        mime_for_path(&args.image),
        BASE64.encode(bytes)
    );
    let pipeline = build_pipeline(args.engine)?;
    match pipeline.run(&image_data).await {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
        Err(PipelineError::Rejected(err)) => {
            eprintln!("{err}");
            Ok(2)
        }
        Err(err) => Err(err.into()),
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}
