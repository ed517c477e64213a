use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tryon_contracts::api::{
    EditRequest, FaceSwapRequest, GarmentFit, GarmentRegion, OperationResult, TryOnOptions,
    TryOnRequest, VideoRequest,
};
use tryon_contracts::history::{history_path, EditHistory};
use tryon_engine::{Studio, StudioConfig};

mod server;

#[derive(Debug, Parser)]
#[command(name = "tryon", version, about = "Virtual try-on studio")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    TryOn(TryOnArgs),
    FaceSwap(FaceSwapArgs),
    Edit(EditArgs),
    Video(VideoArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    /// Defaults to 0.0.0.0:$PORT (PORT defaults to 3000).
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Debug, Parser)]
struct TryOnArgs {
    #[arg(long)]
    model_image: PathBuf,
    #[arg(long)]
    clothing_image: PathBuf,
    #[arg(long)]
    instructions: Option<String>,
    #[arg(long, default_value = "upper", value_parser = parse_region)]
    region: GarmentRegion,
    #[arg(long, default_value = "normal", value_parser = parse_fit)]
    fit: GarmentFit,
    #[arg(long, default_value_t = 1)]
    passes: u32,
    #[arg(long)]
    no_refine: bool,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct FaceSwapArgs {
    #[arg(long)]
    source: PathBuf,
    #[arg(long)]
    target: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    base: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    strength: Option<f32>,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct VideoArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    out: PathBuf,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("tryon error: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = StudioConfig::from_env();
    let studio = Arc::new(Studio::from_config(config));
    match cli.command {
        Command::Serve(args) => {
            serve(studio, args).await?;
            Ok(0)
        }
        Command::TryOn(args) => {
            let request = TryOnRequest {
                model_image: Some(read_image(&args.model_image)?),
                clothing_image: Some(read_image(&args.clothing_image)?),
                instructions: args.instructions,
                options: TryOnOptions {
                    region: args.region,
                    fit: args.fit,
                },
                refine: Some(!args.no_refine),
                refinement_passes: Some(args.passes),
            };
            finish_one_shot(&args.out, studio.try_on(&request).await)
        }
        Command::FaceSwap(args) => {
            let request = FaceSwapRequest {
                source_image: Some(read_image(&args.source)?),
                target_image: Some(read_image(&args.target)?),
            };
            finish_one_shot(&args.out, studio.face_swap(&request).await)
        }
        Command::Edit(args) => {
            let request = EditRequest {
                base_image: Some(read_image(&args.base)?),
                prompt: Some(args.prompt),
                strength: args.strength,
            };
            finish_one_shot(&args.out, studio.edit(&request).await)
        }
        Command::Video(args) => {
            let request = VideoRequest {
                image: Some(read_image(&args.image)?),
                prompt: args.prompt,
            };
            finish_one_shot(&args.out, studio.generate_video(&request).await)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(studio: Arc<Studio>, args: ServeArgs) -> Result<()> {
    let bind = args.bind.unwrap_or_else(default_bind);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(bind = %bind, production = studio.config().production, "listening");
    axum::serve(listener, server::router(studio))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")
}

fn default_bind() -> String {
    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(3000);
    format!("0.0.0.0:{port}")
}

fn read_image(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(BASE64.encode(bytes))
}

fn parse_region(raw: &str) -> Result<GarmentRegion, String> {
    serde_json::from_value(Value::String(raw.trim().to_ascii_lowercase()))
        .map_err(|_| format!("unknown region '{raw}' (expected upper, lower or dress)"))
}

fn parse_fit(raw: &str) -> Result<GarmentFit, String> {
    serde_json::from_value(Value::String(raw.trim().to_ascii_lowercase()))
        .map_err(|_| format!("unknown fit '{raw}' (expected normal, slim or oversize)"))
}

fn finish_one_shot(
    out_dir: &Path,
    result: tryon_engine::StudioResult<OperationResult>,
) -> Result<i32> {
    let result = match result {
        Ok(result) => result,
        Err(err) => {
            eprintln!("{}", err.user_message().text());
            return Err(err.into());
        }
    };
    let summary = save_result(out_dir, &result)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(0)
}

/// Writes the artifact next to `history.json` and appends the entry.
fn save_result(out_dir: &Path, result: &OperationResult) -> Result<Value> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let entry = &result.entry;
    let artifact_path = if entry.artifact.is_inline() {
        let bytes = BASE64
            .decode(entry.artifact.payload.as_bytes())
            .context("artifact payload is not valid base64")?;
        let path = out_dir.join(format!(
            "{}.{}",
            entry.id,
            entry.artifact.media_type.extension()
        ));
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        Some(path)
    } else {
        None
    };

    let history_file = history_path(out_dir);
    let mut history = EditHistory::load(&history_file);
    let index = history.push(entry.clone());
    history.save(&history_file)?;

    Ok(json!({
        "entry_id": entry.id,
        "history_index": index,
        "artifact": artifact_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| entry.artifact.payload.clone()),
        "media_type": entry.artifact.media_type,
        "duration_ms": entry.duration_ms,
        "refinement": result.refinement,
        "strategy": result.strategy,
        "model_text": result.model_text,
    }))
}
