//! `stylize` CLI - apply the style of one image to the content of another.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stylize::image::{load_image, save_image};
use stylize::model::{DEFAULT_MODEL_DIR, DEFAULT_MODEL_URL};
use stylize::{Config, StyleTransferService};

/// Render a content image in the visual style of another image.
#[derive(Parser, Debug)]
#[command(name = "stylize")]
#[command(version, about, long_about = None)]
struct Args {
    /// Image supplying the structure to keep.
    #[arg(value_name = "CONTENT")]
    content: PathBuf,

    /// Image supplying the texture to transfer.
    #[arg(value_name = "STYLE")]
    style: PathBuf,

    /// Output image path.
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Longer side of the images fed to the model, in pixels.
    #[arg(long, default_value = "512", value_name = "INT")]
    max_dim: u32,

    /// Directory the model is unpacked into.
    #[arg(long, default_value = DEFAULT_MODEL_DIR, value_name = "DIR")]
    model_dir: PathBuf,

    /// URL of the compressed (tar.gz) model archive.
    ///
    /// The archive must contain an ONNX export (`model.onnx` or any `*.onnx`).
    /// The default location serves a TensorFlow SavedModel, which cannot be
    /// loaded; pass the URL of an ONNX archive here.
    #[arg(long, default_value = DEFAULT_MODEL_URL, value_name = "URL")]
    model_url: String,

    /// Output JPEG quality (1-100).
    #[arg(short, long, default_value = "95", value_name = "INT")]
    quality: u8,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("stylize={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    if !(1..=100).contains(&args.quality) {
        anyhow::bail!("Quality must be between 1 and 100, got {}", args.quality);
    }

    let config = Config {
        model_url: args.model_url.clone(),
        model_dir: args.model_dir.clone(),
        max_dim: args.max_dim,
        ..Config::default()
    };

    let service = StyleTransferService::new(config).context("Failed to initialize style transfer")?;

    let content = load_image(&args.content).context("Failed to read content image")?;
    let style = load_image(&args.style).context("Failed to read style image")?;

    let stylized = service
        .stylize(&content, &style)
        .context("Failed to apply style transfer")?;

    save_image(&stylized, &args.output, args.quality)
        .context("Failed to save stylized image")?;

    println!(
        "Successfully stylized {} with {} -> {}",
        args.content.display(),
        args.style.display(),
        args.output.display()
    );

    Ok(())
}
