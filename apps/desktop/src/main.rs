use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    config::parse_mode_tags, load_settings, ImageRef, SwapClient, SwapView, UiState, Visibility,
};
use shared::domain::ImageFile;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "faceswap",
    about = "Swap a face between two images using a remote inference service"
)]
struct Args {
    /// Image whose face gets replaced.
    #[arg(long)]
    target: Option<PathBuf>,
    /// Image that provides the face.
    #[arg(long)]
    source: Option<PathBuf>,
    /// Anonymization ratio, 0-100.
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    anon: String,
    /// Adversarial defense ratio, 0-100.
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    adv: String,
    #[arg(long, short, default_value = "faceswap-result.png")]
    output: PathBuf,
    /// Space id (`owner/name`) or base URL of the inference service.
    #[arg(long)]
    space: Option<String>,
    /// Comma separated mode tags.
    #[arg(long)]
    mode: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_secs: Option<u64>,
}

#[derive(Default)]
struct Printed {
    status: Option<String>,
    error: Option<String>,
}

/// Renders status and error lines to stderr and writes the result image to disk.
struct TerminalView {
    output: PathBuf,
    printed: Mutex<Printed>,
}

impl TerminalView {
    fn new(output: PathBuf) -> Self {
        Self {
            output,
            printed: Mutex::new(Printed::default()),
        }
    }
}

impl SwapView for TerminalView {
    fn render(&self, state: &UiState) {
        let mut printed = self.printed.lock().unwrap_or_else(PoisonError::into_inner);
        if state.status() != printed.status.as_deref() {
            if let Some(status) = state.status() {
                eprintln!("{status}");
            }
            printed.status = state.status().map(str::to_string);
        }
        if state.error() != printed.error.as_deref() {
            if let Some(error) = state.error() {
                eprintln!("{error}");
            }
            printed.error = state.error().map(str::to_string);
        }
    }

    fn load_image(&self, image: &ImageRef) -> Result<(), String> {
        let (mime_type, bytes) = image.to_bytes().map_err(|err| err.to_string())?;
        fs::write(&self.output, &bytes)
            .map_err(|err| format!("failed to write '{}': {err}", self.output.display()))?;
        info!(
            path = %self.output.display(),
            mime_type = mime_type.as_deref().unwrap_or("unknown"),
            size_bytes = bytes.len(),
            "result image written"
        );
        Ok(())
    }
}

async fn read_image(path: Option<&Path>) -> Result<Option<ImageFile>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image '{}'", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mime_type = mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string());
    if !mime_type
        .as_deref()
        .is_some_and(|mime| mime.starts_with("image/"))
    {
        warn!(path = %path.display(), "file does not look like an image");
    }
    Ok(Some(ImageFile::new(name, mime_type, bytes)))
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut settings = load_settings();
    if let Some(space) = args.space {
        settings.space = space;
    }
    if let Some(mode) = args.mode.as_deref() {
        settings.mode_tags = parse_mode_tags(mode);
    }
    if let Some(secs) = args.timeout_secs {
        settings.request_timeout_secs = secs;
    }

    let target = read_image(args.target.as_deref()).await?;
    let source = read_image(args.source.as_deref()).await?;

    let view = Arc::new(TerminalView::new(args.output.clone()));
    let client = Arc::new(
        SwapClient::from_settings(&settings, view).context("failed to configure inference client")?,
    );

    // An interrupt is the host going away: cancel like a hidden page would.
    let interrupt = tokio::spawn({
        let client = client.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                client.on_visibility_change(Visibility::Hidden);
            }
        }
    });

    let outcome = client.submit(target, source, &args.anon, &args.adv).await;
    interrupt.abort();

    Ok(match outcome {
        Ok(_) => {
            println!("{}", args.output.display());
            ExitCode::SUCCESS
        }
        Err(err) if err.is_cancelled() => ExitCode::from(EXIT_CANCELLED),
        Err(_) => ExitCode::FAILURE,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
