//! blobup command-line uploader.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Uploads a file to S3-compatible storage through a multipart signing
/// endpoint.
#[derive(Debug, Parser)]
#[command(name = "blobup", version, about)]
pub struct Cli {
    /// File to upload.
    #[arg(required_unless_present = "init_config")]
    pub file: Option<PathBuf>,

    /// Signing endpoint URL.
    #[arg(short, long)]
    pub server: Option<String>,

    /// Send endpoint parameters as a form body.
    #[arg(long)]
    pub post: bool,

    /// Configuration file (TOML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Part size in bytes.
    #[arg(long)]
    pub part_size: Option<u64>,

    /// Parts uploaded at once.
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Attempts per part before the upload fails.
    #[arg(long)]
    pub max_tries: Option<u32>,

    /// Send the SHA-256 of each part when signing.
    #[arg(long)]
    pub hash: bool,

    /// Content type to send instead of the one guessed from the extension.
    #[arg(long)]
    pub content_type: Option<String>,

    /// Print events as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    pub init_config: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "info,blobup=debug"
    } else {
        "warn,blobup=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting blobup");

    let path = cli.config.clone().unwrap_or_else(config::default_path);
    let mut config = config::Config::load_or_default(&path)?;
    config.apply_cli(&cli);

    if cli.init_config {
        config.save(&path)?;
        println!("{}", path.display());
        return Ok(());
    }

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(app::run(config, &cli))?;

    tracing::info!(
        parts = outcome.parts,
        retries = outcome.transient_failures,
        "upload finished"
    );
    Ok(())
}
