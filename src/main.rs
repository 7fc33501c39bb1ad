use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use rotatelog::{DaemonConfig, LogConfig, Reporter, RotationPolicy, init_logging, shutdown_logging};

#[derive(Parser)]
#[command(name = "rotatelog")]
#[command(about = "Rotate, compress and expire log files written by other processes")]
#[command(version)]
#[command(group(ArgGroup::new("source").required(true).args(["config", "path"])))]
struct Cli {
    /// Increase diagnostic verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON or TOML file mapping log paths to rotation policies
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Manage a single log file
    #[arg(short, long, requires = "size")]
    path: Option<PathBuf>,

    /// Rotate the file once it grows beyond this many bytes
    #[arg(short, long)]
    size: Option<u64>,

    /// Number of rotated copies to keep
    #[arg(short = 'm', long, default_value_t = 5)]
    max_files: u64,

    /// Number of newest copies left uncompressed, -1 disables compression
    #[arg(short = 'z', long, default_value_t = 0, allow_negative_numbers = true)]
    compress: i64,

    /// Diagnostic output format: text or json
    #[arg(long, default_value = "text")]
    format: String,
}

impl Cli {
    fn daemon_config(&self) -> Result<DaemonConfig> {
        if let Some(config) = &self.config {
            return DaemonConfig::from_path(config)
                .with_context(|| format!("Failed to load config {}", config.display()));
        }

        let (Some(path), Some(size)) = (&self.path, self.size) else {
            anyhow::bail!("either --config or --path with --size is required");
        };
        let policy = RotationPolicy::size(size, self.max_files);
        let policy = match u64::try_from(self.compress) {
            Ok(uncompressed) => policy.with_compress_after(uncompressed),
            Err(_) => policy.without_compression(),
        };
        Ok(DaemonConfig::single(path, policy))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::new()
        .with_console(true)
        .with_format(cli.format.as_str());
    init_logging(&log_config, Some(cli.verbose)).context("Failed to initialize logging")?;

    let config = cli.daemon_config()?;
    let guards = config
        .start(&Reporter::default())
        .context("Failed to start rotation")?;
    tracing::info!(files = guards.len(), "rotatelog started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c signal")?;

    tracing::info!("shutting down");
    for guard in guards {
        guard.stop();
    }
    shutdown_logging();

    Ok(())
}
