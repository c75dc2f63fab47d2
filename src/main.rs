use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mentor_voice::{Config, Daemon};

/// Mentor - hands-free voice assistant
#[derive(Parser)]
#[command(name = "mentor", version, about)]
struct Cli {
    /// Remote answer service base URL
    #[arg(long, env = "MENTOR_API_URL")]
    api_url: Option<String>,

    /// User id sent to the answer service
    #[arg(long, env = "MENTOR_USER_ID")]
    user_id: Option<String>,

    /// Wake word model file
    #[arg(long, env = "WAKE_WORD_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Directory for captured and synthesized audio
    #[arg(long, env = "MENTOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,mentor_voice=info",
        1 => "info,mentor_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;

    if let Some(url) = cli.api_url {
        config.remote.api_url = url;
    }
    if let Some(user_id) = cli.user_id {
        config.remote.user_id = user_id;
    }
    if let Some(model) = cli.model {
        config.wake_word.model_path = Some(model);
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting mentor");

    Daemon::new(config).run().await?;

    tracing::info!("mentor stopped");
    Ok(())
}
