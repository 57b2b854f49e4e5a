use arxiv_assistant::{Assistant, AssistantConfig, CycleOutcome};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Mail a daily digest of new arXiv papers matching your interests.
#[derive(Parser, Debug)]
#[command(name = "arxiv-assistant", version)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Persist processed dates to this file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Mail every fetched paper without asking the model
    #[arg(long)]
    no_filter: bool,

    /// Log JSON lines instead of text
    #[arg(long)]
    log_json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut config = AssistantConfig::from_file(&args.config).map_err(|e| {
        error!("Failed to load {}: {}", args.config.display(), e);
        e
    })?;
    config.apply_env();
    if args.state_file.is_some() {
        config.state_file = args.state_file;
    }
    if args.no_filter {
        config.gpt_filter = false;
    }
    config.validate()?;

    info!("Starting Arxiv Assistant for {:?}", config.categories);
    let mut assistant = Assistant::from_config(&config)?;

    if args.once {
        let outcome = assistant.run_cycle().await;
        info!("Single cycle finished: {:?}", outcome);
        if outcome == CycleOutcome::FetchFailed {
            return Err("fetching papers failed".into());
        }
        return Ok(());
    }

    assistant.run_forever().await;
    Ok(())
}
