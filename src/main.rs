use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blendr::cli::{load_config, Cli, Commands, ServeOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blendr=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.model_dir)?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            ranker,
            fuser,
            load_timeout_secs,
            max_waiting,
        } => {
            let options = ServeOptions {
                port,
                host,
                ranker,
                fuser,
                load_timeout_secs,
                max_waiting,
            };
            blendr::cli::serve(config, options).await?;
        }
        Commands::List { verbose } => {
            blendr::cli::list(config, verbose).await?;
        }
        Commands::Check { ranker, fuser } => {
            blendr::cli::check(config, ranker, fuser).await?;
        }
        Commands::Pull { repo, file } => {
            blendr::cli::pull(config, repo, file).await?;
        }
    }

    Ok(())
}
