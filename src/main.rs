use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keysplit::cli::{Cli, Commands};
use keysplit::clock::SystemClock;
use keysplit::commands::{list_operators, resume, select, status, sync};
use keysplit::config::{AppConfig, EXPIRATION_CHECK_INTERVAL};
use keysplit::directory::{DirectoryClient, OperatorCache};
use keysplit::selection::OperatorFilter;
use keysplit::session::Session;

fn init_tracing(log_level: &str) {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("keysplit={log_level},warn").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = AppConfig::load(&cli.config)?;
    let network = config.network(cli.network)?.clone();
    debug!(network = %cli.network, owner = %network.owner_address, "Configuration loaded");

    let client = DirectoryClient::from_config(&config).context("Failed to set up directory client")?;
    let cache = OperatorCache::new(client.clone(), Arc::new(SystemClock));
    let mut session = Session::new(cache, client, network, config.preferred_provider.clone());
    session.start_guard(EXPIRATION_CHECK_INTERVAL);

    let output = match cli.command {
        Commands::Sync => sync(&mut session, &cli.state_dir).await?,
        Commands::Operators {
            search,
            verified,
            dkg,
        } => {
            resume(&mut session, &cli.state_dir)?;
            let filter = OperatorFilter {
                search,
                verified_only: verified,
                dkg_only: dkg,
            };
            list_operators(&mut session, &filter)?
        }
        Commands::Select {
            size,
            keys,
            operators,
        } => {
            resume(&mut session, &cli.state_dir)?;
            select(&mut session, &cli.state_dir, size, keys, &operators)?
        }
        Commands::Status => {
            resume(&mut session, &cli.state_dir)?;
            status(&session)
        }
    };

    println!("{output}");
    Ok(())
}
