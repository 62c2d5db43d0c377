use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{ClientEvent, RegistryClient};
use ledger_integration::{SimulatedLedger, SimulatedWallet, WalletProvider};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::Command;
use config::load_settings;

#[derive(Parser, Debug)]
#[command(about = "Interactive shell for the asset registry")]
struct Args {
    /// TOML settings file; defaults to ./registry.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Registry endpoint address, overriding the settings file.
    #[arg(long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(endpoint) = args.endpoint {
        settings.endpoint_address = endpoint;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = settings.client_config()?;
    let ledger = SimulatedLedger::new(config.endpoint_address.clone());
    let wallet = Arc::new(SimulatedWallet::new(settings.wallet_identities()?));
    info!(endpoint = %config.endpoint_address, "using simulated ledger");

    let client = RegistryClient::new_with_dependencies(
        config,
        Arc::clone(&wallet) as Arc<dyn WalletProvider>,
        Arc::new(ledger),
    );
    spawn_event_printer(&client);

    println!("{}", commands::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }

        let output = commands::dispatch(&client, &wallet, command).await;
        if !output.is_empty() {
            println!("{output}");
        }
    }

    Ok(())
}

fn spawn_event_printer(client: &Arc<RegistryClient>) {
    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ClientEvent::SessionChanged(Some(address))) => {
                    println!("* active account is now {address}");
                }
                Ok(ClientEvent::SessionChanged(None)) => println!("* wallet disconnected"),
                Ok(ClientEvent::BindingInvalidated) => {
                    println!("* registry binding dropped; catalog may be stale");
                }
                Ok(ClientEvent::CatalogUpdated { .. } | ClientEvent::OutcomeReported(_)) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
