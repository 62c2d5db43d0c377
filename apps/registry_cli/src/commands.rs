//! Shell commands typed by the user and their dispatch onto the registry client.

use std::fmt::Write as _;

use client_core::{RegistryHandle, Severity, StatusMessage};
use ledger_integration::SimulatedWallet;
use shared::domain::{Address, AssetId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Bind,
    Register { name: String, content_hash: String },
    Transfer { id: AssetId, new_owner: String },
    Verify { id: AssetId, content_hash: String },
    Refresh,
    List,
    Switch { identities: Vec<Address> },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command '{0}'; type 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("'{0}' is not a valid asset id")]
    AssetId(String),
    #[error("'{0}' is not a valid address")]
    Address(String),
}

pub const HELP: &str = "\
commands:
  connect                      connect the wallet
  bind                         bind the registry and load the catalog
  register <name> <hash>       register an asset (name may be quoted)
  transfer <id> <address>      transfer ownership of an asset
  verify <id> <hash>           check an asset's content hash
  refresh                      reload the catalog
  list                         print the cached catalog
  switch [address...]          simulate a wallet account change
  status                       print session and transaction state
  quit";

pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let words = split_words(line);
    let Some((head, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (head.to_ascii_lowercase().as_str(), args) {
        ("connect", []) => Command::Connect,
        ("bind", []) => Command::Bind,
        ("register", [name, content_hash]) => Command::Register {
            name: name.clone(),
            content_hash: content_hash.clone(),
        },
        ("register", _) => return Err(ParseError::Usage("register <name> <hash>")),
        ("transfer", [id, new_owner]) => Command::Transfer {
            id: parse_id(id)?,
            new_owner: new_owner.clone(),
        },
        ("transfer", _) => return Err(ParseError::Usage("transfer <id> <address>")),
        ("verify", [id, content_hash]) => Command::Verify {
            id: parse_id(id)?,
            content_hash: content_hash.clone(),
        },
        ("verify", _) => return Err(ParseError::Usage("verify <id> <hash>")),
        ("refresh", []) => Command::Refresh,
        ("list" | "ls", []) => Command::List,
        ("switch", identities) => Command::Switch {
            identities: identities
                .iter()
                .map(|raw| Address::parse(raw).map_err(|_| ParseError::Address(raw.clone())))
                .collect::<Result<_, _>>()?,
        },
        ("status", []) => Command::Status,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        (other, _) => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_id(raw: &str) -> Result<AssetId, ParseError> {
    raw.trim_start_matches('#')
        .parse::<u64>()
        .map(AssetId)
        .map_err(|_| ParseError::AssetId(raw.to_string()))
}

/// Whitespace split that keeps double-quoted segments together.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in line.trim().chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

pub fn render_status(status: &StatusMessage) -> String {
    match status.severity {
        Severity::Success => format!("ok: {}", status.text),
        Severity::Error => format!("error: {}", status.text),
    }
}

/// Runs one command and returns the text to print.
pub async fn dispatch(
    handle: &dyn RegistryHandle,
    wallet: &SimulatedWallet,
    command: Command,
) -> String {
    let command_name = match &command {
        Command::Connect => "connect",
        Command::Bind => "bind",
        Command::Register { .. } => "register",
        Command::Transfer { .. } => "transfer",
        Command::Verify { .. } => "verify",
        Command::Refresh => "refresh",
        Command::List => "list",
        Command::Switch { .. } => "switch",
        Command::Status => "status",
        Command::Help => "help",
        Command::Quit => "quit",
    };
    tracing::debug!(command = command_name, "dispatching shell command");

    match command {
        Command::Connect => {
            handle.connect_wallet().await;
        }
        Command::Bind => {
            handle.connect_ledger().await;
        }
        Command::Register { name, content_hash } => {
            handle.register_asset(&name, &content_hash).await;
        }
        Command::Transfer { id, new_owner } => {
            handle.transfer_ownership(id, &new_owner).await;
        }
        Command::Verify { id, content_hash } => {
            if let Ok(matches) = handle.verify_asset(id, &content_hash).await {
                return format!("{}\nverified={matches}", current_status(handle));
            }
        }
        Command::Refresh => {
            handle.refresh_catalog().await;
        }
        Command::List => return render_assets(handle).await,
        Command::Switch { identities } => {
            wallet.set_identities(identities);
            return "wallet identities updated".to_string();
        }
        Command::Status => return render_session(handle).await,
        Command::Help => return HELP.to_string(),
        Command::Quit => return String::new(),
    }

    current_status(handle)
}

fn current_status(handle: &dyn RegistryHandle) -> String {
    handle
        .current_outcome_message()
        .map(|status| render_status(&status))
        .unwrap_or_default()
}

async fn render_assets(handle: &dyn RegistryHandle) -> String {
    let assets = handle.current_assets().await;
    if assets.is_empty() {
        return "catalog is empty".to_string();
    }

    let mut out = String::new();
    for asset in assets.iter() {
        let registered = asset
            .registered_at_utc()
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| asset.registered_at.to_string());
        let _ = writeln!(
            out,
            "#{:<4} {:<24} {:<20} owner={} registered={}",
            asset.id,
            asset.name,
            asset.content_hash,
            asset.owner.short(),
            registered
        );
    }
    out.trim_end().to_string()
}

async fn render_session(handle: &dyn RegistryHandle) -> String {
    let session = handle.session().await;
    let account = session
        .active_address()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "connection={:?} account={account} busy={}",
        session.connection_state(),
        handle.is_busy()
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use client_core::{RegistryClient, RegistryClientConfig};
    use ledger_integration::{SimulatedLedger, WalletProvider};

    use super::*;

    fn address(last: u8) -> Address {
        format!("0x{:040x}", last).parse().expect("address")
    }

    #[test]
    fn parses_quoted_names() {
        assert_eq!(
            parse("register \"Deed A\" 0xabc"),
            Ok(Some(Command::Register {
                name: "Deed A".into(),
                content_hash: "0xabc".into(),
            }))
        );
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn reports_usage_and_bad_arguments() {
        assert_eq!(
            parse("transfer 1"),
            Err(ParseError::Usage("transfer <id> <address>"))
        );
        assert_eq!(
            parse("verify one 0xabc"),
            Err(ParseError::AssetId("one".into()))
        );
        assert_eq!(parse("switch 0x12"), Err(ParseError::Address("0x12".into())));
        assert_eq!(parse("mint"), Err(ParseError::Unknown("mint".into())));
    }

    #[test]
    fn accepts_hash_prefixed_ids_and_empty_switch() {
        assert_eq!(
            parse("verify #3 0xabc"),
            Ok(Some(Command::Verify {
                id: AssetId(3),
                content_hash: "0xabc".into(),
            }))
        );
        assert_eq!(
            parse("switch"),
            Ok(Some(Command::Switch {
                identities: Vec::new()
            }))
        );
    }

    #[tokio::test]
    async fn dispatch_prints_the_reported_outcome() {
        let ledger = SimulatedLedger::new(address(0xc0));
        let wallet = Arc::new(SimulatedWallet::new(vec![address(0xaa)]));
        let client = RegistryClient::new_with_dependencies(
            RegistryClientConfig {
                endpoint_address: ledger.contract().clone(),
            },
            Arc::clone(&wallet) as Arc<dyn WalletProvider>,
            Arc::new(ledger),
        );

        let out = dispatch(&client, &wallet, Command::Register {
            name: "Deed A".into(),
            content_hash: "0xabc".into(),
        })
        .await;
        assert!(out.starts_with("error: Wallet not connected"), "{out}");

        dispatch(&client, &wallet, Command::Connect).await;
        let out = dispatch(&client, &wallet, Command::Bind).await;
        assert!(out.starts_with("ok: Connected to registry"), "{out}");

        let out = dispatch(&client, &wallet, Command::Register {
            name: "Deed A".into(),
            content_hash: "0xabc".into(),
        })
        .await;
        assert_eq!(out, "ok: Asset \"Deed A\" registered as #1");

        let listing = dispatch(&client, &wallet, Command::List).await;
        assert!(listing.starts_with("#1"), "{listing}");
        assert!(listing.contains("Deed A"));

        let verified = dispatch(&client, &wallet, Command::Verify {
            id: AssetId(1),
            content_hash: "0xabc".into(),
        })
        .await;
        assert_eq!(
            verified,
            "ok: Asset #1 verified: content hash matches\nverified=true"
        );
        let mismatch = dispatch(&client, &wallet, Command::Verify {
            id: AssetId(1),
            content_hash: "0xdef".into(),
        })
        .await;
        assert!(mismatch.ends_with("verified=false"), "{mismatch}");
        let missing = dispatch(&client, &wallet, Command::Verify {
            id: AssetId(9),
            content_hash: "0xabc".into(),
        })
        .await;
        assert!(missing.starts_with("error: Ledger read failed"), "{missing}");
        assert!(!missing.contains("verified="));

        let status = dispatch(&client, &wallet, Command::Status).await;
        assert!(status.contains("connection=Connected"), "{status}");
        assert!(status.contains("busy=false"));
    }
}
