use std::sync::Arc;

use ledger_integration::{CallerHandle, WalletProvider};
use shared::domain::Address;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::error::{from_wallet, ErrorCode, RegistryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Authenticated wallet connection. The active address exists exactly while connected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Disconnected,
    Connected {
        address: Address,
    },
}

impl Session {
    /// The first identity wins; an empty list tears the session down.
    pub fn from_identities(identities: &[Address]) -> Self {
        match identities.first() {
            Some(address) => Session::Connected {
                address: address.clone(),
            },
            None => Session::Disconnected,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        match self {
            Session::Disconnected => ConnectionState::Disconnected,
            Session::Connected { .. } => ConnectionState::Connected,
        }
    }

    pub fn active_address(&self) -> Option<&Address> {
        match self {
            Session::Disconnected => None,
            Session::Connected { address } => Some(address),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub previous: Option<Address>,
    pub current: Option<Address>,
}

impl SessionChange {
    pub fn identity_swapped(&self) -> bool {
        self.previous != self.current
    }
}

pub struct ConnectedSession {
    pub address: Address,
    pub change: SessionChange,
    /// Identity-list updates published after the handshake.
    pub identity_changes: broadcast::Receiver<Vec<Address>>,
}

pub struct SessionManager {
    provider: Arc<dyn WalletProvider>,
    session: RwLock<Session>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self {
            provider,
            session: RwLock::new(Session::Disconnected),
        }
    }

    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn connect(&self) -> Result<ConnectedSession, RegistryError> {
        // Subscribe first so a change racing the handshake is not lost.
        let identity_changes = self.provider.subscribe_identities();
        let identities = self
            .provider
            .request_identities()
            .await
            .map_err(from_wallet)?;

        let session = Session::from_identities(&identities);
        let Some(address) = session.active_address().cloned() else {
            return Err(RegistryError::new(
                ErrorCode::ProviderError,
                "wallet returned no accounts",
            ));
        };

        let change = self.replace(session).await;
        info!(address = %address, accounts = identities.len(), "wallet connected");

        Ok(ConnectedSession {
            address,
            change,
            identity_changes,
        })
    }

    pub async fn apply_identities(&self, identities: &[Address]) -> SessionChange {
        let change = self.replace(Session::from_identities(identities)).await;
        if change.identity_swapped() {
            match &change.current {
                Some(address) => info!(address = %address, "wallet identity changed"),
                None => info!("wallet reported no identities; session closed"),
            }
        }
        change
    }

    /// Signing handle for the active account. Fails if the wallet has moved on
    /// to an identity this session has not observed yet.
    pub async fn caller_handle(&self) -> Result<CallerHandle, RegistryError> {
        let session = self.session().await;
        let Some(address) = session.active_address() else {
            return Err(RegistryError::not_connected());
        };

        let handle = self.provider.caller_handle().await.map_err(from_wallet)?;
        if &handle.address != address {
            return Err(RegistryError::new(
                ErrorCode::NotConnected,
                format!(
                    "wallet signer {} does not match active account {address}",
                    handle.address
                ),
            ));
        }
        Ok(handle)
    }

    async fn replace(&self, next: Session) -> SessionChange {
        let mut guard = self.session.write().await;
        let previous = guard.active_address().cloned();
        let current = next.active_address().cloned();
        *guard = next;
        SessionChange { previous, current }
    }
}
