//! Client-side orchestration for the asset registry: wallet session, ledger
//! binding, one-at-a-time transactions, the cached catalog and the status line
//! shown to the user.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use ledger_integration::{
    LedgerProvider, MissingLedgerProvider, MissingWalletProvider, WalletProvider,
};
use shared::domain::{Address, Asset, AssetId};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, watch, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod catalog;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod reporter;
pub mod session;

pub use catalog::AssetCatalog;
pub use coordinator::{TransactionCoordinator, TransactionState};
pub use error::{ErrorCode, RegistryError};
pub use gateway::{LedgerBinding, LedgerGateway};
pub use reporter::{OperationOutcome, OutcomeReporter, Severity, StatusMessage};
pub use session::{ConnectionState, Session, SessionChange, SessionManager};

const CLIENT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryClientConfig {
    pub endpoint_address: Address,
}

impl RegistryClientConfig {
    pub fn new(endpoint_address: &str) -> Result<Self, RegistryError> {
        let endpoint_address = Address::parse(endpoint_address).map_err(|err| {
            RegistryError::invalid_input(format!("registry endpoint address: {err}"))
        })?;
        Ok(Self { endpoint_address })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    SessionChanged(Option<Address>),
    BindingInvalidated,
    CatalogUpdated { asset_count: usize },
    OutcomeReported(StatusMessage),
}

/// Operations offered to the presentation layer.
#[async_trait]
pub trait RegistryHandle: Send + Sync {
    async fn connect_wallet(&self) -> OperationOutcome;
    async fn connect_ledger(&self) -> OperationOutcome;
    async fn register_asset(&self, name: &str, content_hash: &str) -> OperationOutcome;
    async fn transfer_ownership(&self, id: AssetId, new_owner: &str) -> OperationOutcome;
    async fn verify_asset(&self, id: AssetId, content_hash: &str) -> Result<bool, RegistryError>;
    async fn refresh_catalog(&self) -> OperationOutcome;
    async fn current_assets(&self) -> Arc<Vec<Asset>>;
    async fn session(&self) -> Session;
    fn current_outcome_message(&self) -> Option<StatusMessage>;
    fn is_busy(&self) -> bool;
    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent>;
}

/// Owns the session/binding pair and every component that depends on it.
pub struct RegistryClient {
    session: SessionManager,
    gateway: LedgerGateway,
    coordinator: TransactionCoordinator,
    catalog: AssetCatalog,
    reporter: OutcomeReporter,
    binding: RwLock<Option<LedgerBinding>>,
    identity_listener: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl RegistryClient {
    pub fn new(config: RegistryClientConfig) -> Arc<Self> {
        Self::new_with_dependencies(
            config,
            Arc::new(MissingWalletProvider),
            Arc::new(MissingLedgerProvider),
        )
    }

    pub fn new_with_dependencies(
        config: RegistryClientConfig,
        wallet: Arc<dyn WalletProvider>,
        ledger: Arc<dyn LedgerProvider>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(CLIENT_EVENT_CAPACITY);
        Arc::new(Self {
            session: SessionManager::new(wallet),
            gateway: LedgerGateway::new(ledger, config.endpoint_address),
            coordinator: TransactionCoordinator::new(),
            catalog: AssetCatalog::new(),
            reporter: OutcomeReporter::new(),
            binding: RwLock::new(None),
            identity_listener: Mutex::new(None),
            events,
        })
    }

    pub async fn connect_wallet(self: &Arc<Self>) -> OperationOutcome {
        let outcome = match self.session.connect().await {
            Ok(connected) => {
                self.spawn_identity_listener(connected.identity_changes)
                    .await;
                self.handle_session_change(connected.change).await;
                OperationOutcome::success(format!("Wallet connected: {}", connected.address))
            }
            Err(err) => err.into(),
        };
        self.publish(outcome)
    }

    pub async fn connect_ledger(&self) -> OperationOutcome {
        let outcome = self.connect_ledger_impl().await.into();
        self.publish(outcome)
    }

    pub async fn register_asset(&self, name: &str, content_hash: &str) -> OperationOutcome {
        let outcome = self.register_asset_impl(name, content_hash).await.into();
        self.publish(outcome)
    }

    pub async fn transfer_ownership(&self, id: AssetId, new_owner: &str) -> OperationOutcome {
        let outcome = self.transfer_ownership_impl(id, new_owner).await.into();
        self.publish(outcome)
    }

    /// Read-only; not gated by the transaction coordinator.
    pub async fn verify_asset(
        &self,
        id: AssetId,
        content_hash: &str,
    ) -> Result<bool, RegistryError> {
        let result = self.verify_asset_impl(id, content_hash).await;
        let outcome = match &result {
            Ok(true) => {
                OperationOutcome::success(format!("Asset #{id} verified: content hash matches"))
            }
            Ok(false) => OperationOutcome::success(format!(
                "Asset #{id} checked: content hash does not match"
            )),
            Err(err) => err.clone().into(),
        };
        self.publish(outcome);
        result
    }

    pub async fn refresh_catalog(&self) -> OperationOutcome {
        let outcome = self
            .refresh_catalog_impl()
            .await
            .map(|count| format!("Catalog refreshed: {count} assets"))
            .into();
        self.publish(outcome)
    }

    pub async fn current_assets(&self) -> Arc<Vec<Asset>> {
        self.catalog.current().await
    }

    pub async fn asset(&self, id: AssetId) -> Option<Asset> {
        self.catalog.asset(id).await
    }

    pub fn catalog_is_stale(&self) -> bool {
        self.catalog.is_stale()
    }

    pub fn current_outcome_message(&self) -> Option<StatusMessage> {
        self.reporter.current()
    }

    pub fn is_busy(&self) -> bool {
        self.coordinator.is_busy()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.coordinator.state()
    }

    pub fn subscribe_transaction_state(&self) -> watch::Receiver<TransactionState> {
        self.coordinator.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn session(&self) -> Session {
        self.session.session().await
    }

    pub async fn binding(&self) -> Option<LedgerBinding> {
        self.binding.read().await.clone()
    }

    /// Applies an identity list reported by the wallet: first entry wins, an
    /// empty list disconnects. Invalidates the binding when the identity moved.
    pub async fn apply_identities(&self, identities: Vec<Address>) {
        let change = self.session.apply_identities(&identities).await;
        self.handle_session_change(change).await;
    }

    fn publish(&self, outcome: OperationOutcome) -> OperationOutcome {
        let status = self.reporter.report(&outcome);
        let _ = self.events.send(ClientEvent::OutcomeReported(status));
        outcome
    }

    async fn spawn_identity_listener(
        self: &Arc<Self>,
        mut changes: broadcast::Receiver<Vec<Address>>,
    ) {
        let client: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(identities) => {
                        let Some(client) = client.upgrade() else {
                            break;
                        };
                        client.apply_identities(identities).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "identity listener lagged behind wallet updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let previous = self.identity_listener.lock().await.replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn handle_session_change(&self, change: SessionChange) {
        if !change.identity_swapped() {
            return;
        }

        self.catalog.mark_stale();
        let _ = self
            .events
            .send(ClientEvent::SessionChanged(change.current.clone()));

        let stale = self.binding.write().await.take();
        if stale.is_none() {
            return;
        }
        warn!("ledger binding invalidated after identity change");
        let _ = self.events.send(ClientEvent::BindingInvalidated);

        if change.current.is_none() {
            return;
        }
        match self.bind_current().await {
            Ok(binding) => {
                info!(caller = %binding.caller(), "ledger binding renewed");
                *self.binding.write().await = Some(binding);
            }
            Err(err) => warn!(error = %err, "could not rebind ledger after identity change"),
        }
    }

    async fn bind_current(&self) -> Result<LedgerBinding, RegistryError> {
        let session = self.session.session().await;
        if !session.is_connected() {
            return Err(RegistryError::not_connected());
        }
        let caller = self.session.caller_handle().await?;
        self.gateway.bind(&session, caller)
    }

    async fn current_binding(&self) -> Result<LedgerBinding, RegistryError> {
        let session = self.session.session().await;
        if !session.is_connected() {
            return Err(RegistryError::not_connected());
        }
        let binding = self.binding.read().await.clone().ok_or_else(|| {
            RegistryError::new(
                ErrorCode::NotConnected,
                "registry not bound; connect to the ledger first",
            )
        })?;
        if !binding.is_valid_for(&session) {
            return Err(RegistryError::new(
                ErrorCode::NotConnected,
                "registry binding belongs to a previous account; reconnect to the ledger",
            ));
        }
        Ok(binding)
    }

    async fn refresh_and_announce(&self, binding: &LedgerBinding) -> Result<usize, RegistryError> {
        let asset_count = self.catalog.refresh(&self.gateway, binding).await?;
        let _ = self.events.send(ClientEvent::CatalogUpdated { asset_count });
        Ok(asset_count)
    }

    async fn connect_ledger_impl(&self) -> Result<String, RegistryError> {
        let binding = self.bind_current().await?;
        *self.binding.write().await = Some(binding.clone());
        info!(
            endpoint = %binding.endpoint_address(),
            caller = %binding.caller(),
            "ledger bound"
        );

        let count = self.refresh_and_announce(&binding).await?;
        Ok(format!(
            "Connected to registry {} ({count} assets)",
            binding.endpoint_address()
        ))
    }

    async fn register_asset_impl(
        &self,
        name: &str,
        content_hash: &str,
    ) -> Result<String, RegistryError> {
        let binding = self.current_binding().await?;
        let receipt = self
            .coordinator
            .run(
                "register_asset",
                self.gateway.submit_register(&binding, name, content_hash),
                || async { self.refresh_and_announce(&binding).await.map(|_| ()) },
            )
            .await?;

        Ok(match receipt.registered_asset_id() {
            Some(id) => format!("Asset \"{}\" registered as #{id}", name.trim()),
            None => format!("Asset \"{}\" registered in tx {}", name.trim(), receipt.tx_hash),
        })
    }

    async fn transfer_ownership_impl(
        &self,
        id: AssetId,
        new_owner: &str,
    ) -> Result<String, RegistryError> {
        let binding = self.current_binding().await?;
        let receipt = self
            .coordinator
            .run(
                "transfer_ownership",
                self.gateway.submit_transfer(&binding, id, new_owner),
                || async { self.refresh_and_announce(&binding).await.map(|_| ()) },
            )
            .await?;

        Ok(match receipt.transferred_to(id) {
            Some(owner) => format!("Asset #{id} transferred to {owner}"),
            None => format!("Asset #{id} transferred in tx {}", receipt.tx_hash),
        })
    }

    async fn verify_asset_impl(
        &self,
        id: AssetId,
        content_hash: &str,
    ) -> Result<bool, RegistryError> {
        let binding = self.current_binding().await?;
        self.gateway
            .read_verify(&binding, id, content_hash.trim())
            .await
    }

    async fn refresh_catalog_impl(&self) -> Result<usize, RegistryError> {
        let binding = self.current_binding().await?;
        self.refresh_and_announce(&binding).await
    }
}

impl Drop for RegistryClient {
    fn drop(&mut self) {
        if let Some(task) = self.identity_listener.get_mut().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl RegistryHandle for Arc<RegistryClient> {
    async fn connect_wallet(&self) -> OperationOutcome {
        RegistryClient::connect_wallet(self).await
    }

    async fn connect_ledger(&self) -> OperationOutcome {
        RegistryClient::connect_ledger(self).await
    }

    async fn register_asset(&self, name: &str, content_hash: &str) -> OperationOutcome {
        RegistryClient::register_asset(self, name, content_hash).await
    }

    async fn transfer_ownership(&self, id: AssetId, new_owner: &str) -> OperationOutcome {
        RegistryClient::transfer_ownership(self, id, new_owner).await
    }

    async fn verify_asset(&self, id: AssetId, content_hash: &str) -> Result<bool, RegistryError> {
        RegistryClient::verify_asset(self, id, content_hash).await
    }

    async fn refresh_catalog(&self) -> OperationOutcome {
        RegistryClient::refresh_catalog(self).await
    }

    async fn current_assets(&self) -> Arc<Vec<Asset>> {
        RegistryClient::current_assets(self).await
    }

    async fn session(&self) -> Session {
        RegistryClient::session(self).await
    }

    fn current_outcome_message(&self) -> Option<StatusMessage> {
        RegistryClient::current_outcome_message(self)
    }

    fn is_busy(&self) -> bool {
        RegistryClient::is_busy(self)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        RegistryClient::subscribe_events(self)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
