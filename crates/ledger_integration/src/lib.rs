//! Seams to the two external collaborators of the registry client: the wallet
//! provider that owns the caller's identities, and the ledger that hosts the
//! registry contract.

use async_trait::async_trait;
use shared::{
    domain::{Address, AssetId, TxHash},
    protocol::{AssetRecord, LedgerEvent, TransactionReceipt},
};
use thiserror::Error;
use tokio::sync::broadcast;

pub mod simulated;

pub use simulated::{SimulatedLedger, SimulatedWallet};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("no wallet provider is reachable")]
    Unavailable,
    #[error("user rejected the request: {0}")]
    Rejected(String),
    #[error("wallet provider failure: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("user rejected the transaction: {0}")]
    UserRejected(String),
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("asset {0} does not exist")]
    NotFound(AssetId),
    #[error("ledger transport failure: {0}")]
    Transport(String),
}

/// Signing authority handed out by the wallet for the currently selected account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerHandle {
    pub address: Address,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Asks the wallet to reveal its accounts; the first entry is the active one.
    async fn request_identities(&self) -> Result<Vec<Address>, WalletError>;
    async fn caller_handle(&self) -> Result<CallerHandle, WalletError>;
    /// Each receiver observes every identity-list change exactly once.
    fn subscribe_identities(&self) -> broadcast::Receiver<Vec<Address>>;
}

pub struct MissingWalletProvider;

#[async_trait]
impl WalletProvider for MissingWalletProvider {
    async fn request_identities(&self) -> Result<Vec<Address>, WalletError> {
        Err(WalletError::Unavailable)
    }

    async fn caller_handle(&self) -> Result<CallerHandle, WalletError> {
        Err(WalletError::Unavailable)
    }

    fn subscribe_identities(&self) -> broadcast::Receiver<Vec<Address>> {
        let (_, rx) = broadcast::channel(1);
        rx
    }
}

/// A mutating call accepted by the ledger but not yet final.
#[async_trait]
pub trait PendingTransaction: Send {
    fn tx_hash(&self) -> &TxHash;
    async fn wait(self: Box<Self>) -> Result<TransactionReceipt, LedgerError>;
}

/// The registry contract interface, addressed by its deployment address.
#[async_trait]
pub trait LedgerProvider: Send + Sync {
    async fn asset_count(&self, contract: &Address) -> Result<u64, LedgerError>;
    async fn get_asset(&self, contract: &Address, id: AssetId) -> Result<AssetRecord, LedgerError>;
    async fn verify_asset(
        &self,
        contract: &Address,
        id: AssetId,
        content_hash: &str,
    ) -> Result<bool, LedgerError>;
    async fn register_asset(
        &self,
        contract: &Address,
        caller: &CallerHandle,
        name: &str,
        content_hash: &str,
    ) -> Result<Box<dyn PendingTransaction>, LedgerError>;
    async fn transfer_ownership(
        &self,
        contract: &Address,
        caller: &CallerHandle,
        id: AssetId,
        new_owner: &Address,
    ) -> Result<Box<dyn PendingTransaction>, LedgerError>;
    fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent>;
}

pub struct MissingLedgerProvider;

#[async_trait]
impl LedgerProvider for MissingLedgerProvider {
    async fn asset_count(&self, contract: &Address) -> Result<u64, LedgerError> {
        Err(unreachable_ledger(contract))
    }

    async fn get_asset(&self, contract: &Address, _id: AssetId) -> Result<AssetRecord, LedgerError> {
        Err(unreachable_ledger(contract))
    }

    async fn verify_asset(
        &self,
        contract: &Address,
        _id: AssetId,
        _content_hash: &str,
    ) -> Result<bool, LedgerError> {
        Err(unreachable_ledger(contract))
    }

    async fn register_asset(
        &self,
        contract: &Address,
        _caller: &CallerHandle,
        _name: &str,
        _content_hash: &str,
    ) -> Result<Box<dyn PendingTransaction>, LedgerError> {
        Err(unreachable_ledger(contract))
    }

    async fn transfer_ownership(
        &self,
        contract: &Address,
        _caller: &CallerHandle,
        _id: AssetId,
        _new_owner: &Address,
    ) -> Result<Box<dyn PendingTransaction>, LedgerError> {
        Err(unreachable_ledger(contract))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent> {
        let (_, rx) = broadcast::channel(1);
        rx
    }
}

fn unreachable_ledger(contract: &Address) -> LedgerError {
    LedgerError::Transport(format!("ledger backend unavailable for contract {contract}"))
}
