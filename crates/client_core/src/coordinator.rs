//! One-at-a-time driver for mutating ledger operations.
//!
//! `Idle -> Submitting -> AwaitingFinality -> (Confirmed | Rejected) -> Idle`

use std::future::Future;

use ledger_integration::PendingTransaction;
use shared::{domain::TxHash, protocol::TransactionReceipt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{from_write, ErrorCode, RegistryError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Submitting,
    AwaitingFinality { tx_hash: TxHash },
    Confirmed { tx_hash: TxHash },
    Rejected,
}

impl TransactionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, TransactionState::Idle)
    }
}

pub struct TransactionCoordinator {
    state: watch::Sender<TransactionState>,
}

/// Holds the busy slot; dropping it always returns the coordinator to `Idle`.
struct BusyGuard<'a> {
    state: &'a watch::Sender<TransactionState>,
}

impl BusyGuard<'_> {
    fn advance(&self, next: TransactionState) {
        debug!(state = ?next, "transaction state");
        self.state.send_replace(next);
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(TransactionState::Idle);
    }
}

impl Default for TransactionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(TransactionState::Idle);
        Self { state }
    }

    pub fn state(&self) -> TransactionState {
        self.state.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        !self.state.borrow().is_idle()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransactionState> {
        self.state.subscribe()
    }

    fn try_begin(&self) -> Option<BusyGuard<'_>> {
        let acquired = self.state.send_if_modified(|state| {
            if state.is_idle() {
                *state = TransactionState::Submitting;
                true
            } else {
                false
            }
        });
        acquired.then(|| BusyGuard { state: &self.state })
    }

    /// Drives `submit` to finality, then runs `synchronize` before reporting success.
    ///
    /// Rejects immediately with `OperationInProgress` when another operation holds
    /// the coordinator. Errors returned by `submit` are passed through as-is so
    /// local validation failures keep their `InvalidInput` code.
    pub async fn run<Submit, Refresh, RefreshFut>(
        &self,
        operation: &'static str,
        submit: Submit,
        synchronize: Refresh,
    ) -> Result<TransactionReceipt, RegistryError>
    where
        Submit: Future<Output = Result<Box<dyn PendingTransaction>, RegistryError>>,
        Refresh: FnOnce() -> RefreshFut,
        RefreshFut: Future<Output = Result<(), RegistryError>>,
    {
        let Some(guard) = self.try_begin() else {
            warn!(operation, "rejected: another transaction is in flight");
            return Err(RegistryError::in_progress());
        };
        debug!(operation, state = ?TransactionState::Submitting, "transaction state");

        let pending = match submit.await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(operation, error = %err, "transaction submission failed");
                guard.advance(TransactionState::Rejected);
                return Err(err);
            }
        };

        let tx_hash = pending.tx_hash().clone();
        guard.advance(TransactionState::AwaitingFinality {
            tx_hash: tx_hash.clone(),
        });

        let receipt = match pending.wait().await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(operation, tx = %tx_hash, error = %err, "transaction failed before finality");
                guard.advance(TransactionState::Rejected);
                return Err(from_write(err));
            }
        };

        guard.advance(TransactionState::Confirmed {
            tx_hash: tx_hash.clone(),
        });
        info!(operation, tx = %tx_hash, block = receipt.block_number.0, "transaction confirmed");

        synchronize().await.map_err(|err| {
            RegistryError::new(
                ErrorCode::ReadError,
                format!("transaction {tx_hash} confirmed but catalog refresh failed: {}", err.message),
            )
        })?;

        Ok(receipt)
    }
}
