//! Deterministic in-process wallet and registry ledger.
//!
//! Both types behave like their remote counterparts from the client's point of
//! view (mutations only become visible at finality, the ledger assigns ids,
//! transfers are owner-only) and expose knobs to inject faults.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{Address, AssetId, BlockNumber, TxHash},
    protocol::{AssetRecord, LedgerEvent, TransactionReceipt},
};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::{CallerHandle, LedgerError, LedgerProvider, PendingTransaction, WalletError, WalletProvider};

const EVENT_CHANNEL_CAPACITY: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct WalletState {
    identities: Vec<Address>,
    reject_requests: bool,
}

pub struct SimulatedWallet {
    state: Mutex<WalletState>,
    changes: broadcast::Sender<Vec<Address>>,
}

impl SimulatedWallet {
    pub fn new(identities: Vec<Address>) -> Self {
        let (changes, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(WalletState {
                identities,
                reject_requests: false,
            }),
            changes,
        }
    }

    /// Replaces the account list and notifies every identity subscriber.
    pub fn set_identities(&self, identities: Vec<Address>) {
        lock(&self.state).identities = identities.clone();
        let _ = self.changes.send(identities);
    }

    /// While set, `request_identities` behaves as if the user dismissed the prompt.
    pub fn set_reject_requests(&self, reject: bool) {
        lock(&self.state).reject_requests = reject;
    }

    pub fn identities(&self) -> Vec<Address> {
        lock(&self.state).identities.clone()
    }
}

#[async_trait]
impl WalletProvider for SimulatedWallet {
    async fn request_identities(&self) -> Result<Vec<Address>, WalletError> {
        let state = lock(&self.state);
        if state.reject_requests {
            return Err(WalletError::Rejected("user denied account access".into()));
        }
        if state.identities.is_empty() {
            return Err(WalletError::Provider("wallet has no accounts".into()));
        }
        Ok(state.identities.clone())
    }

    async fn caller_handle(&self) -> Result<CallerHandle, WalletError> {
        lock(&self.state)
            .identities
            .first()
            .cloned()
            .map(|address| CallerHandle { address })
            .ok_or_else(|| WalletError::Provider("no active account".into()))
    }

    fn subscribe_identities(&self) -> broadcast::Receiver<Vec<Address>> {
        self.changes.subscribe()
    }
}

#[derive(Default)]
struct LedgerState {
    assets: Vec<AssetRecord>,
    block_number: u64,
    failing_reads: HashSet<AssetId>,
    fail_count_reads: bool,
    reject_next_submission: Option<LedgerError>,
    fail_next_finality: Option<String>,
    submissions: u64,
}

impl LedgerState {
    fn record(&self, id: AssetId) -> Result<&AssetRecord, LedgerError> {
        id.index()
            .and_then(|index| self.assets.get(index))
            .ok_or(LedgerError::NotFound(id))
    }

    fn check_owner(&self, id: AssetId, caller: &Address) -> Result<(), LedgerError> {
        let record = self.record(id).map_err(|_| {
            LedgerError::Reverted(format!("asset {id} does not exist"))
        })?;
        if &record.owner != caller {
            return Err(LedgerError::Reverted(format!(
                "caller {caller} is not the owner of asset {id}"
            )));
        }
        Ok(())
    }
}

struct LedgerInner {
    state: Mutex<LedgerState>,
    finality_open: watch::Sender<bool>,
    events: broadcast::Sender<LedgerEvent>,
    fixed_clock: Option<i64>,
}

impl LedgerInner {
    fn now(&self) -> i64 {
        self.fixed_clock.unwrap_or_else(|| Utc::now().timestamp())
    }
}

/// Registry contract deployed at a single address.
#[derive(Clone)]
pub struct SimulatedLedger {
    contract: Address,
    inner: Arc<LedgerInner>,
}

impl SimulatedLedger {
    pub fn new(contract: Address) -> Self {
        Self::build(contract, None)
    }

    /// Stamps every registration with `timestamp` instead of the wall clock.
    pub fn with_fixed_clock(contract: Address, timestamp: i64) -> Self {
        Self::build(contract, Some(timestamp))
    }

    fn build(contract: Address, fixed_clock: Option<i64>) -> Self {
        let (finality_open, _) = watch::channel(true);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            contract,
            inner: Arc::new(LedgerInner {
                state: Mutex::new(LedgerState::default()),
                finality_open,
                events,
                fixed_clock,
            }),
        }
    }

    pub fn contract(&self) -> &Address {
        &self.contract
    }

    /// Appends an already-final asset, bypassing transactions.
    pub fn preload(&self, name: &str, content_hash: &str, owner: Address) -> AssetId {
        let registered_at = self.inner.now();
        let mut state = lock(&self.inner.state);
        state.assets.push(AssetRecord {
            name: name.to_string(),
            content_hash: content_hash.to_string(),
            owner,
            registered_at,
        });
        AssetId(state.assets.len() as u64)
    }

    pub fn records(&self) -> Vec<AssetRecord> {
        lock(&self.inner.state).assets.clone()
    }

    pub fn submission_count(&self) -> u64 {
        lock(&self.inner.state).submissions
    }

    pub fn fail_reads_for(&self, id: AssetId) {
        lock(&self.inner.state).failing_reads.insert(id);
    }

    pub fn fail_count_reads(&self, fail: bool) {
        lock(&self.inner.state).fail_count_reads = fail;
    }

    pub fn clear_read_faults(&self) {
        let mut state = lock(&self.inner.state);
        state.failing_reads.clear();
        state.fail_count_reads = false;
    }

    pub fn reject_next_submission(&self, error: LedgerError) {
        lock(&self.inner.state).reject_next_submission = Some(error);
    }

    pub fn fail_next_finality(&self, reason: impl Into<String>) {
        lock(&self.inner.state).fail_next_finality = Some(reason.into());
    }

    /// Parks every finality wait until [`SimulatedLedger::release_finality`].
    pub fn hold_finality(&self) {
        self.inner.finality_open.send_replace(false);
    }

    pub fn release_finality(&self) {
        self.inner.finality_open.send_replace(true);
    }

    fn ensure_contract(&self, contract: &Address) -> Result<(), LedgerError> {
        if contract != &self.contract {
            return Err(LedgerError::Transport(format!(
                "no registry deployed at {contract}"
            )));
        }
        Ok(())
    }

    fn begin_submission(&self, contract: &Address) -> Result<(), LedgerError> {
        self.ensure_contract(contract)?;
        let mut state = lock(&self.inner.state);
        state.submissions += 1;
        match state.reject_next_submission.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn read_guard(&self, contract: &Address, id: AssetId) -> Result<(), LedgerError> {
        self.ensure_contract(contract)?;
        if lock(&self.inner.state).failing_reads.contains(&id) {
            return Err(LedgerError::Transport(format!(
                "simulated read fault for asset {id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerProvider for SimulatedLedger {
    async fn asset_count(&self, contract: &Address) -> Result<u64, LedgerError> {
        self.ensure_contract(contract)?;
        let state = lock(&self.inner.state);
        if state.fail_count_reads {
            return Err(LedgerError::Transport("simulated assetCount fault".into()));
        }
        Ok(state.assets.len() as u64)
    }

    async fn get_asset(&self, contract: &Address, id: AssetId) -> Result<AssetRecord, LedgerError> {
        self.read_guard(contract, id)?;
        lock(&self.inner.state).record(id).cloned()
    }

    async fn verify_asset(
        &self,
        contract: &Address,
        id: AssetId,
        content_hash: &str,
    ) -> Result<bool, LedgerError> {
        self.read_guard(contract, id)?;
        let state = lock(&self.inner.state);
        Ok(state.record(id)?.content_hash == content_hash)
    }

    async fn register_asset(
        &self,
        contract: &Address,
        caller: &CallerHandle,
        name: &str,
        content_hash: &str,
    ) -> Result<Box<dyn PendingTransaction>, LedgerError> {
        self.begin_submission(contract)?;
        if name.is_empty() {
            return Err(LedgerError::Reverted("name required".into()));
        }

        let pending = SimulatedPendingTransaction {
            tx_hash: TxHash::random(),
            inner: Arc::clone(&self.inner),
            action: PendingAction::Register {
                caller: caller.address.clone(),
                name: name.to_string(),
                content_hash: content_hash.to_string(),
            },
        };
        debug!(tx = %pending.tx_hash, "simulated ledger accepted registerAsset");
        Ok(Box::new(pending))
    }

    async fn transfer_ownership(
        &self,
        contract: &Address,
        caller: &CallerHandle,
        id: AssetId,
        new_owner: &Address,
    ) -> Result<Box<dyn PendingTransaction>, LedgerError> {
        self.begin_submission(contract)?;
        lock(&self.inner.state).check_owner(id, &caller.address)?;

        let pending = SimulatedPendingTransaction {
            tx_hash: TxHash::random(),
            inner: Arc::clone(&self.inner),
            action: PendingAction::Transfer {
                caller: caller.address.clone(),
                id,
                new_owner: new_owner.clone(),
            },
        };
        debug!(tx = %pending.tx_hash, asset_id = id.0, "simulated ledger accepted transferOwnership");
        Ok(Box::new(pending))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent> {
        self.inner.events.subscribe()
    }
}

enum PendingAction {
    Register {
        caller: Address,
        name: String,
        content_hash: String,
    },
    Transfer {
        caller: Address,
        id: AssetId,
        new_owner: Address,
    },
}

struct SimulatedPendingTransaction {
    tx_hash: TxHash,
    inner: Arc<LedgerInner>,
    action: PendingAction,
}

impl SimulatedPendingTransaction {
    fn finalize(self) -> Result<TransactionReceipt, LedgerError> {
        let registered_at = self.inner.now();
        let mut state = lock(&self.inner.state);
        if let Some(reason) = state.fail_next_finality.take() {
            return Err(LedgerError::Reverted(reason));
        }

        let event = match self.action {
            PendingAction::Register {
                caller,
                name,
                content_hash,
            } => {
                state.assets.push(AssetRecord {
                    name,
                    content_hash: content_hash.clone(),
                    owner: caller.clone(),
                    registered_at,
                });
                LedgerEvent::AssetRegistered {
                    id: AssetId(state.assets.len() as u64),
                    owner: caller,
                    content_hash,
                }
            }
            PendingAction::Transfer {
                caller,
                id,
                new_owner,
            } => {
                state.check_owner(id, &caller)?;
                if let Some(record) = id.index().and_then(|index| state.assets.get_mut(index)) {
                    record.owner = new_owner.clone();
                }
                LedgerEvent::OwnershipTransferred {
                    id,
                    from: caller,
                    to: new_owner,
                }
            }
        };

        state.block_number += 1;
        let receipt = TransactionReceipt {
            tx_hash: self.tx_hash,
            block_number: BlockNumber(state.block_number),
            events: vec![event.clone()],
        };
        drop(state);

        let _ = self.inner.events.send(event);
        Ok(receipt)
    }
}

#[async_trait]
impl PendingTransaction for SimulatedPendingTransaction {
    fn tx_hash(&self) -> &TxHash {
        &self.tx_hash
    }

    async fn wait(self: Box<Self>) -> Result<TransactionReceipt, LedgerError> {
        let mut open = self.inner.finality_open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map_err(|_| LedgerError::Transport("ledger stopped producing blocks".into()))?;
        (*self).finalize()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn address(last: u8) -> Address {
        format!("0x{:040x}", last).parse().expect("address")
    }

    fn caller(last: u8) -> CallerHandle {
        CallerHandle {
            address: address(last),
        }
    }

    #[tokio::test]
    async fn registration_becomes_visible_only_at_finality() {
        let contract = address(0xc0);
        let ledger = SimulatedLedger::with_fixed_clock(contract.clone(), 1_700_000_000);

        let pending = ledger
            .register_asset(&contract, &caller(0xaa), "Deed A", "0xabc")
            .await
            .expect("submit");
        assert_eq!(ledger.asset_count(&contract).await.expect("count"), 0);

        let receipt = pending.wait().await.expect("final");
        assert_eq!(receipt.registered_asset_id(), Some(AssetId(1)));
        assert_eq!(receipt.block_number, BlockNumber(1));

        let record = ledger.get_asset(&contract, AssetId(1)).await.expect("read");
        assert_eq!(record.owner, address(0xaa));
        assert_eq!(record.registered_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn out_of_range_reads_are_not_found() {
        let contract = address(0xc0);
        let ledger = SimulatedLedger::new(contract.clone());
        ledger.preload("Deed A", "0xabc", address(0xaa));

        assert_eq!(
            ledger.get_asset(&contract, AssetId(0)).await,
            Err(LedgerError::NotFound(AssetId(0)))
        );
        assert_eq!(
            ledger.verify_asset(&contract, AssetId(2), "0xabc").await,
            Err(LedgerError::NotFound(AssetId(2)))
        );
        assert_eq!(
            ledger.verify_asset(&contract, AssetId(1), "0xabc").await,
            Ok(true)
        );
    }

    #[tokio::test]
    async fn transfer_by_non_owner_reverts_at_submission() {
        let contract = address(0xc0);
        let ledger = SimulatedLedger::new(contract.clone());
        let id = ledger.preload("Deed A", "0xabc", address(0xaa));

        let result = ledger
            .transfer_ownership(&contract, &caller(0xbb), id, &address(0xbb))
            .await;
        assert!(matches!(result, Err(LedgerError::Reverted(_))));
        assert_eq!(ledger.records()[0].owner, address(0xaa));
    }

    #[tokio::test]
    async fn transfer_emits_event_on_finality() {
        let contract = address(0xc0);
        let ledger = SimulatedLedger::new(contract.clone());
        let id = ledger.preload("Deed A", "0xabc", address(0xaa));
        let mut events = ledger.subscribe_events();

        ledger
            .transfer_ownership(&contract, &caller(0xaa), id, &address(0xbb))
            .await
            .expect("submit")
            .wait()
            .await
            .expect("final");

        assert_eq!(
            events.recv().await.expect("event"),
            LedgerEvent::OwnershipTransferred {
                id,
                from: address(0xaa),
                to: address(0xbb),
            }
        );
        assert_eq!(ledger.records()[0].owner, address(0xbb));
    }

    #[tokio::test]
    async fn held_finality_parks_until_released() {
        let contract = address(0xc0);
        let ledger = SimulatedLedger::new(contract.clone());
        ledger.hold_finality();

        let pending = ledger
            .register_asset(&contract, &caller(0xaa), "Deed A", "0xabc")
            .await
            .expect("submit");
        let wait = tokio::spawn(pending.wait());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!wait.is_finished());

        ledger.release_finality();
        let receipt = wait.await.expect("join").expect("final");
        assert_eq!(receipt.registered_asset_id(), Some(AssetId(1)));
    }

    #[tokio::test]
    async fn injected_faults_fire_once() {
        let contract = address(0xc0);
        let ledger = SimulatedLedger::new(contract.clone());
        ledger.reject_next_submission(LedgerError::UserRejected("denied".into()));

        let first = ledger
            .register_asset(&contract, &caller(0xaa), "Deed A", "0xabc")
            .await;
        assert!(matches!(first, Err(LedgerError::UserRejected(_))));

        ledger.fail_next_finality("out of gas");
        let second = ledger
            .register_asset(&contract, &caller(0xaa), "Deed A", "0xabc")
            .await
            .expect("submit")
            .wait()
            .await;
        assert_eq!(second, Err(LedgerError::Reverted("out of gas".into())));
        assert!(ledger.records().is_empty());
        assert_eq!(ledger.submission_count(), 2);
    }

    #[tokio::test]
    async fn wrong_contract_address_is_a_transport_fault() {
        let ledger = SimulatedLedger::new(address(0xc0));
        let result = ledger.asset_count(&address(0xc1)).await;
        assert!(matches!(result, Err(LedgerError::Transport(_))));
    }

    #[tokio::test]
    async fn wallet_publishes_identity_changes() {
        let wallet = SimulatedWallet::new(vec![address(0xaa)]);
        let mut changes = wallet.subscribe_identities();

        wallet.set_identities(vec![address(0xbb), address(0xaa)]);
        assert_eq!(
            changes.recv().await.expect("change"),
            vec![address(0xbb), address(0xaa)]
        );
        assert_eq!(
            wallet.caller_handle().await.expect("handle").address,
            address(0xbb)
        );

        wallet.set_reject_requests(true);
        assert!(matches!(
            wallet.request_identities().await,
            Err(WalletError::Rejected(_))
        ));
    }
}
