use super::*;
use ledger_integration::{LedgerError, SimulatedLedger, SimulatedWallet};
use std::time::Duration;

const REGISTERED_AT: i64 = 1_700_000_000;

fn address(last: u8) -> Address {
    format!("0x{:040x}", last).parse().expect("address")
}

struct Harness {
    client: Arc<RegistryClient>,
    wallet: Arc<SimulatedWallet>,
    ledger: SimulatedLedger,
}

impl Harness {
    fn new(identities: Vec<Address>) -> Self {
        let ledger = SimulatedLedger::with_fixed_clock(address(0xc0), REGISTERED_AT);
        let wallet = Arc::new(SimulatedWallet::new(identities));
        let client = RegistryClient::new_with_dependencies(
            RegistryClientConfig {
                endpoint_address: ledger.contract().clone(),
            },
            Arc::clone(&wallet) as Arc<dyn WalletProvider>,
            Arc::new(ledger.clone()),
        );
        Self {
            client,
            wallet,
            ledger,
        }
    }

    async fn connected(identities: Vec<Address>) -> Self {
        let harness = Self::new(identities);
        assert!(harness.client.connect_wallet().await.is_success());
        assert!(harness.client.connect_ledger().await.is_success());
        harness
    }
}

async fn next_matching(
    events: &mut broadcast::Receiver<ClientEvent>,
    predicate: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event stream open");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for client event")
}

#[test]
fn config_rejects_malformed_endpoint() {
    let err = RegistryClientConfig::new("registry.eth").expect_err("invalid");
    assert_eq!(err.code, ErrorCode::InvalidInput);
    assert!(RegistryClientConfig::new(&address(0xc0).to_string()).is_ok());
}

#[tokio::test]
async fn connect_wallet_without_provider_reports_no_provider() {
    let client = RegistryClient::new(RegistryClientConfig {
        endpoint_address: address(0xc0),
    });

    let outcome = client.connect_wallet().await;
    assert_eq!(outcome.cause(), Some(ErrorCode::NoProviderDetected));
    assert_eq!(
        client.session().await.connection_state(),
        ConnectionState::Disconnected
    );

    let status = client.current_outcome_message().expect("reported");
    assert_eq!(status.severity, Severity::Error);
    assert!(status.text.starts_with("No wallet provider detected"));
}

#[tokio::test]
async fn operations_fail_fast_while_disconnected() {
    let harness = Harness::new(vec![address(0xaa)]);
    let client = &harness.client;

    assert_eq!(
        client.connect_ledger().await.cause(),
        Some(ErrorCode::NotConnected)
    );
    assert_eq!(
        client.register_asset("Deed A", "0xabc").await.cause(),
        Some(ErrorCode::NotConnected)
    );
    assert_eq!(
        client
            .verify_asset(AssetId(1), "0xabc")
            .await
            .expect_err("disconnected")
            .code,
        ErrorCode::NotConnected
    );
    assert_eq!(
        client.refresh_catalog().await.cause(),
        Some(ErrorCode::NotConnected)
    );
    assert_eq!(harness.ledger.submission_count(), 0);
}

#[tokio::test]
async fn writes_require_a_ledger_binding() {
    let harness = Harness::new(vec![address(0xaa)]);
    assert!(harness.client.connect_wallet().await.is_success());

    let outcome = harness.client.register_asset("Deed A", "0xabc").await;
    assert_eq!(outcome.cause(), Some(ErrorCode::NotConnected));
    assert_eq!(harness.ledger.submission_count(), 0);
}

#[tokio::test]
async fn connect_ledger_performs_initial_refresh() {
    let harness = Harness::new(vec![address(0xaa)]);
    harness.ledger.preload("Deed A", "0x0a", address(0xbb));
    harness.ledger.preload("Deed B", "0x0b", address(0xaa));

    assert!(harness.client.connect_wallet().await.is_success());
    let outcome = harness.client.connect_ledger().await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(harness.client.current_assets().await.len(), 2);
    assert!(!harness.client.catalog_is_stale());
    assert_eq!(
        harness.client.binding().await.map(|b| b.caller().clone()),
        Some(address(0xaa))
    );
}

#[tokio::test]
async fn register_reports_ledger_assigned_id() {
    let harness = Harness::connected(vec![address(0xaa)]).await;

    let outcome = harness.client.register_asset("  Deed A  ", "0xabc").await;
    assert_eq!(
        outcome,
        OperationOutcome::success("Asset \"Deed A\" registered as #1")
    );

    let asset = harness.client.asset(AssetId(1)).await.expect("cached");
    assert_eq!(asset.name, "Deed A");
    assert_eq!(asset.registered_at, REGISTERED_AT);
    assert!(!harness.client.is_busy());
}

#[tokio::test]
async fn wallet_rejection_at_submission_is_transaction_rejected() {
    let harness = Harness::connected(vec![address(0xaa)]).await;
    harness
        .ledger
        .reject_next_submission(LedgerError::UserRejected("user denied signature".into()));

    let outcome = harness.client.register_asset("Deed A", "0xabc").await;
    assert_eq!(outcome.cause(), Some(ErrorCode::TransactionRejected));
    assert!(harness.client.current_assets().await.is_empty());
    assert_eq!(harness.client.transaction_state(), TransactionState::Idle);

    let status = harness.client.current_outcome_message().expect("reported");
    assert!(status.text.contains("user denied signature"));
}

#[tokio::test]
async fn invalid_inputs_are_rejected_before_submission() {
    let harness = Harness::connected(vec![address(0xaa)]).await;
    harness.ledger.preload("Deed A", "0xabc", address(0xaa));

    assert_eq!(
        harness.client.register_asset("", "0xabc").await.cause(),
        Some(ErrorCode::InvalidInput)
    );
    assert_eq!(
        harness
            .client
            .transfer_ownership(AssetId(1), "not-an-address")
            .await
            .cause(),
        Some(ErrorCode::InvalidInput)
    );
    assert_eq!(harness.ledger.submission_count(), 0);
}

#[tokio::test]
async fn verify_reports_match_and_mismatch_as_successful_checks() {
    let harness = Harness::connected(vec![address(0xaa)]).await;
    harness.client.register_asset("Deed A", "0xabc").await;

    assert_eq!(
        harness.client.verify_asset(AssetId(1), "0xabc").await,
        Ok(true)
    );
    assert_eq!(
        harness.client.verify_asset(AssetId(1), "0xdef").await,
        Ok(false)
    );
    let status = harness.client.current_outcome_message().expect("reported");
    assert_eq!(status.severity, Severity::Success);
    assert!(status.text.contains("does not match"));

    let err = harness
        .client
        .verify_asset(AssetId(2), "0xabc")
        .await
        .expect_err("out of range");
    assert_eq!(err.code, ErrorCode::ReadError);
}

#[tokio::test]
async fn identity_change_rebinds_and_marks_catalog_stale() {
    let harness = Harness::connected(vec![address(0xaa)]).await;
    let mut events = harness.client.subscribe_events();

    harness.wallet.set_identities(vec![address(0xbb), address(0xaa)]);

    let changed = next_matching(&mut events, |event| {
        matches!(event, ClientEvent::SessionChanged(_))
    })
    .await;
    assert_eq!(changed, ClientEvent::SessionChanged(Some(address(0xbb))));
    next_matching(&mut events, |event| {
        matches!(event, ClientEvent::BindingInvalidated)
    })
    .await;

    // The listener renews the binding right after invalidating it.
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(binding) = harness.client.binding().await {
                if binding.caller() == &address(0xbb) {
                    break;
                }
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("rebound to new identity");

    assert!(harness.client.catalog_is_stale());
    let outcome = harness.client.register_asset("Deed B", "0xbbb").await;
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(
        harness.client.asset(AssetId(1)).await.map(|asset| asset.owner),
        Some(address(0xbb))
    );
    assert!(!harness.client.catalog_is_stale());
}

#[tokio::test]
async fn empty_identity_list_disconnects_and_drops_binding() {
    let harness = Harness::connected(vec![address(0xaa)]).await;

    harness.client.apply_identities(Vec::new()).await;

    assert_eq!(harness.client.session().await, Session::Disconnected);
    assert_eq!(harness.client.binding().await, None);
    assert_eq!(
        harness.client.refresh_catalog().await.cause(),
        Some(ErrorCode::NotConnected)
    );
}

#[tokio::test]
async fn reads_are_not_blocked_by_an_in_flight_write() {
    let harness = Harness::connected(vec![address(0xaa)]).await;
    harness.ledger.preload("Deed A", "0xabc", address(0xaa));
    harness.ledger.hold_finality();
    let mut states = harness.client.subscribe_transaction_state();

    let client = Arc::clone(&harness.client);
    let write = tokio::spawn(async move { client.register_asset("Deed B", "0xdef").await });
    states
        .wait_for(|state| matches!(state, TransactionState::AwaitingFinality { .. }))
        .await
        .expect("awaiting finality");

    assert!(harness.client.is_busy());
    assert_eq!(
        harness.client.verify_asset(AssetId(1), "0xabc").await,
        Ok(true)
    );
    assert!(harness.client.refresh_catalog().await.is_success());
    assert_eq!(harness.client.current_assets().await.len(), 1);

    harness.ledger.release_finality();
    assert!(write.await.expect("join").is_success());
    assert_eq!(harness.client.current_assets().await.len(), 2);
}

#[tokio::test]
async fn handle_trait_forwards_to_the_client() {
    let harness = Harness::new(vec![address(0xaa)]);
    let handle: Arc<dyn RegistryHandle> = Arc::new(Arc::clone(&harness.client));

    assert!(handle.connect_wallet().await.is_success());
    assert!(handle.connect_ledger().await.is_success());
    assert!(handle.register_asset("Deed A", "0xabc").await.is_success());
    assert_eq!(handle.current_assets().await.len(), 1);
    assert!(!handle.is_busy());
    assert_eq!(
        handle.current_outcome_message().map(|status| status.severity),
        Some(Severity::Success)
    );
}
