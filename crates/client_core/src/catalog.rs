use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::domain::{Asset, AssetId};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::{
    error::RegistryError,
    gateway::{LedgerBinding, LedgerGateway},
};

const MAX_PREALLOCATED_ASSETS: usize = 4096;

/// Locally cached, id-ordered view of every registered asset.
///
/// A refresh builds the complete new list before swapping it in, so readers see
/// either the previous snapshot or the new one, never a mix.
#[derive(Default)]
pub struct AssetCatalog {
    snapshot: RwLock<Arc<Vec<Asset>>>,
    refresh_lock: Mutex<()>,
    stale: AtomicBool,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-reads `assetCount` and then assets `1..=assetCount` in order.
    ///
    /// On any failed read the previous snapshot is kept and the error returned.
    pub async fn refresh(
        &self,
        gateway: &LedgerGateway,
        binding: &LedgerBinding,
    ) -> Result<usize, RegistryError> {
        let _serial = self.refresh_lock.lock().await;

        let assets = match fetch_all(gateway, binding).await {
            Ok(assets) => assets,
            Err(err) => {
                warn!(error = %err, "catalog refresh failed; keeping previous snapshot");
                return Err(err);
            }
        };

        let count = assets.len();
        *self.snapshot.write().await = Arc::new(assets);
        self.stale.store(false, Ordering::Release);
        info!(count, "asset catalog refreshed");
        Ok(count)
    }

    pub async fn current(&self) -> Arc<Vec<Asset>> {
        Arc::clone(&*self.snapshot.read().await)
    }

    pub async fn asset(&self, id: AssetId) -> Option<Asset> {
        let index = id.index()?;
        self.snapshot.read().await.get(index).cloned()
    }

    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }
}

async fn fetch_all(
    gateway: &LedgerGateway,
    binding: &LedgerBinding,
) -> Result<Vec<Asset>, RegistryError> {
    let count = gateway.read_asset_count(binding).await?;
    let capacity = usize::try_from(count)
        .unwrap_or(usize::MAX)
        .min(MAX_PREALLOCATED_ASSETS);

    let mut assets = Vec::with_capacity(capacity);
    for raw_id in 1..=count {
        assets.push(gateway.read_asset(binding, AssetId(raw_id)).await?);
    }
    Ok(assets)
}
