use serde::{Deserialize, Serialize};

use crate::domain::{Address, AssetId, BlockNumber, TxHash};

/// Raw `getAsset` result: `(name, hash, owner, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub name: String,
    pub content_hash: String,
    pub owner: Address,
    pub registered_at: i64,
}

/// Change notifications emitted by the registry contract once a mutation is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum LedgerEvent {
    AssetRegistered {
        id: AssetId,
        owner: Address,
        content_hash: String,
    },
    OwnershipTransferred {
        id: AssetId,
        from: Address,
        to: Address,
    },
}

impl LedgerEvent {
    pub fn asset_id(&self) -> AssetId {
        match self {
            LedgerEvent::AssetRegistered { id, .. } | LedgerEvent::OwnershipTransferred { id, .. } => {
                *id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    pub block_number: BlockNumber,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<LedgerEvent>,
}

impl TransactionReceipt {
    /// Id assigned by the ledger to a freshly registered asset, if this receipt carries one.
    pub fn registered_asset_id(&self) -> Option<AssetId> {
        self.events.iter().find_map(|event| match event {
            LedgerEvent::AssetRegistered { id, .. } => Some(*id),
            _ => None,
        })
    }

    /// New owner of asset `id` when this receipt records its transfer.
    pub fn transferred_to(&self, id: AssetId) -> Option<&Address> {
        self.events
            .iter()
            .filter(|event| event.asset_id() == id)
            .find_map(|event| match event {
                LedgerEvent::OwnershipTransferred { to, .. } => Some(to),
                _ => None,
            })
    }
}
