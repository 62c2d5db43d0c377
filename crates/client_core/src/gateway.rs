use std::sync::Arc;

use ledger_integration::{CallerHandle, LedgerProvider, PendingTransaction};
use shared::domain::{Address, Asset, AssetId};
use tracing::debug;

use crate::{
    error::{from_read, from_write, ErrorCode, RegistryError},
    session::Session,
};

/// Callable handle to the registry, tied to the identity it was bound for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerBinding {
    endpoint_address: Address,
    caller: CallerHandle,
}

impl LedgerBinding {
    pub fn endpoint_address(&self) -> &Address {
        &self.endpoint_address
    }

    pub fn caller(&self) -> &Address {
        &self.caller.address
    }

    /// A binding stays usable only while the session still runs under its identity.
    pub fn is_valid_for(&self, session: &Session) -> bool {
        session.active_address() == Some(&self.caller.address)
    }
}

pub struct LedgerGateway {
    provider: Arc<dyn LedgerProvider>,
    endpoint_address: Address,
}

impl LedgerGateway {
    pub fn new(provider: Arc<dyn LedgerProvider>, endpoint_address: Address) -> Self {
        Self {
            provider,
            endpoint_address,
        }
    }

    pub fn endpoint_address(&self) -> &Address {
        &self.endpoint_address
    }

    pub fn bind(&self, session: &Session, caller: CallerHandle) -> Result<LedgerBinding, RegistryError> {
        let Some(address) = session.active_address() else {
            return Err(RegistryError::not_connected());
        };
        if &caller.address != address {
            return Err(RegistryError::new(
                ErrorCode::NotConnected,
                format!("signer {} is not the active account {address}", caller.address),
            ));
        }

        Ok(LedgerBinding {
            endpoint_address: self.endpoint_address.clone(),
            caller,
        })
    }

    pub async fn read_asset_count(&self, binding: &LedgerBinding) -> Result<u64, RegistryError> {
        let count = self
            .provider
            .asset_count(&binding.endpoint_address)
            .await
            .map_err(from_read)?;
        debug!(count, "read assetCount");
        Ok(count)
    }

    pub async fn read_asset(
        &self,
        binding: &LedgerBinding,
        id: AssetId,
    ) -> Result<Asset, RegistryError> {
        let record = self
            .provider
            .get_asset(&binding.endpoint_address, id)
            .await
            .map_err(from_read)?;
        Ok(Asset {
            id,
            name: record.name,
            content_hash: record.content_hash,
            owner: record.owner,
            registered_at: record.registered_at,
        })
    }

    pub async fn read_verify(
        &self,
        binding: &LedgerBinding,
        id: AssetId,
        content_hash: &str,
    ) -> Result<bool, RegistryError> {
        self.provider
            .verify_asset(&binding.endpoint_address, id, content_hash)
            .await
            .map_err(from_read)
    }

    /// Validates locally, then hands the call to the wallet/ledger. Does not wait for finality.
    pub async fn submit_register(
        &self,
        binding: &LedgerBinding,
        name: &str,
        content_hash: &str,
    ) -> Result<Box<dyn PendingTransaction>, RegistryError> {
        let (name, content_hash) = validate_registration(name, content_hash)?;
        let pending = self
            .provider
            .register_asset(&binding.endpoint_address, &binding.caller, name, content_hash)
            .await
            .map_err(from_write)?;
        debug!(tx = %pending.tx_hash(), "registerAsset submitted");
        Ok(pending)
    }

    pub async fn submit_transfer(
        &self,
        binding: &LedgerBinding,
        id: AssetId,
        new_owner: &str,
    ) -> Result<Box<dyn PendingTransaction>, RegistryError> {
        if id.0 == 0 {
            return Err(RegistryError::invalid_input("asset ids start at 1"));
        }
        let new_owner = Address::parse(new_owner)
            .map_err(|err| RegistryError::invalid_input(format!("new owner: {err}")))?;

        let count = self.read_asset_count(binding).await?;
        if id.0 > count {
            return Err(RegistryError::invalid_input(format!(
                "asset {id} does not exist; registry holds {count} assets"
            )));
        }

        let pending = self
            .provider
            .transfer_ownership(&binding.endpoint_address, &binding.caller, id, &new_owner)
            .await
            .map_err(from_write)?;
        debug!(tx = %pending.tx_hash(), asset_id = id.0, "transferOwnership submitted");
        Ok(pending)
    }
}

fn validate_registration<'a>(
    name: &'a str,
    content_hash: &'a str,
) -> Result<(&'a str, &'a str), RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::invalid_input("asset name must not be empty"));
    }
    let content_hash = content_hash.trim();
    if content_hash.is_empty() {
        return Err(RegistryError::invalid_input("content hash must not be empty"));
    }
    Ok((name, content_hash))
}
