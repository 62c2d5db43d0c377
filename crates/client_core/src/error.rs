//! Maps collaborator failures onto the registry error taxonomy at the
//! suspension point where they surface.

use ledger_integration::{LedgerError, WalletError};
pub use shared::error::{ErrorCode, RegistryError};

pub(crate) fn from_wallet(err: WalletError) -> RegistryError {
    match err {
        WalletError::Unavailable => RegistryError::no_provider(),
        WalletError::Rejected(message) => RegistryError::new(ErrorCode::UserRejected, message),
        WalletError::Provider(message) => RegistryError::new(ErrorCode::ProviderError, message),
    }
}

pub(crate) fn from_read(err: LedgerError) -> RegistryError {
    RegistryError::read(err.to_string())
}

pub(crate) fn from_write(err: LedgerError) -> RegistryError {
    RegistryError::rejected(err.to_string())
}
