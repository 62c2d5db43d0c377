use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NoProviderDetected,
    NotConnected,
    UserRejected,
    ProviderError,
    ReadError,
    TransactionRejected,
    OperationInProgress,
    InvalidInput,
}

impl ErrorCode {
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::NoProviderDetected => "No wallet provider detected",
            ErrorCode::NotConnected => "Wallet not connected",
            ErrorCode::UserRejected => "Request rejected in wallet",
            ErrorCode::ProviderError => "Wallet provider error",
            ErrorCode::ReadError => "Ledger read failed",
            ErrorCode::TransactionRejected => "Transaction rejected",
            ErrorCode::OperationInProgress => "Another transaction is in progress",
            ErrorCode::InvalidInput => "Invalid input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}: {message}", .code.description())]
pub struct RegistryError {
    pub code: ErrorCode,
    pub message: String,
}

impl RegistryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn no_provider() -> Self {
        Self::new(
            ErrorCode::NoProviderDetected,
            "install or unlock a wallet and retry",
        )
    }

    pub fn not_connected() -> Self {
        Self::new(ErrorCode::NotConnected, "connect a wallet first")
    }

    pub fn in_progress() -> Self {
        Self::new(
            ErrorCode::OperationInProgress,
            "wait for the pending transaction to finish",
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn read(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ReadError, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransactionRejected, message)
    }
}
