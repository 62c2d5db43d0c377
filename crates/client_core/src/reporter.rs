use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use shared::error::{ErrorCode, RegistryError};

/// Result of one attempted operation, handed straight to the reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Success { message: String },
    Failure { message: String, cause: ErrorCode },
}

impl OperationOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        OperationOutcome::Success {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success { .. })
    }

    pub fn cause(&self) -> Option<ErrorCode> {
        match self {
            OperationOutcome::Success { .. } => None,
            OperationOutcome::Failure { cause, .. } => Some(*cause),
        }
    }
}

impl From<RegistryError> for OperationOutcome {
    fn from(err: RegistryError) -> Self {
        OperationOutcome::Failure {
            message: err.message,
            cause: err.code,
        }
    }
}

impl<T> From<Result<T, RegistryError>> for OperationOutcome
where
    T: Into<String>,
{
    fn from(result: Result<T, RegistryError>) -> Self {
        match result {
            Ok(message) => OperationOutcome::success(message),
            Err(err) => err.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub text: String,
    pub severity: Severity,
}

/// Keeps exactly one current status line; each report replaces the last.
#[derive(Default)]
pub struct OutcomeReporter {
    current: Mutex<Option<StatusMessage>>,
}

impl OutcomeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, outcome: &OperationOutcome) -> StatusMessage {
        let status = render(outcome);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(status.clone());
        status
    }

    pub fn current(&self) -> Option<StatusMessage> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn render(outcome: &OperationOutcome) -> StatusMessage {
    match outcome {
        OperationOutcome::Success { message } => StatusMessage {
            text: message.clone(),
            severity: Severity::Success,
        },
        OperationOutcome::Failure { message, cause } => StatusMessage {
            text: format!("{}: {message}", cause.description()),
            severity: Severity::Error,
        },
    }
}
