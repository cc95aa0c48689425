use serde::Serialize;
use thiserror::Error;

use crate::controller::FlowState;

/// Classification of every failure the payment flow can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WalletErrorKind {
    NoAccounts,
    UserRejected,
    /// The wallet already has an authorization request open.
    RequestPending,
    NetworkAddFailed,
    NetworkSwitchFailed,
    WrongNetwork,
    EligibilityCheckFailed,
    ApprovalInsufficient,
    InsufficientBalance,
    InsufficientAllowance,
    InsufficientGas,
    ExecutionReverted,
    /// The distributor contract did not answer a read before payment.
    ContractUnreachable,
    /// Transport or connectivity failure; safe to retry.
    NetworkTransient,
    Unknown,
}

impl WalletErrorKind {
    /// Whether retrying the same action without user changes can succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            WalletErrorKind::NetworkTransient
                | WalletErrorKind::EligibilityCheckFailed
                | WalletErrorKind::RequestPending
        )
    }
}

/// A classified, user-presentable failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct WalletError {
    pub kind: WalletErrorKind,
    pub message: String,
}

impl WalletError {
    pub fn new(kind: WalletErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors returned by controller actions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("another wallet action is still in progress")]
    Busy,

    #[error("{action} is not available while {state:?}")]
    InvalidState {
        action: &'static str,
        state: FlowState,
    },

    #[error("no wallet connected")]
    NotConnected,

    #[error("action abandoned: the wallet was disconnected")]
    Cancelled,

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl FlowError {
    /// The classified wallet error, if this failure came from the wallet or ledger.
    pub fn wallet_error(&self) -> Option<&WalletError> {
        match self {
            FlowError::Wallet(e) => Some(e),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<WalletErrorKind> {
        self.wallet_error().map(|e| e.kind)
    }
}

/// Error object returned by an EIP-1193 `request` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("wallet rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failure reported by a Ledger Client call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LedgerError {
    /// Provider error code, when the failure carried one.
    pub code: Option<i64>,
    pub message: String,
}

impl LedgerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl From<RpcError> for LedgerError {
    fn from(e: RpcError) -> Self {
        Self {
            code: Some(e.code),
            message: e.message,
        }
    }
}

/// The host environment refused access to its signing capability
/// (e.g. a cross-origin frame restriction).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host access denied: {0}")]
pub struct HostAccessError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("invalid amount '{0}': no numeric content")]
    Empty(String),

    #[error("invalid amount '{0}': {1}")]
    Malformed(String, &'static str),

    #[error("amount '{0}' has more than {1} decimal places")]
    TooPrecise(String, u8),

    #[error("amount overflow")]
    Overflow,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid address in {0}: {1}")]
    InvalidAddress(&'static str, String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid amount in {0}: {1}")]
    InvalidAmount(&'static str, AmountError),

    #[error("invalid value in {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("invalid distribution list: {0}")]
    InvalidDistributions(String),

    #[error("distribution total {sum} does not match required total {required}")]
    TotalMismatch { sum: String, required: String },

    #[error("execution mode {0:?} requires an address that is not configured")]
    ModeUnavailable(crate::config::ExecutionMode),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
