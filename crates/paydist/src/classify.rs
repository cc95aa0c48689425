//! Maps raw Ledger Client failures at the approval and execution steps onto
//! the wallet error taxonomy.

use crate::constants::USER_REJECTED_CODE;
use crate::error::{LedgerError, WalletError, WalletErrorKind};

/// The write step a failure happened in; only affects message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Approval,
    Execution,
}

impl Step {
    fn noun(self) -> &'static str {
        match self {
            Step::Approval => "Approval",
            Step::Execution => "Payment",
        }
    }
}

const TRANSIENT_PATTERNS: &[&str] = &[
    "missing trie node",
    "network error",
    "network changed",
    "timeout",
    "timed out",
    "connection",
    "failed to fetch",
    "error sending request",
    "header not found",
];

/// Classify `err`, first match wins:
///
/// 1. user-declined signing (code 4001 or a "user rejected/denied" message)
/// 2. native funds too low for fees
/// 3. token balance/allowance shortfall (message kept verbatim)
/// 4. on-chain revert during submission
/// 5. transport failures
/// 6. anything else, original text preserved
pub fn classify(step: Step, err: &LedgerError, native_symbol: &str) -> WalletError {
    let lower = err.message.to_ascii_lowercase();

    let classified = if err.code == Some(USER_REJECTED_CODE)
        || lower.contains("user rejected")
        || lower.contains("user denied")
    {
        WalletError::new(
            WalletErrorKind::UserRejected,
            format!("{} rejected by user", step.noun()),
        )
    } else if lower.contains("insufficient funds") {
        WalletError::new(
            WalletErrorKind::InsufficientGas,
            format!("Insufficient {native_symbol} for gas fees"),
        )
    } else if is_shortfall(&lower, "balance") {
        WalletError::new(WalletErrorKind::InsufficientBalance, err.message.clone())
    } else if is_shortfall(&lower, "allowance") {
        WalletError::new(WalletErrorKind::InsufficientAllowance, err.message.clone())
    } else if lower.contains("execution reverted") {
        WalletError::new(
            WalletErrorKind::ExecutionReverted,
            format!("{} reverted on chain: {}", step.noun(), err.message),
        )
    } else if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        WalletError::new(
            WalletErrorKind::NetworkTransient,
            "Network connectivity issue. Please try again in a moment.",
        )
    } else {
        WalletError::new(
            WalletErrorKind::Unknown,
            format!("{} failed: {}", step.noun(), err.message),
        )
    };

    tracing::warn!(
        ?step,
        kind = ?classified.kind,
        code = ?err.code,
        raw = %err.message,
        "ledger call failed"
    );
    classified
}

fn is_shortfall(lower: &str, what: &str) -> bool {
    lower.contains(what) && (lower.contains("insufficient") || lower.contains("exceeds"))
}
