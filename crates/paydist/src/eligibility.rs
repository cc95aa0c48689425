//! Balance and allowance checks against the required payment amount.

use alloy::primitives::{Address, U256};
use serde::Serialize;

use crate::amount::Amount;
use crate::error::{LedgerError, WalletError, WalletErrorKind};
use crate::ledger::LedgerClient;

/// One reading of the payer's balance and allowance.
///
/// Figures are in the token's smallest unit; the comparisons were made there
/// too, so `has_balance` is exact at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibilitySnapshot {
    pub has_balance: bool,
    pub has_allowance: bool,
    pub balance: U256,
    /// `None` when the execution mode needs no spender.
    pub allowance: Option<U256>,
    pub required: U256,
    pub decimals: u8,
}

impl EligibilitySnapshot {
    pub fn current_balance(&self) -> Amount {
        Amount::from_units(self.balance, self.decimals)
    }

    pub fn current_allowance(&self) -> Option<Amount> {
        self.allowance
            .map(|a| Amount::from_units(a, self.decimals))
    }

    pub fn required_amount(&self) -> Amount {
        Amount::from_units(self.required, self.decimals)
    }

    pub fn is_eligible(&self) -> bool {
        self.has_balance && self.has_allowance
    }

    /// The first unmet condition, worded for the user.
    pub fn unmet(&self, symbol: &str) -> Option<WalletError> {
        if !self.has_balance {
            return Some(WalletError::new(
                WalletErrorKind::InsufficientBalance,
                format!(
                    "Insufficient {symbol} balance. You need {} {symbol} to make this payment (current balance: {} {symbol}).",
                    self.required_amount(),
                    self.current_balance()
                ),
            ));
        }
        if !self.has_allowance {
            return Some(WalletError::new(
                WalletErrorKind::InsufficientAllowance,
                format!(
                    "Insufficient {symbol} allowance. Please approve {} {symbol} for the smart contract first.",
                    self.required_amount()
                ),
            ));
        }
        None
    }
}

pub struct EligibilityChecker {
    token: Address,
    spender: Option<Address>,
}

impl EligibilityChecker {
    pub fn new(token: Address, spender: Option<Address>) -> Self {
        Self { token, spender }
    }

    /// Read balance (and allowance when a spender is configured) for `owner`.
    ///
    /// Any read failure is `EligibilityCheckFailed`: the caller must treat
    /// the result as unknown, not as ineligible.
    pub async fn check<L: LedgerClient>(
        &self,
        ledger: &L,
        owner: Address,
        required: &Amount,
    ) -> Result<EligibilitySnapshot, WalletError> {
        let decimals = ledger
            .read_decimals(self.token)
            .await
            .map_err(|e| read_failed("decimals", e))?;
        let required_units = required.to_units(decimals).map_err(|e| {
            WalletError::new(
                WalletErrorKind::EligibilityCheckFailed,
                format!("Required amount cannot be expressed in token units: {e}"),
            )
        })?;

        let balance = ledger
            .read_balance(self.token, owner)
            .await
            .map_err(|e| read_failed("balance", e))?;

        let allowance = match self.spender {
            Some(spender) => Some(
                ledger
                    .read_allowance(self.token, owner, spender)
                    .await
                    .map_err(|e| read_failed("allowance", e))?,
            ),
            None => None,
        };

        let snapshot = EligibilitySnapshot {
            has_balance: balance >= required_units,
            has_allowance: allowance.is_none_or(|a| a >= required_units),
            balance,
            allowance,
            required: required_units,
            decimals,
        };

        tracing::info!(
            %owner,
            balance = %snapshot.current_balance(),
            allowance = ?snapshot.current_allowance().map(|a| a.to_string()),
            required = %required,
            has_balance = snapshot.has_balance,
            has_allowance = snapshot.has_allowance,
            "eligibility checked"
        );

        Ok(snapshot)
    }
}

fn read_failed(what: &str, err: LedgerError) -> WalletError {
    tracing::warn!(what, code = ?err.code, error = %err.message, "eligibility read failed");
    WalletError::new(
        WalletErrorKind::EligibilityCheckFailed,
        format!("Failed to check payment eligibility ({what}): {}", err.message),
    )
}
