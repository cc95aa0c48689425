//! Finalized payment records.

use alloy::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::amount::Amount;
use crate::config::{Distribution, ExecutionMode, ExecutionRoute, NetworkDescriptor};
use crate::connection::Session;
use crate::ledger::TxReceipt;

/// Who received the payer's transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "address")]
pub enum Counterparty {
    Contract(Address),
    Admin(Address),
    /// Each recipient was paid directly.
    Recipients,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientLine {
    pub address: Address,
    pub amount: Amount,
    pub percentage: String,
    pub label: String,
}

/// One per-recipient transfer in a direct-transfer payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTransaction {
    pub hash: TxHash,
    pub recipient: Address,
    pub amount: Amount,
    pub label: String,
}

/// What an execution produced, before it is turned into a record.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The variant that actually ran.
    pub route: ExecutionRoute,
    /// Receipt of the primary (or first) transaction.
    pub receipt: TxReceipt,
    pub sub_transactions: Vec<SubTransaction>,
    /// Total as reported by the executing side; informational only.
    pub reported_total: Option<Amount>,
    pub confirmed_at: DateTime<Utc>,
}

/// Immutable record of a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub transaction_hash: TxHash,
    pub payer: Address,
    pub counterparty: Counterparty,
    pub total_amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub per_recipient: Vec<RecipientLine>,
    pub wallet_name: String,
    pub execution_mode: ExecutionMode,
    pub gas_used: Option<u64>,
    pub block_number: Option<u64>,
    pub sub_transactions: Option<Vec<SubTransaction>>,
}

impl PaymentRecord {
    pub fn transaction_url(&self, network: &NetworkDescriptor) -> String {
        network.tx_url(&self.transaction_hash)
    }

    pub fn payer_url(&self, network: &NetworkDescriptor) -> String {
        network.address_url(&self.payer)
    }

    /// Explorer links for each direct transfer, in payment order.
    pub fn sub_transaction_urls(&self, network: &NetworkDescriptor) -> Vec<String> {
        self.sub_transactions
            .iter()
            .flatten()
            .map(|s| network.tx_url(&s.hash))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub struct ReceiptBuilder;

impl ReceiptBuilder {
    /// Assemble the record. `total_amount` is always the sum of the
    /// per-recipient lines; `result.reported_total` never overrides it.
    pub fn build<H>(
        result: ExecutionResult,
        distributions: &[Distribution],
        session: &Session<H>,
    ) -> PaymentRecord {
        let per_recipient: Vec<RecipientLine> = distributions
            .iter()
            .map(|d| RecipientLine {
                address: d.recipient,
                amount: d.amount,
                percentage: d.percentage.clone(),
                label: d.label.clone(),
            })
            .collect();
        let total_amount = Amount::sum(per_recipient.iter().map(|l| l.amount));

        if let Some(reported) = result.reported_total {
            if reported != total_amount {
                tracing::warn!(
                    %reported,
                    computed = %total_amount,
                    "reported total differs from recipient breakdown, using breakdown"
                );
            }
        }

        let counterparty = match result.route {
            ExecutionRoute::SmartContract { distributor } => Counterparty::Contract(distributor),
            ExecutionRoute::AdminMediated { admin } => Counterparty::Admin(admin),
            ExecutionRoute::DirectTransfer => Counterparty::Recipients,
        };
        let sub_transactions =
            (!result.sub_transactions.is_empty()).then_some(result.sub_transactions);

        PaymentRecord {
            transaction_hash: result.receipt.hash,
            payer: session.address,
            counterparty,
            total_amount,
            timestamp: result.confirmed_at,
            per_recipient,
            wallet_name: session.wallet_name.clone(),
            execution_mode: result.route.mode(),
            gas_used: result.receipt.gas_used,
            block_number: result.receipt.block_number,
            sub_transactions,
        }
    }
}
