//! Ledger Client capability: token reads, approvals, transfers, and
//! confirmation waits against the chain.
//!
//! Two implementations ship with the crate:
//! - [`crate::erc20::AlloyLedger`]: alloy provider (native, feature `full`)
//! - [`crate::rpc_ledger::WalletLedger`]: routed through an EIP-1193 wallet

use std::future::Future;
use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use serde::Serialize;

use crate::connection::Session;
use crate::error::LedgerError;

/// A submitted, not yet confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: TxHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxStatus {
    Success,
    Reverted,
}

/// Final status of a transaction once it is included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub status: TxStatus,
    pub hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == TxStatus::Success
    }
}

/// Chain operations the payment flow needs. Amounts are in the token's
/// smallest unit.
///
/// Futures are not required to be `Send` so browser-backed implementations
/// can hold JavaScript handles. `wait` has no deadline: a stuck confirmation
/// stays pending until the chain answers or the caller drops the future.
pub trait LedgerClient {
    fn read_balance(
        &self,
        token: Address,
        owner: Address,
    ) -> impl Future<Output = Result<U256, LedgerError>>;

    fn read_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256, LedgerError>>;

    fn read_decimals(&self, token: Address) -> impl Future<Output = Result<u8, LedgerError>>;

    /// `getTotalAmount()` on the distributor, in token units. Read before
    /// distributing to confirm the contract answers on this network.
    fn read_distribution_total(
        &self,
        distributor: Address,
    ) -> impl Future<Output = Result<U256, LedgerError>>;

    fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxHandle, LedgerError>>;

    fn submit_transfer(
        &self,
        token: Address,
        recipient: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxHandle, LedgerError>>;

    /// Call `distributePayment()` on the distributor contract.
    fn submit_distribution(
        &self,
        distributor: Address,
    ) -> impl Future<Output = Result<TxHandle, LedgerError>>;

    fn wait(&self, tx: TxHandle) -> impl Future<Output = Result<TxReceipt, LedgerError>>;
}

/// Produces the Ledger Client for a freshly connected session, so writes are
/// signed by the wallet the user picked.
pub trait LedgerConnector<H> {
    type Ledger: LedgerClient;

    fn ledger_for(&self, session: &Session<H>) -> Self::Ledger;
}

impl<H, L, F> LedgerConnector<H> for F
where
    F: Fn(&Session<H>) -> L,
    L: LedgerClient,
{
    type Ledger = L;

    fn ledger_for(&self, session: &Session<H>) -> L {
        self(session)
    }
}

/// Async sleep used between confirmation polls.
pub trait Timer {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// Tokio-backed [`Timer`].
#[cfg(feature = "full")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[cfg(feature = "full")]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}
