//! Wallet connection and approve-then-distribute token payments for EVM chains.
//!
//! Detects injected wallets, connects one on the required network, checks the
//! payer's token balance and allowance, then drives approval and execution of
//! a payment split across a fixed recipient list.
//!
//! # Flow
//!
//! - **Discovery** ([`discover`]) finds injected wallets without touching the network
//! - **Connection** ([`ConnectionManager`]) authorizes and switches networks
//! - **Eligibility** ([`EligibilityChecker`]) compares balance and allowance to the price
//! - **Controller** ([`PaymentFlowController`]) sequences approval and execution
//! - **Receipt** ([`ReceiptBuilder`]) turns a confirmed execution into a [`PaymentRecord`]
//!
//! Chain access goes through the [`LedgerClient`] trait. [`WalletLedger`]
//! signs through the connected wallet; [`AlloyLedger`] (feature `full`) uses
//! an alloy provider.
//!
//! # Quick example (eligibility)
//!
//! ```no_run
//! use alloy::providers::ProviderBuilder;
//! use paydist::{AlloyLedger, DeploymentConfig, EligibilityChecker};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = DeploymentConfig::default();
//! let provider = ProviderBuilder::new()
//!     .connect_http(config.network.rpc_urls[0].parse().unwrap());
//! let ledger = AlloyLedger::new(provider);
//!
//! let checker = EligibilityChecker::new(config.token, config.route.spender());
//! let payer = "0x73D5906Cbf60ecD8b5C0F89ae25fbEabeFdc894E".parse().unwrap();
//! let snapshot = checker
//!     .check(&ledger, payer, &config.required_total)
//!     .await
//!     .unwrap();
//! println!("eligible: {}", snapshot.is_eligible());
//! # }
//! ```

// Core types
pub mod amount;
pub mod config;
pub mod constants;
pub mod error;

// Wallet side
pub mod connection;
pub mod discovery;
pub mod provider;

// Chain side
pub mod ledger;
pub mod rpc_ledger;
#[cfg(feature = "full")]
pub mod erc20;

// Flow
pub mod classify;
pub mod controller;
pub mod eligibility;
pub mod receipt;

use alloy::sol;

// ERC-20 token interface used for balance, allowance, and payment calls.
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function decimals() external view returns (uint8);
        function approve(address spender, uint256 value) external returns (bool);
        function transfer(address to, uint256 value) external returns (bool);
    }
}

// Distributor contract: pulls the configured total from the caller under an
// allowance and splits it across its recipients.
sol! {
    #[sol(rpc)]
    interface IPaymentDistributor {
        function distributePayment() external;
        function getTotalAmount() external view returns (uint256);
    }
}

// Re-exports
pub use amount::Amount;
pub use config::{Distribution, DeploymentConfig, ExecutionMode, ExecutionRoute, NetworkDescriptor};
pub use constants::*;
pub use error::{
    AmountError, ConfigError, FlowError, HostAccessError, LedgerError, RpcError, WalletError,
    WalletErrorKind,
};

pub use connection::{ConnectionManager, Session};
pub use discovery::{discover, Host, HostProvider, Vendor, WalletCandidate};
pub use provider::WalletProvider;

#[cfg(feature = "full")]
pub use erc20::AlloyLedger;
#[cfg(feature = "full")]
pub use ledger::TokioTimer;
pub use ledger::{LedgerClient, LedgerConnector, Timer, TxHandle, TxReceipt, TxStatus};
pub use rpc_ledger::WalletLedger;

pub use classify::{classify, Step};
pub use controller::{FlowState, PaymentFlowController};
pub use eligibility::{EligibilityChecker, EligibilitySnapshot};
pub use receipt::{Counterparty, ExecutionResult, PaymentRecord, ReceiptBuilder};
