//! Connection manager: turns a discovered wallet into a session bound to the
//! required network.

use alloy::primitives::Address;
use serde_json::json;

use crate::amount::Amount;
use crate::config::NetworkDescriptor;
use crate::constants::{REQUEST_PENDING_CODE, UNRECOGNIZED_CHAIN_CODE, USER_REJECTED_CODE};
use crate::discovery::{HostProvider, WalletCandidate};
use crate::error::{RpcError, WalletError, WalletErrorKind};
use crate::provider::{
    parse_accounts, parse_quantity, parse_u64_quantity, WalletProvider, ETH_ACCOUNTS,
    ETH_CHAIN_ID, ETH_GET_BALANCE, ETH_REQUEST_ACCOUNTS, WALLET_ADD_CHAIN, WALLET_SWITCH_CHAIN,
};

/// An authorized signing session on the required network.
///
/// Only [`ConnectionManager::connect`] creates sessions, and it never returns
/// one whose `network_id` differs from the required chain.
#[derive(Debug, Clone)]
pub struct Session<H> {
    pub address: Address,
    pub native_balance: Amount,
    pub network_id: u64,
    pub wallet_name: String,
    pub handle: H,
}

impl<H> Session<H> {
    /// EIP-55 checksummed payer address.
    pub fn checksum_address(&self) -> String {
        self.address.to_checksum(None)
    }
}

pub struct ConnectionManager {
    network: NetworkDescriptor,
}

impl ConnectionManager {
    pub fn new(network: NetworkDescriptor) -> Self {
        Self { network }
    }

    /// Authorize `candidate`, move it to the required network, and read the
    /// resulting account.
    pub async fn connect<H>(&self, candidate: &WalletCandidate<H>) -> Result<Session<H>, WalletError>
    where
        H: HostProvider + WalletProvider,
    {
        let handle = resolve_handle(candidate);

        let accounts = handle
            .request(ETH_REQUEST_ACCOUNTS, json!([]))
            .await
            .map_err(|e| authorization_error(&candidate.name, e))?;
        let accounts = parse_accounts(&accounts)
            .map_err(|e| WalletError::new(WalletErrorKind::Unknown, e))?;
        if accounts.is_empty() {
            return Err(WalletError::new(
                WalletErrorKind::NoAccounts,
                "No accounts found",
            ));
        }
        tracing::debug!(wallet = %candidate.name, accounts = accounts.len(), "accounts authorized");

        self.switch_network(&handle).await?;

        let address = match handle.request(ETH_ACCOUNTS, json!([])).await {
            Ok(v) => parse_accounts(&v)
                .ok()
                .and_then(|a| a.first().copied())
                .unwrap_or(accounts[0]),
            Err(e) => {
                tracing::debug!(error = %e, "eth_accounts failed, using authorized account");
                accounts[0]
            }
        };

        let balance = handle
            .request(
                ETH_GET_BALANCE,
                json!([address.to_checksum(None), "latest"]),
            )
            .await
            .map_err(|e| read_error("balance", e))
            .and_then(|v| {
                parse_quantity(&v).map_err(|e| WalletError::new(WalletErrorKind::Unknown, e))
            })?;

        let network_id = handle
            .request(ETH_CHAIN_ID, json!([]))
            .await
            .map_err(|e| read_error("chain id", e))
            .and_then(|v| {
                parse_u64_quantity(&v).map_err(|e| WalletError::new(WalletErrorKind::Unknown, e))
            })?;

        if network_id != self.network.chain_id {
            tracing::warn!(
                expected = self.network.chain_id,
                actual = network_id,
                wallet = %candidate.name,
                "wallet reports wrong network after switch"
            );
            return Err(WalletError::new(
                WalletErrorKind::WrongNetwork,
                format!(
                    "Please switch to {} network in your wallet.",
                    self.network.chain_name
                ),
            ));
        }

        let native_balance =
            Amount::from_units(balance, self.network.native_currency.decimals);

        tracing::info!(
            wallet = %candidate.name,
            address = %address,
            chain_id = network_id,
            native_balance = %native_balance,
            "wallet connected"
        );

        Ok(Session {
            address,
            native_balance,
            network_id,
            wallet_name: candidate.name.clone(),
            handle,
        })
    }

    async fn switch_network<W: WalletProvider>(&self, handle: &W) -> Result<(), WalletError> {
        let params = json!([{ "chainId": self.network.hex_chain_id() }]);
        let err = match handle.request(WALLET_SWITCH_CHAIN, params.clone()).await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };

        if err.code != UNRECOGNIZED_CHAIN_CODE {
            return Err(self.switch_error(err));
        }

        tracing::info!(chain_id = self.network.chain_id, "wallet lacks network, registering it");
        handle
            .request(WALLET_ADD_CHAIN, json!([self.network.add_chain_params()]))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "network registration failed");
                WalletError::new(
                    WalletErrorKind::NetworkAddFailed,
                    format!("Failed to add {}: {}", self.network.chain_name, e.message),
                )
            })?;

        handle
            .request(WALLET_SWITCH_CHAIN, params)
            .await
            .map(|_| ())
            .map_err(|e| self.switch_error(e))
    }

    fn switch_error(&self, err: RpcError) -> WalletError {
        tracing::warn!(code = err.code, error = %err.message, "network switch failed");
        if err.code == USER_REJECTED_CODE {
            WalletError::new(
                WalletErrorKind::UserRejected,
                format!("User rejected network switch to {}", self.network.chain_name),
            )
        } else {
            WalletError::new(
                WalletErrorKind::NetworkSwitchFailed,
                format!(
                    "Failed to switch to {}: {}",
                    self.network.chain_name, err.message
                ),
            )
        }
    }
}

/// Pick the concrete provider behind a multiplexed handle, falling back to
/// the handle itself.
fn resolve_handle<H: HostProvider>(candidate: &WalletCandidate<H>) -> H {
    if let Some(flag) = candidate.vendor.flag() {
        if let Ok(subs) = candidate.handle.sub_providers() {
            if let Some(sub) = subs.into_iter().find(|p| p.flag(flag).unwrap_or(false)) {
                return sub;
            }
        }
    }
    candidate.handle.clone()
}

fn authorization_error(wallet: &str, err: RpcError) -> WalletError {
    tracing::warn!(wallet, code = err.code, error = %err.message, "account authorization failed");
    match err.code {
        USER_REJECTED_CODE => WalletError::new(
            WalletErrorKind::UserRejected,
            "Connection rejected by user",
        ),
        REQUEST_PENDING_CODE => WalletError::new(
            WalletErrorKind::RequestPending,
            "Connection request already pending. Please check your wallet.",
        ),
        _ => WalletError::new(
            WalletErrorKind::Unknown,
            format!("Failed to connect {wallet}: {}", err.message),
        ),
    }
}

fn read_error(what: &str, err: RpcError) -> WalletError {
    tracing::warn!(what, code = err.code, error = %err.message, "wallet read failed");
    WalletError::new(
        WalletErrorKind::NetworkTransient,
        format!("Failed to read {what} from wallet: {}", err.message),
    )
}
