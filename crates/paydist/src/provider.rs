//! EIP-1193 request interface exposed by injected wallets.

use std::future::Future;

use alloy::primitives::{Address, U256};
use serde_json::Value;

use crate::error::RpcError;

pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
pub const ETH_ACCOUNTS: &str = "eth_accounts";
pub const ETH_CHAIN_ID: &str = "eth_chainId";
pub const ETH_GET_BALANCE: &str = "eth_getBalance";
pub const ETH_CALL: &str = "eth_call";
pub const ETH_SEND_TRANSACTION: &str = "eth_sendTransaction";
pub const ETH_GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
pub const WALLET_SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
pub const WALLET_ADD_CHAIN: &str = "wallet_addEthereumChain";

/// A signing provider that answers JSON-RPC style requests.
///
/// Futures are not required to be `Send`: browser implementations hold
/// JavaScript handles that never leave their thread.
pub trait WalletProvider {
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, RpcError>>;
}

/// Parse a `0x`-prefixed hex quantity into a U256.
pub fn parse_quantity(value: &Value) -> Result<U256, String> {
    let s = value
        .as_str()
        .ok_or_else(|| format!("expected hex quantity, got {value}"))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|e| format!("invalid hex quantity '{s}': {e}"))
}

/// Parse a `0x`-prefixed hex quantity that must fit in a u64 (chain ids,
/// block numbers, gas).
pub fn parse_u64_quantity(value: &Value) -> Result<u64, String> {
    let n = parse_quantity(value)?;
    u64::try_from(n).map_err(|_| format!("quantity {n} does not fit in u64"))
}

/// Parse an account list as returned by `eth_accounts`/`eth_requestAccounts`.
pub fn parse_accounts(value: &Value) -> Result<Vec<Address>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected account list, got {value}"))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| format!("expected address string, got {v}"))?
                .parse::<Address>()
                .map_err(|e| format!("invalid account address: {e}"))
        })
        .collect()
}
