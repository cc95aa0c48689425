//! Ledger Client that routes every call through the connected EIP-1193
//! wallet, so writes are signed by the account the user authorized.

use std::time::Duration;

use alloy::hex;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use serde_json::{json, Value};

use crate::error::LedgerError;
use crate::ledger::{LedgerClient, Timer, TxHandle, TxReceipt, TxStatus};
use crate::provider::{
    parse_u64_quantity, WalletProvider, ETH_CALL, ETH_GET_TRANSACTION_RECEIPT,
    ETH_SEND_TRANSACTION,
};
use crate::{IPaymentDistributor, IERC20};

/// Delay between `eth_getTransactionReceipt` polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct WalletLedger<W, T> {
    provider: W,
    from: Address,
    timer: T,
    poll_interval: Duration,
}

impl<W: WalletProvider, T: Timer> WalletLedger<W, T> {
    pub fn new(provider: W, from: Address, timer: T) -> Self {
        Self {
            provider,
            from,
            timer,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn call<C: SolCall>(&self, to: Address, call: C) -> Result<U256, LedgerError> {
        let data = hex::encode_prefixed(call.abi_encode());
        let result = self
            .provider
            .request(
                ETH_CALL,
                json!([{ "to": to.to_checksum(None), "data": data }, "latest"]),
            )
            .await
            .map_err(|e| {
                tracing::debug!(method = C::SIGNATURE, %to, error = %e, "eth_call failed");
                LedgerError::from(e)
            })?;
        decode_word(C::SIGNATURE, &result)
    }

    async fn send<C: SolCall>(&self, to: Address, call: C) -> Result<TxHandle, LedgerError> {
        let data = Bytes::from(call.abi_encode());
        let tx = json!([{
            "from": self.from.to_checksum(None),
            "to": to.to_checksum(None),
            "data": data,
        }]);
        let result = self.provider.request(ETH_SEND_TRANSACTION, tx).await?;
        let hash = result
            .as_str()
            .and_then(|s| s.parse::<TxHash>().ok())
            .ok_or_else(|| {
                LedgerError::new(format!("{} returned no transaction hash: {result}", C::SIGNATURE))
            })?;
        tracing::info!(method = C::SIGNATURE, %to, tx = %hash, "transaction submitted");
        Ok(TxHandle { hash })
    }
}

/// Decode a single 32-byte ABI word from an `eth_call` result.
fn decode_word(method: &str, value: &Value) -> Result<U256, LedgerError> {
    let raw = value
        .as_str()
        .ok_or_else(|| LedgerError::new(format!("{method} returned non-string result: {value}")))?;
    let bytes = hex::decode(raw)
        .map_err(|e| LedgerError::new(format!("{method} returned invalid hex: {e}")))?;
    if bytes.len() < 32 {
        // Empty return data means the address holds no contract
        return Err(LedgerError::new(format!(
            "{method} returned {} bytes; is the contract deployed on this network?",
            bytes.len()
        )));
    }
    Ok(U256::from_be_slice(&bytes[..32]))
}

fn parse_receipt(hash: TxHash, value: &Value) -> Result<TxReceipt, LedgerError> {
    let status = match value.get("status").and_then(Value::as_str) {
        Some("0x1") => TxStatus::Success,
        Some(_) => TxStatus::Reverted,
        None => return Err(LedgerError::new(format!("receipt for {hash} has no status"))),
    };
    let quantity = |field: &str| value.get(field).and_then(|v| parse_u64_quantity(v).ok());
    Ok(TxReceipt {
        status,
        hash,
        block_number: quantity("blockNumber"),
        gas_used: quantity("gasUsed"),
    })
}

impl<W: WalletProvider, T: Timer> LedgerClient for WalletLedger<W, T> {
    async fn read_balance(&self, token: Address, owner: Address) -> Result<U256, LedgerError> {
        self.call(token, IERC20::balanceOfCall { owner }).await
    }

    async fn read_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, LedgerError> {
        self.call(token, IERC20::allowanceCall { owner, spender })
            .await
    }

    async fn read_decimals(&self, token: Address) -> Result<u8, LedgerError> {
        let word = self.call(token, IERC20::decimalsCall {}).await?;
        u8::try_from(word)
            .map_err(|_| LedgerError::new(format!("token {token} reports decimals {word}")))
    }

    async fn read_distribution_total(&self, distributor: Address) -> Result<U256, LedgerError> {
        self.call(distributor, IPaymentDistributor::getTotalAmountCall {})
            .await
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHandle, LedgerError> {
        self.send(token, IERC20::approveCall { spender, value: amount })
            .await
    }

    async fn submit_transfer(
        &self,
        token: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHandle, LedgerError> {
        self.send(
            token,
            IERC20::transferCall {
                to: recipient,
                value: amount,
            },
        )
        .await
    }

    async fn submit_distribution(&self, distributor: Address) -> Result<TxHandle, LedgerError> {
        self.send(distributor, IPaymentDistributor::distributePaymentCall {})
            .await
    }

    /// Poll until the wallet reports a receipt. There is no deadline.
    async fn wait(&self, tx: TxHandle) -> Result<TxReceipt, LedgerError> {
        let params = json!([format!("{:#x}", tx.hash)]);
        loop {
            let result = self
                .provider
                .request(ETH_GET_TRANSACTION_RECEIPT, params.clone())
                .await?;
            if !result.is_null() {
                let receipt = parse_receipt(tx.hash, &result)?;
                tracing::debug!(tx = %tx.hash, status = ?receipt.status, "receipt received");
                return Ok(receipt);
            }
            self.timer.sleep(self.poll_interval).await;
        }
    }
}
