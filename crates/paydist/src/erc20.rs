use alloy::network::Ethereum;
use alloy::primitives::{Address, U256};
use alloy::providers::{PendingTransactionBuilder, Provider};

use crate::error::LedgerError;
use crate::ledger::{LedgerClient, TxHandle, TxReceipt, TxStatus};
use crate::{IPaymentDistributor, IERC20};

/// Ledger Client over an alloy provider.
///
/// Writes are signed by whatever wallet the provider was built with. No call
/// carries a timeout: a confirmation that never arrives keeps `wait` pending.
#[derive(Debug, Clone)]
pub struct AlloyLedger<P> {
    provider: P,
}

impl<P: Provider> AlloyLedger<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

fn contract_error(call: &str, e: alloy::contract::Error) -> LedgerError {
    let code = match &e {
        alloy::contract::Error::TransportError(t) => t.as_error_resp().map(|r| r.code),
        _ => None,
    };
    LedgerError {
        code,
        message: format!("{call} failed: {e}"),
    }
}

impl<P: Provider> LedgerClient for AlloyLedger<P> {
    async fn read_balance(&self, token: Address, owner: Address) -> Result<U256, LedgerError> {
        IERC20::new(token, &self.provider)
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| contract_error("balanceOf", e))
    }

    async fn read_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, LedgerError> {
        IERC20::new(token, &self.provider)
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| contract_error("allowance", e))
    }

    async fn read_decimals(&self, token: Address) -> Result<u8, LedgerError> {
        IERC20::new(token, &self.provider)
            .decimals()
            .call()
            .await
            .map_err(|e| contract_error("decimals", e))
    }

    async fn read_distribution_total(&self, distributor: Address) -> Result<U256, LedgerError> {
        IPaymentDistributor::new(distributor, &self.provider)
            .getTotalAmount()
            .call()
            .await
            .map_err(|e| contract_error("getTotalAmount", e))
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHandle, LedgerError> {
        let pending = IERC20::new(token, &self.provider)
            .approve(spender, amount)
            .send()
            .await
            .map_err(|e| contract_error("approve", e))?;
        let hash = *pending.tx_hash();
        tracing::info!(%token, %spender, %amount, tx = %hash, "approve submitted");
        Ok(TxHandle { hash })
    }

    async fn submit_transfer(
        &self,
        token: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHandle, LedgerError> {
        let pending = IERC20::new(token, &self.provider)
            .transfer(recipient, amount)
            .send()
            .await
            .map_err(|e| contract_error("transfer", e))?;
        let hash = *pending.tx_hash();
        tracing::info!(%token, %recipient, %amount, tx = %hash, "transfer submitted");
        Ok(TxHandle { hash })
    }

    async fn submit_distribution(&self, distributor: Address) -> Result<TxHandle, LedgerError> {
        let pending = IPaymentDistributor::new(distributor, &self.provider)
            .distributePayment()
            .send()
            .await
            .map_err(|e| contract_error("distributePayment", e))?;
        let hash = *pending.tx_hash();
        tracing::info!(%distributor, tx = %hash, "distribution submitted");
        Ok(TxHandle { hash })
    }

    async fn wait(&self, tx: TxHandle) -> Result<TxReceipt, LedgerError> {
        let receipt =
            PendingTransactionBuilder::<Ethereum>::new(self.provider.root().clone(), tx.hash)
                .get_receipt()
                .await
                .map_err(|e| LedgerError::new(format!("receipt for {} failed: {e}", tx.hash)))?;

        let status = if receipt.status() {
            TxStatus::Success
        } else {
            TxStatus::Reverted
        };
        tracing::debug!(tx = %tx.hash, ?status, block = ?receipt.block_number, "receipt received");

        Ok(TxReceipt {
            status,
            hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: Some(receipt.gas_used),
        })
    }
}

