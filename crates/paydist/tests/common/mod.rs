#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use alloy::primitives::{address, Address, TxHash, U256};
use futures::channel::oneshot;
use serde_json::{json, Value};

use paydist::{
    discover, DeploymentConfig, Host, HostAccessError, HostProvider, LedgerClient, LedgerError,
    PaymentFlowController, RpcError, Session, TxHandle, TxReceipt, TxStatus, WalletCandidate,
    WalletProvider,
};

pub const PAYER: Address = address!("1234567890abcdef1234567890abcdef12345678");
pub const BSC_MAINNET: u64 = 56;
pub const BSC_TESTNET: u64 = 97;

/// `n` whole tokens at 18 decimals, divided by 100.
pub fn cents(n: u64) -> U256 {
    U256::from(n) * U256::from(10_000_000_000_000_000u64)
}

// -- Wallet --

#[derive(Debug)]
pub struct WalletState {
    pub flags: Vec<&'static str>,
    pub accounts: Vec<Address>,
    pub accounts_error: Option<RpcError>,
    pub chain_id: u64,
    pub known_chains: Vec<u64>,
    pub switch_error: Option<RpcError>,
    pub add_error: Option<RpcError>,
    /// Acknowledge switch requests without changing networks.
    pub ignore_switch: bool,
    pub native_balance: U256,
    pub calls: Vec<String>,
}

/// Scripted EIP-1193 wallet. Clones share state.
#[derive(Clone, Debug)]
pub struct MockWallet(pub Rc<RefCell<WalletState>>);

impl MockWallet {
    /// MetaMask on BSC mainnet that already knows BSC testnet.
    pub fn metamask() -> Self {
        Self(Rc::new(RefCell::new(WalletState {
            flags: vec!["isMetaMask"],
            accounts: vec![PAYER],
            accounts_error: None,
            chain_id: BSC_MAINNET,
            known_chains: vec![BSC_MAINNET, BSC_TESTNET],
            switch_error: None,
            add_error: None,
            ignore_switch: false,
            native_balance: cents(50),
            calls: Vec::new(),
        })))
    }

    pub fn with(self, f: impl FnOnce(&mut WalletState)) -> Self {
        f(&mut self.0.borrow_mut());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.borrow().calls.clone()
    }

    pub fn candidate(&self) -> WalletCandidate<MockWallet> {
        discover(&MockHost(Some(self.clone()))).remove(0)
    }
}

fn chain_param(params: &Value) -> u64 {
    params[0]["chainId"]
        .as_str()
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
        .unwrap_or_default()
}

fn accounts_json(s: &WalletState) -> Value {
    json!(s
        .accounts
        .iter()
        .map(|a| a.to_string().to_lowercase())
        .collect::<Vec<_>>())
}

impl HostProvider for MockWallet {
    fn flag(&self, name: &str) -> Result<bool, HostAccessError> {
        Ok(self.0.borrow().flags.contains(&name))
    }

    fn sub_providers(&self) -> Result<Vec<Self>, HostAccessError> {
        Ok(Vec::new())
    }
}

impl WalletProvider for MockWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let mut s = self.0.borrow_mut();
        s.calls.push(method.to_string());
        match method {
            "eth_requestAccounts" => match &s.accounts_error {
                Some(e) => Err(e.clone()),
                None => Ok(accounts_json(&s)),
            },
            "eth_accounts" => Ok(accounts_json(&s)),
            "wallet_switchEthereumChain" => {
                if let Some(e) = &s.switch_error {
                    return Err(e.clone());
                }
                let target = chain_param(&params);
                if !s.known_chains.contains(&target) {
                    return Err(RpcError::new(4902, "Unrecognized chain ID"));
                }
                if !s.ignore_switch {
                    s.chain_id = target;
                }
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                if let Some(e) = &s.add_error {
                    return Err(e.clone());
                }
                let chain = chain_param(&params);
                s.known_chains.push(chain);
                Ok(Value::Null)
            }
            "eth_getBalance" => Ok(json!(format!("0x{:x}", s.native_balance))),
            "eth_chainId" => Ok(json!(format!("0x{:x}", s.chain_id))),
            other => Err(RpcError::new(-32601, format!("method {other} not supported"))),
        }
    }
}

pub struct MockHost(pub Option<MockWallet>);

impl Host for MockHost {
    type Provider = MockWallet;

    fn injected_provider(&self) -> Result<Option<MockWallet>, HostAccessError> {
        Ok(self.0.clone())
    }

    fn has_global(&self, _name: &str) -> Result<bool, HostAccessError> {
        Ok(false)
    }
}

// -- Ledger --

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Approve { spender: Address, amount: U256 },
    Transfer { to: Address, amount: U256 },
    Distribution { distributor: Address },
}

#[derive(Default)]
pub struct LedgerState {
    pub decimals: u8,
    pub balance: U256,
    pub allowance: U256,
    /// What the distributor reports from `getTotalAmount()`.
    pub distributor_total: U256,
    pub distributor_error: Option<LedgerError>,
    /// Allowance a confirmed approval leaves behind; defaults to the amount approved.
    pub approval_result: Option<U256>,
    pending_allowance: Option<U256>,
    pub read_error: Option<LedgerError>,
    pub submit_error: Option<LedgerError>,
    /// Receipt statuses handed out in order; success once exhausted.
    pub statuses: VecDeque<TxStatus>,
    pub gate: Option<oneshot::Receiver<()>>,
    pub submitted: Vec<Submitted>,
    pub balance_reads: u32,
}

/// In-memory token ledger. Clones share state.
#[derive(Clone)]
pub struct MockLedger(pub Rc<RefCell<LedgerState>>);

impl MockLedger {
    pub fn new(balance: U256, allowance: U256) -> Self {
        Self(Rc::new(RefCell::new(LedgerState {
            decimals: 18,
            balance,
            allowance,
            distributor_total: cents(5),
            ..Default::default()
        })))
    }

    pub fn with(self, f: impl FnOnce(&mut LedgerState)) -> Self {
        f(&mut self.0.borrow_mut());
        self
    }

    pub fn set(&self, f: impl FnOnce(&mut LedgerState)) {
        f(&mut self.0.borrow_mut());
    }

    /// Hold the next confirmation until the returned sender fires.
    pub fn gate_next_wait(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.0.borrow_mut().gate = Some(rx);
        tx
    }

    pub fn submitted(&self) -> Vec<Submitted> {
        self.0.borrow().submitted.clone()
    }

    fn submit(&self, what: Submitted) -> Result<TxHandle, LedgerError> {
        let mut s = self.0.borrow_mut();
        if let Some(e) = s.submit_error.clone() {
            return Err(e);
        }
        if let Submitted::Approve { amount, .. } = &what {
            s.pending_allowance = Some(s.approval_result.unwrap_or(*amount));
        }
        s.submitted.push(what);
        let n = s.submitted.len() as u8;
        Ok(TxHandle {
            hash: TxHash::with_last_byte(n),
        })
    }

    fn read<T>(&self, value: impl FnOnce(&LedgerState) -> T) -> Result<T, LedgerError> {
        let s = self.0.borrow();
        match &s.read_error {
            Some(e) => Err(e.clone()),
            None => Ok(value(&s)),
        }
    }
}

impl LedgerClient for MockLedger {
    async fn read_balance(&self, _token: Address, _owner: Address) -> Result<U256, LedgerError> {
        self.0.borrow_mut().balance_reads += 1;
        self.read(|s| s.balance)
    }

    async fn read_allowance(
        &self,
        _token: Address,
        _owner: Address,
        _spender: Address,
    ) -> Result<U256, LedgerError> {
        self.read(|s| s.allowance)
    }

    async fn read_decimals(&self, _token: Address) -> Result<u8, LedgerError> {
        self.read(|s| s.decimals)
    }

    async fn read_distribution_total(&self, _distributor: Address) -> Result<U256, LedgerError> {
        if let Some(e) = self.0.borrow().distributor_error.clone() {
            return Err(e);
        }
        self.read(|s| s.distributor_total)
    }

    async fn approve(
        &self,
        _token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHandle, LedgerError> {
        self.submit(Submitted::Approve { spender, amount })
    }

    async fn submit_transfer(
        &self,
        _token: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHandle, LedgerError> {
        self.submit(Submitted::Transfer {
            to: recipient,
            amount,
        })
    }

    async fn submit_distribution(&self, distributor: Address) -> Result<TxHandle, LedgerError> {
        self.submit(Submitted::Distribution { distributor })
    }

    async fn wait(&self, tx: TxHandle) -> Result<TxReceipt, LedgerError> {
        let gate = self.0.borrow_mut().gate.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let mut s = self.0.borrow_mut();
        let status = s.statuses.pop_front().unwrap_or(TxStatus::Success);
        if status == TxStatus::Success {
            if let Some(allowance) = s.pending_allowance.take() {
                s.allowance = allowance;
            }
        }
        Ok(TxReceipt {
            status,
            hash: tx.hash,
            block_number: Some(1_000),
            gas_used: Some(50_000),
        })
    }
}

// -- Controller --

pub type Controller =
    PaymentFlowController<MockWallet, Box<dyn Fn(&Session<MockWallet>) -> MockLedger>>;

pub fn controller(config: DeploymentConfig, ledger: &MockLedger) -> Controller {
    let ledger = ledger.clone();
    PaymentFlowController::new(config, Box::new(move |_: &Session<MockWallet>| ledger.clone()))
}
