//! Payment flow controller.
//!
//! Drives connect → eligibility → approve → execute → record against one
//! session at a time. Every action is gated on a single in-flight flag, so a
//! second action issued while one is pending is rejected with
//! [`FlowError::Busy`] instead of interleaving. Failures leave the state where
//! it was before the action started.
//!
//! The controller is single-threaded (`!Sync`): actions take `&self` and keep
//! their bookkeeping in a `RefCell` that is never borrowed across an await.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use alloy::primitives::{Address, U256};
use chrono::Utc;
use serde::Serialize;

use crate::amount::Amount;
use crate::classify::{classify, Step};
use crate::config::{DeploymentConfig, ExecutionRoute};
use crate::connection::{ConnectionManager, Session};
use crate::discovery::{HostProvider, WalletCandidate};
use crate::eligibility::{EligibilityChecker, EligibilitySnapshot};
use crate::error::{FlowError, LedgerError, WalletError, WalletErrorKind};
use crate::ledger::{LedgerClient, LedgerConnector, TxReceipt};
use crate::provider::WalletProvider;
use crate::receipt::{ExecutionResult, PaymentRecord, ReceiptBuilder, SubTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FlowState {
    Disconnected,
    /// Session established; eligibility not yet known.
    Connected,
    /// Terminal until the payer is funded and eligibility is refreshed.
    InsufficientBalance,
    ApprovalPending,
    Approved,
    Executing,
    Completed,
}

const ANY_CONNECTED: &[FlowState] = &[
    FlowState::Connected,
    FlowState::InsufficientBalance,
    FlowState::ApprovalPending,
    FlowState::Approved,
];

struct Inner<H, L> {
    state: FlowState,
    session: Option<Rc<Session<H>>>,
    ledger: Option<Rc<L>>,
    snapshot: Option<EligibilitySnapshot>,
    record: Option<PaymentRecord>,
    last_error: Option<WalletError>,
}

/// Marks one action as in flight. Dropping it clears the busy flag unless a
/// disconnect already started a new epoch.
struct Flight<'a> {
    busy: &'a Cell<bool>,
    epoch: &'a Cell<u64>,
    at: u64,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.epoch.get() == self.at {
            self.busy.set(false);
        }
    }
}

pub struct PaymentFlowController<H, C: LedgerConnector<H>> {
    config: DeploymentConfig,
    connections: ConnectionManager,
    checker: EligibilityChecker,
    connector: C,
    inner: RefCell<Inner<H, C::Ledger>>,
    busy: Cell<bool>,
    epoch: Cell<u64>,
}

impl<H, C> PaymentFlowController<H, C>
where
    H: HostProvider + WalletProvider,
    C: LedgerConnector<H>,
{
    pub fn new(config: DeploymentConfig, connector: C) -> Self {
        let connections = ConnectionManager::new(config.network.clone());
        let checker = EligibilityChecker::new(config.token, config.route.spender());
        Self {
            config,
            connections,
            checker,
            connector,
            inner: RefCell::new(Inner {
                state: FlowState::Disconnected,
                session: None,
                ledger: None,
                snapshot: None,
                record: None,
                last_error: None,
            }),
            busy: Cell::new(false),
            epoch: Cell::new(0),
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn state(&self) -> FlowState {
        self.inner.borrow().state
    }

    pub fn session(&self) -> Option<Rc<Session<H>>> {
        self.inner.borrow().session.clone()
    }

    pub fn snapshot(&self) -> Option<EligibilitySnapshot> {
        self.inner.borrow().snapshot.clone()
    }

    pub fn record(&self) -> Option<PaymentRecord> {
        self.inner.borrow().record.clone()
    }

    /// The most recent classified failure, cleared when the next action starts.
    pub fn last_error(&self) -> Option<WalletError> {
        self.inner.borrow().last_error.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Connect `candidate` and check eligibility.
    ///
    /// A failed connect leaves any existing session untouched. If the
    /// connection succeeds but the eligibility read fails, the controller
    /// stays in `Connected` and [`refresh_eligibility`](Self::refresh_eligibility)
    /// retries the read.
    pub async fn connect(&self, candidate: &WalletCandidate<H>) -> Result<(), FlowError> {
        let flight = self.begin("connect", None)?;

        let session = match self.connections.connect(candidate).await {
            Ok(s) => s,
            Err(e) => return Err(self.fail(&flight, None, e)),
        };
        self.ensure_current(&flight)?;

        let ledger = self.connector.ledger_for(&session);
        {
            let mut inner = self.inner.borrow_mut();
            inner.session = Some(Rc::new(session));
            inner.ledger = Some(Rc::new(ledger));
            inner.snapshot = None;
            inner.record = None;
        }
        self.transition(FlowState::Connected);

        self.check_and_route(&flight, FlowState::Connected).await
    }

    /// Re-read eligibility; the only way out of `InsufficientBalance`.
    pub async fn refresh_eligibility(&self) -> Result<(), FlowError> {
        let flight = self.begin("refresh_eligibility", Some(ANY_CONNECTED))?;
        let from = self.state();
        self.check_and_route(&flight, from).await
    }

    /// Grant the spender an allowance of the required total, wait for the
    /// confirmation, then re-read the allowance. Only the re-read result can
    /// move the flow to `Approved`.
    pub async fn approve(&self) -> Result<(), FlowError> {
        let flight = self.begin("approve", Some(&[FlowState::ApprovalPending]))?;
        let back_to = Some(FlowState::ApprovalPending);

        let Some(spender) = self.config.route.spender() else {
            tracing::info!(mode = ?self.config.mode(), "no spender for this mode, approval skipped");
            self.transition(FlowState::Approved);
            return Ok(());
        };
        let (session, ledger) = self.handles()?;

        let required = match self.required_units(&*ledger).await {
            Ok(units) => units,
            Err(e) => return Err(self.fail(&flight, back_to, e)),
        };
        self.ensure_current(&flight)?;

        tracing::info!(
            payer = %session.address,
            %spender,
            amount = %self.config.required_total,
            "requesting token approval"
        );
        let receipt = match self
            .submit_and_wait(Step::Approval, &*ledger, |l| {
                l.approve(self.config.token, spender, required)
            })
            .await
        {
            Ok(r) => r,
            Err(e) => return Err(self.fail(&flight, back_to, e)),
        };
        self.ensure_current(&flight)?;
        if !receipt.succeeded() {
            return Err(self.fail(
                &flight,
                back_to,
                WalletError::new(
                    WalletErrorKind::ExecutionReverted,
                    format!("Approval transaction {} reverted", receipt.hash),
                ),
            ));
        }

        let snapshot = match self.read_eligibility(&flight, &session, &*ledger).await? {
            Ok(s) => s,
            Err(e) => return Err(self.fail(&flight, back_to, e)),
        };
        let has_allowance = snapshot.has_allowance;
        let allowance = snapshot
            .current_allowance()
            .unwrap_or(Amount::ZERO)
            .to_string();
        self.inner.borrow_mut().snapshot = Some(snapshot);

        if !has_allowance {
            let symbol = &self.config.token_symbol;
            return Err(self.fail(
                &flight,
                back_to,
                WalletError::new(
                    WalletErrorKind::ApprovalInsufficient,
                    format!(
                        "Approval failed to set sufficient allowance. Required: {} {symbol}, but allowance is only {allowance} {symbol}",
                        self.config.required_total
                    ),
                ),
            ));
        }

        tracing::info!(tx = %receipt.hash, "approval confirmed and verified");
        self.transition(FlowState::Approved);
        Ok(())
    }

    /// Return from `Approved` to the approval step and re-check eligibility.
    pub async fn back(&self) -> Result<(), FlowError> {
        let flight = self.begin("back", Some(&[FlowState::Approved]))?;
        self.transition(FlowState::ApprovalPending);
        self.check_and_route(&flight, FlowState::ApprovalPending)
            .await
    }

    /// Re-verify eligibility, submit the payment for the configured mode, and
    /// wait for confirmation. On success the flow is `Completed` and the
    /// returned record is also available from [`record`](Self::record).
    pub async fn execute(&self) -> Result<PaymentRecord, FlowError> {
        let flight = self.begin("execute", Some(&[FlowState::Approved]))?;
        let back_to = Some(FlowState::Approved);
        let (session, ledger) = self.handles()?;

        let snapshot = match self.read_eligibility(&flight, &session, &*ledger).await? {
            Ok(s) => s,
            Err(e) => return Err(self.fail(&flight, back_to, e)),
        };
        let unmet = snapshot.unmet(&self.config.token_symbol);
        let decimals = snapshot.decimals;
        let required = snapshot.required;
        self.inner.borrow_mut().snapshot = Some(snapshot);
        if let Some(e) = unmet {
            return Err(self.fail(&flight, back_to, e));
        }

        let reported_total = match self.config.route {
            ExecutionRoute::SmartContract { distributor } => {
                match self.distributor_total(&*ledger, distributor, decimals).await {
                    Ok(total) => Some(total),
                    Err(e) => return Err(self.fail(&flight, back_to, e)),
                }
            }
            _ => None,
        };
        self.ensure_current(&flight)?;

        self.transition(FlowState::Executing);
        let outcome = match self.config.route {
            ExecutionRoute::SmartContract { distributor } => {
                self.submit_and_wait(Step::Execution, &*ledger, |l| {
                    l.submit_distribution(distributor)
                })
                .await
                .and_then(|r| {
                    reverted_check(
                        r,
                        format!(
                            "Smart contract execution reverted. Please check your {} balance and allowance.",
                            self.config.token_symbol
                        ),
                    )
                })
                .map(|r| (r, Vec::new()))
            }
            ExecutionRoute::AdminMediated { admin } => self
                .submit_and_wait(Step::Execution, &*ledger, |l| {
                    l.submit_transfer(self.config.token, admin, required)
                })
                .await
                .and_then(|r| reverted_check(r, "Payment transfer reverted".to_string()))
                .map(|r| (r, Vec::new())),
            ExecutionRoute::DirectTransfer => self.transfer_each(&flight, &*ledger, decimals).await,
        };
        self.ensure_current(&flight)?;

        let (receipt, sub_transactions) = match outcome {
            Ok(o) => o,
            Err(e) => return Err(self.fail(&flight, back_to, e)),
        };

        let result = ExecutionResult {
            route: self.config.route,
            receipt,
            sub_transactions,
            reported_total,
            confirmed_at: Utc::now(),
        };
        let record = ReceiptBuilder::build(result, &self.config.distributions, &session);

        tracing::info!(
            tx = %record.transaction_hash,
            mode = ?record.execution_mode,
            total = %record.total_amount,
            recipients = record.per_recipient.len(),
            "payment completed"
        );
        self.inner.borrow_mut().record = Some(record.clone());
        self.transition(FlowState::Completed);
        Ok(record)
    }

    /// Clear the completed record and return to the approval branch point.
    pub async fn new_payment(&self) -> Result<(), FlowError> {
        let flight = self.begin("new_payment", Some(&[FlowState::Completed]))?;
        self.inner.borrow_mut().record = None;
        self.transition(FlowState::Connected);
        self.check_and_route(&flight, FlowState::Connected).await
    }

    /// Drop the session. Purely local; allowed at any time. An action still
    /// pending resolves as [`FlowError::Cancelled`] and commits nothing.
    pub fn disconnect(&self) {
        self.epoch.set(self.epoch.get() + 1);
        self.busy.set(false);
        let mut inner = self.inner.borrow_mut();
        let from = inner.state;
        inner.state = FlowState::Disconnected;
        inner.session = None;
        inner.ledger = None;
        inner.snapshot = None;
        inner.record = None;
        inner.last_error = None;
        tracing::info!(?from, "wallet disconnected");
    }

    fn begin(
        &self,
        action: &'static str,
        allowed: Option<&[FlowState]>,
    ) -> Result<Flight<'_>, FlowError> {
        if self.busy.get() {
            tracing::debug!(action, "rejected, another action is in flight");
            return Err(FlowError::Busy);
        }
        let state = self.state();
        if allowed.is_some_and(|states| !states.contains(&state)) {
            return Err(FlowError::InvalidState { action, state });
        }
        self.busy.set(true);
        self.inner.borrow_mut().last_error = None;
        tracing::debug!(action, ?state, "action started");
        Ok(Flight {
            busy: &self.busy,
            epoch: &self.epoch,
            at: self.epoch.get(),
        })
    }

    fn ensure_current(&self, flight: &Flight<'_>) -> Result<(), FlowError> {
        if self.epoch.get() == flight.at {
            Ok(())
        } else {
            Err(FlowError::Cancelled)
        }
    }

    /// Record a failure and restore `back_to`, unless the action was
    /// cancelled by a disconnect.
    fn fail(&self, flight: &Flight<'_>, back_to: Option<FlowState>, err: WalletError) -> FlowError {
        if self.ensure_current(flight).is_err() {
            return FlowError::Cancelled;
        }
        tracing::warn!(kind = ?err.kind, error = %err.message, "action failed");
        if let Some(state) = back_to {
            self.transition(state);
        }
        self.inner.borrow_mut().last_error = Some(err.clone());
        FlowError::Wallet(err)
    }

    fn transition(&self, to: FlowState) {
        let mut inner = self.inner.borrow_mut();
        if inner.state != to {
            tracing::info!(from = ?inner.state, ?to, "flow transition");
            inner.state = to;
        }
    }

    fn handles(&self) -> Result<(Rc<Session<H>>, Rc<C::Ledger>), FlowError> {
        let inner = self.inner.borrow();
        match (&inner.session, &inner.ledger) {
            (Some(s), Some(l)) => Ok((s.clone(), l.clone())),
            _ => Err(FlowError::NotConnected),
        }
    }

    /// Outer error: cancelled. Inner error: the read failed.
    async fn read_eligibility(
        &self,
        flight: &Flight<'_>,
        session: &Session<H>,
        ledger: &C::Ledger,
    ) -> Result<Result<EligibilitySnapshot, WalletError>, FlowError> {
        let result = self
            .checker
            .check(ledger, session.address, &self.config.required_total)
            .await;
        self.ensure_current(flight)?;
        if result.is_err() {
            self.inner.borrow_mut().snapshot = None;
        }
        Ok(result)
    }

    /// Run an eligibility check and route: no balance goes to
    /// `InsufficientBalance`, a still-valid approval stays `Approved`, and
    /// everything else lands on the approval step.
    async fn check_and_route(&self, flight: &Flight<'_>, from: FlowState) -> Result<(), FlowError> {
        let (session, ledger) = self.handles()?;
        let snapshot = match self.read_eligibility(flight, &session, &*ledger).await? {
            Ok(s) => s,
            Err(e) => return Err(self.fail(flight, Some(from), e)),
        };

        let next = if !snapshot.has_balance {
            FlowState::InsufficientBalance
        } else if from == FlowState::Approved && snapshot.has_allowance {
            FlowState::Approved
        } else {
            FlowState::ApprovalPending
        };
        self.inner.borrow_mut().snapshot = Some(snapshot);
        self.transition(next);
        Ok(())
    }

    async fn required_units(&self, ledger: &C::Ledger) -> Result<U256, WalletError> {
        let cached = self.inner.borrow().snapshot.as_ref().map(|s| s.required);
        if let Some(units) = cached {
            return Ok(units);
        }
        let decimals = ledger
            .read_decimals(self.config.token)
            .await
            .map_err(|e| classify(Step::Approval, &e, self.native_symbol()))?;
        self.config
            .required_total
            .to_units(decimals)
            .map_err(|e| WalletError::new(WalletErrorKind::Unknown, e.to_string()))
    }

    /// Read the distributor's own total before anything is signed. A contract
    /// that does not answer is reported as unreachable, not as a revert.
    async fn distributor_total(
        &self,
        ledger: &C::Ledger,
        distributor: Address,
        decimals: u8,
    ) -> Result<Amount, WalletError> {
        let err = match ledger.read_distribution_total(distributor).await {
            Ok(units) => return Ok(Amount::from_units(units, decimals)),
            Err(e) => e,
        };
        let classified = classify(Step::Execution, &err, self.native_symbol());
        if classified.kind == WalletErrorKind::NetworkTransient {
            return Err(classified);
        }
        tracing::warn!(%distributor, error = %err, "distributor did not answer");
        Err(WalletError::new(
            WalletErrorKind::ContractUnreachable,
            format!(
                "Unable to reach the payment distributor at {distributor}. Check the contract address and network."
            ),
        ))
    }

    async fn submit_and_wait<'l, F, Fut>(
        &self,
        step: Step,
        ledger: &'l C::Ledger,
        submit: F,
    ) -> Result<TxReceipt, WalletError>
    where
        F: FnOnce(&'l C::Ledger) -> Fut,
        Fut: std::future::Future<Output = Result<crate::ledger::TxHandle, LedgerError>>,
    {
        let symbol = self.native_symbol();
        let tx = submit(ledger)
            .await
            .map_err(|e| classify(step, &e, symbol))?;
        tracing::info!(?step, tx = %tx.hash, "waiting for confirmation");
        ledger.wait(tx).await.map_err(|e| classify(step, &e, symbol))
    }

    /// One transfer per recipient in configured order, each confirmed before
    /// the next is submitted.
    async fn transfer_each(
        &self,
        flight: &Flight<'_>,
        ledger: &C::Ledger,
        decimals: u8,
    ) -> Result<(TxReceipt, Vec<SubTransaction>), WalletError> {
        let total = self.config.distributions.len();
        let mut receipts: Vec<TxReceipt> = Vec::with_capacity(total);
        let mut subs = Vec::with_capacity(total);

        for (i, d) in self.config.distributions.iter().enumerate() {
            if self.ensure_current(flight).is_err() {
                break;
            }
            let amount = d.amount.to_units(decimals).map_err(|e| {
                WalletError::new(
                    WalletErrorKind::Unknown,
                    format!("Cannot pay {}: {e}", d.label),
                )
            })?;
            let receipt = self
                .submit_and_wait(Step::Execution, ledger, |l| {
                    l.submit_transfer(self.config.token, d.recipient, amount)
                })
                .await
                .map_err(|e| partial(e, i))?;
            if !receipt.succeeded() {
                return Err(WalletError::new(
                    WalletErrorKind::ExecutionReverted,
                    format!(
                        "Transfer {} of {total} to {} reverted ({i} earlier transfers confirmed)",
                        i + 1,
                        d.label
                    ),
                ));
            }
            tracing::info!(index = i + 1, total, recipient = %d.recipient, tx = %receipt.hash, "transfer confirmed");
            subs.push(SubTransaction {
                hash: receipt.hash,
                recipient: d.recipient,
                amount: d.amount,
                label: d.label.clone(),
            });
            receipts.push(receipt);
        }

        let Some(first) = receipts.first().copied() else {
            return Err(WalletError::new(
                WalletErrorKind::Unknown,
                "No transfers were submitted",
            ));
        };
        let gas_used = receipts
            .iter()
            .map(|r| r.gas_used)
            .sum::<Option<u64>>();
        Ok((TxReceipt { gas_used, ..first }, subs))
    }

    fn native_symbol(&self) -> &str {
        &self.config.network.native_currency.symbol
    }
}

fn reverted_check(receipt: TxReceipt, message: String) -> Result<TxReceipt, WalletError> {
    if receipt.succeeded() {
        Ok(receipt)
    } else {
        Err(WalletError::new(WalletErrorKind::ExecutionReverted, message))
    }
}

/// Note already-confirmed transfers on a mid-sequence failure.
fn partial(mut err: WalletError, confirmed: usize) -> WalletError {
    if confirmed > 0 {
        err.message = format!("{} ({confirmed} earlier transfers confirmed)", err.message);
    }
    err
}
