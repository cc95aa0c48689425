mod common;

use std::pin::pin;

use common::*;

use paydist::{
    Amount, Counterparty, DeploymentConfig, ExecutionMode, ExecutionRoute, FlowError, FlowState,
    LedgerError, TxStatus, WalletErrorKind, DEFAULT_ADMIN, DEFAULT_DISTRIBUTOR,
    DEFAULT_RECIPIENT_1, DEFAULT_RECIPIENT_2,
};

async fn connected(config: DeploymentConfig, ledger: &MockLedger) -> Controller {
    let flow = controller(config, ledger);
    flow.connect(&MockWallet::metamask().candidate())
        .await
        .unwrap();
    flow
}

async fn approved(config: DeploymentConfig, ledger: &MockLedger) -> Controller {
    let flow = connected(config, ledger).await;
    flow.approve().await.unwrap();
    assert_eq!(flow.state(), FlowState::Approved);
    flow
}

// -- Scenarios --

#[tokio::test]
async fn test_happy_path() {
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = connected(DeploymentConfig::default(), &ledger).await;

    assert_eq!(flow.state(), FlowState::ApprovalPending);
    let snap = flow.snapshot().unwrap();
    assert!(snap.has_balance);
    assert!(!snap.has_allowance);
    assert_eq!(snap.current_balance().to_string(), "1");

    flow.approve().await.unwrap();
    assert_eq!(flow.state(), FlowState::Approved);
    assert_eq!(
        flow.snapshot().unwrap().current_allowance().unwrap().to_string(),
        "0.05"
    );

    let record = flow.execute().await.unwrap();
    assert_eq!(flow.state(), FlowState::Completed);
    assert_eq!(record.total_amount.to_string(), "0.05");
    assert_eq!(record.per_recipient.len(), 2);
    assert_eq!(record.payer, PAYER);
    assert_eq!(record.wallet_name, "MetaMask");
    assert_eq!(record.execution_mode, ExecutionMode::SmartContract);
    assert_eq!(record.counterparty, Counterparty::Contract(DEFAULT_DISTRIBUTOR));
    assert_eq!(flow.record(), Some(record));

    assert_eq!(
        ledger.submitted(),
        vec![
            Submitted::Approve {
                spender: DEFAULT_DISTRIBUTOR,
                amount: cents(5),
            },
            Submitted::Distribution {
                distributor: DEFAULT_DISTRIBUTOR,
            },
        ]
    );
}

#[tokio::test]
async fn test_insufficient_balance_blocks_approval() {
    let ledger = MockLedger::new(cents(1), cents(0));
    let flow = connected(DeploymentConfig::default(), &ledger).await;

    assert_eq!(flow.state(), FlowState::InsufficientBalance);
    let err = flow.approve().await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::InvalidState {
            state: FlowState::InsufficientBalance,
            ..
        }
    ));
    assert!(ledger.submitted().is_empty());

    // Funding arrives; an explicit refresh reopens the flow
    ledger.set(|s| s.balance = cents(100));
    flow.refresh_eligibility().await.unwrap();
    assert_eq!(flow.state(), FlowState::ApprovalPending);
}

#[tokio::test]
async fn test_balance_exactly_required_is_eligible() {
    let ledger = MockLedger::new(cents(5), cents(0));
    let flow = connected(DeploymentConfig::default(), &ledger).await;
    assert_eq!(flow.state(), FlowState::ApprovalPending);
}

#[tokio::test]
async fn test_approval_reverified_after_confirmation() {
    let ledger = MockLedger::new(cents(100), cents(0)).with(|s| s.approval_result = Some(cents(1)));
    let flow = connected(DeploymentConfig::default(), &ledger).await;

    let err = flow.approve().await.unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::ApprovalInsufficient));
    assert_eq!(flow.state(), FlowState::ApprovalPending);
    assert!(err.to_string().contains("0.01"));
    // The snapshot reflects the re-read, not the pre-approval state
    assert_eq!(
        flow.snapshot().unwrap().current_allowance(),
        Some("0.01".parse::<Amount>().unwrap())
    );
}

#[tokio::test]
async fn test_reverted_approval() {
    let ledger = MockLedger::new(cents(100), cents(0))
        .with(|s| s.statuses.push_back(TxStatus::Reverted));
    let flow = connected(DeploymentConfig::default(), &ledger).await;

    let err = flow.approve().await.unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::ExecutionReverted));
    assert_eq!(flow.state(), FlowState::ApprovalPending);
}

#[tokio::test]
async fn test_reverted_execution_returns_to_approved() {
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = approved(DeploymentConfig::default(), &ledger).await;

    ledger.set(|s| s.statuses.push_back(TxStatus::Reverted));
    let err = flow.execute().await.unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::ExecutionReverted));
    assert_eq!(flow.state(), FlowState::Approved);
    assert!(flow.record().is_none());

    // Explicit retry
    flow.execute().await.unwrap();
    assert_eq!(flow.state(), FlowState::Completed);
}

#[tokio::test]
async fn test_unreachable_distributor_blocks_execution() {
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = approved(DeploymentConfig::default(), &ledger).await;
    let submitted = ledger.submitted().len();

    ledger.set(|s| s.distributor_error = Some(LedgerError::new("execution reverted")));
    let err = flow.execute().await.unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::ContractUnreachable));
    assert!(err.to_string().contains("payment distributor"));
    assert_eq!(ledger.submitted().len(), submitted, "nothing was submitted");
    assert_eq!(flow.state(), FlowState::Approved);

    ledger.set(|s| s.distributor_error = Some(LedgerError::new("error sending request")));
    let err = flow.execute().await.unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::NetworkTransient));

    ledger.set(|s| s.distributor_error = None);
    flow.execute().await.unwrap();
    assert_eq!(flow.state(), FlowState::Completed);
}

#[tokio::test]
async fn test_distributor_total_never_overrides_breakdown() {
    let ledger = MockLedger::new(cents(100), cents(0)).with(|s| s.distributor_total = cents(6));
    let flow = approved(DeploymentConfig::default(), &ledger).await;

    let record = flow.execute().await.unwrap();
    assert_eq!(record.total_amount.to_string(), "0.05");
}

#[tokio::test]
async fn test_execute_reverifies_before_submitting() {
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = approved(DeploymentConfig::default(), &ledger).await;
    let submitted = ledger.submitted().len();

    ledger.set(|s| s.balance = cents(2));
    let err = flow.execute().await.unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::InsufficientBalance));
    assert!(err.to_string().contains("balance"));

    ledger.set(|s| {
        s.balance = cents(100);
        s.allowance = cents(0);
    });
    let err = flow.execute().await.unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::InsufficientAllowance));

    assert_eq!(ledger.submitted().len(), submitted, "nothing was submitted");
    assert_eq!(flow.state(), FlowState::Approved);
}

#[tokio::test]
async fn test_user_rejects_approval_signature() {
    let ledger = MockLedger::new(cents(100), cents(0)).with(|s| {
        s.submit_error = Some(LedgerError::with_code(
            4001,
            "MetaMask Tx Signature: User denied transaction signature.",
        ))
    });
    let flow = connected(DeploymentConfig::default(), &ledger).await;

    let err = flow.approve().await.unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::UserRejected));
    assert_eq!(flow.state(), FlowState::ApprovalPending);
    assert_eq!(
        flow.last_error().map(|e| e.kind),
        Some(WalletErrorKind::UserRejected)
    );
}

#[tokio::test]
async fn test_gas_shortfall_at_execution() {
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = approved(DeploymentConfig::default(), &ledger).await;

    ledger.set(|s| {
        s.submit_error = Some(LedgerError::with_code(
            -32000,
            "insufficient funds for gas * price + value",
        ))
    });
    let err = flow.execute().await.unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::InsufficientGas));
    assert_eq!(err.to_string(), "Insufficient BNB for gas fees");
}

#[tokio::test]
async fn test_eligibility_read_failure_is_unknown_not_ineligible() {
    let ledger = MockLedger::new(cents(100), cents(0))
        .with(|s| s.read_error = Some(LedgerError::new("error sending request")));
    let flow = controller(DeploymentConfig::default(), &ledger);

    let err = flow
        .connect(&MockWallet::metamask().candidate())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::EligibilityCheckFailed));
    assert_eq!(flow.state(), FlowState::Connected);
    assert!(flow.snapshot().is_none());
    assert!(flow.session().is_some());

    ledger.set(|s| s.read_error = None);
    flow.refresh_eligibility().await.unwrap();
    assert_eq!(flow.state(), FlowState::ApprovalPending);
}

#[tokio::test]
async fn test_back_and_new_payment() {
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = approved(DeploymentConfig::default(), &ledger).await;

    flow.back().await.unwrap();
    assert_eq!(flow.state(), FlowState::ApprovalPending);

    flow.approve().await.unwrap();
    flow.execute().await.unwrap();
    assert!(flow.record().is_some());

    flow.new_payment().await.unwrap();
    assert_eq!(flow.state(), FlowState::ApprovalPending);
    assert!(flow.record().is_none());
    assert!(flow.snapshot().is_some());
}

#[tokio::test]
async fn test_actions_rejected_out_of_order() {
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = controller(DeploymentConfig::default(), &ledger);

    assert!(matches!(
        flow.execute().await,
        Err(FlowError::InvalidState { action: "execute", .. })
    ));

    flow.connect(&MockWallet::metamask().candidate())
        .await
        .unwrap();
    assert!(matches!(
        flow.execute().await,
        Err(FlowError::InvalidState {
            state: FlowState::ApprovalPending,
            ..
        })
    ));
    assert!(matches!(
        flow.new_payment().await,
        Err(FlowError::InvalidState { .. })
    ));
}

// -- Concurrency --

#[tokio::test]
async fn test_second_execute_while_pending_is_rejected() {
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = approved(DeploymentConfig::default(), &ledger).await;

    let release = ledger.gate_next_wait();
    let mut first = pin!(flow.execute());
    assert!(futures::poll!(first.as_mut()).is_pending());
    assert!(flow.is_busy());
    assert_eq!(flow.state(), FlowState::Executing);

    assert!(matches!(flow.execute().await, Err(FlowError::Busy)));
    assert!(matches!(flow.approve().await, Err(FlowError::Busy)));
    let distributions = ledger
        .submitted()
        .into_iter()
        .filter(|s| matches!(s, Submitted::Distribution { .. }))
        .count();
    assert_eq!(distributions, 1);

    release.send(()).unwrap();
    first.await.unwrap();
    assert!(!flow.is_busy());
    assert_eq!(flow.state(), FlowState::Completed);
}

#[tokio::test]
async fn test_disconnect_cancels_pending_action() {
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = approved(DeploymentConfig::default(), &ledger).await;

    let release = ledger.gate_next_wait();
    let mut pending = pin!(flow.execute());
    assert!(futures::poll!(pending.as_mut()).is_pending());

    flow.disconnect();
    assert_eq!(flow.state(), FlowState::Disconnected);
    assert!(!flow.is_busy(), "a new connect is possible right away");

    release.send(()).unwrap();
    assert!(matches!(pending.await, Err(FlowError::Cancelled)));
    assert_eq!(flow.state(), FlowState::Disconnected);
    assert!(flow.record().is_none());
    assert!(flow.session().is_none());
}

// -- Execution variants --

#[tokio::test]
async fn test_admin_mediated_payment() {
    let config = DeploymentConfig {
        route: ExecutionRoute::AdminMediated {
            admin: DEFAULT_ADMIN,
        },
        ..DeploymentConfig::default()
    };
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = connected(config, &ledger).await;

    let snap = flow.snapshot().unwrap();
    assert!(snap.has_allowance);
    assert_eq!(snap.allowance, None);

    // No spender: approval is a local step
    flow.approve().await.unwrap();
    assert_eq!(flow.state(), FlowState::Approved);
    assert!(ledger.submitted().is_empty());

    let record = flow.execute().await.unwrap();
    assert_eq!(
        ledger.submitted(),
        vec![Submitted::Transfer {
            to: DEFAULT_ADMIN,
            amount: cents(5),
        }]
    );
    assert_eq!(record.counterparty, Counterparty::Admin(DEFAULT_ADMIN));
    assert_eq!(record.execution_mode, ExecutionMode::AdminMediated);
    assert_eq!(record.total_amount.to_string(), "0.05");
}

#[tokio::test]
async fn test_direct_transfer_payment() {
    let config = DeploymentConfig {
        route: ExecutionRoute::DirectTransfer,
        ..DeploymentConfig::default()
    };
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = approved(config, &ledger).await;

    let record = flow.execute().await.unwrap();
    assert_eq!(
        ledger.submitted(),
        vec![
            Submitted::Transfer {
                to: DEFAULT_RECIPIENT_1,
                amount: cents(2),
            },
            Submitted::Transfer {
                to: DEFAULT_RECIPIENT_2,
                amount: cents(3),
            },
        ]
    );
    assert_eq!(record.counterparty, Counterparty::Recipients);
    let subs = record.sub_transactions.as_ref().unwrap();
    assert_eq!(subs.len(), 2);
    assert_eq!(record.transaction_hash, subs[0].hash);
    assert_eq!(record.gas_used, Some(100_000));
    assert_eq!(
        record.total_amount,
        Amount::sum(record.per_recipient.iter().map(|l| l.amount))
    );
}

#[tokio::test]
async fn test_direct_transfer_stops_at_revert() {
    let config = DeploymentConfig {
        route: ExecutionRoute::DirectTransfer,
        ..DeploymentConfig::default()
    };
    let ledger = MockLedger::new(cents(100), cents(0));
    let flow = approved(config, &ledger).await;

    ledger.set(|s| {
        s.statuses.push_back(TxStatus::Success);
        s.statuses.push_back(TxStatus::Reverted);
    });
    let err = flow.execute().await.unwrap_err();
    assert_eq!(err.kind(), Some(WalletErrorKind::ExecutionReverted));
    assert!(err.to_string().contains("Transfer 2 of 2"));
    assert_eq!(flow.state(), FlowState::Approved);
    assert!(flow.record().is_none());
}
