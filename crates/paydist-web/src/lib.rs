//! Browser bindings for paydist.
//!
//! Wires the payment flow to the page: wallets are discovered on `window`,
//! requests go through the injected EIP-1193 provider, and confirmations are
//! polled on a browser timer.

use std::time::Duration;

use wasm_bindgen::prelude::*;

use paydist::{discover, DeploymentConfig, PaymentFlowController, Session, Timer, WalletLedger};

mod host;

pub use host::{BrowserHost, InjectedProvider};

/// [`Timer`] backed by `setTimeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlooTimer;

impl Timer for GlooTimer {
    async fn sleep(&self, duration: Duration) {
        gloo_timers::future::sleep(duration).await
    }
}

pub type BrowserLedger = WalletLedger<InjectedProvider, GlooTimer>;

pub type BrowserController =
    PaymentFlowController<InjectedProvider, fn(&Session<InjectedProvider>) -> BrowserLedger>;

/// Ledger that signs through the same provider the session connected.
pub fn wallet_ledger(session: &Session<InjectedProvider>) -> BrowserLedger {
    WalletLedger::new(session.handle.clone(), session.address, GlooTimer)
}

/// Controller for `config` whose ledger calls go through the connected wallet.
pub fn browser_controller(config: DeploymentConfig) -> BrowserController {
    PaymentFlowController::new(
        config,
        wallet_ledger as fn(&Session<InjectedProvider>) -> BrowserLedger,
    )
}

/// Names of the wallets injected into this page, in detection order.
#[wasm_bindgen(js_name = detectWallets)]
pub fn detect_wallets() -> Vec<String> {
    match BrowserHost::window() {
        Some(host) => discover(&host).into_iter().map(|c| c.name).collect(),
        None => Vec::new(),
    }
}

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}
