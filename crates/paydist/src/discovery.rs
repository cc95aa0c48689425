//! Wallet discovery over the host's injected signing capability.
//!
//! The host object is inspected exactly once per pass: vendor flags are
//! evaluated into immutable [`WalletCandidate`] values so nothing downstream
//! needs to re-inspect the opaque handle.

use std::collections::BTreeSet;

use crate::error::HostAccessError;

/// Wallet implementations recognised by their injected marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vendor {
    MetaMask,
    TrustWallet,
    CoinbaseWallet,
    SafePal,
    Exodus,
    Xdefi,
    Keplr,
    Trezor,
    Ledger,
    /// Injected provider with no recognised marker.
    Generic,
}

impl Vendor {
    /// Vendors identified by a boolean flag on the provider object, in
    /// detection order.
    pub const FLAGGED: [Vendor; 8] = [
        Vendor::MetaMask,
        Vendor::TrustWallet,
        Vendor::CoinbaseWallet,
        Vendor::SafePal,
        Vendor::Exodus,
        Vendor::Xdefi,
        Vendor::Trezor,
        Vendor::Ledger,
    ];

    /// Order in which candidates found on the primary provider are listed.
    pub const DETECTION_ORDER: [Vendor; 9] = [
        Vendor::MetaMask,
        Vendor::TrustWallet,
        Vendor::CoinbaseWallet,
        Vendor::SafePal,
        Vendor::Exodus,
        Vendor::Xdefi,
        Vendor::Keplr,
        Vendor::Trezor,
        Vendor::Ledger,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Vendor::MetaMask => "MetaMask",
            Vendor::TrustWallet => "Trust Wallet",
            Vendor::CoinbaseWallet => "Coinbase Wallet",
            Vendor::SafePal => "SafePal",
            Vendor::Exodus => "Exodus",
            Vendor::Xdefi => "XDEFI Wallet",
            Vendor::Trezor => "Trezor",
            Vendor::Ledger => "Ledger",
            Vendor::Keplr => "Keplr Wallet",
            Vendor::Generic => "Web3 Wallet",
        }
    }

    /// Marker property the vendor sets on its provider object.
    pub fn flag(self) -> Option<&'static str> {
        match self {
            Vendor::MetaMask => Some("isMetaMask"),
            Vendor::TrustWallet => Some("isTrust"),
            Vendor::CoinbaseWallet => Some("isCoinbaseWallet"),
            Vendor::SafePal => Some("isSafePal"),
            Vendor::Exodus => Some("isExodus"),
            Vendor::Xdefi => Some("isXDEFI"),
            Vendor::Trezor => Some("isTrezor"),
            Vendor::Ledger => Some("isLedger"),
            Vendor::Keplr | Vendor::Generic => None,
        }
    }
}

/// Host global whose presence signals a Keplr installation.
pub const KEPLR_GLOBAL: &str = "keplr";

/// An injected provider object as exposed by the host.
pub trait HostProvider: Clone {
    /// Whether the boolean marker `name` is set on this object.
    fn flag(&self, name: &str) -> Result<bool, HostAccessError>;

    /// Sub-providers when this handle multiplexes several wallets; empty otherwise.
    fn sub_providers(&self) -> Result<Vec<Self>, HostAccessError>;

    /// The sub-provider a multiplexing handle currently routes to, if it
    /// exposes one (`selectedProvider`).
    fn selected_provider(&self) -> Result<Option<Self>, HostAccessError> {
        Ok(None)
    }
}

/// The environment that may inject a signing capability.
pub trait Host {
    type Provider: HostProvider;

    /// The injected provider, if any.
    fn injected_provider(&self) -> Result<Option<Self::Provider>, HostAccessError>;

    /// Whether a named global object exists.
    fn has_global(&self, name: &str) -> Result<bool, HostAccessError>;
}

/// A detected wallet, ready to hand to the connection manager.
#[derive(Debug, Clone)]
pub struct WalletCandidate<H> {
    pub vendor: Vendor,
    pub name: String,
    /// Vendor markers that were set on `handle` at discovery time.
    pub capability_flags: BTreeSet<String>,
    pub handle: H,
}

impl<H> WalletCandidate<H> {
    fn new(vendor: Vendor, capability_flags: BTreeSet<String>, handle: H) -> Self {
        Self {
            vendor,
            name: vendor.name().to_string(),
            capability_flags,
            handle,
        }
    }
}

fn present_flags<P: HostProvider>(provider: &P) -> Result<BTreeSet<String>, HostAccessError> {
    let mut flags = BTreeSet::new();
    for vendor in Vendor::FLAGGED {
        if let Some(flag) = vendor.flag() {
            if provider.flag(flag)? {
                flags.insert(flag.to_string());
            }
        }
    }
    Ok(flags)
}

/// Enumerate the wallets the host exposes. Never fails: a host that blocks
/// access yields an empty list.
pub fn discover<E: Host>(host: &E) -> Vec<WalletCandidate<E::Provider>> {
    match try_discover(host) {
        Ok(candidates) => {
            tracing::debug!(
                count = candidates.len(),
                wallets = ?candidates.iter().map(|c| c.vendor).collect::<Vec<_>>(),
                "wallet discovery complete"
            );
            candidates
        }
        Err(e) => {
            tracing::warn!(error = %e, "wallet detection blocked by host, reporting none");
            Vec::new()
        }
    }
}

fn try_discover<E: Host>(
    host: &E,
) -> Result<Vec<WalletCandidate<E::Provider>>, HostAccessError> {
    let Some(primary) = host.injected_provider()? else {
        return Ok(Vec::new());
    };

    let mut primary_flags = present_flags(&primary)?;
    // Coinbase's multiplexer marks only the provider it routes to.
    if let Some(flag) = Vendor::CoinbaseWallet.flag() {
        if let Some(selected) = primary.selected_provider()? {
            if selected.flag(flag)? {
                primary_flags.insert(flag.to_string());
            }
        }
    }

    let mut candidates: Vec<WalletCandidate<E::Provider>> = Vec::new();
    for vendor in Vendor::DETECTION_ORDER {
        let found = match vendor.flag() {
            Some(flag) => primary_flags.contains(flag),
            None => vendor == Vendor::Keplr && host.has_global(KEPLR_GLOBAL)?,
        };
        if found {
            candidates.push(WalletCandidate::new(
                vendor,
                primary_flags.clone(),
                primary.clone(),
            ));
        }
    }

    for sub in primary.sub_providers()? {
        let sub_flags = present_flags(&sub)?;
        for vendor in Vendor::FLAGGED {
            let Some(flag) = vendor.flag() else { continue };
            if sub_flags.contains(flag) && !candidates.iter().any(|c| c.vendor == vendor) {
                candidates.push(WalletCandidate::new(vendor, sub_flags.clone(), sub.clone()));
            }
        }
    }

    if candidates.is_empty() {
        candidates.push(WalletCandidate::new(Vendor::Generic, primary_flags, primary));
    }

    Ok(candidates)
}
