use std::env;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::amount::Amount;
use crate::constants::*;
use crate::error::ConfigError;

/// Native currency of the required network, as registered with wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Everything a wallet needs to switch to, or register, the required network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub explorer_url: String,
}

impl Default for NetworkDescriptor {
    /// Defaults to BSC Testnet.
    fn default() -> Self {
        Self {
            chain_id: BSC_TESTNET_CHAIN_ID,
            chain_name: BSC_TESTNET_NAME.to_string(),
            native_currency: NativeCurrency {
                name: NATIVE_CURRENCY_NAME.to_string(),
                symbol: NATIVE_CURRENCY_SYMBOL.to_string(),
                decimals: NATIVE_CURRENCY_DECIMALS,
            },
            rpc_urls: RPC_URLS.iter().map(|s| s.to_string()).collect(),
            explorer_url: EXPLORER_BASE.to_string(),
        }
    }
}

impl NetworkDescriptor {
    /// Chain id as the `0x`-prefixed hex quantity wallets expect.
    pub fn hex_chain_id(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// `wallet_addEthereumChain` parameter object (EIP-3085).
    pub fn add_chain_params(&self) -> serde_json::Value {
        serde_json::json!({
            "chainId": self.hex_chain_id(),
            "chainName": self.chain_name,
            "nativeCurrency": self.native_currency,
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": [format!("{}/", self.explorer_base())],
        })
    }

    fn explorer_base(&self) -> &str {
        self.explorer_url.trim_end_matches('/')
    }

    pub fn tx_url(&self, hash: &impl std::fmt::Display) -> String {
        format!("{}/tx/{}", self.explorer_base(), hash)
    }

    pub fn address_url(&self, address: &Address) -> String {
        format!("{}/address/{}", self.explorer_base(), address.to_checksum(None))
    }
}

/// One configured recipient share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub recipient: Address,
    pub amount: Amount,
    pub label: String,
    pub percentage: String,
}

/// Which flow variant runs. Decided once when the configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// A distributor contract pulls the total under an allowance and splits it.
    SmartContract,
    /// The payer transfers the total to a collection wallet.
    AdminMediated,
    /// The payer transfers each share directly.
    DirectTransfer,
}

impl std::str::FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "smartcontract" | "contract" => Ok(ExecutionMode::SmartContract),
            "adminmediated" | "admin" => Ok(ExecutionMode::AdminMediated),
            "directtransfer" | "direct" => Ok(ExecutionMode::DirectTransfer),
            _ => Err(ConfigError::InvalidValue("PAYDIST_MODE", s.to_string())),
        }
    }
}

/// Resolved execution mode together with the address it pays through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionRoute {
    SmartContract { distributor: Address },
    AdminMediated { admin: Address },
    DirectTransfer,
}

impl ExecutionRoute {
    /// Precedence: an explicit preference wins when its address is
    /// configured; otherwise distributor, then admin, then direct transfer.
    pub fn resolve(
        distributor: Option<Address>,
        admin: Option<Address>,
        preferred: Option<ExecutionMode>,
    ) -> Result<Self, ConfigError> {
        match preferred {
            Some(ExecutionMode::SmartContract) => distributor
                .map(|distributor| ExecutionRoute::SmartContract { distributor })
                .ok_or(ConfigError::ModeUnavailable(ExecutionMode::SmartContract)),
            Some(ExecutionMode::AdminMediated) => admin
                .map(|admin| ExecutionRoute::AdminMediated { admin })
                .ok_or(ConfigError::ModeUnavailable(ExecutionMode::AdminMediated)),
            Some(ExecutionMode::DirectTransfer) => Ok(ExecutionRoute::DirectTransfer),
            None => Ok(match (distributor, admin) {
                (Some(distributor), _) => ExecutionRoute::SmartContract { distributor },
                (None, Some(admin)) => ExecutionRoute::AdminMediated { admin },
                (None, None) => ExecutionRoute::DirectTransfer,
            }),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            ExecutionRoute::SmartContract { .. } => ExecutionMode::SmartContract,
            ExecutionRoute::AdminMediated { .. } => ExecutionMode::AdminMediated,
            ExecutionRoute::DirectTransfer => ExecutionMode::DirectTransfer,
        }
    }

    /// The address that must hold an allowance before execution, if any.
    pub fn spender(&self) -> Option<Address> {
        match self {
            ExecutionRoute::SmartContract { distributor } => Some(*distributor),
            _ => None,
        }
    }
}

/// Static deployment input: network, contracts, recipients, price.
///
/// Construct with [`DeploymentConfig::new`] or [`DeploymentConfig::from_env`];
/// both validate the distribution list against the required total.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub network: NetworkDescriptor,
    pub token: Address,
    pub token_symbol: String,
    pub route: ExecutionRoute,
    pub distributions: Vec<Distribution>,
    pub required_total: Amount,
}

impl Default for DeploymentConfig {
    /// The BSC Testnet smart-contract deployment.
    fn default() -> Self {
        Self {
            network: NetworkDescriptor::default(),
            token: DEFAULT_TOKEN,
            token_symbol: TOKEN_SYMBOL.to_string(),
            route: ExecutionRoute::SmartContract {
                distributor: DEFAULT_DISTRIBUTOR,
            },
            distributions: default_distributions(),
            required_total: DEFAULT_TOTAL,
        }
    }
}

fn default_distributions() -> Vec<Distribution> {
    vec![
        Distribution {
            recipient: DEFAULT_RECIPIENT_1,
            amount: DEFAULT_SHARE_1,
            label: "Recipient 1".to_string(),
            percentage: "40%".to_string(),
        },
        Distribution {
            recipient: DEFAULT_RECIPIENT_2,
            amount: DEFAULT_SHARE_2,
            label: "Recipient 2".to_string(),
            percentage: "60%".to_string(),
        },
    ]
}

impl DeploymentConfig {
    /// Build and validate a configuration.
    pub fn new(
        network: NetworkDescriptor,
        token: Address,
        token_symbol: impl Into<String>,
        route: ExecutionRoute,
        distributions: Vec<Distribution>,
        required_total: Amount,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            network,
            token,
            token_symbol: token_symbol.into(),
            route,
            distributions,
            required_total,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn mode(&self) -> ExecutionMode {
        self.route.mode()
    }

    /// Check the invariants downstream code relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.distributions.is_empty() {
            return Err(ConfigError::InvalidDistributions(
                "at least one recipient is required".to_string(),
            ));
        }
        for (i, d) in self.distributions.iter().enumerate() {
            if d.recipient == Address::ZERO {
                return Err(ConfigError::InvalidDistributions(format!(
                    "recipient #{} has the zero address",
                    i + 1
                )));
            }
            if d.amount.is_zero() {
                return Err(ConfigError::InvalidDistributions(format!(
                    "recipient #{} has a zero amount",
                    i + 1
                )));
            }
        }

        let sum = Amount::sum(self.distributions.iter().map(|d| d.amount));
        if sum != self.required_total {
            return Err(ConfigError::TotalMismatch {
                sum: sum.to_string(),
                required: self.required_total.to_string(),
            });
        }

        for rpc in &self.network.rpc_urls {
            Url::parse(rpc).map_err(|_| ConfigError::InvalidUrl(rpc.clone()))?;
        }
        Url::parse(&self.network.explorer_url)
            .map_err(|_| ConfigError::InvalidUrl(self.network.explorer_url.clone()))?;

        Ok(())
    }

    /// Load from `PAYDIST_*` environment variables, falling back to the
    /// BSC Testnet deployment for anything unset.
    ///
    /// `PAYDIST_DISTRIBUTIONS` is a JSON array of
    /// `{"recipient", "amount", "label", "percentage"}` objects.
    /// Setting `PAYDIST_DISTRIBUTOR` or `PAYDIST_ADMIN` to an empty string
    /// removes that address.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mut network = defaults.network;
        if let Some(v) = non_empty("PAYDIST_CHAIN_ID") {
            network.chain_id = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYDIST_CHAIN_ID", v))?;
        }
        if let Some(v) = non_empty("PAYDIST_CHAIN_NAME") {
            network.chain_name = v;
        }
        if let Some(v) = non_empty("PAYDIST_NATIVE_SYMBOL") {
            network.native_currency.name = v.clone();
            network.native_currency.symbol = v;
        }
        if let Some(v) = non_empty("PAYDIST_RPC_URLS") {
            network.rpc_urls = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = non_empty("PAYDIST_EXPLORER_URL") {
            network.explorer_url = v;
        }

        let token = match non_empty("PAYDIST_TOKEN") {
            Some(v) => parse_address("PAYDIST_TOKEN", &v)?,
            None => defaults.token,
        };
        let token_symbol = non_empty("PAYDIST_TOKEN_SYMBOL").unwrap_or(defaults.token_symbol);

        let distributor = optional_address("PAYDIST_DISTRIBUTOR", Some(DEFAULT_DISTRIBUTOR))?;
        let admin = optional_address("PAYDIST_ADMIN", Some(DEFAULT_ADMIN))?;
        let preferred = non_empty("PAYDIST_MODE")
            .map(|v| v.parse::<ExecutionMode>())
            .transpose()?;
        let route = ExecutionRoute::resolve(distributor, admin, preferred)?;

        let distributions = match non_empty("PAYDIST_DISTRIBUTIONS") {
            Some(v) => serde_json::from_str(&v)?,
            None => defaults.distributions,
        };
        let required_total = match non_empty("PAYDIST_TOTAL") {
            Some(v) => v
                .parse()
                .map_err(|e| ConfigError::InvalidAmount("PAYDIST_TOTAL", e))?,
            None => defaults.required_total,
        };

        let config = Self::new(
            network,
            token,
            token_symbol,
            route,
            distributions,
            required_total,
        )?;

        tracing::info!(
            chain_id = config.network.chain_id,
            token = %config.token,
            mode = ?config.mode(),
            recipients = config.distributions.len(),
            total = %config.required_total,
            "deployment configuration loaded"
        );

        Ok(config)
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parse_address(key: &'static str, value: &str) -> Result<Address, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(key, value.to_string()))
}

/// Unset keeps the default; set-but-empty clears it.
fn optional_address(
    key: &'static str,
    default: Option<Address>,
) -> Result<Option<Address>, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => parse_address(key, &v).map(Some),
    }
}
