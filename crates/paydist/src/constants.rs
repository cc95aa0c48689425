use alloy::primitives::{address, Address};

use crate::amount::Amount;

/// BSC Testnet chain ID.
pub const BSC_TESTNET_CHAIN_ID: u64 = 97;

/// Display name used when asking a wallet to register the network.
pub const BSC_TESTNET_NAME: &str = "Binance Smart Chain Testnet";

pub const NATIVE_CURRENCY_NAME: &str = "BNB";
pub const NATIVE_CURRENCY_SYMBOL: &str = "BNB";
pub const NATIVE_CURRENCY_DECIMALS: u8 = 18;

/// Public RPC endpoints for BSC Testnet, in preference order.
pub const RPC_URLS: &[&str] = &[
    "https://data-seed-prebsc-1-s1.binance.org:8545/",
    "https://data-seed-prebsc-2-s1.binance.org:8545/",
    "https://data-seed-prebsc-1-s2.binance.org:8545/",
];

/// Block explorer base URL.
pub const EXPLORER_BASE: &str = "https://testnet.bscscan.com";

/// BEP-20 USDT on BSC Testnet.
pub const DEFAULT_TOKEN: Address = address!("337610d27c682E347C9cD60BD4b3b107C9d34dDd");

pub const TOKEN_SYMBOL: &str = "USDT";

/// PaymentDistributor contract deployed on BSC Testnet.
pub const DEFAULT_DISTRIBUTOR: Address = address!("708bb8cfacfb992d7b00e0afe415aec608d73f7c");

/// Collection wallet for the admin-mediated variant.
pub const DEFAULT_ADMIN: Address = address!("f52f981dafb26dc2ce86e48fbf6fbc2e35cd9444");

pub const DEFAULT_RECIPIENT_1: Address = address!("f52f981dafb26dc2ce86e48fbf6fbc2e35cd9444");
pub const DEFAULT_RECIPIENT_2: Address = address!("73D5906Cbf60ecD8b5C0F89ae25fbEabeFdc894E");

/// Total charged per payment, split across the default recipients.
pub const DEFAULT_TOTAL: Amount = Amount::from_parts(5, 2);

pub const DEFAULT_SHARE_1: Amount = Amount::from_parts(2, 2);
pub const DEFAULT_SHARE_2: Amount = Amount::from_parts(3, 2);

// EIP-1193 provider error codes.

/// The user declined the request in the wallet UI.
pub const USER_REJECTED_CODE: i64 = 4001;

/// `wallet_switchEthereumChain` was asked for a chain the wallet does not know.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// An identical authorization request is already open in the wallet.
pub const REQUEST_PENDING_CODE: i64 = -32002;
