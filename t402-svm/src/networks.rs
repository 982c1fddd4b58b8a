//! Known Solana network and USDC mint tables.

use t402::networks::NetworkInfo;

/// CAIP-2 reference for Solana mainnet (truncated genesis hash).
pub const SOLANA_MAINNET_REFERENCE: &str = "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp";

/// CAIP-2 reference for Solana devnet (truncated genesis hash).
pub const SOLANA_DEVNET_REFERENCE: &str = "EtWTRABZaYq6iMfeYKouRu166VU2xqa1";

/// USDC mint on Solana mainnet.
pub const USDC_MAINNET_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// USDC mint on Solana devnet.
pub const USDC_DEVNET_MINT: &str = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU";

/// USDC decimals on Solana.
pub const USDC_DECIMALS: u8 = 6;

/// V1 legacy network names for Solana chains, for the core
/// [`t402::networks::NetworkRegistry`].
pub const SOLANA_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "solana",
        namespace: "solana",
        reference: SOLANA_MAINNET_REFERENCE,
    },
    NetworkInfo {
        name: "solana-devnet",
        namespace: "solana",
        reference: SOLANA_DEVNET_REFERENCE,
    },
];

/// Returns the default USDC mint for a CAIP-2 solana network, if known.
#[must_use]
pub fn default_usdc_mint(network: &str) -> Option<&'static str> {
    match network {
        n if n == format!("solana:{SOLANA_MAINNET_REFERENCE}") => Some(USDC_MAINNET_MINT),
        n if n == format!("solana:{SOLANA_DEVNET_REFERENCE}") => Some(USDC_DEVNET_MINT),
        _ => None,
    }
}
