//! Known EVM network and USDC deployment tables.

use alloy_primitives::{Address, address};

use t402::networks::NetworkInfo;

use crate::chain::{AssetInfo, NetworkConfig};

/// Base Mainnet chain ID.
pub const BASE_MAINNET: u64 = 8453;

/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: u64 = 84532;

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: u64 = 1;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: u64 = 137;

/// Polygon Amoy (testnet) chain ID.
pub const POLYGON_AMOY: u64 = 80002;

/// Avalanche C-Chain chain ID.
pub const AVALANCHE_MAINNET: u64 = 43114;

/// Avalanche Fuji (testnet) chain ID.
pub const AVALANCHE_FUJI: u64 = 43113;

/// Sei Mainnet (pacific-1 EVM) chain ID.
pub const SEI_MAINNET: u64 = 1329;

/// Sei Testnet (atlantic-2 EVM) chain ID.
pub const SEI_TESTNET: u64 = 1328;

/// USDC contract address on Base Mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC contract address on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// USDC contract address on Ethereum Mainnet.
pub const USDC_ETHEREUM: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// USDC contract address on Polygon Mainnet.
pub const USDC_POLYGON: Address = address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359");

/// USDC contract address on Polygon Amoy (Circle native).
pub const USDC_POLYGON_AMOY: Address = address!("41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582");

/// USDC contract address on Avalanche C-Chain.
pub const USDC_AVALANCHE: Address = address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");

/// USDC contract address on Avalanche Fuji.
pub const USDC_AVALANCHE_FUJI: Address = address!("5425890298aed601595a70AB815c96711a31Bc65");

/// USDC contract address on Sei Mainnet (Circle native).
pub const USDC_SEI: Address = address!("3894085Ef7Ff0f0aeDf52E2A2704928d1Ec074F1");

/// USDC contract address on Sei Testnet.
pub const USDC_SEI_TESTNET: Address = address!("4fCF1784B31630811181f670Aea7A7bEF803eaED");

/// Default EIP-712 domain name for USDC.
pub const DEFAULT_USDC_NAME: &str = "USD Coin";

/// Default EIP-712 domain version for USDC.
pub const DEFAULT_USDC_VERSION: &str = "2";

/// Default token decimals for USDC.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

/// V1 legacy network names for EVM chains, for the core
/// [`t402::networks::NetworkRegistry`].
pub const EVM_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "base",
        namespace: "eip155",
        reference: "8453",
    },
    NetworkInfo {
        name: "base-sepolia",
        namespace: "eip155",
        reference: "84532",
    },
    NetworkInfo {
        name: "ethereum",
        namespace: "eip155",
        reference: "1",
    },
    NetworkInfo {
        name: "polygon",
        namespace: "eip155",
        reference: "137",
    },
    NetworkInfo {
        name: "polygon-amoy",
        namespace: "eip155",
        reference: "80002",
    },
    NetworkInfo {
        name: "avalanche",
        namespace: "eip155",
        reference: "43114",
    },
    NetworkInfo {
        name: "avalanche-fuji",
        namespace: "eip155",
        reference: "43113",
    },
    NetworkInfo {
        name: "sei",
        namespace: "eip155",
        reference: "1329",
    },
    NetworkInfo {
        name: "sei-testnet",
        namespace: "eip155",
        reference: "1328",
    },
];

/// Returns configurations for all known EVM networks.
#[must_use]
pub fn known_networks() -> Vec<NetworkConfig> {
    vec![
        network(BASE_MAINNET, usdc(USDC_BASE, DEFAULT_USDC_NAME)),
        // Base Sepolia USDC returns "USDC" from name(), not "USD Coin".
        network(BASE_SEPOLIA, usdc(USDC_BASE_SEPOLIA, "USDC")),
        network(ETHEREUM_MAINNET, usdc(USDC_ETHEREUM, DEFAULT_USDC_NAME)),
        network(POLYGON_MAINNET, usdc(USDC_POLYGON, DEFAULT_USDC_NAME)),
        // Polygon Amoy runs the newer FiatTokenV2_2 with name() = "USDC".
        network(POLYGON_AMOY, usdc(USDC_POLYGON_AMOY, "USDC")),
        network(AVALANCHE_MAINNET, usdc(USDC_AVALANCHE, DEFAULT_USDC_NAME)),
        network(
            AVALANCHE_FUJI,
            usdc(USDC_AVALANCHE_FUJI, DEFAULT_USDC_NAME),
        ),
        network(SEI_MAINNET, usdc(USDC_SEI, "USDC")),
        network(SEI_TESTNET, usdc(USDC_SEI_TESTNET, "USDC")),
    ]
}

/// Returns the config for a numeric chain ID, if known.
#[must_use]
pub fn network_config(chain_id: u64) -> Option<NetworkConfig> {
    known_networks().into_iter().find(|n| n.chain_id == chain_id)
}

fn network(chain_id: u64, asset: AssetInfo) -> NetworkConfig {
    NetworkConfig {
        network: format!("eip155:{chain_id}"),
        chain_id,
        assets: vec![asset],
    }
}

fn usdc(address: Address, name: &str) -> AssetInfo {
    AssetInfo {
        address,
        decimals: DEFAULT_TOKEN_DECIMALS,
        name: name.to_owned(),
        version: DEFAULT_USDC_VERSION.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_legacy_name_has_a_config() {
        for info in EVM_NETWORKS {
            let chain_id: u64 = info.reference.parse().unwrap();
            assert!(
                network_config(chain_id).is_some(),
                "missing config for {}",
                info.name
            );
        }
    }
}
