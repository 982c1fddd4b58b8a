//! Wire and configuration types for EVM chains.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use t402::chain::ChainId;

/// A numeric EIP-155 chain reference (e.g., `8453` for Base).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Eip155ChainReference(u64);

impl Eip155ChainReference {
    /// Creates a chain reference from its numeric value.
    #[must_use]
    pub const fn new(chain_id: u64) -> Self {
        Self(chain_id)
    }

    /// Returns the numeric chain ID.
    #[must_use]
    pub const fn inner(&self) -> u64 {
        self.0
    }

    /// Returns the CAIP-2 chain ID for this reference.
    #[must_use]
    pub fn as_chain_id(&self) -> ChainId {
        ChainId::new("eip155", self.0.to_string())
    }
}

impl fmt::Display for Eip155ChainReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eip155:{}", self.0)
    }
}

impl From<Eip155ChainReference> for ChainId {
    fn from(value: Eip155ChainReference) -> Self {
        value.as_chain_id()
    }
}

impl From<&Eip155ChainReference> for ChainId {
    fn from(value: &Eip155ChainReference) -> Self {
        value.as_chain_id()
    }
}

impl TryFrom<&ChainId> for Eip155ChainReference {
    type Error = String;

    fn try_from(value: &ChainId) -> Result<Self, Self::Error> {
        if value.namespace() != "eip155" {
            return Err(format!("not an eip155 chain: {value}"));
        }
        let reference = value
            .reference()
            .parse::<u64>()
            .map_err(|e| format!("invalid eip155 reference: {e}"))?;
        Ok(Self(reference))
    }
}

/// A `U256` token amount that serializes as a decimal string.
///
/// Amounts in their smallest unit regularly exceed what JSON numbers can
/// represent, so the wire format is a string (e.g., `"1000000"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    /// Returns the inner `U256`.
    #[must_use]
    pub const fn inner(&self) -> U256 {
        self.0
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = alloy_primitives::ruint::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str_radix(s, 10).map(Self)
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Static information about a token deployment on one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    /// The token contract address.
    pub address: Address,
    /// Token decimals (6 for USDC).
    pub decimals: u8,
    /// EIP-712 domain name as returned by the contract's `name()`.
    pub name: String,
    /// EIP-712 domain version as returned by the contract's `version()`.
    pub version: String,
}

/// Static configuration for one known EVM network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// CAIP-2 network identifier (e.g., `"eip155:8453"`).
    pub network: String,
    /// Numeric chain ID.
    pub chain_id: u64,
    /// Known payment assets, default first.
    pub assets: Vec<AssetInfo>,
}

impl NetworkConfig {
    /// Finds an asset on this network by contract address.
    #[must_use]
    pub fn find_asset(&self, address: Address) -> Option<&AssetInfo> {
        self.assets.iter().find(|a| a.address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_reference_caip2() {
        let base = Eip155ChainReference::new(8453);
        assert_eq!(base.to_string(), "eip155:8453");
        let chain_id: ChainId = base.into();
        assert_eq!(chain_id, ChainId::new("eip155", "8453"));
        let back = Eip155ChainReference::try_from(&chain_id).unwrap();
        assert_eq!(back, base);
        assert!(Eip155ChainReference::try_from(&ChainId::new("solana", "devnet")).is_err());
    }

    #[test]
    fn token_amount_string_serde() {
        let amount = TokenAmount::from(1_000_000u64);
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"1000000\"");
        let back: TokenAmount = serde_json::from_str("\"1000000\"").unwrap();
        assert_eq!(back, amount);
        assert!(serde_json::from_str::<TokenAmount>("\"12.5\"").is_err());
    }
}
