//! Blockchain identifiers and provider abstractions.
//!
//! - [`ChainId`] — a CAIP-2 compliant chain identifier (e.g., `eip155:8453`)
//! - [`ChainProvider`] — the minimal surface every chain provider exposes
//!
//! The family wildcard used by the scheme registry is a [`ChainId`] whose
//! reference is `"*"` (e.g., `eip155:*`).

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// A CAIP-2 compliant blockchain identifier.
///
/// The format is `namespace:reference` where `namespace` identifies the
/// blockchain family (e.g., `eip155`, `solana`) and `reference` identifies
/// the specific chain within that family.
///
/// # Example
///
/// ```
/// use t402::chain::ChainId;
///
/// let base = ChainId::new("eip155", "8453");
/// assert_eq!(base.to_string(), "eip155:8453");
///
/// let parsed: ChainId = "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1".parse().unwrap();
/// assert_eq!(parsed.namespace(), "solana");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    /// Creates a new chain ID from namespace and reference components.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Creates the family wildcard for a namespace (reference `"*"`).
    pub fn wildcard<N: Into<String>>(namespace: N) -> Self {
        Self::new(namespace, "*")
    }

    /// Returns the namespace component of the chain ID.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the reference component of the chain ID.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Returns `true` if this is a family wildcard (`namespace:*`).
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.reference == "*"
    }

    /// Returns the family wildcard for this chain's namespace.
    #[must_use]
    pub fn family(&self) -> Self {
        Self::wildcard(self.namespace.clone())
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// Error returned when parsing an invalid chain ID string.
///
/// A valid chain ID must be `namespace:reference` with both components
/// non-empty.
#[derive(Debug, thiserror::Error)]
#[error("Invalid chain id format {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s.split_once(':').ok_or(ChainIdFormatError(s.into()))?;
        if namespace.is_empty() || reference.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        Ok(Self {
            namespace: namespace.into(),
            reference: reference.into(),
        })
    }
}

impl Serialize for ChainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// Common operations available on all chain providers.
///
/// This is the minimal surface the scheme registry and facilitator need to
/// know about a provider regardless of the underlying blockchain.
pub trait ChainProvider {
    /// Returns the addresses of all configured signers for this chain.
    ///
    /// For EVM chains these are 0x-prefixed hex addresses; for Solana they
    /// are base58-encoded public keys.
    fn signer_addresses(&self) -> Vec<String>;

    /// Returns the CAIP-2 chain identifier for this provider.
    fn chain_id(&self) -> ChainId;
}

impl<T: ChainProvider> ChainProvider for std::sync::Arc<T> {
    fn signer_addresses(&self) -> Vec<String> {
        (**self).signer_addresses()
    }
    fn chain_id(&self) -> ChainId {
        (**self).chain_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_eip155() {
        let original = ChainId::new("eip155", "8453");
        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, "\"eip155:8453\"");
        let back: ChainId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn roundtrip_solana() {
        let original = ChainId::new("solana", "EtWTRABZaYq6iMfeYKouRu166VU2xqa1");
        let back: ChainId =
            serde_json::from_str(&serde_json::to_string(&original).unwrap()).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn rejects_missing_reference() {
        assert!("eip155".parse::<ChainId>().is_err());
        assert!("eip155:".parse::<ChainId>().is_err());
        assert!(":8453".parse::<ChainId>().is_err());
    }

    #[test]
    fn wildcard_family() {
        let base = ChainId::new("eip155", "8453");
        assert!(!base.is_wildcard());
        let family = base.family();
        assert!(family.is_wildcard());
        assert_eq!(family.to_string(), "eip155:*");
    }
}
