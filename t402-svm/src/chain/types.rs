//! Address and chain reference types for Solana.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use solana_pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;

use t402::chain::ChainId;

/// A Solana address (a base58-encoded ed25519 public key on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(Pubkey);

impl Address {
    /// Wraps a public key.
    #[must_use]
    pub const fn new(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }

    /// Returns the inner public key.
    #[must_use]
    pub const fn pubkey(&self) -> &Pubkey {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = solana_pubkey::ParsePubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Pubkey>().map(Self)
    }
}

impl From<Pubkey> for Address {
    fn from(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }
}

impl From<Address> for Pubkey {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl PartialEq<Pubkey> for Address {
    fn eq(&self, other: &Pubkey) -> bool {
        &self.0 == other
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A Solana chain reference: the CAIP-2 reference string (truncated
/// genesis hash, e.g., `"EtWTRABZaYq6iMfeYKouRu166VU2xqa1"` for devnet).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SolanaChainReference(String);

impl SolanaChainReference {
    /// Creates a chain reference.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Returns the reference string.
    #[must_use]
    pub fn inner(&self) -> &str {
        &self.0
    }

    /// Returns the CAIP-2 chain ID for this reference.
    #[must_use]
    pub fn as_chain_id(&self) -> ChainId {
        ChainId::new("solana", self.0.clone())
    }
}

impl fmt::Display for SolanaChainReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "solana:{}", self.0)
    }
}

impl From<SolanaChainReference> for ChainId {
    fn from(value: SolanaChainReference) -> Self {
        value.as_chain_id()
    }
}

impl From<&SolanaChainReference> for ChainId {
    fn from(value: &SolanaChainReference) -> Self {
        value.as_chain_id()
    }
}

impl TryFrom<&ChainId> for SolanaChainReference {
    type Error = String;

    fn try_from(value: &ChainId) -> Result<Self, Self::Error> {
        if value.namespace() != "solana" {
            return Err(format!("not a solana chain: {value}"));
        }
        Ok(Self(value.reference().to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_base58_serde() {
        let address: Address = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"
            .parse()
            .unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }

    #[test]
    fn chain_reference_roundtrip() {
        let devnet = SolanaChainReference::new("EtWTRABZaYq6iMfeYKouRu166VU2xqa1");
        let chain_id: ChainId = (&devnet).into();
        assert_eq!(chain_id.to_string(), "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1");
        assert_eq!(SolanaChainReference::try_from(&chain_id).unwrap(), devnet);
    }
}
