//! Network name registry for V1 compatibility.
//!
//! V1 of the protocol identifies networks by human-readable names
//! (`"base-sepolia"`) where V2 uses CAIP-2 chain IDs (`eip155:84532`).
//! Concrete network tables live in the chain crates (`t402-evm` exports
//! `EVM_NETWORKS`, `t402-svm` exports `SOLANA_NETWORKS`); applications
//! assemble a [`NetworkRegistry`] from those slices at startup.

use std::collections::HashMap;

use crate::chain::ChainId;

/// A known network definition with its chain ID and human-readable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Human-readable network name (e.g., "base-sepolia", "solana")
    pub name: &'static str,
    /// CAIP-2 namespace (e.g., "eip155", "solana")
    pub namespace: &'static str,
    /// Chain reference (e.g., "84532" for Base Sepolia)
    pub reference: &'static str,
}

impl NetworkInfo {
    /// Creates a [`ChainId`] from this network info.
    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        ChainId::new(self.namespace, self.reference)
    }
}

/// Registry that maps V1 network names to [`ChainId`] values and back.
///
/// This is the single source of truth for V1 name ↔ CAIP-2 lookups.
///
/// # Example
///
/// ```ignore
/// let registry = NetworkRegistry::from_networks(t402_evm::EVM_NETWORKS)
///     .with_networks(t402_svm::SOLANA_NETWORKS);
/// let chain_id = registry.chain_id_by_name("base").unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    name_to_chain_id: HashMap<&'static str, ChainId>,
    chain_id_to_name: HashMap<ChainId, &'static str>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated from a network info slice.
    #[must_use]
    pub fn from_networks(networks: &[NetworkInfo]) -> Self {
        let mut registry = Self::new();
        registry.register(networks);
        registry
    }

    /// Registers additional networks into this registry.
    pub fn register(&mut self, networks: &[NetworkInfo]) {
        for info in networks {
            self.name_to_chain_id.insert(info.name, info.chain_id());
            self.chain_id_to_name.insert(info.chain_id(), info.name);
        }
    }

    /// Builder-style method: registers additional networks and returns `self`.
    #[must_use]
    pub fn with_networks(mut self, networks: &[NetworkInfo]) -> Self {
        self.register(networks);
        self
    }

    /// Looks up a [`ChainId`] by its V1 human-readable network name.
    #[must_use]
    pub fn chain_id_by_name(&self, name: &str) -> Option<&ChainId> {
        self.name_to_chain_id.get(name)
    }

    /// Looks up a V1 human-readable network name by its [`ChainId`].
    #[must_use]
    pub fn name_by_chain_id(&self, chain_id: &ChainId) -> Option<&'static str> {
        self.chain_id_to_name.get(chain_id).copied()
    }

    /// Returns the number of registered networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.name_to_chain_id.len()
    }

    /// Returns `true` if no networks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name_to_chain_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_both_ways() {
        let registry = NetworkRegistry::from_networks(&[
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
        ]);
        let base = registry.chain_id_by_name("base").unwrap();
        assert_eq!(base, &ChainId::new("eip155", "8453"));
        assert_eq!(registry.name_by_chain_id(base), Some("base"));
        assert!(registry.chain_id_by_name("unknown").is_none());
    }
}
