//! Payment scheme system for t402.
//!
//! Schemes are the pluggable payment mechanisms of the protocol. Each
//! mechanism is identified by a (protocol version, scheme name, chain
//! family) triple and exposes up to three capability surfaces:
//!
//! - **Facilitator** ([`crate::facilitator::Facilitator`]) — verify and
//!   settle payments
//! - **Client** ([`SchemeClient`]) — construct and sign payment payloads
//! - **Server** ([`SchemeServer`]) — parse prices and enrich requirements
//!
//! [`SchemeRegistry`] maps `(version, scheme, network)` to facilitator
//! handlers. Registration accepts a list of networks and automatically
//! derives the family wildcard entry (`namespace:*`) once two networks of
//! the same family are registered together; lookup prefers an exact network
//! match over the wildcard.

use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::chain::ChainId;
use crate::facilitator::{BoxFuture, Facilitator};
use crate::proto;
use crate::proto::v2;

/// The "exact" payment scheme marker: the authorized amount must cover the
/// required amount exactly as specified by the requirements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExactScheme;

impl ExactScheme {
    /// The wire name of the scheme.
    pub const NAME: &'static str = "exact";
}

impl Display for ExactScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(Self::NAME)
    }
}

impl std::str::FromStr for ExactScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::NAME {
            Ok(Self)
        } else {
            Err(format!("unknown scheme {s}"))
        }
    }
}

impl Serialize for ExactScheme {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(Self::NAME)
    }
}

impl<'de> Deserialize<'de> for ExactScheme {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Trait for identifying a payment scheme implementation.
///
/// Each scheme has a unique identifier composed of the protocol version,
/// chain namespace, and scheme name.
pub trait SchemeId {
    /// Returns the t402 protocol version (1 or 2).
    fn t402_version(&self) -> u8 {
        2
    }
    /// Returns the chain namespace (e.g., "eip155", "solana").
    fn namespace(&self) -> &str;
    /// Returns the scheme name (e.g., "exact").
    fn scheme(&self) -> &str;
    /// Returns the CAIP-2 family pattern this scheme serves (e.g., `eip155:*`).
    fn caip_family(&self) -> String {
        format!("{}:*", self.namespace())
    }
    /// Returns the full scheme identifier (e.g., "v2-eip155-exact").
    fn id(&self) -> String {
        format!(
            "v{}-{}-{}",
            self.t402_version(),
            self.namespace(),
            self.scheme(),
        )
    }
}

/// Trait for building facilitator handlers from chain providers.
///
/// The type parameter `P` is the chain provider type the mechanism needs.
pub trait SchemeBuilder<P> {
    /// Creates a new facilitator handler for the given chain provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the handler cannot be built from the provider or
    /// if the scheme-specific configuration is invalid.
    fn build(
        &self,
        provider: P,
        config: Option<serde_json::Value>,
    ) -> Result<Box<dyn Facilitator>, Box<dyn std::error::Error>>;
}

/// Errors that can occur while constructing a payment payload client-side.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SchemeClientError {
    /// The requirements cannot be satisfied by this client.
    #[error("Requirements not supported by this client: {0}")]
    UnsupportedRequirements(String),
    /// Signing the authorization failed.
    #[error("Signing failed: {0}")]
    Signing(String),
    /// Payload serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Client-side capability of a payment scheme: constructs and signs the
/// mechanism-specific payment payload for an accepted requirement.
pub trait SchemeClient: Send + Sync {
    /// Returns `true` when this client can satisfy the given
    /// (version, scheme, network) triple.
    fn supports(&self, t402_version: u8, scheme: &str, network: &str) -> bool;

    /// Constructs a signed payment payload for the given requirements.
    ///
    /// `requirements` is the raw requirement object (V1 or V2 shape,
    /// depending on `t402_version`); `resource` and `extensions` are echoed
    /// into V2 payloads. Returns the payload as JSON bytes ready for base64
    /// header encoding.
    fn create_payment_payload<'a>(
        &'a self,
        t402_version: u8,
        requirements: &'a serde_json::Value,
        resource: Option<&'a v2::ResourceInfo>,
        extensions: Option<&'a proto::Extensions>,
    ) -> BoxFuture<'a, Result<Vec<u8>, SchemeClientError>>;
}

/// An asset/amount pair produced by price parsing, with optional
/// scheme-specific extra data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetAmount {
    /// Chain-native asset identifier (token contract address, SPL mint).
    pub asset: String,
    /// Amount in the asset's smallest unit, as a decimal string.
    pub amount: String,
    /// Scheme-specific extra data to seed the requirement's `extra` field.
    pub extra: Option<serde_json::Value>,
}

/// Errors that can occur while building payment requirements server-side.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SchemeServerError {
    /// The price value cannot be interpreted for this scheme/network.
    #[error("Cannot parse price: {0}")]
    InvalidPrice(String),
    /// The network is not known to this scheme.
    #[error("Unknown network {0}")]
    UnknownNetwork(String),
}

/// Server-side capability of a payment scheme: turns route prices into
/// requirements and enriches them with facilitator-supplied data.
pub trait SchemeServer: Send + Sync {
    /// Returns the scheme name this server handles (e.g., "exact").
    fn scheme(&self) -> &str;

    /// Parses a route price (a money string like `"1.50"` or a structured
    /// `{asset, amount}` object) into an [`AssetAmount`] for the network.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeServerError`] if the price cannot be interpreted.
    fn parse_price(
        &self,
        price: &serde_json::Value,
        network: &str,
    ) -> Result<AssetAmount, SchemeServerError>;

    /// Fills requirement fields that only the facilitator knows (EIP-712
    /// domain parameters, the Solana fee payer) from the supported kind.
    fn enhance_requirements(
        &self,
        base: v2::PaymentRequirements,
        supported: &proto::SupportedPaymentKind,
        extensions: &[String],
    ) -> v2::PaymentRequirements;
}

/// Unique identifier for a registered facilitator handler.
///
/// Combines the protocol version, scheme name, and network. The family
/// wildcard form uses a [`ChainId`] with reference `"*"`.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct HandlerKey {
    /// The t402 protocol version.
    pub t402_version: u8,
    /// The scheme name (e.g., "exact").
    pub scheme: String,
    /// The network this handler serves (exact or `namespace:*`).
    pub network: ChainId,
}

impl HandlerKey {
    /// Creates a new handler key.
    #[must_use]
    pub const fn new(t402_version: u8, scheme: String, network: ChainId) -> Self {
        Self {
            t402_version,
            scheme,
            network,
        }
    }

    /// Returns the wildcard form of this key (`namespace:*`).
    #[must_use]
    pub fn as_wildcard(&self) -> Self {
        Self {
            t402_version: self.t402_version,
            scheme: self.scheme.clone(),
            network: self.network.family(),
        }
    }
}

impl Display for HandlerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{}:{}:{}",
            self.t402_version, self.scheme, self.network
        )
    }
}

/// Registry of active facilitator handlers keyed by
/// (version, scheme, network).
///
/// Write-once during startup, read-only during serving.
#[derive(Default)]
pub struct SchemeRegistry {
    entries: HashMap<HandlerKey, Arc<dyn Facilitator>>,
    // Distinct handlers in registration order, for `/supported` unions.
    handlers: Vec<Arc<dyn Facilitator>>,
}

impl Debug for SchemeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.entries.keys().map(ToString::to_string).collect();
        f.debug_struct("SchemeRegistry")
            .field("entries", &keys)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl SchemeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a set of networks under one
    /// (version, scheme) pair.
    ///
    /// One exact entry is inserted per network. When the list contains two
    /// or more networks of the same family, the `namespace:*` wildcard entry
    /// is derived automatically so the handler also serves chains of that
    /// family that were not named explicitly.
    pub fn register(
        &mut self,
        t402_version: u8,
        scheme: &str,
        networks: &[ChainId],
        handler: Arc<dyn Facilitator>,
    ) {
        let mut family_counts: HashMap<&str, usize> = HashMap::new();
        for network in networks {
            *family_counts.entry(network.namespace()).or_default() += 1;
            let key = HandlerKey::new(t402_version, scheme.to_owned(), network.clone());
            #[cfg(feature = "telemetry")]
            tracing::info!(key = %key, "Registered scheme handler");
            self.entries.insert(key, Arc::clone(&handler));
        }
        for (namespace, count) in family_counts {
            if count >= 2 {
                let key = HandlerKey::new(
                    t402_version,
                    scheme.to_owned(),
                    ChainId::wildcard(namespace),
                );
                #[cfg(feature = "telemetry")]
                tracing::info!(key = %key, "Derived family wildcard handler");
                self.entries.entry(key).or_insert_with(|| Arc::clone(&handler));
            }
        }
        self.handlers.push(handler);
    }

    /// Builder-style [`SchemeRegistry::register`].
    #[must_use]
    pub fn and_register(
        mut self,
        t402_version: u8,
        scheme: &str,
        networks: &[ChainId],
        handler: Arc<dyn Facilitator>,
    ) -> Self {
        self.register(t402_version, scheme, networks, handler);
        self
    }

    /// Looks up a handler by key.
    ///
    /// Two-phase lookup: exact `(version, scheme, network)` first, then the
    /// `namespace:*` wildcard. Exact always wins when both are registered.
    #[must_use]
    pub fn by_key(&self, key: &HandlerKey) -> Option<&Arc<dyn Facilitator>> {
        self.entries
            .get(key)
            .or_else(|| self.entries.get(&key.as_wildcard()))
    }

    /// Returns the distinct registered handlers in registration order.
    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn Facilitator>> {
        self.handlers.iter()
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
