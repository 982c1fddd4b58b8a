//! Resource-server core logic.
//!
//! [`ResourceServer`] is the transport-agnostic half of a payment-gated
//! HTTP server: it knows which facilitators support which
//! (scheme, network) pairs, turns route prices into enriched payment
//! requirements, matches incoming payloads against offered requirements,
//! and delegates verify/settle to the right facilitator client.
//!
//! The HTTP-specific half — route patterns, header codecs, the tower
//! middleware — lives in `t402-http` and drives this type.
//!
//! # Startup
//!
//! Call [`ResourceServer::initialize`] before serving: it fetches
//! `/supported` from every registered facilitator and caches the result.
//! Misconfigured routes (a (scheme, network) pair no facilitator supports)
//! must fail loud at startup; [`ResourceServer::supports`] is the check.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::facilitator::{Facilitator, FacilitatorError};
use crate::proto;
use crate::proto::v2;
use crate::scheme::{SchemeServer, SchemeServerError};

/// One payment option attached to a protected resource, before requirement
/// assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Payment scheme identifier (e.g., `"exact"`).
    pub scheme: String,
    /// CAIP-2 network identifier (e.g., `"eip155:8453"`).
    pub network: String,
    /// Recipient address.
    pub pay_to: String,
    /// Price — a money string (e.g., `"1.50"`) or a structured
    /// `{asset, amount}` object, interpreted by the scheme server.
    pub price: serde_json::Value,
    /// Maximum payment authorization age in seconds (default 300).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    /// Extension declarations to attach to 402 responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<proto::Extensions>,
}

/// Errors surfaced by the resource-server core.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ResourceServerError {
    /// [`ResourceServer::initialize`] has not been called.
    #[error("Resource server not initialized; call initialize() first")]
    NotInitialized,
    /// No registered facilitator supports the (scheme, network) pair.
    #[error("No facilitator supports scheme '{scheme}' on network '{network}'")]
    UnsupportedPair {
        /// The requested scheme.
        scheme: String,
        /// The requested network.
        network: String,
    },
    /// No scheme server is registered for the (scheme, network) pair.
    #[error("No scheme server registered for scheme '{scheme}' on network '{network}'")]
    MissingSchemeServer {
        /// The requested scheme.
        scheme: String,
        /// The requested network.
        network: String,
    },
    /// Price parsing failed.
    #[error(transparent)]
    Price(#[from] SchemeServerError),
    /// The facilitator call failed.
    #[error(transparent)]
    Facilitator(#[from] FacilitatorError),
    /// Requirement or payload serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Transport-agnostic resource-server core.
pub struct ResourceServer {
    facilitators: Vec<Arc<dyn Facilitator>>,
    // network (exact or "namespace:*") → scheme name → server handler
    schemes: HashMap<String, HashMap<String, Arc<dyn SchemeServer>>>,
    // (network, scheme) → index into `facilitators`, as reported by /supported
    facilitator_map: HashMap<(String, String), usize>,
    // /supported responses per facilitator, cached at initialization
    supported: Vec<proto::SupportedResponse>,
    initialized: bool,
}

impl std::fmt::Debug for ResourceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceServer")
            .field("facilitators", &self.facilitators.len())
            .field("schemes", &self.schemes.keys().collect::<Vec<_>>())
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl Default for ResourceServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceServer {
    /// Creates a resource server with no facilitators.
    #[must_use]
    pub fn new() -> Self {
        Self {
            facilitators: Vec::new(),
            schemes: HashMap::new(),
            facilitator_map: HashMap::new(),
            supported: Vec::new(),
            initialized: false,
        }
    }

    /// Adds a facilitator client (local instance or HTTP client).
    pub fn add_facilitator(&mut self, facilitator: Arc<dyn Facilitator>) -> &mut Self {
        self.facilitators.push(facilitator);
        self
    }

    /// Builder-style [`ResourceServer::add_facilitator`].
    #[must_use]
    pub fn with_facilitator(mut self, facilitator: Arc<dyn Facilitator>) -> Self {
        self.facilitators.push(facilitator);
        self
    }

    /// Registers a scheme server for a network (exact chain ID or the
    /// `namespace:*` family pattern).
    pub fn register_scheme(
        &mut self,
        network: impl Into<String>,
        server: Arc<dyn SchemeServer>,
    ) -> &mut Self {
        let scheme = server.scheme().to_owned();
        self.schemes
            .entry(network.into())
            .or_default()
            .insert(scheme, server);
        self
    }

    /// Builder-style [`ResourceServer::register_scheme`].
    #[must_use]
    pub fn with_scheme(
        mut self,
        network: impl Into<String>,
        server: Arc<dyn SchemeServer>,
    ) -> Self {
        self.register_scheme(network, server);
        self
    }

    /// Fetches `/supported` from every registered facilitator and caches
    /// the results. Must be called before serving requests.
    ///
    /// # Errors
    ///
    /// Returns the first facilitator error encountered; callers should
    /// treat this as fatal at startup.
    pub async fn initialize(&mut self) -> Result<(), ResourceServerError> {
        self.facilitator_map.clear();
        self.supported.clear();
        for (idx, facilitator) in self.facilitators.iter().enumerate() {
            let supported = facilitator.supported().await?;
            for kind in &supported.kinds {
                self.facilitator_map
                    .entry((kind.network.clone(), kind.scheme.clone()))
                    .or_insert(idx);
            }
            self.supported.push(supported);
        }
        self.initialized = true;
        Ok(())
    }

    /// Returns whether [`ResourceServer::initialize`] has completed.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns `true` when some facilitator supports the
    /// (scheme, network) pair, either exactly or through the family
    /// wildcard it reported.
    #[must_use]
    pub fn supports(&self, scheme: &str, network: &str) -> bool {
        self.find_facilitator(scheme, network).is_some()
    }

    fn family_of(network: &str) -> Option<String> {
        network
            .split_once(':')
            .map(|(namespace, _)| format!("{namespace}:*"))
    }

    fn find_facilitator(&self, scheme: &str, network: &str) -> Option<&Arc<dyn Facilitator>> {
        let idx = self
            .facilitator_map
            .get(&(network.to_owned(), scheme.to_owned()))
            .or_else(|| {
                let family = Self::family_of(network)?;
                self.facilitator_map.get(&(family, scheme.to_owned()))
            })?;
        self.facilitators.get(*idx)
    }

    fn find_scheme_server(&self, scheme: &str, network: &str) -> Option<&Arc<dyn SchemeServer>> {
        self.schemes
            .get(network)
            .and_then(|by_scheme| by_scheme.get(scheme))
            .or_else(|| {
                let family = Self::family_of(network)?;
                self.schemes
                    .get(&family)
                    .and_then(|by_scheme| by_scheme.get(scheme))
            })
    }

    /// Returns the cached supported kind for (version, scheme, network),
    /// preferring an exact network kind over a wildcard kind.
    #[must_use]
    pub fn supported_kind(
        &self,
        t402_version: u8,
        scheme: &str,
        network: &str,
    ) -> Option<&proto::SupportedPaymentKind> {
        self.supported
            .iter()
            .find_map(|response| response.kind_for(t402_version, scheme, network))
    }

    /// Builds one enriched V2 payment requirement from a resource config.
    ///
    /// Runs the scheme server's price parsing, assembles the base
    /// requirement, and fills facilitator-known fields (EIP-712 domain,
    /// fee payer) from the cached supported kind.
    ///
    /// # Errors
    ///
    /// Fails when the server is uninitialized, the pair is unsupported, or
    /// the price cannot be parsed.
    pub fn build_requirements(
        &self,
        config: &ResourceConfig,
    ) -> Result<v2::PaymentRequirements, ResourceServerError> {
        if !self.initialized {
            return Err(ResourceServerError::NotInitialized);
        }
        let server = self
            .find_scheme_server(&config.scheme, &config.network)
            .ok_or_else(|| ResourceServerError::MissingSchemeServer {
                scheme: config.scheme.clone(),
                network: config.network.clone(),
            })?;
        let kind = self
            .supported_kind(2, &config.scheme, &config.network)
            .ok_or_else(|| ResourceServerError::UnsupportedPair {
                scheme: config.scheme.clone(),
                network: config.network.clone(),
            })?;

        let parsed = server.parse_price(&config.price, &config.network)?;
        if parsed.asset.is_empty() {
            return Err(SchemeServerError::InvalidPrice(
                "asset must not be empty".to_owned(),
            )
            .into());
        }
        if parsed.amount.is_empty() || parsed.amount.trim_start_matches('0').is_empty() {
            return Err(SchemeServerError::InvalidPrice(format!(
                "amount must be positive, got '{}'",
                parsed.amount
            ))
            .into());
        }
        let network = config
            .network
            .parse()
            .map_err(|_| ResourceServerError::UnsupportedPair {
                scheme: config.scheme.clone(),
                network: config.network.clone(),
            })?;
        let base = v2::PaymentRequirements {
            scheme: config.scheme.clone(),
            network,
            amount: parsed.amount,
            pay_to: config.pay_to.clone(),
            max_timeout_seconds: config.max_timeout_seconds.unwrap_or(300),
            asset: parsed.asset,
            extra: parsed.extra,
        };
        let extensions: Vec<String> = config
            .extensions
            .as_ref()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        Ok(server.enhance_requirements(base, kind, &extensions))
    }

    /// Assembles the 402 Payment Required body from a list of requirements.
    #[must_use]
    pub const fn create_payment_required(
        &self,
        accepts: Vec<v2::PaymentRequirements>,
        resource: Option<v2::ResourceInfo>,
        error: Option<String>,
        extensions: Option<proto::Extensions>,
    ) -> v2::PaymentRequired {
        v2::PaymentRequired {
            t402_version: v2::V2,
            error,
            resource,
            accepts,
            extensions,
        }
    }

    /// Finds the offered requirement the payload's `accepted` echo matches,
    /// comparing the five protocol-critical fields only.
    #[must_use]
    pub fn find_matching<'a>(
        &self,
        available: &'a [v2::PaymentRequirements],
        accepted: &v2::PaymentRequirements,
    ) -> Option<&'a v2::PaymentRequirements> {
        available.iter().find(|offered| offered.matches(accepted))
    }

    /// Delegates verification to the facilitator supporting the pair.
    ///
    /// The payload travels as raw bytes, exactly as received from the
    /// client; only the server-built requirements are serialized here.
    ///
    /// # Errors
    ///
    /// Fails when uninitialized, when the pair is unsupported, or when the
    /// facilitator call itself fails.
    pub async fn verify_payment(
        &self,
        t402_version: u8,
        payload: &serde_json::value::RawValue,
        requirements: &v2::PaymentRequirements,
    ) -> Result<proto::VerifyResponse, ResourceServerError> {
        let requirements_raw = serde_json::value::to_raw_value(requirements)?;
        self.verify_raw(
            t402_version,
            payload,
            &requirements_raw,
            &requirements.scheme,
            &requirements.network.to_string(),
        )
        .await
    }

    /// Delegates settlement to the facilitator supporting the pair.
    ///
    /// # Errors
    ///
    /// Fails when uninitialized, when the pair is unsupported, or when the
    /// facilitator call itself fails.
    pub async fn settle_payment(
        &self,
        t402_version: u8,
        payload: &serde_json::value::RawValue,
        requirements: &v2::PaymentRequirements,
    ) -> Result<proto::SettleResponse, ResourceServerError> {
        let requirements_raw = serde_json::value::to_raw_value(requirements)?;
        self.settle_raw(
            t402_version,
            payload,
            &requirements_raw,
            &requirements.scheme,
            &requirements.network.to_string(),
        )
        .await
    }

    /// Raw-bytes verification for callers that hold pre-serialized
    /// requirements (e.g., the V1 compatibility path of the HTTP gate).
    ///
    /// `scheme` and `network` (CAIP-2) select the facilitator.
    ///
    /// # Errors
    ///
    /// Fails when uninitialized, when the pair is unsupported, or when the
    /// facilitator call itself fails.
    pub async fn verify_raw(
        &self,
        t402_version: u8,
        payload: &serde_json::value::RawValue,
        requirements: &serde_json::value::RawValue,
        scheme: &str,
        network: &str,
    ) -> Result<proto::VerifyResponse, ResourceServerError> {
        let (facilitator, request) =
            self.prepare_call(t402_version, payload, requirements, scheme, network)?;
        Ok(facilitator.verify(request).await?)
    }

    /// Raw-bytes settlement counterpart of [`ResourceServer::verify_raw`].
    ///
    /// # Errors
    ///
    /// Fails when uninitialized, when the pair is unsupported, or when the
    /// facilitator call itself fails.
    pub async fn settle_raw(
        &self,
        t402_version: u8,
        payload: &serde_json::value::RawValue,
        requirements: &serde_json::value::RawValue,
        scheme: &str,
        network: &str,
    ) -> Result<proto::SettleResponse, ResourceServerError> {
        let (facilitator, request) =
            self.prepare_call(t402_version, payload, requirements, scheme, network)?;
        Ok(facilitator.settle(request).await?)
    }

    fn prepare_call(
        &self,
        t402_version: u8,
        payload: &serde_json::value::RawValue,
        requirements: &serde_json::value::RawValue,
        scheme: &str,
        network: &str,
    ) -> Result<(&Arc<dyn Facilitator>, proto::VerifyRequest), ResourceServerError> {
        if !self.initialized {
            return Err(ResourceServerError::NotInitialized);
        }
        let facilitator = self.find_facilitator(scheme, network).ok_or_else(|| {
            ResourceServerError::UnsupportedPair {
                scheme: scheme.to_owned(),
                network: network.to_owned(),
            }
        })?;
        let request = proto::VerifyRequest {
            t402_version,
            payment_payload: payload.to_owned(),
            payment_requirements: requirements.to_owned(),
        };
        Ok((facilitator, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facilitator::BoxFuture;
    use crate::scheme::AssetAmount;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticFacilitator {
        kinds: Vec<proto::SupportedPaymentKind>,
        verify_calls: Arc<AtomicUsize>,
    }

    impl StaticFacilitator {
        fn exact_on(network: &str) -> Self {
            Self {
                kinds: vec![proto::SupportedPaymentKind {
                    t402_version: 2,
                    scheme: "exact".to_owned(),
                    network: network.to_owned(),
                    asset: None,
                    extra: Some(serde_json::json!({"feePayer": "FeePayer1"})),
                    extensions: None,
                }],
                verify_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Facilitator for StaticFacilitator {
        fn verify(
            &self,
            _request: proto::VerifyRequest,
        ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(proto::VerifyResponse::valid("0xPayer".to_owned())) })
        }

        fn settle(
            &self,
            _request: proto::SettleRequest,
        ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>> {
            Box::pin(async {
                Ok(proto::SettleResponse::Success {
                    payer: "0xPayer".to_owned(),
                    transaction: "0xtx".to_owned(),
                    network: "eip155:84532".to_owned(),
                })
            })
        }

        fn supported(
            &self,
        ) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>> {
            let kinds = self.kinds.clone();
            Box::pin(async move {
                Ok(proto::SupportedResponse {
                    kinds,
                    extensions: vec![],
                    signers: HashMap::new(),
                })
            })
        }
    }

    struct FixedPriceServer;

    impl SchemeServer for FixedPriceServer {
        fn scheme(&self) -> &str {
            "exact"
        }

        fn parse_price(
            &self,
            price: &serde_json::Value,
            _network: &str,
        ) -> Result<AssetAmount, SchemeServerError> {
            let amount = price
                .as_str()
                .ok_or_else(|| SchemeServerError::InvalidPrice(price.to_string()))?;
            Ok(AssetAmount {
                asset: "0xAsset".to_owned(),
                amount: amount.to_owned(),
                extra: None,
            })
        }

        fn enhance_requirements(
            &self,
            mut base: v2::PaymentRequirements,
            supported: &proto::SupportedPaymentKind,
            _extensions: &[String],
        ) -> v2::PaymentRequirements {
            base.extra = supported.extra.clone();
            base
        }
    }

    fn config() -> ResourceConfig {
        ResourceConfig {
            scheme: "exact".to_owned(),
            network: "eip155:84532".to_owned(),
            pay_to: "0xRecipient".to_owned(),
            price: serde_json::json!("1000"),
            max_timeout_seconds: None,
            extensions: None,
        }
    }

    async fn initialized_server(network: &str) -> ResourceServer {
        let mut server = ResourceServer::new()
            .with_facilitator(Arc::new(StaticFacilitator::exact_on(network)))
            .with_scheme("eip155:*", Arc::new(FixedPriceServer));
        server.initialize().await.unwrap();
        server
    }

    #[tokio::test]
    async fn initialize_builds_support_map() {
        let server = initialized_server("eip155:84532").await;
        assert!(server.supports("exact", "eip155:84532"));
        assert!(!server.supports("exact", "solana:devnet"));
        assert!(!server.supports("upto", "eip155:84532"));
    }

    #[tokio::test]
    async fn wildcard_kind_supports_whole_family() {
        let server = initialized_server("eip155:*").await;
        assert!(server.supports("exact", "eip155:84532"));
        assert!(server.supports("exact", "eip155:1"));
    }

    #[tokio::test]
    async fn build_requirements_enriches_from_supported_kind() {
        let server = initialized_server("eip155:84532").await;
        let requirements = server.build_requirements(&config()).unwrap();
        assert_eq!(requirements.amount, "1000");
        assert_eq!(requirements.max_timeout_seconds, 300);
        assert_eq!(
            requirements.extra,
            Some(serde_json::json!({"feePayer": "FeePayer1"}))
        );
    }

    #[tokio::test]
    async fn uninitialized_server_refuses_to_build() {
        let server = ResourceServer::new().with_scheme("eip155:*", Arc::new(FixedPriceServer));
        assert!(matches!(
            server.build_requirements(&config()),
            Err(ResourceServerError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn verify_routes_to_supporting_facilitator() {
        let server = initialized_server("eip155:84532").await;
        let requirements = server.build_requirements(&config()).unwrap();
        let payload = serde_json::value::to_raw_value(&serde_json::json!({
            "t402Version": 2,
            "accepted": requirements,
            "payload": {"signature": "0xsig"},
        }))
        .unwrap();
        let response = server
            .verify_payment(2, &payload, &requirements)
            .await
            .unwrap();
        assert!(response.is_valid());
    }

    #[tokio::test]
    async fn matching_uses_protocol_critical_fields() {
        let server = initialized_server("eip155:84532").await;
        let offered = vec![server.build_requirements(&config()).unwrap()];
        let mut accepted = offered[0].clone();
        accepted.extra = None;
        accepted.max_timeout_seconds = 999;
        assert!(server.find_matching(&offered, &accepted).is_some());

        accepted.pay_to = "0xSomeoneElse".to_owned();
        assert!(server.find_matching(&offered, &accepted).is_none());
    }
}
