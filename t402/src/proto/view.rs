//! Schema-agnostic views over raw protocol bytes.
//!
//! The facilitator must route a request to a mechanism handler before it
//! knows the payload's concrete shape. [`PayloadView`] and
//! [`RequirementsView`] expose just the routing fields — version, scheme,
//! network — from the raw JSON, leaving full parsing to the handler that
//! owns the scheme.

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::chain::ChainId;
use crate::networks::NetworkRegistry;
use crate::proto::{VerificationError, v1, v2};

/// A version/scheme/network view over raw payment-payload bytes.
///
/// For V1 payloads the routing fields sit at the top level; for V2 they are
/// nested under `accepted`. The view resolves this automatically and, where
/// possible, normalizes the network to a CAIP-2 [`ChainId`] (V1 legacy names
/// resolve through the [`NetworkRegistry`]).
#[derive(Debug, Clone)]
pub struct PayloadView {
    /// The protocol version declared inside the payload.
    pub t402_version: u8,
    /// The payment scheme.
    pub scheme: String,
    /// The network exactly as it appears on the wire.
    pub network: String,
    /// The network normalized to a CAIP-2 chain ID, when resolvable.
    pub chain_id: Option<ChainId>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PayloadWire {
    #[serde(rename_all = "camelCase")]
    V2 {
        t402_version: v2::T402Version2,
        accepted: AcceptedWire,
    },
    #[serde(rename_all = "camelCase")]
    V1 {
        t402_version: v1::T402Version1,
        scheme: String,
        network: String,
    },
}

#[derive(Debug, Deserialize)]
struct AcceptedWire {
    scheme: String,
    network: String,
}

impl PayloadView {
    /// Resolves the view from raw payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidPayload`] if the payload does not
    /// expose a recognizable version, scheme, and network.
    pub fn from_raw(raw: &RawValue, networks: &NetworkRegistry) -> Result<Self, VerificationError> {
        let wire: PayloadWire = serde_json::from_str(raw.get())
            .map_err(|e| VerificationError::InvalidPayload(e.to_string()))?;
        Ok(match wire {
            PayloadWire::V1 {
                scheme, network, ..
            } => {
                let chain_id = networks.chain_id_by_name(&network).cloned();
                Self {
                    t402_version: 1,
                    scheme,
                    network,
                    chain_id,
                }
            }
            PayloadWire::V2 { accepted, .. } => {
                let chain_id = accepted.network.parse::<ChainId>().ok();
                Self {
                    t402_version: 2,
                    scheme: accepted.scheme,
                    network: accepted.network,
                    chain_id,
                }
            }
        })
    }

    /// Returns the protocol version declared inside the payload.
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.t402_version
    }

    /// Returns the payment scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the network exactly as declared on the wire.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }
}

/// A scheme/network/amount view over raw payment-requirements bytes.
///
/// Both protocol versions carry `scheme` and `network` at the top level;
/// the amount field is `amount` in V2 and `maxAmountRequired` in V1.
#[derive(Debug, Clone)]
pub struct RequirementsView {
    /// The payment scheme.
    pub scheme: String,
    /// The network as it appears on the wire.
    pub network: String,
    /// The required amount in smallest units, when present.
    pub amount: Option<String>,
    /// The payment recipient, when present.
    pub pay_to: Option<String>,
    /// The asset identifier, when present.
    pub asset: Option<String>,
    /// The maximum authorization age in seconds, when present.
    pub max_timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequirementsWire {
    scheme: String,
    network: String,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    max_amount_required: Option<String>,
    #[serde(default)]
    pay_to: Option<String>,
    #[serde(default)]
    asset: Option<String>,
    #[serde(default)]
    max_timeout_seconds: Option<u64>,
}

impl RequirementsView {
    /// Resolves the view from raw requirements bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidRequirements`] if the requirements
    /// do not expose a scheme and network.
    pub fn from_raw(raw: &RawValue) -> Result<Self, VerificationError> {
        let wire: RequirementsWire = serde_json::from_str(raw.get())
            .map_err(|e| VerificationError::InvalidRequirements(e.to_string()))?;
        Ok(Self {
            scheme: wire.scheme,
            network: wire.network,
            amount: wire.amount.or(wire.max_amount_required),
            pay_to: wire.pay_to,
            asset: wire.asset,
            max_timeout_seconds: wire.max_timeout_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::NetworkInfo;

    fn registry() -> NetworkRegistry {
        NetworkRegistry::from_networks(&[NetworkInfo {
            name: "base-sepolia",
            namespace: "eip155",
            reference: "84532",
        }])
    }

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_owned()).unwrap()
    }

    #[test]
    fn v2_payload_view_reads_accepted() {
        let payload = raw(
            r#"{"t402Version":2,"accepted":{"scheme":"exact","network":"eip155:84532","amount":"1000","payTo":"0xR","maxTimeoutSeconds":300,"asset":"0xA"},"payload":{}}"#,
        );
        let view = PayloadView::from_raw(&payload, &registry()).unwrap();
        assert_eq!(view.version(), 2);
        assert_eq!(view.scheme(), "exact");
        assert_eq!(view.network(), "eip155:84532");
        assert_eq!(view.chain_id, Some(ChainId::new("eip155", "84532")));
    }

    #[test]
    fn v1_payload_view_resolves_legacy_name() {
        let payload = raw(
            r#"{"t402Version":1,"scheme":"exact","network":"base-sepolia","payload":{"signature":"0x"}}"#,
        );
        let view = PayloadView::from_raw(&payload, &registry()).unwrap();
        assert_eq!(view.version(), 1);
        assert_eq!(view.network(), "base-sepolia");
        assert_eq!(view.chain_id, Some(ChainId::new("eip155", "84532")));
    }

    #[test]
    fn unknown_v1_network_leaves_chain_unresolved() {
        let payload =
            raw(r#"{"t402Version":1,"scheme":"exact","network":"nowhere","payload":{}}"#);
        let view = PayloadView::from_raw(&payload, &registry()).unwrap();
        assert!(view.chain_id.is_none());
    }

    #[test]
    fn garbage_payload_is_invalid() {
        let payload = raw(r#"{"hello":"world"}"#);
        let err = PayloadView::from_raw(&payload, &registry()).unwrap_err();
        assert!(matches!(err, VerificationError::InvalidPayload(_)));
    }

    #[test]
    fn requirements_view_reads_both_amount_spellings() {
        let v2 = raw(
            r#"{"scheme":"exact","network":"eip155:84532","amount":"1000","payTo":"0xR","maxTimeoutSeconds":300,"asset":"0xA"}"#,
        );
        let view = RequirementsView::from_raw(&v2).unwrap();
        assert_eq!(view.amount.as_deref(), Some("1000"));

        let v1 = raw(
            r#"{"scheme":"exact","network":"base-sepolia","maxAmountRequired":"500","resource":"https://x/y","description":"","mimeType":"application/json","payTo":"0xR","maxTimeoutSeconds":60,"asset":"0xA"}"#,
        );
        let view = RequirementsView::from_raw(&v1).unwrap();
        assert_eq!(view.amount.as_deref(), Some("500"));
    }
}
