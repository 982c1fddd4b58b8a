//! Protocol version 2 (V2) types for t402.
//!
//! V2 identifies networks by CAIP-2 chain IDs (e.g., `"eip155:8453"`),
//! carries resource metadata in a dedicated [`ResourceInfo`] object, and
//! embeds the accepted requirements inside the payment payload so the
//! facilitator can check exactly what the client agreed to.
//!
//! # Key Types
//!
//! - [`T402Version2`] — version marker that serializes as `2`
//! - [`PaymentPayload`] — signed payment with the accepted requirements
//! - [`PaymentRequirements`] — payment terms set by the resource server
//! - [`PaymentRequired`] — HTTP 402 response body
//! - [`ResourceInfo`] — metadata about the paid resource

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::chain::ChainId;
use crate::proto;

/// Version marker for t402 protocol version 2.
pub type T402Version2 = super::Version<2>;

/// Convenience constant for constructing V2 protocol messages.
pub const V2: T402Version2 = super::Version;

/// Response from a V2 payment verification request.
pub type VerifyResponse = proto::VerifyResponse;

/// Response from a V2 payment settlement request.
pub type SettleResponse = proto::SettleResponse;

/// A fully typed V2 verify/settle request.
pub type TypedRequest<TPayload, TRequirements> = proto::TypedRequest<2, TPayload, TRequirements>;

/// Metadata about the resource being paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource content.
    pub mime_type: String,
    /// URL of the resource.
    pub url: String,
}

/// A signed payment authorization from the client (V2 format).
///
/// The payload echoes the requirements the client accepted, allowing the
/// facilitator to verify that the client agreed to specific terms.
///
/// # Type Parameters
///
/// - `TAccepted` — the accepted requirements type
/// - `TPayload` — the scheme-specific payload type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload<TAccepted = PaymentRequirements, TPayload = Box<serde_json::value::RawValue>>
{
    /// The payment requirements the client accepted, echoed exactly.
    pub accepted: TAccepted,
    /// The scheme-specific signed payload.
    pub payload: TPayload,
    /// Information about the resource being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
    /// Protocol version (always 2).
    pub t402_version: T402Version2,
    /// Optional protocol extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<proto::Extensions>,
}

/// Payment requirements set by the resource server (V2 format).
///
/// # Type Parameters
///
/// - `TScheme` — the scheme identifier type (default: `String`)
/// - `TAmount` — the amount type (default: `String`)
/// - `TAddress` — the address type (default: `String`)
/// - `TExtra` — scheme-specific extra data type (default: `serde_json::Value`)
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements<
    TScheme = String,
    TAmount = String,
    TAddress = String,
    TExtra = serde_json::Value,
> {
    /// The payment scheme (e.g., "exact").
    pub scheme: TScheme,
    /// The CAIP-2 chain ID (e.g., "eip155:8453").
    pub network: ChainId,
    /// The required amount, in the asset's smallest unit.
    pub amount: TAmount,
    /// The recipient address for payment.
    pub pay_to: TAddress,
    /// Maximum age of a payment authorization, in seconds.
    pub max_timeout_seconds: u64,
    /// The asset identifier (token contract address or mint).
    pub asset: TAddress,
    /// Scheme-specific extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<TExtra>,
}

impl PaymentRequirements {
    /// Converts the string-typed requirements into a concrete typed view.
    ///
    /// Returns `None` if any of the conversions fail.
    #[must_use]
    pub fn as_concrete<
        TScheme: FromStr,
        TAmount: FromStr,
        TAddress: FromStr,
        TExtra: DeserializeOwned,
    >(
        &self,
    ) -> Option<PaymentRequirements<TScheme, TAmount, TAddress, TExtra>> {
        let scheme = self.scheme.parse::<TScheme>().ok()?;
        let amount = self.amount.parse::<TAmount>().ok()?;
        let pay_to = self.pay_to.parse::<TAddress>().ok()?;
        let asset = self.asset.parse::<TAddress>().ok()?;
        let extra = self
            .extra
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        Some(PaymentRequirements {
            scheme,
            network: self.network.clone(),
            amount,
            pay_to,
            max_timeout_seconds: self.max_timeout_seconds,
            asset,
            extra,
        })
    }
}

impl<TScheme, TAmount, TAddress, TExtra> PaymentRequirements<TScheme, TAmount, TAddress, TExtra>
where
    TScheme: PartialEq,
    TAmount: PartialEq,
    TAddress: PartialEq,
{
    /// Compares against another requirement on the five protocol-critical
    /// fields only: scheme, network, amount, asset, and `payTo`.
    ///
    /// `maxTimeoutSeconds` and `extra` are deliberately ignored so that
    /// facilitator enrichment (EIP-712 domains, fee payers) cannot cause
    /// false-negative rejections.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.network == other.network
            && self.amount == other.amount
            && self.asset == other.asset
            && self.pay_to == other.pay_to
    }
}

/// HTTP 402 Payment Required response body for V2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 2).
    pub t402_version: T402Version2,
    /// Optional error message if the request was malformed or rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Information about the resource being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
    /// List of acceptable payment methods, in server preference order.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    /// Optional protocol extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<proto::Extensions>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_owned(),
            network: "eip155:84532".parse().unwrap(),
            amount: "1000".to_owned(),
            pay_to: "0xRecipient".to_owned(),
            max_timeout_seconds: 300,
            asset: "0xAsset".to_owned(),
            extra: None,
        }
    }

    #[test]
    fn requirements_roundtrip() {
        let original = requirements();
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"network\":\"eip155:84532\""));
        assert!(json.contains("\"amount\":\"1000\""));
        let back: PaymentRequirements = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn payload_roundtrip() {
        let payload: PaymentPayload = PaymentPayload {
            accepted: requirements(),
            payload: serde_json::value::to_raw_value(&serde_json::json!({"signature": "0xabc"}))
                .unwrap(),
            resource: Some(ResourceInfo {
                description: "Weather data".to_owned(),
                mime_type: "application/json".to_owned(),
                url: "https://api.example/weather".to_owned(),
            }),
            t402_version: V2,
            extensions: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["t402Version"], 2);
        assert_eq!(json["accepted"]["scheme"], "exact");
        let back: PaymentPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.accepted, requirements());
    }

    #[test]
    fn matching_ignores_timeout_and_extra() {
        let a = requirements();
        let mut b = requirements();
        b.max_timeout_seconds = 999;
        b.extra = Some(serde_json::json!({"feePayer": "F"}));
        assert!(a.matches(&b));

        let mut c = requirements();
        c.amount = "2000".to_owned();
        assert!(!a.matches(&c));
    }
}
