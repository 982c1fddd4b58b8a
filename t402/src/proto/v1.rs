//! Protocol version 1 (V1) types for t402.
//!
//! V1 is the original wire format. It identifies networks by human-readable
//! names (e.g., `"base-sepolia"`) and carries resource metadata inside each
//! requirement instead of a dedicated `resource` object.
//!
//! # Key Types
//!
//! - [`T402Version1`] — version marker that serializes as `1`
//! - [`PaymentPayload`] — signed payment authorization from the client
//! - [`PaymentRequirements`] — payment terms set by the resource server
//! - [`PaymentRequired`] — HTTP 402 response body

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::proto;

/// Version marker for t402 protocol version 1.
pub type T402Version1 = super::Version<1>;

/// Convenience constant for constructing V1 protocol messages.
pub const V1: T402Version1 = super::Version;

/// Response from a V1 payment verification request.
pub type VerifyResponse = proto::VerifyResponse;

/// Response from a V1 payment settlement request.
pub type SettleResponse = proto::SettleResponse;

/// A fully typed V1 verify/settle request.
pub type TypedRequest<TPayload, TRequirements> = proto::TypedRequest<1, TPayload, TRequirements>;

/// A signed payment authorization from the client (V1 format).
///
/// The routing fields (`scheme`, `network`) sit at the top level; the
/// scheme-specific proof is opaque in `payload`.
///
/// # Type Parameters
///
/// - `TScheme` — the scheme identifier type (default: `String`)
/// - `TPayload` — the scheme-specific payload type (default: raw JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload<TScheme = String, TPayload = Box<serde_json::value::RawValue>> {
    /// Protocol version (always 1).
    pub t402_version: T402Version1,
    /// The payment scheme (e.g., "exact").
    pub scheme: TScheme,
    /// The network name (e.g., "base-sepolia").
    pub network: String,
    /// The scheme-specific signed payload.
    pub payload: TPayload,
}

/// Payment requirements set by the resource server (V1 format).
///
/// # Type Parameters
///
/// - `TScheme` — the scheme identifier type (default: `String`)
/// - `TAmount` — the amount type (default: `String`)
/// - `TAddress` — the address type (default: `String`)
/// - `TExtra` — scheme-specific extra data type (default: `serde_json::Value`)
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements<
    TScheme = String,
    TAmount = String,
    TAddress = String,
    TExtra = serde_json::Value,
> {
    /// The payment scheme (e.g., "exact").
    pub scheme: TScheme,
    /// The network name (e.g., "base-sepolia").
    pub network: String,
    /// The maximum amount required, in the asset's smallest unit.
    pub max_amount_required: TAmount,
    /// The resource URL being paid for.
    pub resource: String,
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource.
    pub mime_type: String,
    /// Optional JSON schema for the resource output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
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
        let max_amount_required = self.max_amount_required.parse::<TAmount>().ok()?;
        let pay_to = self.pay_to.parse::<TAddress>().ok()?;
        let asset = self.asset.parse::<TAddress>().ok()?;
        let extra = self
            .extra
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        Some(PaymentRequirements {
            scheme,
            network: self.network.clone(),
            max_amount_required,
            resource: self.resource.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            output_schema: self.output_schema.clone(),
            pay_to,
            max_timeout_seconds: self.max_timeout_seconds,
            asset,
            extra,
        })
    }
}

/// HTTP 402 Payment Required response body for V1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 1).
    pub t402_version: T402Version1,
    /// List of acceptable payment methods, in server preference order.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    /// Optional error message if the request was malformed or rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_owned(),
            network: "base-sepolia".to_owned(),
            max_amount_required: "1000".to_owned(),
            resource: "https://api.example/weather".to_owned(),
            description: "Weather data".to_owned(),
            mime_type: "application/json".to_owned(),
            output_schema: None,
            pay_to: "0xRecipient".to_owned(),
            max_timeout_seconds: 60,
            asset: "0xAsset".to_owned(),
            extra: Some(serde_json::json!({"name": "USDC", "version": "2"})),
        }
    }

    #[test]
    fn requirements_roundtrip() {
        let original = requirements();
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"maxAmountRequired\":\"1000\""));
        let back: PaymentRequirements = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn payment_required_roundtrip() {
        let required = PaymentRequired {
            t402_version: V1,
            accepts: vec![requirements()],
            error: None,
        };
        let json = serde_json::to_value(&required).unwrap();
        assert_eq!(json["t402Version"], 1);
        let back: PaymentRequired = serde_json::from_value(json).unwrap();
        assert_eq!(back.accepts, vec![requirements()]);
    }
}
