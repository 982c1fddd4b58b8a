//! Protocol types for t402 payment messages.
//!
//! This module defines the wire format used between clients, resource
//! servers, and facilitators. Both protocol version 1 (V1) and version 2
//! (V2) are supported.
//!
//! # Key Types
//!
//! - [`VerifyRequest`] / [`SettleRequest`] — facilitator request envelopes
//!   that preserve the payload and requirements bytes exactly as received
//! - [`VerifyResponse`] / [`SettleResponse`] — structured facilitator results
//! - [`SupportedResponse`] — the `/supported` discovery document
//! - [`ErrorReason`] — the closed registry of machine-readable failure codes
//! - [`VerificationError`] / [`SettlementError`] — typed failure values that
//!   map onto [`ErrorReason`]
//! - [`PayloadView`] — version/scheme/network access over raw payload bytes
//!
//! # Wire Format
//!
//! All types serialize to JSON with camelCase field names. The protocol
//! version is carried in the `t402Version` field.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_with::{VecSkipError, serde_as};
use std::collections::HashMap;
use std::str::FromStr;

use crate::chain::ChainId;

pub mod v1;
pub mod v2;

mod version;
mod view;

pub use version::Version;
pub use view::{PayloadView, RequirementsView};

/// Protocol extension data attached to various t402 wire types.
///
/// Keys are extension names; values are arbitrary JSON specific to each
/// extension.
pub type Extensions = HashMap<String, serde_json::Value>;

/// A `u64` value that serializes as a decimal string.
///
/// JSON consumers (particularly `JavaScript`) cannot accurately represent
/// large integers, so amounts and timestamps cross the wire as strings.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct U64String(u64);

impl U64String {
    /// Returns the inner `u64` value.
    #[must_use]
    pub const fn inner(&self) -> u64 {
        self.0
    }
}

impl FromStr for U64String {
    type Err = <u64 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

impl From<u64> for U64String {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<U64String> for u64 {
    fn from(value: U64String) -> Self {
        value.0
    }
}

impl std::fmt::Display for U64String {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for U64String {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for U64String {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map(Self).map_err(serde::de::Error::custom)
    }
}

/// Describes a payment method supported by a facilitator.
///
/// Returned in [`SupportedResponse`] to indicate which protocol versions,
/// schemes, and networks a facilitator can handle.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    /// The t402 protocol version (1 or 2).
    pub t402_version: u8,
    /// The payment scheme identifier (e.g., "exact").
    pub scheme: String,
    /// The network identifier (CAIP-2 chain ID for V2, network name for V1).
    pub network: String,
    /// Optional default asset for this kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// Optional scheme-specific extra data (e.g., the facilitator fee payer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
    /// Optional extensions this kind participates in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

/// Response from a facilitator's `GET /supported` endpoint.
///
/// Tells clients and resource servers which payment methods the facilitator
/// supports, which protocol extensions it implements, and which signer
/// addresses it settles with per network.
#[serde_as]
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// List of supported payment kinds.
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedPaymentKind>,
    /// List of supported protocol extensions.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Map of network identifiers (or `namespace:*` patterns) to signer
    /// addresses.
    #[serde(default)]
    pub signers: HashMap<String, Vec<String>>,
}

impl SupportedResponse {
    /// Finds signer addresses matching the given chain, checking both the
    /// exact chain ID (e.g., `"eip155:8453"`) and the namespace wildcard
    /// (e.g., `"eip155:*"`).
    #[must_use]
    pub fn signers_for_chain(&self, chain_id: &ChainId) -> Vec<&str> {
        let exact_key = chain_id.to_string();
        let wildcard_key = format!("{}:*", chain_id.namespace());

        let mut result = Vec::new();
        if let Some(addrs) = self.signers.get(&exact_key) {
            result.extend(addrs.iter().map(String::as_str));
        }
        if let Some(addrs) = self.signers.get(&wildcard_key) {
            result.extend(addrs.iter().map(String::as_str));
        }
        result
    }

    /// Finds the supported kind for the given version/scheme/network,
    /// preferring an exact network match over a `namespace:*` wildcard kind.
    #[must_use]
    pub fn kind_for(
        &self,
        t402_version: u8,
        scheme: &str,
        network: &str,
    ) -> Option<&SupportedPaymentKind> {
        let family = network
            .split_once(':')
            .map(|(namespace, _)| format!("{namespace}:*"));
        self.kinds
            .iter()
            .find(|k| k.t402_version == t402_version && k.scheme == scheme && k.network == network)
            .or_else(|| {
                let family = family?;
                self.kinds.iter().find(|k| {
                    k.t402_version == t402_version && k.scheme == scheme && k.network == family
                })
            })
    }
}

/// Request to verify a payment before settlement.
///
/// The two sub-objects are held as raw JSON so the bytes received over HTTP
/// are the bytes forwarded into mechanism handlers — no re-marshalling, which
/// keeps field-order-sensitive V1/V2 payloads intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// The declared protocol version (1 or 2).
    pub t402_version: u8,
    /// The signed payment payload, verbatim.
    pub payment_payload: Box<RawValue>,
    /// The payment requirements to verify against, verbatim.
    pub payment_requirements: Box<RawValue>,
}

/// Request to settle a verified payment on-chain.
///
/// Identical to [`VerifyRequest`] on the wire.
pub type SettleRequest = VerifyRequest;

impl VerifyRequest {
    /// Assembles a request from typed payload and requirements values.
    ///
    /// # Errors
    ///
    /// Returns a [`VerificationError`] if either value fails to serialize.
    pub fn assemble<TPayload, TRequirements>(
        t402_version: u8,
        payload: &TPayload,
        requirements: &TRequirements,
    ) -> Result<Self, VerificationError>
    where
        TPayload: Serialize,
        TRequirements: Serialize,
    {
        let payment_payload = serde_json::value::to_raw_value(payload)
            .map_err(|e| VerificationError::InvalidPayload(e.to_string()))?;
        let payment_requirements = serde_json::value::to_raw_value(requirements)
            .map_err(|e| VerificationError::InvalidRequirements(e.to_string()))?;
        Ok(Self {
            t402_version,
            payment_payload,
            payment_requirements,
        })
    }

    /// Resolves a version/scheme/network view over the raw payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidPayload`] if the payload does not
    /// parse far enough to expose its routing fields.
    pub fn payload_view(
        &self,
        networks: &crate::networks::NetworkRegistry,
    ) -> Result<PayloadView, VerificationError> {
        PayloadView::from_raw(&self.payment_payload, networks)
    }

    /// Resolves a scheme/network/amount view over the raw requirements bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidRequirements`] if the requirements
    /// do not parse.
    pub fn requirements_view(&self) -> Result<RequirementsView, VerificationError> {
        RequirementsView::from_raw(&self.payment_requirements)
    }
}

/// A fully typed verify/settle request for a specific protocol version.
///
/// Mechanism handlers parse the raw [`VerifyRequest`] into this shape once
/// they know the concrete payload and requirements types for their scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedRequest<const N: u8, TPayload, TRequirements> {
    /// Protocol version marker (serializes as the integer `N`).
    pub t402_version: Version<N>,
    /// The signed payment payload.
    pub payment_payload: TPayload,
    /// The payment requirements to verify against.
    pub payment_requirements: TRequirements,
}

impl<const N: u8, TPayload, TRequirements> TypedRequest<N, TPayload, TRequirements>
where
    TPayload: serde::de::DeserializeOwned,
    TRequirements: serde::de::DeserializeOwned,
{
    /// Parses the raw sub-objects of a [`VerifyRequest`] into typed form.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::VersionMismatch`] if the declared version
    /// is not `N`, or an invalid-payload/invalid-requirements error if the
    /// sub-objects do not deserialize.
    pub fn from_request(request: &VerifyRequest) -> Result<Self, VerificationError> {
        if request.t402_version != N {
            return Err(VerificationError::VersionMismatch);
        }
        let payment_payload = serde_json::from_str(request.payment_payload.get())
            .map_err(|e| VerificationError::InvalidPayload(e.to_string()))?;
        let payment_requirements = serde_json::from_str(request.payment_requirements.get())
            .map_err(|e| VerificationError::InvalidRequirements(e.to_string()))?;
        Ok(Self {
            t402_version: Version,
            payment_payload,
            payment_requirements,
        })
    }
}

/// Result returned by a facilitator after verifying a payment payload
/// against payment requirements.
///
/// Indicates whether the payment authorization is valid and identifies the
/// payer. If invalid, includes the machine-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerifyResponse {
    /// The payload matches the requirements and passes all checks.
    Valid {
        /// The address of the payer.
        payer: String,
    },
    /// The payload was well-formed but failed verification.
    Invalid {
        /// Machine-readable reason verification failed.
        reason: String,
        /// The payer address, if identifiable.
        payer: Option<String>,
    },
}

impl VerifyResponse {
    /// Constructs a successful verification response.
    #[must_use]
    pub const fn valid(payer: String) -> Self {
        Self::Valid { payer }
    }

    /// Constructs a failed verification response.
    #[must_use]
    pub const fn invalid(payer: Option<String>, reason: String) -> Self {
        Self::Invalid { reason, payer }
    }

    /// Returns `true` if the verification succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Returns the invalid reason, if any.
    #[must_use]
    pub fn invalid_reason(&self) -> Option<&str> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid { reason, .. } => Some(reason),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<String>,
}

impl Serialize for VerifyResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            Self::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                payer: Some(payer.clone()),
                invalid_reason: None,
            },
            Self::Invalid { reason, payer } => VerifyResponseWire {
                is_valid: false,
                payer: payer.clone(),
                invalid_reason: Some(reason.clone()),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.is_valid {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(Self::Valid { payer })
        } else {
            let reason = wire
                .invalid_reason
                .ok_or_else(|| serde::de::Error::missing_field("invalidReason"))?;
            Ok(Self::Invalid {
                reason,
                payer: wire.payer,
            })
        }
    }
}

/// Result of a payment settlement request.
///
/// On success carries the on-chain transaction identifier and payer; on
/// failure carries the machine-readable reason. The `network` field is
/// present in both cases (it may be empty when the failure predates payload
/// parsing, e.g., a hook abort on an unparseable payload).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettleResponse {
    /// Settlement succeeded.
    Success {
        /// The address that paid.
        payer: String,
        /// The on-chain transaction hash or signature.
        transaction: String,
        /// The network where settlement occurred.
        network: String,
    },
    /// Settlement failed.
    Error {
        /// Machine-readable reason for failure.
        reason: String,
        /// The network where settlement was attempted.
        network: String,
        /// The payer address, if identifiable.
        payer: Option<String>,
    },
}

impl SettleResponse {
    /// Returns `true` if the settlement succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the error reason, if any.
    #[must_use]
    pub fn error_reason(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { reason, .. } => Some(reason),
        }
    }

    /// Returns the network the settlement ran (or was attempted) on.
    #[must_use]
    pub fn network(&self) -> &str {
        match self {
            Self::Success { network, .. } | Self::Error { network, .. } => network,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    network: String,
}

impl Serialize for SettleResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            Self::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                error_reason: None,
                payer: Some(payer.clone()),
                transaction: Some(transaction.clone()),
                network: network.clone(),
            },
            Self::Error {
                reason,
                network,
                payer,
            } => SettleResponseWire {
                success: false,
                error_reason: Some(reason.clone()),
                payer: payer.clone(),
                transaction: None,
                network: network.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            let transaction = wire
                .transaction
                .ok_or_else(|| serde::de::Error::missing_field("transaction"))?;
            Ok(Self::Success {
                payer,
                transaction,
                network: wire.network,
            })
        } else {
            let reason = wire
                .error_reason
                .ok_or_else(|| serde::de::Error::missing_field("errorReason"))?;
            Ok(Self::Error {
                reason,
                network: wire.network,
                payer: wire.payer,
            })
        }
    }
}

/// Machine-readable reason codes for payment failures.
///
/// This is the central registry of failure codes: new values must be added
/// here before any component may emit them. Hooks may additionally supply
/// free-form reasons, which cross the wire as plain strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorReason {
    /// The payment payload is malformed.
    InvalidPayload,
    /// The payment requirements are malformed.
    InvalidRequirements,
    /// The declared protocol version does not match the payload.
    ProtocolVersionMismatch,
    /// The payment scheme is not supported.
    UnsupportedScheme,
    /// The network is not supported.
    UnsupportedNetwork,
    /// The payload network does not match the requirements.
    NetworkMismatch,
    /// No handler is registered for the (scheme, network) pair.
    #[serde(rename = "no_handler_for_(scheme,network)")]
    NoHandler,
    /// No offered requirement matches the supplied payload.
    NoMatchingRequirement,
    /// The transaction instruction shape is invalid.
    InvalidInstruction,
    /// The payment signature is invalid.
    InvalidSignature,
    /// The authorization is outside its validity window.
    AuthorizationExpired,
    /// The authorization deadline is too close to settle in time.
    DeadlineTooSoon,
    /// The authorization nonce has already been consumed on-chain.
    NonceAlreadyUsed,
    /// Smart-account (EIP-6492/EIP-1271) signature validation failed.
    SmartAccountValidationFailed,
    /// The authorized amount does not cover the requirements.
    InsufficientAmount,
    /// The payer's on-chain balance is insufficient.
    InsufficientFunds,
    /// The payment recipient does not match the requirements.
    RecipientMismatch,
    /// The payment asset does not match the requirements.
    AssetMismatch,
    /// The settlement transaction reverted on-chain.
    SettlementReverted,
    /// Settlement confirmation timed out.
    SettlementTimeout,
    /// Pre-submission transaction simulation failed.
    SimulationFailed,
    /// The settlement transaction failed on-chain.
    SettlementFailed,
}

impl ErrorReason {
    /// Returns the wire representation of this reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidRequirements => "invalid_requirements",
            Self::ProtocolVersionMismatch => "protocol_version_mismatch",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::UnsupportedNetwork => "unsupported_network",
            Self::NetworkMismatch => "network_mismatch",
            Self::NoHandler => "no_handler_for_(scheme,network)",
            Self::NoMatchingRequirement => "no_matching_requirement",
            Self::InvalidInstruction => "invalid_instruction",
            Self::InvalidSignature => "invalid_signature",
            Self::AuthorizationExpired => "authorization_expired",
            Self::DeadlineTooSoon => "deadline_too_soon",
            Self::NonceAlreadyUsed => "nonce_already_used",
            Self::SmartAccountValidationFailed => "smart_account_validation_failed",
            Self::InsufficientAmount => "insufficient_amount",
            Self::InsufficientFunds => "insufficient_funds",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::AssetMismatch => "asset_mismatch",
            Self::SettlementReverted => "settlement_reverted",
            Self::SettlementTimeout => "settlement_timeout",
            Self::SimulationFailed => "simulation_failed",
            Self::SettlementFailed => "settlement_failed",
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while verifying a payment.
///
/// Every variant maps onto exactly one [`ErrorReason`]; these cross the HTTP
/// boundary as structured `isValid:false` / `success:false` bodies, never as
/// transport-level errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VerificationError {
    /// The payment payload is malformed.
    #[error("Invalid payment payload: {0}")]
    InvalidPayload(String),
    /// The payment requirements are malformed.
    #[error("Invalid payment requirements: {0}")]
    InvalidRequirements(String),
    /// The declared protocol version does not match the payload.
    #[error("Declared protocol version does not match the payload")]
    VersionMismatch,
    /// The payment scheme is not supported.
    #[error("Unsupported scheme")]
    UnsupportedScheme,
    /// The network is not supported.
    #[error("Unsupported network")]
    UnsupportedNetwork,
    /// The payload network does not match the requirements.
    #[error("Payload network does not match the payment requirements")]
    NetworkMismatch,
    /// No handler is registered for the (scheme, network) pair.
    #[error("No handler registered for scheme '{scheme}' on network '{network}'")]
    NoHandler {
        /// The requested scheme.
        scheme: String,
        /// The requested network.
        network: String,
    },
    /// No offered requirement matches the supplied payload.
    #[error("No payment requirement matches the supplied payload")]
    NoMatchingRequirement,
    /// The transaction instruction shape is invalid.
    #[error("Invalid transaction instruction: {0}")]
    InvalidInstruction(String),
    /// The payment signature is invalid.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// The authorization is outside its validity window.
    #[error("Payment authorization is outside its validity window")]
    AuthorizationExpired,
    /// The authorization deadline is too close to settle in time.
    #[error("Authorization deadline is too soon to settle")]
    DeadlineTooSoon,
    /// The authorization nonce has already been consumed on-chain.
    #[error("Authorization nonce has already been used")]
    NonceAlreadyUsed,
    /// Smart-account signature validation failed.
    #[error("Smart account validation failed: {0}")]
    SmartAccountValidationFailed(String),
    /// The authorized amount does not cover the requirements.
    #[error("Authorized amount does not cover the payment requirements")]
    InsufficientAmount,
    /// The payer's on-chain balance is insufficient.
    #[error("On-chain balance does not cover the payment amount")]
    InsufficientFunds,
    /// The payment recipient does not match the requirements.
    #[error("Payment recipient does not match the requirements")]
    RecipientMismatch,
    /// The payment asset does not match the requirements.
    #[error("Payment asset does not match the requirements")]
    AssetMismatch,
}

impl VerificationError {
    /// Returns the registered [`ErrorReason`] for this error.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::InvalidPayload(_) => ErrorReason::InvalidPayload,
            Self::InvalidRequirements(_) => ErrorReason::InvalidRequirements,
            Self::VersionMismatch => ErrorReason::ProtocolVersionMismatch,
            Self::UnsupportedScheme => ErrorReason::UnsupportedScheme,
            Self::UnsupportedNetwork => ErrorReason::UnsupportedNetwork,
            Self::NetworkMismatch => ErrorReason::NetworkMismatch,
            Self::NoHandler { .. } => ErrorReason::NoHandler,
            Self::NoMatchingRequirement => ErrorReason::NoMatchingRequirement,
            Self::InvalidInstruction(_) => ErrorReason::InvalidInstruction,
            Self::InvalidSignature(_) => ErrorReason::InvalidSignature,
            Self::AuthorizationExpired => ErrorReason::AuthorizationExpired,
            Self::DeadlineTooSoon => ErrorReason::DeadlineTooSoon,
            Self::NonceAlreadyUsed => ErrorReason::NonceAlreadyUsed,
            Self::SmartAccountValidationFailed(_) => ErrorReason::SmartAccountValidationFailed,
            Self::InsufficientAmount => ErrorReason::InsufficientAmount,
            Self::InsufficientFunds => ErrorReason::InsufficientFunds,
            Self::RecipientMismatch => ErrorReason::RecipientMismatch,
            Self::AssetMismatch => ErrorReason::AssetMismatch,
        }
    }
}

impl From<serde_json::Error> for VerificationError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidPayload(value.to_string())
    }
}

/// Errors that can occur while settling a verified payment on-chain.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SettlementError {
    /// The settlement transaction reverted.
    #[error("Settlement transaction {0} reverted")]
    Reverted(String),
    /// Settlement confirmation timed out.
    #[error("Timed out waiting for settlement confirmation")]
    Timeout,
    /// Pre-submission simulation failed.
    #[error("Transaction simulation failed: {0}")]
    SimulationFailed(String),
    /// The settlement transaction failed on-chain.
    #[error("Settlement failed: {0}")]
    Failed(String),
}

impl SettlementError {
    /// Returns the registered [`ErrorReason`] for this error.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::Reverted(_) => ErrorReason::SettlementReverted,
            Self::Timeout => ErrorReason::SettlementTimeout,
            Self::SimulationFailed(_) => ErrorReason::SimulationFailed,
            Self::Failed(_) => ErrorReason::SettlementFailed,
        }
    }
}

/// A payment required response that can be either V1 or V2.
///
/// Returned with HTTP 402 status to indicate that payment is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum PaymentRequired {
    /// Protocol version 2 variant.
    V2(v2::PaymentRequired),
    /// Protocol version 1 variant.
    V1(v1::PaymentRequired),
}

impl PaymentRequired {
    /// Returns the protocol version of this response.
    #[must_use]
    pub const fn t402_version(&self) -> u8 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_response_valid_roundtrip() {
        let response = VerifyResponse::valid("0xPayer".to_owned());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["isValid"], true);
        assert_eq!(json["payer"], "0xPayer");
        assert!(json.get("invalidReason").is_none());

        let back: VerifyResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn verify_response_invalid_roundtrip() {
        let response = VerifyResponse::invalid(None, "insufficient_amount".to_owned());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["invalidReason"], "insufficient_amount");

        let back: VerifyResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn settle_response_roundtrip() {
        let response = SettleResponse::Success {
            payer: "John".to_owned(),
            transaction: "0xdeadbeef".to_owned(),
            network: "eip155:84532".to_owned(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["transaction"], "0xdeadbeef");

        let back: SettleResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, response);

        let failure = SettleResponse::Error {
            reason: "settlement_reverted".to_owned(),
            network: "eip155:84532".to_owned(),
            payer: None,
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorReason"], "settlement_reverted");
        let back: SettleResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, failure);
    }

    #[test]
    fn error_reason_wire_names() {
        let json = serde_json::to_string(&ErrorReason::NonceAlreadyUsed).unwrap();
        assert_eq!(json, "\"nonce_already_used\"");
        let json = serde_json::to_string(&ErrorReason::NoHandler).unwrap();
        assert_eq!(json, "\"no_handler_for_(scheme,network)\"");
        assert_eq!(
            ErrorReason::SmartAccountValidationFailed.as_str(),
            "smart_account_validation_failed"
        );
    }

    #[test]
    fn verify_request_preserves_raw_bytes() {
        // Field order and unknown fields must survive the round trip intact.
        let body = r#"{"t402Version":2,"paymentPayload":{"b":1,"a":2,"zz":"keep"},"paymentRequirements":{"scheme":"exact","network":"eip155:8453"}}"#;
        let request: VerifyRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.t402_version, 2);
        assert_eq!(
            request.payment_payload.get(),
            r#"{"b":1,"a":2,"zz":"keep"}"#
        );
        let serialized = serde_json::to_string(&request).unwrap();
        assert!(serialized.contains(r#"{"b":1,"a":2,"zz":"keep"}"#));
    }

    #[test]
    fn supported_response_skips_unknown_kinds() {
        let json = serde_json::json!({
            "kinds": [
                { "t402Version": 2, "scheme": "exact", "network": "eip155:8453" },
                { "bogus": true },
            ],
            "extensions": ["bazaar"],
            "signers": { "eip155:*": ["0xSigner"] },
        });
        let supported: SupportedResponse = serde_json::from_value(json).unwrap();
        assert_eq!(supported.kinds.len(), 1);
        assert_eq!(supported.extensions, vec!["bazaar"]);
        let chain: ChainId = "eip155:8453".parse().unwrap();
        assert_eq!(supported.signers_for_chain(&chain), vec!["0xSigner"]);
    }

    #[test]
    fn supported_kind_prefers_exact_network() {
        let supported = SupportedResponse {
            kinds: vec![
                SupportedPaymentKind {
                    t402_version: 2,
                    scheme: "exact".to_owned(),
                    network: "eip155:*".to_owned(),
                    asset: None,
                    extra: Some(serde_json::json!({"source": "wildcard"})),
                    extensions: None,
                },
                SupportedPaymentKind {
                    t402_version: 2,
                    scheme: "exact".to_owned(),
                    network: "eip155:8453".to_owned(),
                    asset: None,
                    extra: Some(serde_json::json!({"source": "exact"})),
                    extensions: None,
                },
            ],
            extensions: vec![],
            signers: HashMap::new(),
        };
        let kind = supported.kind_for(2, "exact", "eip155:8453").unwrap();
        assert_eq!(kind.extra.as_ref().unwrap()["source"], "exact");
        let kind = supported.kind_for(2, "exact", "eip155:10").unwrap();
        assert_eq!(kind.extra.as_ref().unwrap()["source"], "wildcard");
    }
}
