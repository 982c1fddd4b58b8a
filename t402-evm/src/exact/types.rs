//! Wire types for the EIP-155 "exact" payment scheme.

use alloy_primitives::{Address, B256, Bytes};
use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};

use t402::proto::{v1 as proto_v1, v2 as proto_v2};
use t402::timestamp::UnixTimestamp;

use crate::chain::TokenAmount;

/// EIP-3009 `transferWithAuthorization` payment payload.
///
/// Contains the EIP-712 signature and the structured authorization that was
/// signed — everything needed to execute the transfer on an ERC-3009
/// compliant token contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Payload {
    /// The cryptographic signature authorizing the transfer.
    ///
    /// Either an EOA signature (64-65 bytes), an EIP-1271 signature
    /// (arbitrary length, validated by the wallet contract), or an
    /// EIP-6492 signature (wrapped with deployment data and magic suffix).
    pub signature: Bytes,
    /// The structured authorization data that was signed.
    pub authorization: Eip3009Authorization,
}

/// EIP-712 structured data for an ERC-3009 transfer authorization.
///
/// Defines who may transfer which amount to whom, during what window,
/// identified by a client-chosen unique nonce.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Authorization {
    /// The address authorizing the transfer (token owner).
    pub from: Address,
    /// The recipient address for the transfer.
    pub to: Address,
    /// The amount to transfer, in the token's smallest unit.
    pub value: TokenAmount,
    /// Not valid before this timestamp (inclusive).
    pub valid_after: UnixTimestamp,
    /// Not valid at or after this timestamp (exclusive).
    pub valid_before: UnixTimestamp,
    /// A unique 32-byte nonce; the token contract enforces single use.
    pub nonce: B256,
}

/// Extra payment-requirements data for the EVM exact scheme: the EIP-712
/// domain parameters of the token contract.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    /// The token name as used in the EIP-712 domain.
    pub name: String,
    /// The token version as used in the EIP-712 domain.
    pub version: String,
}

sol!(
    /// Solidity-compatible struct for ERC-3009 `TransferWithAuthorization`.
    ///
    /// Reconstructed on the facilitator to recompute the EIP-712 signing
    /// hash when verifying a client signature; field order and types must
    /// match EIP-3009 exactly.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

/// V2 wire format aliases for the EVM exact scheme.
pub mod v2 {
    use super::{Address, Eip3009Payload, PaymentRequirementsExtra, TokenAmount, proto_v2};

    /// Typed verify request for the exact EVM scheme.
    pub type VerifyRequest = proto_v2::TypedRequest<PaymentPayload, PaymentRequirements>;

    /// Typed settle request (same wire shape as verify).
    pub type SettleRequest = VerifyRequest;

    /// Payment payload with embedded accepted requirements.
    pub type PaymentPayload = proto_v2::PaymentPayload<PaymentRequirements, Eip3009Payload>;

    /// Payment requirements with EVM-typed fields.
    pub type PaymentRequirements =
        proto_v2::PaymentRequirements<String, TokenAmount, Address, PaymentRequirementsExtra>;
}

/// V1 wire format aliases for the EVM exact scheme.
pub mod v1 {
    use super::{Address, Eip3009Payload, PaymentRequirementsExtra, TokenAmount, proto_v1};

    /// Typed verify request for the exact EVM scheme.
    pub type VerifyRequest = proto_v1::TypedRequest<PaymentPayload, PaymentRequirements>;

    /// Typed settle request (same wire shape as verify).
    pub type SettleRequest = VerifyRequest;

    /// Payment payload carrying the EIP-3009 proof.
    pub type PaymentPayload = proto_v1::PaymentPayload<String, Eip3009Payload>;

    /// Payment requirements with EVM-typed fields.
    pub type PaymentRequirements =
        proto_v1::PaymentRequirements<String, TokenAmount, Address, PaymentRequirementsExtra>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn authorization_wire_shape() {
        let authorization = Eip3009Authorization {
            from: address!("1111111111111111111111111111111111111111"),
            to: address!("2222222222222222222222222222222222222222"),
            value: TokenAmount::from(1000u64),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(1_800_000_000),
            nonce: B256::repeat_byte(0xAA),
        };
        let json = serde_json::to_value(authorization).unwrap();
        assert_eq!(json["value"], "1000");
        assert_eq!(json["validAfter"], "0");
        assert_eq!(json["validBefore"], "1800000000");
        let back: Eip3009Authorization = serde_json::from_value(json).unwrap();
        assert_eq!(back.nonce, authorization.nonce);
        assert_eq!(back.value, authorization.value);
    }

    #[test]
    fn v2_payload_roundtrip() {
        let requirements = v2::PaymentRequirements {
            scheme: "exact".to_owned(),
            network: "eip155:84532".parse().unwrap(),
            amount: TokenAmount::from(1000u64),
            pay_to: address!("2222222222222222222222222222222222222222"),
            max_timeout_seconds: 300,
            asset: address!("3333333333333333333333333333333333333333"),
            extra: Some(PaymentRequirementsExtra {
                name: "USDC".to_owned(),
                version: "2".to_owned(),
            }),
        };
        let payload = v2::PaymentPayload {
            accepted: requirements.clone(),
            payload: Eip3009Payload {
                signature: Bytes::from(vec![0u8; 65]),
                authorization: Eip3009Authorization {
                    from: address!("1111111111111111111111111111111111111111"),
                    to: address!("2222222222222222222222222222222222222222"),
                    value: TokenAmount::from(1000u64),
                    valid_after: UnixTimestamp::from_secs(0),
                    valid_before: UnixTimestamp::from_secs(1_800_000_000),
                    nonce: B256::ZERO,
                },
            },
            resource: None,
            t402_version: t402::proto::v2::V2,
            extensions: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: v2::PaymentPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.accepted, requirements);
    }
}
