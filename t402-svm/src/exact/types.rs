//! Wire types for the Solana "exact" payment scheme.

use serde::{Deserialize, Serialize};
use solana_pubkey::{Pubkey, pubkey};

use t402::proto::{U64String, v1 as proto_v1, v2 as proto_v2};

use crate::chain::Address;

/// Associated Token Account program public key.
pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Solana exact payment payload: one base64-encoded, partially-signed
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSvmPayload {
    /// Base64-encoded serialized Solana transaction.
    pub transaction: String,
}

/// Extra payment-requirements data for the Solana exact scheme: the
/// facilitator-declared fee payer the client must reserve a signer slot
/// for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    /// The facilitator's fee payer address.
    pub fee_payer: Address,
}

/// Derives the associated token account for an owner/mint pair.
#[must_use]
pub fn associated_token_account(owner: &Pubkey, token_program: &Pubkey, mint: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    );
    ata
}

/// V2 wire format aliases for the Solana exact scheme.
pub mod v2 {
    use super::{Address, ExactSvmPayload, PaymentRequirementsExtra, U64String, proto_v2};

    /// Typed verify request for the exact Solana scheme.
    pub type VerifyRequest = proto_v2::TypedRequest<PaymentPayload, PaymentRequirements>;

    /// Typed settle request (same wire shape as verify).
    pub type SettleRequest = VerifyRequest;

    /// Payment payload with embedded accepted requirements.
    pub type PaymentPayload = proto_v2::PaymentPayload<PaymentRequirements, ExactSvmPayload>;

    /// Payment requirements with Solana-typed fields.
    pub type PaymentRequirements =
        proto_v2::PaymentRequirements<String, U64String, Address, PaymentRequirementsExtra>;
}

/// V1 wire format aliases for the Solana exact scheme.
pub mod v1 {
    use super::{Address, ExactSvmPayload, PaymentRequirementsExtra, U64String, proto_v1};

    /// Typed verify request for the exact Solana scheme.
    pub type VerifyRequest = proto_v1::TypedRequest<PaymentPayload, PaymentRequirements>;

    /// Typed settle request (same wire shape as verify).
    pub type SettleRequest = VerifyRequest;

    /// Payment payload carrying the base64 transaction.
    pub type PaymentPayload = proto_v1::PaymentPayload<String, ExactSvmPayload>;

    /// Payment requirements with Solana-typed fields.
    pub type PaymentRequirements =
        proto_v1::PaymentRequirements<String, U64String, Address, PaymentRequirementsExtra>;
}

#[cfg(any(feature = "client", feature = "facilitator"))]
mod transaction {
    use solana_signature::Signature;
    use solana_transaction::versioned::VersionedTransaction;

    use t402::encoding::Base64Bytes;
    use t402::proto::VerificationError;

    /// Decodes a base64 payload string into a versioned transaction.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidPayload`] on base64 or bincode
    /// failure.
    pub fn decode_transaction(b64: &str) -> Result<VersionedTransaction, VerificationError> {
        let bytes = Base64Bytes::from(b64.as_bytes())
            .decode()
            .map_err(|e| VerificationError::InvalidPayload(e.to_string()))?;
        bincode::deserialize::<VersionedTransaction>(bytes.as_slice())
            .map_err(|e| VerificationError::InvalidPayload(e.to_string()))
    }

    /// Encodes a versioned transaction as a base64 payload string.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidPayload`] on serialization
    /// failure.
    pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String, VerificationError> {
        let bytes = bincode::serialize(tx)
            .map_err(|e| VerificationError::InvalidPayload(e.to_string()))?;
        Ok(Base64Bytes::encode(bytes).to_string())
    }

    /// Returns `true` when every required signer slot holds a non-default
    /// signature.
    #[must_use]
    pub fn is_fully_signed(tx: &VersionedTransaction) -> bool {
        let num_required = tx.message.header().num_required_signatures as usize;
        if tx.signatures.len() < num_required {
            return false;
        }
        let default = Signature::default();
        tx.signatures.iter().all(|signature| *signature != default)
    }
}

#[cfg(any(feature = "client", feature = "facilitator"))]
pub use transaction::*;
