//! Signature parsing for ERC-3009 payment authorization.
//!
//! Normalizes EOA, EIP-1271 (contract wallet), and EIP-6492 (counterfactual
//! wallet) signature formats into [`StructuredSignature`].

use alloy_primitives::{Address, B256, Bytes, Signature, U256, hex};
use alloy_sol_types::{Eip712Domain, SolStruct, SolType};

use super::Eip3009Payment;
use super::contract::Sig6492;
use crate::exact::types::TransferWithAuthorization;

/// The fixed 32-byte magic suffix defined by
/// [EIP-6492](https://eips.ethereum.org/EIPS/eip-6492).
const EIP6492_MAGIC_SUFFIX: [u8; 32] =
    hex!("6492649264926492649264926492649264926492649264926492649264926492");

/// Canonical data required to verify a signature.
#[derive(Debug, Clone)]
pub(super) struct SignedMessage {
    /// Expected signer (an EOA or contract wallet).
    pub address: Address,
    /// The EIP-712 digest that was signed.
    pub hash: B256,
    /// Structured signature.
    pub signature: StructuredSignature,
}

impl SignedMessage {
    /// Recomputes the EIP-712 hash for a payment and structures its
    /// signature bytes.
    pub fn extract(
        payment: &Eip3009Payment,
        domain: &Eip712Domain,
    ) -> Result<Self, SignatureFormatError> {
        let transfer_with_authorization = TransferWithAuthorization {
            from: payment.from,
            to: payment.to,
            value: payment.value,
            validAfter: U256::from(payment.valid_after.as_secs()),
            validBefore: U256::from(payment.valid_before.as_secs()),
            nonce: payment.nonce,
        };
        let eip712_hash = transfer_with_authorization.eip712_signing_hash(domain);
        let signature =
            StructuredSignature::try_from_bytes(payment.signature.clone(), payment.from, &eip712_hash)?;
        Ok(Self {
            address: payment.from,
            hash: eip712_hash,
            signature,
        })
    }
}

/// A structured representation of an Ethereum signature.
#[derive(Debug, Clone)]
pub(super) enum StructuredSignature {
    /// An EIP-6492 wrapped signature (counterfactual contract wallet).
    Eip6492 {
        /// Wallet factory to deploy through.
        factory: Address,
        /// Calldata for the factory deployment call.
        factory_calldata: Bytes,
        /// The inner signature once the wallet exists.
        inner: Bytes,
        /// The complete wrapped bytes, as received.
        original: Bytes,
    },
    /// A recovered EOA signature.
    Eoa(Signature),
    /// A plain EIP-1271 contract signature (no 6492 wrapper).
    Eip1271(Bytes),
}

/// Errors from parsing a structured signature.
#[derive(Debug, thiserror::Error)]
pub enum SignatureFormatError {
    /// The EIP-6492 wrapper could not be decoded.
    #[error("invalid EIP-6492 wrapper: {0}")]
    InvalidEip6492(alloy_sol_types::Error),
}

impl StructuredSignature {
    /// Structures raw signature bytes.
    ///
    /// EIP-6492 wrapping is detected by the magic suffix. 64/65-byte
    /// signatures are recovered against `prehash`; when the recovered
    /// address matches `expected_signer` they are treated as EOA
    /// signatures, otherwise they fall back to EIP-1271 contract
    /// validation.
    pub fn try_from_bytes(
        bytes: Bytes,
        expected_signer: Address,
        prehash: &B256,
    ) -> Result<Self, SignatureFormatError> {
        let is_eip6492 = bytes.len() >= 32 && bytes[bytes.len() - 32..] == EIP6492_MAGIC_SUFFIX;
        if is_eip6492 {
            let body = &bytes[..bytes.len() - 32];
            let sig6492 =
                Sig6492::abi_decode_params(body).map_err(SignatureFormatError::InvalidEip6492)?;
            return Ok(Self::Eip6492 {
                factory: sig6492.factory,
                factory_calldata: sig6492.factoryCalldata,
                inner: sig6492.innerSig,
                original: bytes,
            });
        }

        let eoa_signature = if bytes.len() == 65 {
            Signature::from_raw(&bytes)
                .ok()
                .map(Signature::normalized_s)
        } else if bytes.len() == 64 {
            Some(Signature::from_erc2098(&bytes).normalized_s())
        } else {
            None
        };
        Ok(match eoa_signature {
            None => Self::Eip1271(bytes),
            Some(signature) => {
                let is_expected_signer = signature
                    .recover_address_from_prehash(prehash)
                    .ok()
                    .is_some_and(|recovered| recovered == expected_signer);
                if is_expected_signer {
                    Self::Eoa(signature)
                } else {
                    Self::Eip1271(bytes)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn short_bytes_are_eip1271() {
        let sig = StructuredSignature::try_from_bytes(
            Bytes::from(vec![0x01, 0x02, 0x03]),
            address!("1111111111111111111111111111111111111111"),
            &B256::ZERO,
        )
        .unwrap();
        assert!(matches!(sig, StructuredSignature::Eip1271(_)));
    }

    #[test]
    fn magic_suffix_is_detected() {
        // A minimal ABI-encoded (address, bytes, bytes) tuple followed by the
        // magic suffix.
        let factory = address!("4242424242424242424242424242424242424242");
        let encoded = Sig6492::abi_encode_params(&Sig6492 {
            factory,
            factoryCalldata: Bytes::from(vec![0xde, 0xad]),
            innerSig: Bytes::from(vec![0xbe, 0xef]),
        });
        let mut wrapped = encoded;
        wrapped.extend_from_slice(&EIP6492_MAGIC_SUFFIX);
        let sig = StructuredSignature::try_from_bytes(
            Bytes::from(wrapped),
            address!("1111111111111111111111111111111111111111"),
            &B256::ZERO,
        )
        .unwrap();
        match sig {
            StructuredSignature::Eip6492 {
                factory: parsed, ..
            } => assert_eq!(parsed, factory),
            other => panic!("expected EIP-6492, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_recovery_falls_back_to_eip1271() {
        // A well-formed 65-byte signature that does not recover to the
        // expected signer must be handed to contract validation.
        let mut bytes = vec![0x11u8; 64];
        bytes.push(27);
        let sig = StructuredSignature::try_from_bytes(
            Bytes::from(bytes),
            address!("1111111111111111111111111111111111111111"),
            &B256::repeat_byte(0x42),
        )
        .unwrap();
        assert!(matches!(sig, StructuredSignature::Eip1271(_)));
    }
}
