//! Client-side payment construction for the EIP-155 exact scheme.
//!
//! [`ExactEvmClient`] signs ERC-3009 `transferWithAuthorization` payloads
//! through an injected [`ExactEvmSigner`], so key handling stays outside
//! the protocol crates and tests never touch a network.

use alloy_primitives::{Address, B256, Signature, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;

use t402::facilitator::BoxFuture;
use t402::networks::NetworkRegistry;
use t402::proto::{Extensions, v1 as proto_v1, v2 as proto_v2};
use t402::scheme::{ExactScheme, SchemeClient, SchemeClientError};
use t402::timestamp::UnixTimestamp;

use crate::chain::Eip155ChainReference;
use crate::exact::types::{
    self, Eip3009Authorization, Eip3009Payload, PaymentRequirementsExtra,
    TransferWithAuthorization,
};
use crate::networks::EVM_NETWORKS;

/// Signing surface the exact EVM client needs.
///
/// Abstracts over owned and shared signers; Alloy's `Signer` trait is not
/// implemented for `Arc<T>`, but callers commonly share one key.
pub trait ExactEvmSigner: Send + Sync {
    /// Returns the signer's address.
    fn address(&self) -> Address;

    /// Signs the given 32-byte digest.
    fn sign_hash(
        &self,
        hash: &B256,
    ) -> impl Future<Output = Result<Signature, alloy_signer::Error>> + Send;
}

impl ExactEvmSigner for PrivateKeySigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

impl<T: ExactEvmSigner> ExactEvmSigner for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// EIP-712 signing parameters for one ERC-3009 authorization.
#[derive(Debug, Clone)]
pub struct Eip3009SigningParams {
    /// The numeric EIP-155 chain ID.
    pub chain_id: u64,
    /// The token contract (EIP-712 verifying contract).
    pub asset: Address,
    /// The recipient of the transfer.
    pub pay_to: Address,
    /// The amount to authorize.
    pub amount: U256,
    /// The requirement's settle window in seconds.
    pub max_timeout_seconds: u64,
    /// EIP-712 domain name/version, when the server supplied them.
    pub extra: Option<PaymentRequirementsExtra>,
}

/// Signs an ERC-3009 `TransferWithAuthorization` with EIP-712.
///
/// `validAfter` is backdated ten minutes so clock skew cannot make the
/// payment arrive early; `validBefore` leaves twice the requirement's
/// timeout so the facilitator's settle-margin check passes with room to
/// spare. The nonce is 32 random bytes, unique per authorization.
///
/// # Errors
///
/// Returns [`SchemeClientError::Signing`] if the signer fails.
pub async fn sign_eip3009_authorization<S: ExactEvmSigner>(
    signer: &S,
    params: &Eip3009SigningParams,
) -> Result<Eip3009Payload, SchemeClientError> {
    let (name, version) = params.extra.as_ref().map_or_else(
        || (String::new(), String::new()),
        |extra| (extra.name.clone(), extra.version.clone()),
    );
    let domain = eip712_domain! {
        name: name,
        version: version,
        chain_id: params.chain_id,
        verifying_contract: params.asset,
    };

    let now = UnixTimestamp::now();
    let valid_after = UnixTimestamp::from_secs(now.as_secs().saturating_sub(10 * 60));
    let valid_before = now + params.max_timeout_seconds * 2;
    let nonce: [u8; 32] = rand::thread_rng().r#gen();
    let nonce = B256::from(nonce);

    let authorization = Eip3009Authorization {
        from: signer.address(),
        to: params.pay_to,
        value: params.amount.into(),
        valid_after,
        valid_before,
        nonce,
    };

    // The facilitator reconstructs this struct verbatim from the
    // authorization to check the signature; the two must agree field by
    // field.
    let transfer_with_authorization = TransferWithAuthorization {
        from: authorization.from,
        to: authorization.to,
        value: params.amount,
        validAfter: U256::from(valid_after.as_secs()),
        validBefore: U256::from(valid_before.as_secs()),
        nonce,
    };
    let eip712_hash = transfer_with_authorization.eip712_signing_hash(&domain);
    let signature = signer
        .sign_hash(&eip712_hash)
        .await
        .map_err(|e| SchemeClientError::Signing(e.to_string()))?;

    Ok(Eip3009Payload {
        signature: signature.as_bytes().into(),
        authorization,
    })
}

/// Client handler for exact payments on EVM chains (both protocol versions).
#[derive(Debug)]
pub struct ExactEvmClient<S> {
    signer: S,
    networks: NetworkRegistry,
}

impl<S> ExactEvmClient<S> {
    /// Creates a client handler around the given signer.
    #[must_use]
    pub fn new(signer: S) -> Self {
        Self {
            signer,
            networks: NetworkRegistry::from_networks(EVM_NETWORKS),
        }
    }
}

impl<S> ExactEvmClient<S>
where
    S: ExactEvmSigner,
{
    async fn create_v2(
        &self,
        requirements: &serde_json::Value,
        resource: Option<&proto_v2::ResourceInfo>,
        extensions: Option<&Extensions>,
    ) -> Result<Vec<u8>, SchemeClientError> {
        let requirements: types::v2::PaymentRequirements =
            serde_json::from_value(requirements.clone()).map_err(|e| {
                SchemeClientError::UnsupportedRequirements(e.to_string())
            })?;
        let chain = Eip155ChainReference::try_from(&requirements.network)
            .map_err(SchemeClientError::UnsupportedRequirements)?;
        let payload = sign_eip3009_authorization(
            &self.signer,
            &Eip3009SigningParams {
                chain_id: chain.inner(),
                asset: requirements.asset,
                pay_to: requirements.pay_to,
                amount: requirements.amount.into(),
                max_timeout_seconds: requirements.max_timeout_seconds,
                extra: requirements.extra.clone(),
            },
        )
        .await?;
        let payment_payload = types::v2::PaymentPayload {
            accepted: requirements,
            payload,
            resource: resource.cloned(),
            t402_version: proto_v2::V2,
            extensions: extensions.cloned(),
        };
        Ok(serde_json::to_vec(&payment_payload)?)
    }

    async fn create_v1(
        &self,
        requirements: &serde_json::Value,
    ) -> Result<Vec<u8>, SchemeClientError> {
        let requirements: types::v1::PaymentRequirements =
            serde_json::from_value(requirements.clone()).map_err(|e| {
                SchemeClientError::UnsupportedRequirements(e.to_string())
            })?;
        let chain_id = self
            .networks
            .chain_id_by_name(&requirements.network)
            .cloned()
            .ok_or_else(|| {
                SchemeClientError::UnsupportedRequirements(format!(
                    "unknown network {}",
                    requirements.network
                ))
            })?;
        let chain = Eip155ChainReference::try_from(&chain_id)
            .map_err(SchemeClientError::UnsupportedRequirements)?;
        let payload = sign_eip3009_authorization(
            &self.signer,
            &Eip3009SigningParams {
                chain_id: chain.inner(),
                asset: requirements.asset,
                pay_to: requirements.pay_to,
                amount: requirements.max_amount_required.into(),
                max_timeout_seconds: requirements.max_timeout_seconds,
                extra: requirements.extra.clone(),
            },
        )
        .await?;
        let payment_payload = types::v1::PaymentPayload {
            t402_version: proto_v1::V1,
            scheme: ExactScheme::NAME.to_owned(),
            network: requirements.network,
            payload,
        };
        Ok(serde_json::to_vec(&payment_payload)?)
    }
}

impl<S> SchemeClient for ExactEvmClient<S>
where
    S: ExactEvmSigner + 'static,
{
    fn supports(&self, t402_version: u8, scheme: &str, network: &str) -> bool {
        if scheme != ExactScheme::NAME {
            return false;
        }
        match t402_version {
            2 => network.starts_with("eip155:"),
            1 => self.networks.chain_id_by_name(network).is_some(),
            _ => false,
        }
    }

    fn create_payment_payload<'a>(
        &'a self,
        t402_version: u8,
        requirements: &'a serde_json::Value,
        resource: Option<&'a proto_v2::ResourceInfo>,
        extensions: Option<&'a Extensions>,
    ) -> BoxFuture<'a, Result<Vec<u8>, SchemeClientError>> {
        Box::pin(async move {
            match t402_version {
                2 => self.create_v2(requirements, resource, extensions).await,
                1 => self.create_v1(requirements).await,
                other => Err(SchemeClientError::UnsupportedRequirements(format!(
                    "unsupported protocol version {other}"
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn requirements_json() -> serde_json::Value {
        serde_json::json!({
            "scheme": "exact",
            "network": "eip155:84532",
            "amount": "1000",
            "payTo": "0x2222222222222222222222222222222222222222",
            "maxTimeoutSeconds": 300,
            "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "extra": { "name": "USDC", "version": "2" },
        })
    }

    #[tokio::test]
    async fn signs_a_v2_payload_that_parses_back() {
        let signer = PrivateKeySigner::random();
        let expected_from = ExactEvmSigner::address(&signer);
        let client = ExactEvmClient::new(signer);
        assert!(client.supports(2, "exact", "eip155:84532"));
        assert!(!client.supports(2, "upto", "eip155:84532"));
        assert!(client.supports(1, "exact", "base-sepolia"));
        assert!(!client.supports(1, "exact", "mystery-chain"));

        let bytes = client
            .create_payment_payload(2, &requirements_json(), None, None)
            .await
            .unwrap();
        let payload: types::v2::PaymentPayload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload.payload.authorization.from, expected_from);
        assert_eq!(
            payload.payload.authorization.to,
            address!("2222222222222222222222222222222222222222")
        );
        assert_eq!(payload.payload.signature.len(), 65);
        // The authorization leaves enough margin for the facilitator's
        // settle-deadline check.
        let now = UnixTimestamp::now().as_secs();
        assert!(payload.payload.authorization.valid_before.as_secs() >= now + 300);
    }

    #[tokio::test]
    async fn signature_recovers_to_the_signer() {
        let signer = PrivateKeySigner::random();
        let expected_from = ExactEvmSigner::address(&signer);
        let client = ExactEvmClient::new(signer);
        let bytes = client
            .create_payment_payload(2, &requirements_json(), None, None)
            .await
            .unwrap();
        let payload: types::v2::PaymentPayload = serde_json::from_slice(&bytes).unwrap();
        let authorization = payload.payload.authorization;

        let domain = eip712_domain! {
            name: "USDC",
            version: "2",
            chain_id: 84532u64,
            verifying_contract: address!("036CbD53842c5426634e7929541eC2318f3dCF7e"),
        };
        let message = TransferWithAuthorization {
            from: authorization.from,
            to: authorization.to,
            value: authorization.value.into(),
            validAfter: U256::from(authorization.valid_after.as_secs()),
            validBefore: U256::from(authorization.valid_before.as_secs()),
            nonce: authorization.nonce,
        };
        let hash = message.eip712_signing_hash(&domain);
        let signature = Signature::from_raw(&payload.payload.signature).unwrap();
        let recovered = signature.recover_address_from_prehash(&hash).unwrap();
        assert_eq!(recovered, expected_from);
    }
}
