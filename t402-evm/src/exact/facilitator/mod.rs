//! Facilitator-side verification and settlement for the EIP-155 exact
//! scheme.

mod contract;
mod error;
mod settle;
mod signature;
mod verify;

pub use contract::{IEIP3009, Validator6492};
pub use error::Eip155ExactError;
pub use signature::SignatureFormatError;

use alloy_primitives::{Address, B256, Bytes, U256, address};
use alloy_provider::Provider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use t402::chain::{ChainId, ChainProvider};
use t402::facilitator::{BoxFuture, Facilitator, FacilitatorError};
use t402::networks::NetworkRegistry;
use t402::proto;
use t402::proto::VerificationError;
use t402::scheme::{ExactScheme, SchemeBuilder, SchemeId};
use t402::timestamp::UnixTimestamp;

use crate::chain::{Eip155MetaTransactionProvider, TokenAmount};
use crate::exact::types::{self, PaymentRequirementsExtra};
use crate::exact::{V1Eip155Exact, V2Eip155Exact};
use crate::networks::{EVM_NETWORKS, network_config};

/// Signature verifier for EIP-6492, EIP-1271, and EOA signatures,
/// universally deployed on supported EVM chains. If absent on a target
/// chain, smart-account verification fails; deploy the validator there.
pub const VALIDATOR_ADDRESS: Address = address!("dAcD51A54883eb67D95FAEb2BBfdC4a9a6BD2a3B");

/// Policy configuration for the EVM exact facilitator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExactEvmConfig {
    /// Whether EIP-6492 signatures may be validated and settled by
    /// executing the wallet factory predeploy call. When off, wrapped
    /// signatures fail with `smart_account_validation_failed`.
    pub deploy_erc4337_with_eip6492: bool,
}

/// A fully specified ERC-3009 authorization ready for on-chain use.
#[derive(Debug)]
pub struct Eip3009Payment {
    /// Authorized sender — EOA or smart wallet.
    pub from: Address,
    /// Authorized recipient.
    pub to: Address,
    /// Transfer amount in token units.
    pub value: U256,
    /// Not valid before this timestamp (inclusive).
    pub valid_after: UnixTimestamp,
    /// Not valid at/after this timestamp (exclusive).
    pub valid_before: UnixTimestamp,
    /// Unique 32-byte nonce.
    pub nonce: B256,
    /// Raw signature bytes.
    pub signature: Bytes,
}

/// Version-independent view of the requirement fields the verification
/// ladder needs.
#[derive(Debug, Clone)]
pub(crate) struct ExactRequirement {
    pub scheme: String,
    pub network: ChainId,
    pub pay_to: Address,
    pub amount: TokenAmount,
    pub max_timeout_seconds: u64,
    pub asset: Address,
    pub extra: Option<PaymentRequirementsExtra>,
}

impl ExactRequirement {
    fn from_v2(requirements: &types::v2::PaymentRequirements) -> Self {
        Self {
            scheme: requirements.scheme.clone(),
            network: requirements.network.clone(),
            pay_to: requirements.pay_to,
            amount: requirements.amount,
            max_timeout_seconds: requirements.max_timeout_seconds,
            asset: requirements.asset,
            extra: requirements.extra.clone(),
        }
    }

    fn from_v1(
        requirements: &types::v1::PaymentRequirements,
        networks: &NetworkRegistry,
    ) -> Result<Self, VerificationError> {
        let network = networks
            .chain_id_by_name(&requirements.network)
            .cloned()
            .ok_or(VerificationError::UnsupportedNetwork)?;
        Ok(Self {
            scheme: requirements.scheme.clone(),
            network,
            pay_to: requirements.pay_to,
            amount: requirements.max_amount_required,
            max_timeout_seconds: requirements.max_timeout_seconds,
            asset: requirements.asset,
            extra: requirements.extra.clone(),
        })
    }
}

impl<P> SchemeBuilder<P> for V1Eip155Exact
where
    P: Eip155MetaTransactionProvider + ChainProvider + Send + Sync + 'static,
    P::Inner: Sync,
    Eip155ExactError: From<P::Error>,
{
    fn build(
        &self,
        provider: P,
        config: Option<serde_json::Value>,
    ) -> Result<Box<dyn Facilitator>, Box<dyn std::error::Error>> {
        let config = config
            .map(serde_json::from_value::<ExactEvmConfig>)
            .transpose()?
            .unwrap_or_default();
        Ok(Box::new(V1Eip155ExactFacilitator::new(provider, config)))
    }
}

impl<P> SchemeBuilder<P> for V2Eip155Exact
where
    P: Eip155MetaTransactionProvider + ChainProvider + Send + Sync + 'static,
    P::Inner: Sync,
    Eip155ExactError: From<P::Error>,
{
    fn build(
        &self,
        provider: P,
        config: Option<serde_json::Value>,
    ) -> Result<Box<dyn Facilitator>, Box<dyn std::error::Error>> {
        let config = config
            .map(serde_json::from_value::<ExactEvmConfig>)
            .transpose()?
            .unwrap_or_default();
        Ok(Box::new(V2Eip155ExactFacilitator::new(provider, config)))
    }
}

/// Facilitator for V2 EIP-155 exact payments.
pub struct V2Eip155ExactFacilitator<P> {
    provider: P,
    config: ExactEvmConfig,
}

impl<P> std::fmt::Debug for V2Eip155ExactFacilitator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V2Eip155ExactFacilitator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P> V2Eip155ExactFacilitator<P> {
    /// Creates a V2 facilitator over the given provider.
    pub const fn new(provider: P, config: ExactEvmConfig) -> Self {
        Self { provider, config }
    }
}

impl<P> Facilitator for V2Eip155ExactFacilitator<P>
where
    P: Eip155MetaTransactionProvider + ChainProvider + Send + Sync,
    P::Inner: Sync,
    Eip155ExactError: From<P::Error>,
{
    fn verify(
        &self,
        request: proto::VerifyRequest,
    ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>> {
        Box::pin(async move {
            let typed = types::v2::VerifyRequest::from_request(&request)?;
            let payload = &typed.payment_payload;
            if !payload.accepted.matches(&typed.payment_requirements) {
                return Err(VerificationError::NoMatchingRequirement.into());
            }
            let requirement = ExactRequirement::from_v2(&payload.accepted);
            let (_, payment, _) = verify::assert_valid_payment(
                self.provider.inner(),
                self.provider.chain(),
                &self.config,
                &payload.payload,
                &requirement,
            )
            .await
            .map_err(FacilitatorError::from)?;
            Ok(proto::VerifyResponse::valid(payment.from.to_string()))
        })
    }

    fn settle(
        &self,
        request: proto::SettleRequest,
    ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>> {
        Box::pin(async move {
            let typed = types::v2::SettleRequest::from_request(&request)?;
            let payload = &typed.payment_payload;
            if !payload.accepted.matches(&typed.payment_requirements) {
                return Err(VerificationError::NoMatchingRequirement.into());
            }
            let requirement = ExactRequirement::from_v2(&payload.accepted);
            let (contract, payment, domain) = verify::assert_valid_payment(
                self.provider.inner(),
                self.provider.chain(),
                &self.config,
                &payload.payload,
                &requirement,
            )
            .await
            .map_err(FacilitatorError::from)?;
            let tx_hash = settle::settle_payment(
                &self.provider,
                &self.config,
                &contract,
                &payment,
                &domain,
            )
            .await
            .map_err(FacilitatorError::from)?;
            Ok(proto::SettleResponse::Success {
                payer: payment.from.to_string(),
                transaction: tx_hash.to_string(),
                network: requirement.network.to_string(),
            })
        })
    }

    fn supported(&self) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>> {
        Box::pin(async move {
            let chain_id = self.provider.chain_id();
            Ok(proto::SupportedResponse {
                kinds: vec![supported_kind(2, chain_id.to_string(), &chain_id)],
                extensions: Vec::new(),
                signers: HashMap::from([(
                    V2Eip155Exact.caip_family(),
                    self.provider.signer_addresses(),
                )]),
            })
        })
    }
}

/// Facilitator for V1 EIP-155 exact payments (legacy network names).
pub struct V1Eip155ExactFacilitator<P> {
    provider: P,
    config: ExactEvmConfig,
    networks: NetworkRegistry,
}

impl<P> std::fmt::Debug for V1Eip155ExactFacilitator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V1Eip155ExactFacilitator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P> V1Eip155ExactFacilitator<P> {
    /// Creates a V1 facilitator over the given provider.
    #[must_use]
    pub fn new(provider: P, config: ExactEvmConfig) -> Self {
        Self {
            provider,
            config,
            networks: NetworkRegistry::from_networks(EVM_NETWORKS),
        }
    }
}

impl<P> V1Eip155ExactFacilitator<P>
where
    P: Eip155MetaTransactionProvider + ChainProvider + Send + Sync,
    P::Inner: Sync,
    Eip155ExactError: From<P::Error>,
{
    async fn check(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<
        (
            IEIP3009::IEIP3009Instance<&P::Inner>,
            Eip3009Payment,
            alloy_sol_types::Eip712Domain,
            ChainId,
        ),
        FacilitatorError,
    > {
        let typed = types::v1::VerifyRequest::from_request(request)?;
        let payload = &typed.payment_payload;
        if payload.scheme != ExactScheme::NAME {
            return Err(VerificationError::UnsupportedScheme.into());
        }
        if payload.network != typed.payment_requirements.network {
            return Err(VerificationError::NetworkMismatch.into());
        }
        let requirement =
            ExactRequirement::from_v1(&typed.payment_requirements, &self.networks)?;
        let network = requirement.network.clone();
        let (contract, payment, domain) = verify::assert_valid_payment(
            self.provider.inner(),
            self.provider.chain(),
            &self.config,
            &payload.payload,
            &requirement,
        )
        .await
        .map_err(FacilitatorError::from)?;
        Ok((contract, payment, domain, network))
    }
}

impl<P> Facilitator for V1Eip155ExactFacilitator<P>
where
    P: Eip155MetaTransactionProvider + ChainProvider + Send + Sync,
    P::Inner: Sync,
    Eip155ExactError: From<P::Error>,
{
    fn verify(
        &self,
        request: proto::VerifyRequest,
    ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>> {
        Box::pin(async move {
            let (_, payment, _, _) = self.check(&request).await?;
            Ok(proto::VerifyResponse::valid(payment.from.to_string()))
        })
    }

    fn settle(
        &self,
        request: proto::SettleRequest,
    ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>> {
        Box::pin(async move {
            let typed = types::v1::SettleRequest::from_request(&request)?;
            let network_name = typed.payment_payload.network.clone();
            let (contract, payment, domain, _) = self.check(&request).await?;
            let tx_hash = settle::settle_payment(
                &self.provider,
                &self.config,
                &contract,
                &payment,
                &domain,
            )
            .await
            .map_err(FacilitatorError::from)?;
            Ok(proto::SettleResponse::Success {
                payer: payment.from.to_string(),
                transaction: tx_hash.to_string(),
                network: network_name,
            })
        })
    }

    fn supported(&self) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>> {
        Box::pin(async move {
            let chain_id = self.provider.chain_id();
            let kinds = self
                .networks
                .name_by_chain_id(&chain_id)
                .map(|name| vec![supported_kind(1, name.to_owned(), &chain_id)])
                .unwrap_or_default();
            Ok(proto::SupportedResponse {
                kinds,
                extensions: Vec::new(),
                signers: HashMap::from([(
                    V1Eip155Exact.caip_family(),
                    self.provider.signer_addresses(),
                )]),
            })
        })
    }
}

/// Assembles a supported kind for this chain, seeding the EIP-712 domain
/// hints from the known default asset when the chain is recognized.
fn supported_kind(
    t402_version: u8,
    network: String,
    chain_id: &ChainId,
) -> proto::SupportedPaymentKind {
    let default_asset = chain_id
        .reference()
        .parse::<u64>()
        .ok()
        .and_then(network_config)
        .and_then(|config| config.assets.into_iter().next());
    let (asset, extra) = match default_asset {
        Some(info) => (
            Some(info.address.to_string()),
            serde_json::to_value(PaymentRequirementsExtra {
                name: info.name,
                version: info.version,
            })
            .ok(),
        ),
        None => (None, None),
    };
    proto::SupportedPaymentKind {
        t402_version,
        scheme: ExactScheme::NAME.to_owned(),
        network,
        asset,
        extra,
        extensions: None,
    }
}
