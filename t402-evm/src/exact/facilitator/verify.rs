//! Payment verification for the EIP-155 exact scheme.
//!
//! Implements the verification ladder for ERC-3009 payments. Every failure
//! maps onto one registered reason: scheme → `unsupported_scheme`, network →
//! `network_mismatch`, signature → `invalid_signature` /
//! `smart_account_validation_failed`, window → `authorization_expired` /
//! `deadline_too_soon`, recipient → `recipient_mismatch`, value →
//! `insufficient_amount`, replay → `nonce_already_used`, balance →
//! `insufficient_funds`.

use alloy_primitives::{Address, B256, U256};
use alloy_provider::Provider;
use alloy_sol_types::{Eip712Domain, eip712_domain};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use t402::chain::ChainId;
use t402::proto::VerificationError;
use t402::scheme::ExactScheme;
use t402::timestamp::UnixTimestamp;

use super::contract::{IEIP3009, Validator6492};
use super::error::Eip155ExactError;
use super::signature::{SignedMessage, StructuredSignature};
use super::{Eip3009Payment, ExactEvmConfig, ExactRequirement, VALIDATOR_ADDRESS};
use crate::chain::Eip155ChainReference;
use crate::exact::types::Eip3009Payload;

/// Awaits a future, optionally instrumenting it with a tracing span.
macro_rules! traced {
    ($fut:expr, $span:expr) => {{
        #[cfg(feature = "telemetry")]
        {
            use tracing::Instrument;
            $fut.instrument($span).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            $fut.await
        }
    }};
}
pub(super) use traced;

/// Runs the full verification ladder for an EIP-3009 payment.
///
/// Returns the prepared contract instance, the normalized payment, and the
/// EIP-712 domain so settlement can reuse them without re-deriving.
///
/// # Errors
///
/// Returns [`Eip155ExactError`] carrying the registered reason for the
/// first failed check.
#[cfg_attr(feature = "telemetry", instrument(skip_all, err))]
pub(super) async fn assert_valid_payment<'a, P: Provider>(
    provider: &'a P,
    chain: &Eip155ChainReference,
    config: &ExactEvmConfig,
    payload: &Eip3009Payload,
    requirement: &ExactRequirement,
) -> Result<(IEIP3009::IEIP3009Instance<&'a P>, Eip3009Payment, Eip712Domain), Eip155ExactError> {
    if requirement.scheme != ExactScheme::NAME {
        return Err(VerificationError::UnsupportedScheme.into());
    }
    let chain_id: ChainId = chain.into();
    if requirement.network != chain_id {
        return Err(VerificationError::NetworkMismatch.into());
    }

    let contract = IEIP3009::new(requirement.asset, provider);
    let domain = assert_domain(chain, &contract, requirement).await?;

    let authorization = &payload.authorization;
    let payment = Eip3009Payment {
        from: authorization.from,
        to: authorization.to,
        value: authorization.value.into(),
        valid_after: authorization.valid_after,
        valid_before: authorization.valid_before,
        nonce: authorization.nonce,
        signature: payload.signature.clone(),
    };

    let signed = SignedMessage::extract(&payment, &domain)?;
    assert_signature(provider, config, &signed).await?;

    assert_time(
        payment.valid_after,
        payment.valid_before,
        requirement.max_timeout_seconds,
    )?;

    if payment.to != requirement.pay_to {
        return Err(VerificationError::RecipientMismatch.into());
    }
    let amount_required: U256 = requirement.amount.into();
    if payment.value < amount_required {
        return Err(VerificationError::InsufficientAmount.into());
    }

    // Independent RPC reads run in parallel: one round trip instead of two.
    tokio::try_join!(
        assert_nonce_unused(&contract, &payment.from, &payment.nonce),
        assert_enough_balance(&contract, &payment.from, payment.value),
    )?;

    Ok((contract, payment, domain))
}

/// Constructs the EIP-712 domain for signature verification.
///
/// `name` and `version` come from the requirements' `extra` when present;
/// otherwise they are fetched from the token contract.
///
/// # Errors
///
/// Returns [`Eip155ExactError`] if on-chain name/version queries fail.
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
    network = %chain,
    asset = %requirement.asset,
)))]
pub(super) async fn assert_domain<P: Provider>(
    chain: &Eip155ChainReference,
    contract: &IEIP3009::IEIP3009Instance<P>,
    requirement: &ExactRequirement,
) -> Result<Eip712Domain, Eip155ExactError> {
    let name = match requirement.extra.as_ref().map(|e| e.name.clone()) {
        Some(name) => name,
        None => {
            let call = contract.name();
            traced!(
                call.call().into_future(),
                tracing::info_span!("fetch_eip712_name", otel.kind = "client")
            )?
        }
    };
    let version = match requirement.extra.as_ref().map(|e| e.version.clone()) {
        Some(version) => version,
        None => {
            let call = contract.version();
            traced!(
                call.call().into_future(),
                tracing::info_span!("fetch_eip712_version", otel.kind = "client")
            )?
        }
    };
    let domain = eip712_domain! {
        name: name,
        version: version,
        chain_id: chain.inner(),
        verifying_contract: requirement.asset,
    };
    Ok(domain)
}

/// Validates the signature over the EIP-712 hash.
///
/// EOA signatures were already recovered while structuring; EIP-1271 bytes
/// are validated through the universal validator's read-only path; EIP-6492
/// wrapped signatures require the predeploy-factory execution path, which
/// the `deploy_erc4337_with_eip6492` policy flag gates.
#[cfg_attr(feature = "telemetry", instrument(skip_all, err))]
pub(super) async fn assert_signature<P: Provider>(
    provider: &P,
    config: &ExactEvmConfig,
    signed: &SignedMessage,
) -> Result<(), Eip155ExactError> {
    match &signed.signature {
        StructuredSignature::Eoa(_) => Ok(()),
        StructuredSignature::Eip6492 { original, .. } => {
            if !config.deploy_erc4337_with_eip6492 {
                return Err(VerificationError::SmartAccountValidationFailed(
                    "EIP-6492 signatures are disabled by facilitator policy".to_owned(),
                )
                .into());
            }
            let validator = Validator6492::new(VALIDATOR_ADDRESS, provider);
            let call = validator.isValidSigWithSideEffects(
                signed.address,
                signed.hash,
                original.clone(),
            );
            let is_valid = traced!(
                call.call().into_future(),
                tracing::info_span!("validate_eip6492_signature", otel.kind = "client")
            )
            .map_err(|e| VerificationError::SmartAccountValidationFailed(e.to_string()))?;
            if is_valid {
                Ok(())
            } else {
                Err(VerificationError::SmartAccountValidationFailed(
                    "validator reported the signature invalid".to_owned(),
                )
                .into())
            }
        }
        StructuredSignature::Eip1271(bytes) => {
            let validator = Validator6492::new(VALIDATOR_ADDRESS, provider);
            let call = validator.isValidSig(signed.address, signed.hash, bytes.clone());
            let is_valid = traced!(
                call.call().into_future(),
                tracing::info_span!("validate_eip1271_signature", otel.kind = "client")
            )
            .map_err(|e| VerificationError::InvalidSignature(e.to_string()))?;
            if is_valid {
                Ok(())
            } else {
                Err(VerificationError::InvalidSignature(
                    "wallet contract rejected the signature".to_owned(),
                )
                .into())
            }
        }
    }
}

/// Enforces the authorization window and the settle deadline margin.
///
/// The current time must sit inside `[validAfter, validBefore]`, and
/// `validBefore` must leave at least `max_timeout_seconds` of margin so the
/// settlement transaction cannot outlive the authorization.
pub(super) fn assert_time(
    valid_after: UnixTimestamp,
    valid_before: UnixTimestamp,
    max_timeout_seconds: u64,
) -> Result<(), VerificationError> {
    let now = UnixTimestamp::now();
    if now < valid_after || now > valid_before {
        return Err(VerificationError::AuthorizationExpired);
    }
    if valid_before.as_secs() - now.as_secs() < max_timeout_seconds {
        return Err(VerificationError::DeadlineTooSoon);
    }
    Ok(())
}

/// Checks the EIP-3009 nonce has not been consumed on-chain.
///
/// # Errors
///
/// Returns `nonce_already_used` when `authorizationState` reports the nonce
/// spent; the RPC result is decoded strictly — empty return data is an
/// error, never treated as `false`.
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
    from = %authorizer,
    nonce = %nonce,
)))]
pub(super) async fn assert_nonce_unused<P: Provider>(
    contract: &IEIP3009::IEIP3009Instance<P>,
    authorizer: &Address,
    nonce: &B256,
) -> Result<(), Eip155ExactError> {
    let call = contract.authorizationState(*authorizer, *nonce);
    let used = traced!(
        call.call().into_future(),
        tracing::info_span!("check_authorization_state", otel.kind = "client")
    )?;
    if used {
        return Err(VerificationError::NonceAlreadyUsed.into());
    }
    Ok(())
}

/// Checks the payer's token balance covers the authorized value.
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
    sender = %sender,
    required = %required,
)))]
pub(super) async fn assert_enough_balance<P: Provider>(
    contract: &IEIP3009::IEIP3009Instance<P>,
    sender: &Address,
    required: U256,
) -> Result<(), Eip155ExactError> {
    let call = contract.balanceOf(*sender);
    let balance = traced!(
        call.call().into_future(),
        tracing::info_span!("fetch_token_balance", otel.kind = "client")
    )?;
    if balance < required {
        Err(VerificationError::InsufficientFunds.into())
    } else {
        Ok(())
    }
}
