//! On-chain settlement for the EIP-155 exact scheme.
//!
//! Dispatches `transferWithAuthorization` through the overload matching the
//! signature format, bundling a wallet factory deployment via Multicall3
//! for counterfactual EIP-6492 signers.

use alloy_primitives::{B256, Bytes, Signature, TxHash, U256};
use alloy_provider::bindings::IMulticall3;
use alloy_provider::{MULTICALL3_ADDRESS, MulticallItem, Provider};
use alloy_sol_types::{Eip712Domain, SolCall};
use alloy_transport::TransportError;

#[cfg(feature = "telemetry")]
use tracing_core::Level;

use t402::proto::VerificationError;

use super::contract::IEIP3009;
use super::error::Eip155ExactError;
use super::signature::{SignedMessage, StructuredSignature};
use super::verify::traced;
use super::{Eip3009Payment, ExactEvmConfig};
use crate::chain::{Eip155MetaTransactionProvider, MetaTransaction};

/// The target and calldata of a prepared `transferWithAuthorization` call.
struct PreparedTransfer {
    to: alloy_primitives::Address,
    calldata: Bytes,
}

fn prepare_bytes_transfer<P: Provider>(
    contract: &IEIP3009::IEIP3009Instance<P>,
    payment: &Eip3009Payment,
    signature: Bytes,
) -> PreparedTransfer {
    let tx = contract.transferWithAuthorization_0(
        payment.from,
        payment.to,
        payment.value,
        U256::from(payment.valid_after.as_secs()),
        U256::from(payment.valid_before.as_secs()),
        payment.nonce,
        signature,
    );
    PreparedTransfer {
        to: tx.target(),
        calldata: tx.calldata().clone(),
    }
}

fn prepare_component_transfer<P: Provider>(
    contract: &IEIP3009::IEIP3009Instance<P>,
    payment: &Eip3009Payment,
    signature: &Signature,
) -> PreparedTransfer {
    let v = 27 + u8::from(signature.v());
    let r = B256::from(signature.r());
    let s = B256::from(signature.s());
    let tx = contract.transferWithAuthorization_1(
        payment.from,
        payment.to,
        payment.value,
        U256::from(payment.valid_after.as_secs()),
        U256::from(payment.valid_before.as_secs()),
        payment.nonce,
        v,
        r,
        s,
    );
    PreparedTransfer {
        to: tx.target(),
        calldata: tx.calldata().clone(),
    }
}

/// Checks whether contract code is present at `address`.
async fn is_contract_deployed<P: Provider>(
    provider: &P,
    address: &alloy_primitives::Address,
) -> Result<bool, TransportError> {
    let call = provider.get_code_at(*address);
    let bytes = traced!(
        call.into_future(),
        tracing::info_span!("get_code_at", address = %address, otel.kind = "client")
    )?;
    Ok(!bytes.is_empty())
}

/// Settles a verified payment by submitting the transfer on-chain and
/// waiting for its receipt.
///
/// # Errors
///
/// Returns `settlement_reverted` when the receipt reports failure and
/// `settlement_timeout` when the receipt does not arrive within the
/// provider's configured window.
pub(super) async fn settle_payment<P, E>(
    provider: &P,
    config: &ExactEvmConfig,
    contract: &IEIP3009::IEIP3009Instance<&P::Inner>,
    payment: &Eip3009Payment,
    domain: &Eip712Domain,
) -> Result<TxHash, Eip155ExactError>
where
    P: Eip155MetaTransactionProvider<Error = E> + Sync,
    Eip155ExactError: From<E>,
{
    let signed = SignedMessage::extract(payment, domain)?;
    let receipt = match signed.signature {
        StructuredSignature::Eoa(signature) => {
            let transfer = prepare_component_transfer(contract, payment, &signature);
            let send = provider.send_transaction(MetaTransaction {
                to: transfer.to,
                calldata: transfer.calldata,
                confirmations: 1,
            });
            traced!(
                send,
                tracing::info_span!("transferWithAuthorization",
                    from = %payment.from,
                    to = %payment.to,
                    value = %payment.value,
                    nonce = %payment.nonce,
                    sig_kind = "EOA",
                    otel.kind = "client",
                )
            )?
        }
        StructuredSignature::Eip1271(signature) => {
            let transfer = prepare_bytes_transfer(contract, payment, signature);
            let send = provider.send_transaction(MetaTransaction {
                to: transfer.to,
                calldata: transfer.calldata,
                confirmations: 1,
            });
            traced!(
                send,
                tracing::info_span!("transferWithAuthorization",
                    from = %payment.from,
                    to = %payment.to,
                    value = %payment.value,
                    nonce = %payment.nonce,
                    sig_kind = "EIP1271",
                    otel.kind = "client",
                )
            )?
        }
        StructuredSignature::Eip6492 {
            factory,
            factory_calldata,
            inner,
            original: _,
        } => {
            if !config.deploy_erc4337_with_eip6492 {
                return Err(VerificationError::SmartAccountValidationFailed(
                    "EIP-6492 settlement is disabled by facilitator policy".to_owned(),
                )
                .into());
            }
            let transfer = prepare_bytes_transfer(contract, payment, inner);
            let deployed = is_contract_deployed(provider.inner(), &payment.from).await?;
            let (to, calldata) = if deployed {
                (transfer.to, transfer.calldata)
            } else {
                // The wallet does not exist yet: bundle the factory
                // deployment with the transfer. The deployment may fail
                // without failing the bundle (the wallet might be deployed
                // by a competing transaction in the same block).
                let aggregate = IMulticall3::aggregate3Call {
                    calls: vec![
                        IMulticall3::Call3 {
                            allowFailure: true,
                            target: factory,
                            callData: factory_calldata,
                        },
                        IMulticall3::Call3 {
                            allowFailure: false,
                            target: transfer.to,
                            callData: transfer.calldata,
                        },
                    ],
                };
                (MULTICALL3_ADDRESS, aggregate.abi_encode().into())
            };
            let send = provider.send_transaction(MetaTransaction {
                to,
                calldata,
                confirmations: 1,
            });
            traced!(
                send,
                tracing::info_span!("transferWithAuthorization",
                    from = %payment.from,
                    to = %payment.to,
                    value = %payment.value,
                    nonce = %payment.nonce,
                    sig_kind = if deployed { "EIP6492.deployed" } else { "EIP6492.counterfactual" },
                    otel.kind = "client",
                )
            )?
        }
    };

    if receipt.status() {
        #[cfg(feature = "telemetry")]
        tracing::event!(Level::INFO,
            status = "ok",
            tx = %receipt.transaction_hash,
            "transferWithAuthorization succeeded"
        );
        Ok(receipt.transaction_hash)
    } else {
        #[cfg(feature = "telemetry")]
        tracing::event!(Level::WARN,
            status = "failed",
            tx = %receipt.transaction_hash,
            "transferWithAuthorization reverted"
        );
        Err(Eip155ExactError::TransactionReverted(
            receipt.transaction_hash,
        ))
    }
}
