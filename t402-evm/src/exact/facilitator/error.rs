//! Error types for the EIP-155 exact scheme facilitator.

use alloy_primitives::TxHash;
use alloy_provider::{PendingTransactionError, WatchTxError};
use alloy_transport::TransportError;

use t402::facilitator::FacilitatorError;
use t402::proto::{SettlementError, VerificationError};

use super::signature::SignatureFormatError;
use crate::chain::MetaTransactionSendError;

/// Errors specific to EIP-155 exact scheme operations.
#[derive(Debug, thiserror::Error)]
pub enum Eip155ExactError {
    /// RPC transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Pending transaction error other than a receipt timeout.
    #[error(transparent)]
    PendingTransaction(PendingTransactionError),
    /// Timed out waiting for the settlement receipt.
    #[error("Timed out waiting for transaction receipt")]
    ReceiptTimeout,
    /// The settlement transaction reverted.
    #[error("Transaction {0} reverted")]
    TransactionReverted(TxHash),
    /// Contract call failed.
    #[error("Contract call failed: {0}")]
    ContractCall(String),
    /// Payment verification failed.
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl From<Eip155ExactError> for FacilitatorError {
    fn from(value: Eip155ExactError) -> Self {
        match value {
            Eip155ExactError::ReceiptTimeout => Self::Settlement(SettlementError::Timeout),
            Eip155ExactError::TransactionReverted(hash) => {
                Self::Settlement(SettlementError::Reverted(hash.to_string()))
            }
            Eip155ExactError::Transport(_)
            | Eip155ExactError::PendingTransaction(_)
            | Eip155ExactError::ContractCall(_) => Self::Onchain(value.to_string()),
            Eip155ExactError::Verification(e) => Self::Verification(e),
        }
    }
}

impl From<PendingTransactionError> for Eip155ExactError {
    fn from(value: PendingTransactionError) -> Self {
        match value {
            PendingTransactionError::TxWatcher(WatchTxError::Timeout) => Self::ReceiptTimeout,
            other => Self::PendingTransaction(other),
        }
    }
}

impl From<SignatureFormatError> for Eip155ExactError {
    fn from(value: SignatureFormatError) -> Self {
        Self::Verification(VerificationError::InvalidSignature(value.to_string()))
    }
}

impl From<MetaTransactionSendError> for Eip155ExactError {
    fn from(value: MetaTransactionSendError) -> Self {
        match value {
            MetaTransactionSendError::Transport(e) => Self::Transport(e),
            MetaTransactionSendError::PendingTransaction(e) => e.into(),
            MetaTransactionSendError::Custom(e) => Self::ContractCall(e),
        }
    }
}

impl From<alloy_contract::Error> for Eip155ExactError {
    fn from(value: alloy_contract::Error) -> Self {
        match value {
            alloy_contract::Error::TransportError(e) => Self::Transport(e),
            alloy_contract::Error::PendingTransactionError(e) => e.into(),
            other => Self::ContractCall(other.to_string()),
        }
    }
}
