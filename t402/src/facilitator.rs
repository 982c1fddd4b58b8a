//! Core trait and error type for t402 payment facilitators.
//!
//! [`Facilitator`] is the unified verify/settle/supported interface
//! implemented by local mechanism handlers (`t402-evm`, `t402-svm`), by the
//! registry-backed dispatcher ([`crate::local::FacilitatorLocal`]), and by
//! the remote HTTP client in `t402-http`. It is dyn-compatible so
//! heterogeneous instances can live in registries behind
//! `Box<dyn Facilitator>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::proto;
use crate::proto::{SettlementError, VerificationError};

/// Boxed future type alias for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur during facilitator operations.
///
/// The [`Verification`](FacilitatorError::Verification) and
/// [`Settlement`](FacilitatorError::Settlement) variants are *structured*
/// failures: they carry a registered [`proto::ErrorReason`] and cross the
/// HTTP boundary as 200-status `isValid:false` / `success:false` bodies.
/// [`Onchain`](FacilitatorError::Onchain) and
/// [`Other`](FacilitatorError::Other) are unexpected internal faults and
/// surface as HTTP 5xx unless a failure hook recovers them.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FacilitatorError {
    /// Payment verification failed (invalid signature, replayed nonce,
    /// insufficient balance, ...).
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// Payment settlement failed (reverted, timed out, simulation failure).
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    /// On-chain operation failed unexpectedly (RPC unreachable, transport).
    #[error("Onchain error: {0}")]
    Onchain(String),
    /// Any other error not covered by the specific variants.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl FacilitatorError {
    /// Returns the registered error reason when this is a structured failure.
    #[must_use]
    pub const fn reason(&self) -> Option<proto::ErrorReason> {
        match self {
            Self::Verification(e) => Some(e.reason()),
            Self::Settlement(e) => Some(e.reason()),
            Self::Onchain(_) | Self::Other(_) => None,
        }
    }
}

/// Trait defining the asynchronous interface for t402 payment facilitators.
pub trait Facilitator: Send + Sync {
    /// Verifies a proposed t402 payment payload against the attached
    /// requirements.
    ///
    /// This includes checking payload integrity, signature validity, replay
    /// protection, balance sufficiency, network compatibility, and
    /// compliance with the declared payment requirements.
    fn verify(
        &self,
        request: proto::VerifyRequest,
    ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>>;

    /// Executes an on-chain t402 settlement for a valid payment.
    ///
    /// Re-validates the payment and, if valid, performs the on-chain call to
    /// settle it, waiting for confirmation.
    fn settle(
        &self,
        request: proto::SettleRequest,
    ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>>;

    /// Returns the payment kinds supported by this facilitator.
    fn supported(&self) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>>;
}

impl<T: Facilitator + ?Sized> Facilitator for Arc<T> {
    fn verify(
        &self,
        request: proto::VerifyRequest,
    ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>> {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: proto::SettleRequest,
    ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>> {
        self.as_ref().settle(request)
    }

    fn supported(&self) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>> {
        self.as_ref().supported()
    }
}
