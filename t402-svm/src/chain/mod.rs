//! Solana chain primitives for t402 payments.

pub mod types;
pub use types::*;

#[cfg(feature = "facilitator")]
pub mod provider;
#[cfg(feature = "facilitator")]
pub use provider::*;
