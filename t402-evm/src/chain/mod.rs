//! EVM chain primitives for t402 payments.
//!
//! - [`Eip155ChainReference`] — a numeric EVM chain ID (e.g., `8453`)
//! - [`TokenAmount`] — a `U256` amount that crosses JSON as a decimal string
//! - [`AssetInfo`] / [`NetworkConfig`] — static token deployment data
//! - [`provider`] — the alloy-backed facilitator provider (feature
//!   `facilitator`)

pub mod types;
pub use types::*;

#[cfg(feature = "facilitator")]
pub mod nonce;
#[cfg(feature = "facilitator")]
pub mod provider;

#[cfg(feature = "facilitator")]
pub use nonce::*;
#[cfg(feature = "facilitator")]
pub use provider::*;
