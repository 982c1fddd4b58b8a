//! The Solana "exact" payment scheme.
//!
//! An exact payment is a partially-signed Solana transaction whose single
//! instruction is an SPL Token `TransferChecked` paying the required amount
//! to the recipient's associated token account. The client signs as the
//! transfer authority; the fee-payer slot is reserved for the facilitator,
//! which completes the signature set at settlement.

use t402::scheme::{ExactScheme, SchemeId};

pub mod types;
pub use types::*;

#[cfg(feature = "facilitator")]
pub mod facilitator;
#[cfg(feature = "facilitator")]
pub use facilitator::*;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub use client::*;

#[cfg(feature = "server")]
pub mod server;
#[cfg(feature = "server")]
pub use server::*;

/// Scheme marker: V1 protocol, Solana, exact amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct V1SolanaExact;

impl SchemeId for V1SolanaExact {
    fn t402_version(&self) -> u8 {
        1
    }
    fn namespace(&self) -> &str {
        "solana"
    }
    fn scheme(&self) -> &str {
        ExactScheme::NAME
    }
}

/// Scheme marker: V2 protocol, Solana, exact amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2SolanaExact;

impl SchemeId for V2SolanaExact {
    fn namespace(&self) -> &str {
        "solana"
    }
    fn scheme(&self) -> &str {
        ExactScheme::NAME
    }
}
