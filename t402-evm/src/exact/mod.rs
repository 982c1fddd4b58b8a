//! The EIP-155 "exact" payment scheme.
//!
//! An exact payment transfers precisely the required amount of an ERC-20
//! through ERC-3009 `transferWithAuthorization`. The client signs the
//! authorization off-chain (EIP-712); the facilitator verifies it and
//! submits the transfer on-chain.
//!
//! # Signature handling
//!
//! Three signature formats are accepted:
//!
//! - **EOA** (64/65 bytes) — recovered locally and dispatched to the
//!   `(v, r, s)` overload of `transferWithAuthorization`
//! - **EIP-1271** (any other length) — passed as raw bytes to the bytes
//!   overload, validated by the wallet contract
//! - **EIP-6492** (magic-suffix-wrapped) — validated through the universal
//!   validator; on settlement of an undeployed wallet the factory call is
//!   bundled with the transfer via Multicall3 (gated by the
//!   `deploy_erc4337_with_eip6492` policy flag)

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

/// Scheme marker: V1 protocol, EVM chains, exact amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct V1Eip155Exact;

impl SchemeId for V1Eip155Exact {
    fn t402_version(&self) -> u8 {
        1
    }
    fn namespace(&self) -> &str {
        "eip155"
    }
    fn scheme(&self) -> &str {
        ExactScheme::NAME
    }
}

/// Scheme marker: V2 protocol, EVM chains, exact amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2Eip155Exact;

impl SchemeId for V2Eip155Exact {
    fn namespace(&self) -> &str {
        "eip155"
    }
    fn scheme(&self) -> &str {
        ExactScheme::NAME
    }
}
