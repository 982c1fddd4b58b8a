#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana chain support for t402 payments.
//!
//! This crate implements the "exact" payment mechanism on Solana. The
//! client builds and partially signs a transaction whose single instruction
//! is an SPL Token `TransferChecked`; the fee-payer slot is reserved for
//! the facilitator, which co-signs, simulates, submits, and confirms the
//! transaction on settlement.
//!
//! # Modules
//!
//! - [`chain`] — addresses, chain references, and the facilitator provider
//! - [`exact`] — wire types, verification, settlement, and the client and
//!   server scheme handlers
//! - [`networks`] — known network and USDC mint tables
//!
//! # Feature Flags
//!
//! - `facilitator` — transaction verification, co-signing, and settlement
//! - `client` — transaction construction and payer signing
//! - `server` — price parsing and requirement enhancement
//! - `telemetry` — tracing instrumentation

pub mod chain;
pub mod exact;
pub mod networks;

pub use exact::{V1SolanaExact, V2SolanaExact};
