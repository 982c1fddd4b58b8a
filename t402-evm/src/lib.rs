#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM chain support for t402 payments via EIP-155.
//!
//! This crate implements the "exact" payment mechanism for EVM-compatible
//! blockchains. Payments ride on ERC-3009 `transferWithAuthorization`: the
//! client signs an off-chain authorization (EIP-712) and the facilitator
//! submits it on-chain, paying the gas.
//!
//! # Modules
//!
//! - [`chain`] — chain references, token amounts, and the alloy-backed
//!   provider used by the facilitator
//! - [`exact`] — wire types, verification, settlement, and the client and
//!   server scheme handlers
//! - [`networks`] — known network and USDC deployment tables
//!
//! # Feature Flags
//!
//! - `facilitator` — on-chain verification and settlement
//! - `client` — payment payload construction and signing
//! - `server` — price parsing and requirement enhancement
//! - `telemetry` — tracing instrumentation

pub mod chain;
pub mod exact;
pub mod networks;

pub use exact::{V1Eip155Exact, V2Eip155Exact};
