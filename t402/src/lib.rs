#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the t402 payment protocol.
//!
//! This crate provides the foundational types used throughout the t402
//! ecosystem for implementing HTTP 402 Payment Required flows. It is
//! blockchain-agnostic; chain-specific mechanisms live in separate crates
//! (`t402-evm`, `t402-svm`).
//!
//! # Overview
//!
//! The t402 protocol enables machine payments over HTTP by leveraging the
//! 402 Payment Required status code. When a client requests a paid resource,
//! the server responds with payment requirements. The client signs a payment
//! authorization, which a facilitator verifies off-chain and settles
//! on-chain.
//!
//! # Modules
//!
//! - [`chain`] — CAIP-2 chain identifiers and provider abstractions
//! - [`encoding`] — Base64 helpers for header and payload transport
//! - [`facilitator`] — The [`facilitator::Facilitator`] trait and its error type
//! - [`hooks`] — Before/after/failure hooks around verify and settle
//! - [`local`] — Registry-backed facilitator dispatch ([`local::FacilitatorLocal`])
//! - [`networks`] — Registry of well-known network names (V1 compatibility)
//! - [`proto`] — Wire format types for protocol messages (V1 and V2)
//! - [`scheme`] — Scheme registry and capability traits
//! - [`server`] — Resource-server core: requirement assembly and delegation
//! - [`timestamp`] — Unix timestamps for authorization windows
//!
//! # Protocol Versions
//!
//! - **V1** ([`proto::v1`]): original wire format with network names
//!   (e.g., `"base-sepolia"`)
//! - **V2** ([`proto::v2`]): CAIP-2 chain IDs (e.g., `"eip155:84532"`) and
//!   richer resource metadata

pub mod chain;
pub mod encoding;
pub mod facilitator;
pub mod hooks;
pub mod local;
pub mod networks;
pub mod proto;
pub mod scheme;
pub mod server;
pub mod timestamp;
