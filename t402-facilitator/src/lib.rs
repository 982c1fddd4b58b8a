#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! t402 facilitator server.
//!
//! A runnable facilitator implementing the t402 payment protocol over
//! HTTP: it verifies payment payloads off-chain and settles them on-chain
//! for the configured EVM and Solana networks.
//!
//! # Modules
//!
//! - [`config`] — TOML configuration with environment variable expansion
//! - [`handlers`] — the `/verify`, `/settle`, `/supported` endpoints
//! - [`run`] — chain wiring and server startup
//! - [`telemetry`] — tracing + optional OTLP export (feature `telemetry`)

pub mod config;
pub mod handlers;
pub mod run;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use run::run;
