#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport layer for the t402 payment protocol.
//!
//! - [`headers`] — base64 JSON codecs for the payment headers
//! - [`constants`] — header names and defaults
//! - [`server`] — tower middleware gating routes on payment (feature
//!   `server`)
//! - [`client`] — reqwest middleware paying 402 responses automatically
//!   (feature `client`)

pub mod constants;
pub mod headers;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub mod client;
