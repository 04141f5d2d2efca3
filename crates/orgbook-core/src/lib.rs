//! Core types and pure logic for the OrgBook credential registry.
//!
//! This crate turns issuer-signed credentials into versioned application
//! records according to issuer-supplied processor configuration, and selects
//! stored credentials to satisfy a verifier's proof request. It is free of
//! HTTP and database dependencies; storage and the wallet/ledger client are
//! reached through the [`store::CredentialStore`] and
//! [`wallet::WalletClient`] traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod credential;
pub mod error;
pub mod ingest;
pub mod issuer;
pub mod mapper;
pub mod proof;
pub mod record;
pub mod retry;
pub mod store;
pub mod subject;
pub mod transform;
pub mod wallet;

pub use error::{Error, ErrorClass, Result};
