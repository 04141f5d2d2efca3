//! JSON REST API for OrgBook.
//!
//! Exposes axum [`Router`]s backed by a [`CredentialManager`] over any
//! [`orgbook_core::store::CredentialStore`] and
//! [`orgbook_core::wallet::WalletClient`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", orgbook_api::api_router(manager.clone()))
//! .nest("/api/admin", orgbook_api::admin_router(manager).layer(auth))
//! ```

pub mod credentials;
pub mod error;
pub mod issuers;
pub mod proofs;
pub mod subjects;

use axum::{
  Router,
  routing::{get, post},
};
use orgbook_core::{ingest::CredentialManager, store::CredentialStore, wallet::WalletClient};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build the public API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, W>(manager: CredentialManager<S, W>) -> Router<()>
where
  S: CredentialStore + 'static,
  W: WalletClient + 'static,
{
  Router::new()
    // Credentials
    .route("/credentials", post(credentials::ingest::<S, W>))
    .route("/credentials/{id}", get(credentials::get_one::<S, W>))
    // Subjects
    .route("/subjects/{source_id}", get(subjects::get_one::<S, W>))
    .route("/subjects/{source_id}/records", get(subjects::records::<S, W>))
    // Proofs
    .route("/proofs", post(proofs::construct::<S, W>))
    .layer(TraceLayer::new_for_http())
    .with_state(manager)
}

/// Build the issuer administration router. Mount it behind authentication.
pub fn admin_router<S, W>(manager: CredentialManager<S, W>) -> Router<()>
where
  S: CredentialStore + 'static,
  W: WalletClient + 'static,
{
  Router::new()
    .route("/issuers", post(issuers::register::<S, W>))
    .layer(TraceLayer::new_for_http())
    .with_state(manager)
}

#[cfg(test)]
mod tests;
