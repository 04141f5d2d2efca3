//! `POST /issuers` — register or update an issuer and its credential types.
//!
//! Mounted under the admin router; the caller is responsible for
//! authentication.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use orgbook_core::{
  ingest::CredentialManager,
  issuer::IssuerRegistration,
  store::CredentialStore,
  wallet::WalletClient,
};

use crate::error::ApiError;

pub async fn register<S, W>(
  State(manager): State<CredentialManager<S, W>>,
  Json(registration): Json<IssuerRegistration>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CredentialStore + 'static,
  W: WalletClient + 'static,
{
  let registered = manager.register_issuer(registration).await?;
  Ok((StatusCode::CREATED, Json(registered)))
}
