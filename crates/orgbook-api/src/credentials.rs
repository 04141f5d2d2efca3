//! Handlers for `/credentials` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/credentials` | Body: [`IngestBody`]; returns 201 + ingest receipt |
//! | `GET`  | `/credentials/:id` | Credential with its claims; 404 if not found |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use orgbook_core::{
  credential::{Claim, Credential},
  ingest::CredentialManager,
  store::CredentialStore,
  wallet::WalletClient,
  Error as CoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Ingest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IngestBody {
  /// The issuer-signed credential as received from the holder agent.
  pub credential:                     Value,
  /// Credential definition metadata forwarded to the wallet.
  #[serde(default)]
  pub credential_definition_metadata: Value,
}

/// `POST /credentials`
pub async fn ingest<S, W>(
  State(manager): State<CredentialManager<S, W>>,
  Json(body): Json<IngestBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CredentialStore + 'static,
  W: WalletClient + 'static,
{
  let receipt = manager
    .process(body.credential, body.credential_definition_metadata)
    .await?;
  Ok((StatusCode::CREATED, Json(receipt)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CredentialView {
  #[serde(flatten)]
  pub credential: Credential,
  pub claims:     Vec<Claim>,
}

/// `GET /credentials/:id`
pub async fn get_one<S, W>(
  State(manager): State<CredentialManager<S, W>>,
  Path(id): Path<Uuid>,
) -> Result<Json<CredentialView>, ApiError>
where
  S: CredentialStore + 'static,
  W: WalletClient + 'static,
{
  let store = manager.store();
  let credential = store
    .get_credential(id)
    .await
    .map_err(CoreError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("credential {id} not found")))?;
  let claims = store.get_claims(id).await.map_err(CoreError::store)?;

  Ok(Json(CredentialView { credential, claims }))
}
