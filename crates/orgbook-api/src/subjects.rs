//! Handlers for `/subjects` endpoints. Subjects are addressed by their
//! source id, the value the issuer put in the configured source claim.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/subjects/:source_id` | Subject with its credentials; 404 if not found |
//! | `GET`  | `/subjects/:source_id/records` | Optional `?kind=contact&include_historical=true` |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use orgbook_core::{
  credential::Credential,
  ingest::CredentialManager,
  record::{RecordKind, StoredRecord},
  store::CredentialStore,
  subject::Subject,
  wallet::WalletClient,
  Error as CoreError,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

async fn find_subject<S: CredentialStore>(store: &S, source_id: &str) -> Result<Subject, ApiError> {
  store
    .get_subject(source_id.to_owned())
    .await
    .map_err(CoreError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("subject {source_id:?} not found")))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SubjectView {
  #[serde(flatten)]
  pub subject:     Subject,
  /// Newest first.
  pub credentials: Vec<Credential>,
}

/// `GET /subjects/:source_id`
pub async fn get_one<S, W>(
  State(manager): State<CredentialManager<S, W>>,
  Path(source_id): Path<String>,
) -> Result<Json<SubjectView>, ApiError>
where
  S: CredentialStore + 'static,
  W: WalletClient + 'static,
{
  let store = manager.store();
  let subject = find_subject(store, &source_id).await?;
  let credentials = store
    .list_credentials(subject.subject_id)
    .await
    .map_err(CoreError::store)?;

  Ok(Json(SubjectView { subject, credentials }))
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecordParams {
  pub kind:               Option<RecordKind>,
  /// Also return retired records. Default `false`.
  #[serde(default)]
  pub include_historical: bool,
}

/// `GET /subjects/:source_id/records[?kind=<kind>][&include_historical=true]`
pub async fn records<S, W>(
  State(manager): State<CredentialManager<S, W>>,
  Path(source_id): Path<String>,
  Query(params): Query<RecordParams>,
) -> Result<Json<Vec<StoredRecord>>, ApiError>
where
  S: CredentialStore + 'static,
  W: WalletClient + 'static,
{
  let store = manager.store();
  let subject = find_subject(store, &source_id).await?;
  let records = store
    .get_records(subject.subject_id, params.kind, params.include_historical)
    .await
    .map_err(CoreError::store)?;

  Ok(Json(records))
}
