//! `POST /proofs` — build a proof for one subject from the wallet's stored
//! credentials.

use std::collections::BTreeMap;

use axum::{Json, extract::State};
use orgbook_core::{
  ingest::CredentialManager,
  proof::{ConstructedProof, ProofRequest},
  store::CredentialStore,
  wallet::WalletClient,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ProofBody {
  pub source_id:     String,
  pub proof_request: ProofRequest,
  /// Sent to the wallet as self-attested attributes.
  #[serde(default)]
  pub filters:       BTreeMap<String, String>,
}

pub async fn construct<S, W>(
  State(manager): State<CredentialManager<S, W>>,
  Json(body): Json<ProofBody>,
) -> Result<Json<ConstructedProof>, ApiError>
where
  S: CredentialStore + 'static,
  W: WalletClient + 'static,
{
  if body.proof_request.requested_attributes.is_empty()
    && body.proof_request.requested_predicates.is_empty()
  {
    return Err(ApiError::BadRequest("proof request asks for nothing".into()));
  }

  let mut proofs = manager.proof_manager(body.proof_request, body.source_id);
  for (name, value) in body.filters {
    proofs.add_filter(name, value);
  }

  Ok(Json(proofs.construct_proof().await?))
}
