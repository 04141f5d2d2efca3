//! The `CredentialStore` trait and its input/output types.
//!
//! The trait is implemented by storage backends (e.g.
//! `orgbook-store-sqlite`). The ingestion pipeline and the JSON API depend on
//! this abstraction, not on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  credential::{Claim, Credential},
  issuer::{CredentialType, Issuer, IssuerRegistration, RegisteredIssuer, Schema},
  record::{RecordDraft, RecordKind, StoredRecord, UpsertOutcome},
  subject::Subject,
};

/// Lets the pipeline decide whether a backend failure is worth retrying.
pub trait Retryable {
  fn is_retryable(&self) -> bool;
}

// ─── Ingestion input / output ────────────────────────────────────────────────

/// Everything needed to persist one credential. Produced by the pipeline
/// after all configuration and data checks have passed.
#[derive(Debug, Clone)]
pub struct NewCredential {
  pub credential_type_id: Uuid,
  /// Subject source identifier; the subject is created if unseen.
  pub source_id:          String,
  pub wallet_id:          Option<String>,
  /// `(name, raw value)` pairs in payload order.
  pub claims:             Vec<(String, String)>,
  pub drafts:             Vec<RecordDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
  pub subject:         Subject,
  pub subject_created: bool,
  pub credential:      Credential,
  pub claims:          Vec<Claim>,
  /// One entry per draft, in draft order.
  pub records:         Vec<UpsertOutcome>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an OrgBook storage backend.
///
/// Subjects are never deleted; credentials and claims are immutable once
/// written. Satellite records are only created, updated in place, or retired
/// by [`CredentialStore::ingest`].
pub trait CredentialStore: Send + Sync {
  type Error: std::error::Error + Retryable + Send + Sync + 'static;

  // ── Configuration ─────────────────────────────────────────────────────

  /// Upsert an issuer with its schemas and credential types.
  fn register_issuer(
    &self,
    registration: IssuerRegistration,
  ) -> impl Future<Output = Result<RegisteredIssuer, Self::Error>> + Send + '_;

  fn find_issuer(
    &self,
    did: String,
  ) -> impl Future<Output = Result<Option<Issuer>, Self::Error>> + Send + '_;

  fn find_schema(
    &self,
    origin_did: String,
    name: String,
    version: String,
  ) -> impl Future<Output = Result<Option<Schema>, Self::Error>> + Send + '_;

  fn find_credential_type(
    &self,
    issuer_id: Uuid,
    schema_id: Uuid,
  ) -> impl Future<Output = Result<Option<CredentialType>, Self::Error>> + Send + '_;

  // ── Ingestion ─────────────────────────────────────────────────────────

  /// Persist a credential atomically: get-or-create the subject, write the
  /// credential and its claims, and run the versioned upsert for every
  /// draft. Either everything is written or nothing is.
  ///
  /// After this returns, each draft's subject/kind/cardinality combination
  /// has exactly one current record.
  fn ingest(
    &self,
    input: NewCredential,
  ) -> impl Future<Output = Result<IngestReceipt, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_subject(
    &self,
    source_id: String,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  fn get_credential(
    &self,
    credential_id: Uuid,
  ) -> impl Future<Output = Result<Option<Credential>, Self::Error>> + Send + '_;

  fn list_credentials(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Credential>, Self::Error>> + Send + '_;

  fn get_claims(
    &self,
    credential_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Claim>, Self::Error>> + Send + '_;

  /// Records belonging to a subject, newest first.
  ///
  /// - `kind`: restrict to one record kind.
  /// - `include_historical`: if `false`, only current records are returned.
  fn get_records(
    &self,
    subject_id: Uuid,
    kind: Option<RecordKind>,
    include_historical: bool,
  ) -> impl Future<Output = Result<Vec<StoredRecord>, Self::Error>> + Send + '_;
}
