//! Error types for `orgbook-core`.
//!
//! Every failure falls into one of three classes (see [`ErrorClass`]).
//! Configuration and data errors are permanent for a given credential and are
//! never retried; transient errors may be retried at the pipeline boundary.

use thiserror::Error;

use crate::{record::RecordKind, wallet::WalletError};

/// How a failure should be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// Issuer configuration does not fit the credential. Operator action needed.
  Configuration,
  /// The credential (or proof response) itself is unusable.
  Data,
  /// Network, ledger or storage unavailability.
  Transient,
}

#[derive(Debug, Error)]
pub enum Error {
  // ── Data ────────────────────────────────────────────────────────────────
  #[error("malformed credential: {0}")]
  MalformedCredential(String),

  #[error("invalid schema id {0:?}")]
  InvalidSchemaId(String),

  #[error("credential has no claim {name:?}; claims are: {}", .available.join(", "))]
  UnknownClaim { name: String, available: Vec<String> },

  #[error(
    "credential does not contain the configured source claim {claim:?}; claims are: {}",
    .available.join(", ")
  )]
  MissingSourceClaim { claim: String, available: Vec<String> },

  #[error("no stored credential can satisfy requested attribute {attribute:?}")]
  NoCandidateCredential { attribute: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  // ── Configuration ───────────────────────────────────────────────────────
  #[error("issuer with did {did:?} does not exist")]
  UnknownIssuer { did: String },

  #[error("schema with origin did {did:?}, name {name:?} and version {version:?} does not exist")]
  UnknownSchema {
    did:     String,
    name:    String,
    version: String,
  },

  #[error("no credential type configured for issuer {did:?} and schema {name:?} {version:?}")]
  UnconfiguredCredentialType {
    did:     String,
    name:    String,
    version: String,
  },

  #[error("unsupported record type {0:?}")]
  UnsupportedRecordType(String),

  #[error("record type {kind} has no field {field:?}")]
  UnknownRecordField { kind: RecordKind, field: String },

  #[error("no processor function named {0:?}")]
  UnknownProcessorFunction(String),

  #[error(
    "cardinality field {field:?} of record type {kind} is not produced by the processor; values are: {}",
    .available.join(", ")
  )]
  MissingCardinalityValue {
    kind:      RecordKind,
    field:     String,
    available: Vec<String>,
  },

  // ── Collaborators ───────────────────────────────────────────────────────
  #[error("wallet error: {0}")]
  Wallet(#[from] WalletError),

  #[error("store error: {source}")]
  Store {
    retryable: bool,
    #[source]
    source:    Box<dyn std::error::Error + Send + Sync>,
  },

  // ── Context ─────────────────────────────────────────────────────────────
  /// Wraps any of the above with the identity of the credential being
  /// processed so operators can diagnose without the raw payload.
  #[error("credential {schema_id} (subject {}): {source}", .source_id.as_deref().unwrap_or("unknown"))]
  Credential {
    schema_id: String,
    source_id: Option<String>,
    #[source]
    source:    Box<Error>,
  },
}

impl Error {
  /// Wrap a store backend error, preserving whether it may be retried.
  pub fn store<E>(err: E) -> Self
  where
    E: crate::store::Retryable + std::error::Error + Send + Sync + 'static,
  {
    Self::Store { retryable: err.is_retryable(), source: Box::new(err) }
  }

  pub fn class(&self) -> ErrorClass {
    match self {
      Self::MalformedCredential(_)
      | Self::InvalidSchemaId(_)
      | Self::UnknownClaim { .. }
      | Self::MissingSourceClaim { .. }
      | Self::NoCandidateCredential { .. }
      | Self::Serialization(_) => ErrorClass::Data,

      Self::UnknownIssuer { .. }
      | Self::UnknownSchema { .. }
      | Self::UnconfiguredCredentialType { .. }
      | Self::UnsupportedRecordType(_)
      | Self::UnknownRecordField { .. }
      | Self::UnknownProcessorFunction(_)
      | Self::MissingCardinalityValue { .. } => ErrorClass::Configuration,

      Self::Wallet(e) if e.is_transient() => ErrorClass::Transient,
      Self::Wallet(_) => ErrorClass::Data,
      Self::Store { retryable: true, .. } => ErrorClass::Transient,
      Self::Store { .. } => ErrorClass::Data,

      Self::Credential { source, .. } => source.class(),
    }
  }

  pub fn is_retryable(&self) -> bool { self.class() == ErrorClass::Transient }

  /// Strip any [`Error::Credential`] context and return the root failure.
  pub fn root(&self) -> &Error {
    match self {
      Self::Credential { source, .. } => source.root(),
      other => other,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
