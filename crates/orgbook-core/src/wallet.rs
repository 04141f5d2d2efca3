//! The `WalletClient` trait — capability contract for the external
//! wallet/ledger agent that holds cryptographic credential material.
//!
//! Implementations are constructed explicitly and passed in; nothing in this
//! crate reaches for a process-wide client.

use std::{future::Future, time::Duration};

use serde_json::Value;
use thiserror::Error;

use crate::proof::{ProofCandidates, ProofRequest, RequestedCredentials};

#[derive(Debug, Error)]
pub enum WalletError {
  /// The agent could not be reached or answered with a server error.
  #[error("wallet unavailable: {0}")]
  Unavailable(String),

  #[error("wallet call timed out after {0:?}")]
  Timeout(Duration),

  /// The agent refused the request (malformed credential, bad proof request).
  #[error("wallet rejected request: {0}")]
  Rejected(String),

  #[error("unexpected wallet response: {0}")]
  InvalidResponse(String),
}

impl WalletError {
  pub fn is_transient(&self) -> bool { matches!(self, Self::Unavailable(_) | Self::Timeout(_)) }
}

/// Every call is scoped to one holder: the wallet of the subject identified
/// by `holder` (the subject's source id). Credentials stored for one holder
/// are never offered for another holder's proofs.
pub trait WalletClient: Send + Sync {
  /// Store a credential and return the referent the wallet assigned to it.
  fn store_credential<'a>(
    &'a self,
    holder: &'a str,
    credential: &'a Value,
    credential_definition_metadata: &'a Value,
  ) -> impl Future<Output = Result<String, WalletError>> + Send + 'a;

  /// Find stored credentials able to satisfy `request`.
  fn get_credentials_for_proof_request<'a>(
    &'a self,
    holder: &'a str,
    request: &'a ProofRequest,
  ) -> impl Future<Output = Result<ProofCandidates, WalletError>> + Send + 'a;

  /// Build the cryptographic proof for `request` from the selected
  /// credentials.
  fn create_proof<'a>(
    &'a self,
    holder: &'a str,
    request: &'a ProofRequest,
    candidates: &'a ProofCandidates,
    selection: &'a RequestedCredentials,
  ) -> impl Future<Output = Result<Value, WalletError>> + Send + 'a;
}
