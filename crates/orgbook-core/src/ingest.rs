//! The ingestion pipeline: decode a credential, resolve its configuration,
//! store it in the wallet, then persist the credential and its records.
//!
//! All configuration and data checks run before anything leaves the process,
//! so a rejected credential never reaches the wallet or the store.

use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use crate::{
  credential::DecodedCredential,
  issuer::{CredentialType, IssuerRegistration, RegisteredIssuer},
  mapper::map_records,
  proof::{ProofManager, ProofRequest},
  retry::RetryPolicy,
  store::{CredentialStore, IngestReceipt, NewCredential},
  transform::TransformRegistry,
  wallet::WalletClient,
  Error, Result,
};

pub struct CredentialManager<S, W> {
  store:      Arc<S>,
  wallet:     Arc<W>,
  transforms: Arc<TransformRegistry>,
  retry:      RetryPolicy,
}

impl<S, W> Clone for CredentialManager<S, W> {
  fn clone(&self) -> Self {
    Self {
      store:      self.store.clone(),
      wallet:     self.wallet.clone(),
      transforms: self.transforms.clone(),
      retry:      self.retry,
    }
  }
}

impl<S: CredentialStore, W: WalletClient> CredentialManager<S, W> {
  pub fn new(store: Arc<S>, wallet: Arc<W>) -> Self {
    Self {
      store,
      wallet,
      transforms: Arc::new(TransformRegistry::builtin()),
      retry: RetryPolicy::default(),
    }
  }

  pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
    self.transforms = Arc::new(transforms);
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn transforms(&self) -> &TransformRegistry { &self.transforms }

  pub fn retry(&self) -> RetryPolicy { self.retry }

  /// A proof manager sharing this manager's wallet and retry policy.
  pub fn proof_manager(&self, request: ProofRequest, source_id: impl Into<String>) -> ProofManager<W> {
    ProofManager::new(self.wallet.clone(), request, source_id).with_retry(self.retry)
  }

  // ── Issuers ───────────────────────────────────────────────────────────

  /// Validate a registration against the transform registry, then store it.
  pub async fn register_issuer(&self, registration: IssuerRegistration) -> Result<RegisteredIssuer> {
    registration.validate(&self.transforms)?;

    let did = registration.issuer.did.clone();
    let registered = self
      .store
      .register_issuer(registration)
      .await
      .map_err(Error::store)?;

    tracing::info!(
      did = %did,
      credential_types = registered.credential_types.len(),
      "registered issuer"
    );
    Ok(registered)
  }

  // ── Credentials ───────────────────────────────────────────────────────

  /// Ingest one issuer-signed credential.
  ///
  /// Failures are wrapped in [`Error::Credential`] carrying the schema id and,
  /// once known, the subject's source id.
  pub async fn process(&self, payload: Value, credential_definition_metadata: Value) -> Result<IngestReceipt> {
    let schema_id = payload
      .get("schema_id")
      .and_then(Value::as_str)
      .unwrap_or("unknown")
      .to_owned();
    let span = tracing::info_span!("process_credential", schema_id = %schema_id);

    let mut source_id = None;
    let result = self
      .process_inner(payload, credential_definition_metadata, &mut source_id)
      .instrument(span)
      .await;

    result.map_err(|source| {
      tracing::warn!(
        schema_id = %schema_id,
        source_id = source_id.as_deref().unwrap_or("unknown"),
        class = ?source.class(),
        "credential rejected: {source}"
      );
      Error::Credential { schema_id, source_id, source: Box::new(source) }
    })
  }

  async fn process_inner(
    &self,
    payload: Value,
    credential_definition_metadata: Value,
    source_id_out: &mut Option<String>,
  ) -> Result<IngestReceipt> {
    let credential = DecodedCredential::decode(payload)?;
    let credential_type = self.resolve_credential_type(&credential).await?;

    let source_id = credential
      .get(&credential_type.source_claim)
      .map_err(|_| Error::MissingSourceClaim {
        claim:     credential_type.source_claim.clone(),
        available: credential.claim_attributes(),
      })?
      .to_owned();
    *source_id_out = Some(source_id.clone());

    let drafts = map_records(&credential_type.processor_config, &credential, &self.transforms)?;
    for draft in &drafts {
      draft.cardinality_filter()?;
    }

    let wallet_id = self
      .retry
      .run("wallet store", || {
        self.retry.deadline(
          self
            .wallet
            .store_credential(&source_id, credential.raw(), &credential_definition_metadata),
        )
      })
      .await?;
    tracing::debug!(wallet_id = %wallet_id, "stored credential in wallet");

    let input = NewCredential {
      credential_type_id: credential_type.credential_type_id,
      source_id,
      wallet_id: Some(wallet_id),
      claims: credential.claims().to_vec(),
      drafts,
    };

    let store = &*self.store;
    let receipt = self
      .retry
      .run("store ingest", || {
        let input = input.clone();
        async move { store.ingest(input).await.map_err(Error::store) }
      })
      .await?;

    tracing::info!(
      source_id = %receipt.subject.source_id,
      subject_created = receipt.subject_created,
      credential_id = %receipt.credential.credential_id,
      claims = receipt.claims.len(),
      records = receipt.records.len(),
      "ingested credential"
    );
    Ok(receipt)
  }

  /// Issuer → schema → credential type, each step failing with its own
  /// configuration error.
  async fn resolve_credential_type(&self, credential: &DecodedCredential) -> Result<CredentialType> {
    let did = credential.origin_did();

    let issuer = self
      .store
      .find_issuer(did.to_owned())
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::UnknownIssuer { did: did.to_owned() })?;

    let schema = self
      .store
      .find_schema(
        did.to_owned(),
        credential.schema_name().to_owned(),
        credential.schema_version().to_owned(),
      )
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::UnknownSchema {
        did:     did.to_owned(),
        name:    credential.schema_name().to_owned(),
        version: credential.schema_version().to_owned(),
      })?;

    self
      .store
      .find_credential_type(issuer.issuer_id, schema.schema_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::UnconfiguredCredentialType {
        did:     did.to_owned(),
        name:    schema.name,
        version: schema.version,
      })
  }
}
