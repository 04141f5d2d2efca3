//! Issuers, schemas, and credential types — the configuration that tells the
//! pipeline how to turn one issuer's credentials into records.
//!
//! Configuration is written by issuer registration and is read-only to the
//! ingestion path.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  record::RecordKind,
  transform::{FieldSpec, TransformRegistry},
  Error, Result,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
  pub issuer_id:  Uuid,
  pub did:        String,
  pub name:       String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
  pub schema_id:  Uuid,
  pub origin_did: String,
  pub name:       String,
  pub version:    String,
}

// ─── Processor configuration ─────────────────────────────────────────────────

/// One record-mapping rule.
///
/// ```json
/// {
///   "model": "contact",
///   "fields": { "email": { "input": "email", "from": "claim" } },
///   "cardinality_fields": ["email"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorRule {
  /// Target record type; validated against [`RecordKind`].
  #[serde(rename = "model")]
  pub record_type:        String,
  pub fields:             BTreeMap<String, FieldSpec>,
  /// Fields whose values together identify a record for one subject.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub cardinality_fields: Vec<String>,
}

impl ProcessorRule {
  /// Check the rule against the supported record kinds and `registry`.
  pub fn validate(&self, registry: &TransformRegistry) -> Result<RecordKind> {
    let kind = RecordKind::from_config(&self.record_type)?;

    for (field, spec) in &self.fields {
      kind.check_field(field)?;
      for name in spec.processor.iter().flatten() {
        registry.get(name)?;
      }
    }

    if let Some(field) = self
      .cardinality_fields
      .iter()
      .find(|f| !self.fields.contains_key(*f))
    {
      return Err(Error::MissingCardinalityValue {
        kind,
        field: field.clone(),
        available: self.fields.keys().cloned().collect(),
      });
    }

    Ok(kind)
  }
}

/// Links an issuer/schema pair to its processing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialType {
  pub credential_type_id: Uuid,
  pub issuer_id:          Uuid,
  pub schema_id:          Uuid,
  pub description:        Option<String>,
  /// Name of the claim whose value identifies the subject.
  pub source_claim:       String,
  /// Ordered record-mapping rules; may be empty.
  pub processor_config:   Vec<ProcessorRule>,
}

// ─── Registration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerSpec {
  pub did:  String,
  pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialTypeSpec {
  /// Schema name; the origin DID is the registering issuer's.
  pub schema:           String,
  pub version:          String,
  pub source_claim:     String,
  #[serde(default)]
  pub description:      Option<String>,
  #[serde(default)]
  pub processor_config: Option<Vec<ProcessorRule>>,
}

/// Everything an issuer declares about itself in one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerRegistration {
  pub issuer:           IssuerSpec,
  #[serde(default)]
  pub credential_types: Vec<CredentialTypeSpec>,
}

impl IssuerRegistration {
  /// Validate every processor rule before anything is persisted.
  pub fn validate(&self, registry: &TransformRegistry) -> Result<()> {
    for spec in &self.credential_types {
      for rule in spec.processor_config.iter().flatten() {
        rule.validate(registry)?;
      }
    }
    Ok(())
  }
}

/// The persisted result of a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredIssuer {
  pub issuer:           Issuer,
  pub schemas:          Vec<Schema>,
  pub credential_types: Vec<CredentialType>,
}
