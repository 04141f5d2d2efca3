//! Credential decoding and the stored credential/claim rows.
//!
//! An issuer sends a credential as JSON:
//!
//! ```json
//! {
//!   "schema_id": "did:sov:ABC:2:Test:1.0",
//!   "cred_def_id": "...",
//!   "values": {
//!     "postal_code": { "raw": "N2L 6P3", "encoded": "1062703188233012330691500488799027" }
//!   }
//! }
//! ```
//!
//! [`DecodedCredential`] is the read-only view the rest of the pipeline works
//! with: schema identity plus an ordered name → raw value mapping.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Schema key ──────────────────────────────────────────────────────────────

/// Marker segment that separates the origin DID from the schema name in a
/// ledger schema id (`<origin_did>:2:<name>:<version>`).
const SCHEMA_MARKER: &str = "2";

/// The `(origin_did, name, version)` triple identifying a ledger schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaKey {
  pub origin_did: String,
  pub name:       String,
  pub version:    String,
}

impl FromStr for SchemaKey {
  type Err = Error;

  /// The origin DID may itself contain `:` (e.g. `did:sov:ABC`), so the id is
  /// split from the right.
  fn from_str(s: &str) -> Result<Self> {
    let mut parts = s.rsplitn(4, ':');
    let (Some(version), Some(name), Some(marker), Some(origin_did)) =
      (parts.next(), parts.next(), parts.next(), parts.next())
    else {
      return Err(Error::InvalidSchemaId(s.to_owned()));
    };

    if marker != SCHEMA_MARKER
      || origin_did.is_empty()
      || name.is_empty()
      || version.is_empty()
    {
      return Err(Error::InvalidSchemaId(s.to_owned()));
    }

    Ok(Self {
      origin_did: origin_did.to_owned(),
      name:       name.to_owned(),
      version:    version.to_owned(),
    })
  }
}

impl fmt::Display for SchemaKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{SCHEMA_MARKER}:{}:{}", self.origin_did, self.name, self.version)
  }
}

// ─── Decoded credential ──────────────────────────────────────────────────────

/// A parsed, read-only view over an issuer credential payload.
#[derive(Debug, Clone)]
pub struct DecodedCredential {
  raw:         Value,
  schema_id:   String,
  schema:      SchemaKey,
  cred_def_id: Option<String>,
  /// Claim name → raw value, in payload order.
  claims:      Vec<(String, String)>,
}

impl DecodedCredential {
  /// Parse a credential payload. Pure; no lookups are performed.
  pub fn decode(payload: Value) -> Result<Self> {
    let schema_id = payload
      .get("schema_id")
      .and_then(Value::as_str)
      .ok_or_else(|| Error::MalformedCredential("missing string `schema_id`".into()))?
      .to_owned();
    let schema = schema_id.parse::<SchemaKey>()?;

    let cred_def_id = payload
      .get("cred_def_id")
      .and_then(Value::as_str)
      .map(str::to_owned);

    let values = payload
      .get("values")
      .and_then(Value::as_object)
      .ok_or_else(|| Error::MalformedCredential("missing object `values`".into()))?;

    let claims = values
      .iter()
      .map(|(name, value)| {
        let raw = value.get("raw").and_then(Value::as_str).ok_or_else(|| {
          Error::MalformedCredential(format!("claim {name:?} has no string `raw` value"))
        })?;
        Ok((name.clone(), raw.to_owned()))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self { raw: payload, schema_id, schema, cred_def_id, claims })
  }

  /// The payload exactly as received; forwarded to the wallet for storage.
  pub fn raw(&self) -> &Value { &self.raw }

  pub fn schema_id(&self) -> &str { &self.schema_id }

  pub fn schema(&self) -> &SchemaKey { &self.schema }

  pub fn origin_did(&self) -> &str { &self.schema.origin_did }

  pub fn schema_name(&self) -> &str { &self.schema.name }

  pub fn schema_version(&self) -> &str { &self.schema.version }

  pub fn cred_def_id(&self) -> Option<&str> { self.cred_def_id.as_deref() }

  /// Claim attribute names in payload order.
  pub fn claim_attributes(&self) -> Vec<String> {
    self.claims.iter().map(|(name, _)| name.clone()).collect()
  }

  /// All claims as `(name, raw value)` pairs in payload order.
  pub fn claims(&self) -> &[(String, String)] { &self.claims }

  /// The raw value of claim `name`.
  pub fn get(&self, name: &str) -> Result<&str> {
    self
      .claims
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, v)| v.as_str())
      .ok_or_else(|| Error::UnknownClaim {
        name:      name.to_owned(),
        available: self.claim_attributes(),
      })
  }
}

// ─── Stored rows ─────────────────────────────────────────────────────────────

/// One ingested credential instance, owned by exactly one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
  pub credential_id:      Uuid,
  pub subject_id:         Uuid,
  pub credential_type_id: Uuid,
  /// Referent assigned by the wallet when the credential was stored there.
  pub wallet_id:          Option<String>,
  pub created_at:         DateTime<Utc>,
}

/// A single name/value pair belonging to one credential. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
  pub claim_id:      Uuid,
  pub credential_id: Uuid,
  pub name:          String,
  pub value:         String,
  pub created_at:    DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn payload() -> Value {
    json!({
      "schema_id": "did:sov:ABC:2:Test:1.0",
      "cred_def_id": "ABC:3:CL:12:tag",
      "values": {
        "legal_name": { "raw": "Acme", "encoded": "1" },
        "email":      { "raw": "a@b.com", "encoded": "2" },
        "zeta":       { "raw": "z", "encoded": "3" }
      }
    })
  }

  #[test]
  fn schema_key_splits_qualified_did_from_the_right() {
    let key: SchemaKey = "did:sov:ABC:2:Test:1.0".parse().unwrap();
    assert_eq!(key.origin_did, "did:sov:ABC");
    assert_eq!(key.name, "Test");
    assert_eq!(key.version, "1.0");
    assert_eq!(key.to_string(), "did:sov:ABC:2:Test:1.0");
  }

  #[test]
  fn schema_key_accepts_unqualified_did() {
    let key: SchemaKey = "6qnvgJtqwK44D8LFYnV5Yf:2:incorporation:1.0.3".parse().unwrap();
    assert_eq!(key.origin_did, "6qnvgJtqwK44D8LFYnV5Yf");
    assert_eq!(key.name, "incorporation");
  }

  #[test]
  fn schema_key_rejects_malformed_ids() {
    for bad in ["", "Test:1.0", "ABC:3:Test:1.0", ":2:Test:1.0", "ABC:2::1.0"] {
      assert!(
        matches!(bad.parse::<SchemaKey>(), Err(Error::InvalidSchemaId(_))),
        "{bad:?} should be rejected"
      );
    }
  }

  #[test]
  fn decode_exposes_schema_identity_and_claims_in_order() {
    let cred = DecodedCredential::decode(payload()).unwrap();
    assert_eq!(cred.origin_did(), "did:sov:ABC");
    assert_eq!(cred.schema_name(), "Test");
    assert_eq!(cred.schema_version(), "1.0");
    assert_eq!(cred.cred_def_id(), Some("ABC:3:CL:12:tag"));
    assert_eq!(cred.claim_attributes(), ["legal_name", "email", "zeta"]);
    assert_eq!(cred.get("email").unwrap(), "a@b.com");
  }

  #[test]
  fn get_unknown_claim_lists_available_names() {
    let cred = DecodedCredential::decode(payload()).unwrap();
    let err = cred.get("phone").unwrap_err();
    match err {
      Error::UnknownClaim { name, available } => {
        assert_eq!(name, "phone");
        assert_eq!(available.len(), 3);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn decode_rejects_missing_values_and_non_string_raw() {
    let err = DecodedCredential::decode(json!({ "schema_id": "A:2:B:1" })).unwrap_err();
    assert!(matches!(err, Error::MalformedCredential(_)));

    let err = DecodedCredential::decode(json!({
      "schema_id": "A:2:B:1",
      "values": { "n": { "raw": 5 } }
    }))
    .unwrap_err();
    assert!(matches!(err, Error::MalformedCredential(_)));
  }
}
