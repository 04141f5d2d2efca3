//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 UTC strings with fixed microsecond precision, so
//! lexical order is chronological order. Processor configuration and record
//! fields are stored as compact JSON. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use orgbook_core::{
  credential::{Claim, Credential},
  issuer::{CredentialType, Issuer, ProcessorRule, Schema},
  record::{RecordFields, RecordKind, SatelliteRecord, StoredRecord},
  subject::Subject,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_kind(kind: RecordKind) -> &'static str { kind.into() }

pub fn decode_kind(s: &str) -> Result<RecordKind> { Ok(RecordKind::from_config(s)?) }

pub fn encode_fields(record: &SatelliteRecord) -> Result<String> {
  Ok(serde_json::to_string(&record.to_fields()?)?)
}

pub fn decode_record(kind: RecordKind, fields_json: &str) -> Result<SatelliteRecord> {
  let fields: RecordFields = serde_json::from_str(fields_json)?;
  Ok(SatelliteRecord::from_fields(kind, &fields)?)
}

pub fn encode_processor_config(rules: &[ProcessorRule]) -> Result<String> {
  Ok(serde_json::to_string(rules)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub struct RawIssuer {
  pub issuer_id:  String,
  pub did:        String,
  pub name:       String,
  pub created_at: String,
}

impl RawIssuer {
  pub const COLUMNS: &'static str = "issuer_id, did, name, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      issuer_id:  row.get(0)?,
      did:        row.get(1)?,
      name:       row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_issuer(self) -> Result<Issuer> {
    Ok(Issuer {
      issuer_id:  decode_uuid(&self.issuer_id)?,
      did:        self.did,
      name:       self.name,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawSchema {
  pub schema_id:  String,
  pub origin_did: String,
  pub name:       String,
  pub version:    String,
}

impl RawSchema {
  pub const COLUMNS: &'static str = "schema_id, origin_did, name, version";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      schema_id:  row.get(0)?,
      origin_did: row.get(1)?,
      name:       row.get(2)?,
      version:    row.get(3)?,
    })
  }

  pub fn into_schema(self) -> Result<Schema> {
    Ok(Schema {
      schema_id:  decode_uuid(&self.schema_id)?,
      origin_did: self.origin_did,
      name:       self.name,
      version:    self.version,
    })
  }
}

pub struct RawCredentialType {
  pub credential_type_id: String,
  pub issuer_id:          String,
  pub schema_id:          String,
  pub description:        Option<String>,
  pub source_claim:       String,
  pub processor_config:   String,
}

impl RawCredentialType {
  pub const COLUMNS: &'static str =
    "credential_type_id, issuer_id, schema_id, description, source_claim, processor_config";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      credential_type_id: row.get(0)?,
      issuer_id:          row.get(1)?,
      schema_id:          row.get(2)?,
      description:        row.get(3)?,
      source_claim:       row.get(4)?,
      processor_config:   row.get(5)?,
    })
  }

  pub fn into_credential_type(self) -> Result<CredentialType> {
    Ok(CredentialType {
      credential_type_id: decode_uuid(&self.credential_type_id)?,
      issuer_id:          decode_uuid(&self.issuer_id)?,
      schema_id:          decode_uuid(&self.schema_id)?,
      description:        self.description,
      source_claim:       self.source_claim,
      processor_config:   serde_json::from_str(&self.processor_config)?,
    })
  }
}

pub struct RawSubject {
  pub subject_id: String,
  pub source_id:  String,
  pub created_at: String,
}

impl RawSubject {
  pub const COLUMNS: &'static str = "subject_id, source_id, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject_id: row.get(0)?,
      source_id:  row.get(1)?,
      created_at: row.get(2)?,
    })
  }

  pub fn into_subject(self) -> Result<Subject> {
    Ok(Subject {
      subject_id: decode_uuid(&self.subject_id)?,
      source_id:  self.source_id,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawCredential {
  pub credential_id:      String,
  pub subject_id:         String,
  pub credential_type_id: String,
  pub wallet_id:          Option<String>,
  pub created_at:         String,
}

impl RawCredential {
  pub const COLUMNS: &'static str =
    "credential_id, subject_id, credential_type_id, wallet_id, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      credential_id:      row.get(0)?,
      subject_id:         row.get(1)?,
      credential_type_id: row.get(2)?,
      wallet_id:          row.get(3)?,
      created_at:         row.get(4)?,
    })
  }

  pub fn into_credential(self) -> Result<Credential> {
    Ok(Credential {
      credential_id:      decode_uuid(&self.credential_id)?,
      subject_id:         decode_uuid(&self.subject_id)?,
      credential_type_id: decode_uuid(&self.credential_type_id)?,
      wallet_id:          self.wallet_id,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawClaim {
  pub claim_id:      String,
  pub credential_id: String,
  pub name:          String,
  pub value:         String,
  pub created_at:    String,
}

impl RawClaim {
  pub const COLUMNS: &'static str = "claim_id, credential_id, name, value, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      claim_id:      row.get(0)?,
      credential_id: row.get(1)?,
      name:          row.get(2)?,
      value:         row.get(3)?,
      created_at:    row.get(4)?,
    })
  }

  pub fn into_claim(self) -> Result<Claim> {
    Ok(Claim {
      claim_id:      decode_uuid(&self.claim_id)?,
      credential_id: decode_uuid(&self.credential_id)?,
      name:          self.name,
      value:         self.value,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// A `satellite_records` row plus its associated credential ids.
pub struct RawRecord {
  pub record_id:      String,
  pub subject_id:     String,
  pub kind:           String,
  pub fields_json:    String,
  pub created_at:     String,
  pub updated_at:     String,
  pub end_date:       Option<String>,
  pub credential_ids: Vec<String>,
}

impl RawRecord {
  pub const COLUMNS: &'static str =
    "record_id, subject_id, kind, fields_json, created_at, updated_at, end_date";

  /// Reads every column but `credential_ids`, which is filled separately.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:      row.get(0)?,
      subject_id:     row.get(1)?,
      kind:           row.get(2)?,
      fields_json:    row.get(3)?,
      created_at:     row.get(4)?,
      updated_at:     row.get(5)?,
      end_date:       row.get(6)?,
      credential_ids: Vec::new(),
    })
  }

  pub fn into_record(self) -> Result<StoredRecord> {
    let kind = decode_kind(&self.kind)?;
    Ok(StoredRecord {
      record_id:      decode_uuid(&self.record_id)?,
      subject_id:     decode_uuid(&self.subject_id)?,
      record:         decode_record(kind, &self.fields_json)?,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
      end_date:       self.end_date.as_deref().map(decode_dt).transpose()?,
      credential_ids: self
        .credential_ids
        .iter()
        .map(|id| decode_uuid(id))
        .collect::<Result<_>>()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = "2024-01-01T00:00:00.000001Z".parse::<DateTime<Utc>>().unwrap();
    let b = "2024-01-01T00:00:00.1Z".parse::<DateTime<Utc>>().unwrap();
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn kinds_use_config_names() {
    assert_eq!(encode_kind(RecordKind::Contact), "contact");
    assert_eq!(decode_kind("address").unwrap(), RecordKind::Address);
    assert!(decode_kind("vehicle").is_err());
  }
}
