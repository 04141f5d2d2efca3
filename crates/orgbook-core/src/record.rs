//! Satellite records — typed, versioned application records derived from
//! credentials.
//!
//! The set of record kinds is closed. Each kind carries its own field schema;
//! the processor configuration can only populate fields that exist on the
//! target kind. A record is "current" while its `end_date` is `None`; once
//! superseded it becomes historical and is never modified again.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

/// Field name → resolved value. `None` is a genuine null.
pub type RecordFields = BTreeMap<String, Option<String>>;

// ─── Kinds ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordKind {
  Name,
  Address,
  Person,
  Contact,
}

impl RecordKind {
  /// Resolve a record type named in processor configuration.
  pub fn from_config(name: &str) -> Result<Self> {
    name
      .parse()
      .map_err(|_| Error::UnsupportedRecordType(name.to_owned()))
  }

  /// The field names this kind accepts, as they appear in configuration and
  /// in stored JSON.
  pub fn fields(self) -> &'static [&'static str] {
    match self {
      Self::Name => &["text", "language", "type"],
      Self::Address => &[
        "addressee",
        "civic_address",
        "city",
        "province",
        "postal_code",
        "country",
        "type",
      ],
      Self::Person => &["full_name", "given_name", "family_name"],
      Self::Contact => &["email", "phone", "text", "type"],
    }
  }

  pub fn check_field(self, field: &str) -> Result<()> {
    if self.fields().contains(&field) {
      Ok(())
    } else {
      Err(Error::UnknownRecordField { kind: self, field: field.to_owned() })
    }
  }
}

// ─── Per-kind schemas ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NameRecord {
  pub text:      Option<String>,
  pub language:  Option<String>,
  #[serde(rename = "type")]
  pub name_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressRecord {
  pub addressee:     Option<String>,
  pub civic_address: Option<String>,
  pub city:          Option<String>,
  pub province:      Option<String>,
  pub postal_code:   Option<String>,
  pub country:       Option<String>,
  #[serde(rename = "type")]
  pub address_type:  Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersonRecord {
  pub full_name:   Option<String>,
  pub given_name:  Option<String>,
  pub family_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactRecord {
  pub email:        Option<String>,
  pub phone:        Option<String>,
  pub text:         Option<String>,
  #[serde(rename = "type")]
  pub contact_type: Option<String>,
}

/// A typed satellite record. The variant is the record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum SatelliteRecord {
  Name(NameRecord),
  Address(AddressRecord),
  Person(PersonRecord),
  Contact(ContactRecord),
}

impl SatelliteRecord {
  pub fn kind(&self) -> RecordKind {
    match self {
      Self::Name(_) => RecordKind::Name,
      Self::Address(_) => RecordKind::Address,
      Self::Person(_) => RecordKind::Person,
      Self::Contact(_) => RecordKind::Contact,
    }
  }

  /// Build a typed record from a field map. Unset fields are null.
  pub fn from_fields(kind: RecordKind, fields: &RecordFields) -> Result<Self> {
    for field in fields.keys() {
      kind.check_field(field)?;
    }
    let wrapped = serde_json::json!({ "kind": kind, "data": fields });
    Ok(serde_json::from_value(wrapped)?)
  }

  /// The full field map, nulls included, as persisted in `fields_json`.
  pub fn to_fields(&self) -> Result<RecordFields> {
    // The full serialised form is `{"kind": "...", "data": {...}}`.
    let mut full = serde_json::to_value(self)?;
    let data = full
      .get_mut("data")
      .map(serde_json::Value::take)
      .unwrap_or_default();
    Ok(serde_json::from_value(data)?)
  }

  /// Overlay `draft` onto this record. Fields the draft does not mention keep
  /// their current value.
  pub fn merged_with(&self, draft: &RecordFields) -> Result<Self> {
    let mut fields = self.to_fields()?;
    fields.extend(draft.iter().map(|(k, v)| (k.clone(), v.clone())));
    Self::from_fields(self.kind(), &fields)
  }
}

// ─── Drafts ──────────────────────────────────────────────────────────────────

/// The output of the record mapper for one processor rule; not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
  pub kind:               RecordKind,
  pub fields:             RecordFields,
  pub cardinality_fields: Vec<String>,
}

impl RecordDraft {
  /// Build the identity filter used by the versioned upsert.
  ///
  /// Fails with [`Error::MissingCardinalityValue`] when a declared cardinality
  /// field was not produced for this draft.
  pub fn cardinality_filter(&self) -> Result<CardinalityFilter> {
    let values = self
      .cardinality_fields
      .iter()
      .map(|field| {
        self
          .fields
          .get(field)
          .map(|value| (field.clone(), value.clone()))
          .ok_or_else(|| Error::MissingCardinalityValue {
            kind:      self.kind,
            field:     field.clone(),
            available: self.fields.keys().cloned().collect(),
          })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(CardinalityFilter { kind: self.kind, values })
  }
}

/// "Current records of this kind whose cardinality fields hold these values."
/// The subject restriction is applied by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardinalityFilter {
  pub kind:   RecordKind,
  pub values: Vec<(String, Option<String>)>,
}

impl CardinalityFilter {
  /// Stable digest of the field/value tuple, used by the store's uniqueness
  /// constraint on current records. Field order in configuration does not
  /// affect the key.
  pub fn key(&self) -> String {
    let mut pairs: Vec<_> = self.values.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (field, value) in pairs {
      hasher.update(field.as_bytes());
      hasher.update([0u8]);
      match value {
        Some(v) => {
          hasher.update([1u8]);
          hasher.update(v.as_bytes());
        }
        None => hasher.update([0u8]),
      }
      hasher.update([0xffu8]);
    }
    hex::encode(hasher.finalize())
  }
}

// ─── Stored records ──────────────────────────────────────────────────────────

/// A persisted satellite record with its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
  pub record_id:      Uuid,
  pub subject_id:     Uuid,
  pub record:         SatelliteRecord,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
  /// `None` while the record is current.
  pub end_date:       Option<DateTime<Utc>>,
  /// Every credential that has produced or refreshed this record.
  pub credential_ids: Vec<Uuid>,
}

impl StoredRecord {
  pub fn is_current(&self) -> bool { self.end_date.is_none() }
}

/// What the versioned upsert did with one draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UpsertOutcome {
  Created {
    record_id: Uuid,
    kind:      RecordKind,
  },
  Updated {
    record_id: Uuid,
    kind:      RecordKind,
    /// Stale current records retired because they collapsed onto this one.
    retired:   Vec<Uuid>,
  },
}

impl UpsertOutcome {
  pub fn record_id(&self) -> Uuid {
    match self {
      Self::Created { record_id, .. } | Self::Updated { record_id, .. } => *record_id,
    }
  }
}
