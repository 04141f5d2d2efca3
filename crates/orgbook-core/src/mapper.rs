//! Record mapper: processor configuration + decoded credential → drafts.
//!
//! Pure; persistence happens in the store's versioned upsert.

use crate::{
  credential::DecodedCredential,
  issuer::ProcessorRule,
  record::{RecordDraft, RecordFields, RecordKind},
  transform::TransformRegistry,
  Result,
};

/// Produce one draft per rule, in rule order.
pub fn map_records(
  rules: &[ProcessorRule],
  credential: &DecodedCredential,
  registry: &TransformRegistry,
) -> Result<Vec<RecordDraft>> {
  rules
    .iter()
    .map(|rule| map_rule(rule, credential, registry))
    .collect()
}

fn map_rule(
  rule: &ProcessorRule,
  credential: &DecodedCredential,
  registry: &TransformRegistry,
) -> Result<RecordDraft> {
  let kind = RecordKind::from_config(&rule.record_type)?;

  let fields = rule
    .fields
    .iter()
    .map(|(field, spec)| {
      kind.check_field(field)?;
      Ok((field.clone(), registry.resolve(spec, credential)?))
    })
    .collect::<Result<RecordFields>>()?;

  tracing::debug!(
    kind = %kind,
    fields = fields.len(),
    cardinality = ?rule.cardinality_fields,
    "mapped record draft"
  );

  Ok(RecordDraft {
    kind,
    fields,
    cardinality_fields: rule.cardinality_fields.clone(),
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::Error;

  fn credential() -> DecodedCredential {
    DecodedCredential::decode(json!({
      "schema_id": "did:sov:ABC:2:Test:1.0",
      "values": {
        "email":      { "raw": "A@B.com", "encoded": "" },
        "legal_name": { "raw": "Acme", "encoded": "" },
        "phone":      { "raw": "None", "encoded": "" }
      }
    }))
    .unwrap()
  }

  fn rules(value: serde_json::Value) -> Vec<ProcessorRule> { serde_json::from_value(value).unwrap() }

  #[test]
  fn maps_one_draft_per_rule() {
    let drafts = map_records(
      &rules(json!([
        {
          "model": "contact",
          "fields": {
            "email": { "input": "email", "from": "claim",
                       "processor": ["string_helpers.lowercase"] },
            "phone": { "input": "phone", "from": "claim" },
            "type":  { "input": "business", "from": "value" }
          },
          "cardinality_fields": ["email"]
        },
        {
          "model": "name",
          "fields": { "text": { "input": "legal_name", "from": "claim" } }
        }
      ])),
      &credential(),
      &TransformRegistry::builtin(),
    )
    .unwrap();

    assert_eq!(drafts.len(), 2);
    let contact = &drafts[0];
    assert_eq!(contact.kind, RecordKind::Contact);
    assert_eq!(contact.fields["email"].as_deref(), Some("a@b.com"));
    assert_eq!(contact.fields["phone"], None);
    assert_eq!(contact.fields["type"].as_deref(), Some("business"));
    assert_eq!(contact.cardinality_fields, ["email"]);

    assert_eq!(drafts[1].kind, RecordKind::Name);
    assert!(drafts[1].cardinality_fields.is_empty());
  }

  #[test]
  fn empty_config_produces_no_drafts() {
    let drafts = map_records(&[], &credential(), &TransformRegistry::builtin()).unwrap();
    assert!(drafts.is_empty());
  }

  #[test]
  fn unsupported_record_type_fails() {
    let err = map_records(
      &rules(json!([{ "model": "vehicle", "fields": {} }])),
      &credential(),
      &TransformRegistry::builtin(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedRecordType(name) if name == "vehicle"));
  }
}
