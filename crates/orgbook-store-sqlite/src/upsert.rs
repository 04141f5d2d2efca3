//! The ingest transaction and the versioned upsert of satellite records.
//!
//! Everything here runs synchronously on the connection thread inside one
//! `IMMEDIATE` transaction, so no other writer can interleave between the
//! lookup and the write of an upsert. The partial unique index on current
//! records backs this up against writers on other connections.

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::{params_from_iter, types::Value as SqlValue, OptionalExtension as _, Transaction};
use uuid::Uuid;

use orgbook_core::{
  credential::{Claim, Credential},
  record::{CardinalityFilter, RecordDraft, SatelliteRecord, UpsertOutcome},
  store::{IngestReceipt, NewCredential},
  subject::Subject,
};

use crate::{
  encode::{decode_record, decode_uuid, encode_dt, encode_fields, encode_kind, encode_uuid, RawSubject},
  error::is_unique_violation,
  Error, Result,
};

pub(crate) fn ingest_tx(conn: &mut rusqlite::Connection, input: NewCredential) -> Result<IngestReceipt> {
  let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
  // Stored timestamps carry microseconds; keep the receipt identical to reads.
  let now = Utc::now().trunc_subsecs(6);

  let (subject, subject_created) = get_or_create_subject(&tx, &input.source_id, now)?;

  let credential = Credential {
    credential_id:      Uuid::new_v4(),
    subject_id:         subject.subject_id,
    credential_type_id: input.credential_type_id,
    wallet_id:          input.wallet_id,
    created_at:         now,
  };
  tx.execute(
    "INSERT INTO credentials (credential_id, subject_id, credential_type_id, wallet_id, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      encode_uuid(credential.credential_id),
      encode_uuid(credential.subject_id),
      encode_uuid(credential.credential_type_id),
      credential.wallet_id,
      encode_dt(now),
    ],
  )?;

  let mut claims = Vec::with_capacity(input.claims.len());
  for (position, (name, value)) in input.claims.into_iter().enumerate() {
    let claim = Claim {
      claim_id: Uuid::new_v4(),
      credential_id: credential.credential_id,
      name,
      value,
      created_at: now,
    };
    tx.execute(
      "INSERT INTO claims (claim_id, credential_id, position, name, value, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      rusqlite::params![
        encode_uuid(claim.claim_id),
        encode_uuid(claim.credential_id),
        position as i64,
        claim.name,
        claim.value,
        encode_dt(now),
      ],
    )?;
    claims.push(claim);
  }

  let records = input
    .drafts
    .iter()
    .map(|draft| upsert_record(&tx, subject.subject_id, credential.credential_id, draft, now))
    .collect::<Result<Vec<_>>>()?;

  tx.commit()?;

  Ok(IngestReceipt { subject, subject_created, credential, claims, records })
}

fn get_or_create_subject(
  tx: &Transaction<'_>,
  source_id: &str,
  now: DateTime<Utc>,
) -> Result<(Subject, bool)> {
  let existing = tx
    .query_row(
      &format!("SELECT {} FROM subjects WHERE source_id = ?1", RawSubject::COLUMNS),
      rusqlite::params![source_id],
      RawSubject::from_row,
    )
    .optional()?;

  if let Some(raw) = existing {
    return Ok((raw.into_subject()?, false));
  }

  let subject = Subject {
    subject_id: Uuid::new_v4(),
    source_id:  source_id.to_owned(),
    created_at: now,
  };
  tx.execute(
    "INSERT INTO subjects (subject_id, source_id, created_at) VALUES (?1, ?2, ?3)",
    rusqlite::params![encode_uuid(subject.subject_id), subject.source_id, encode_dt(now)],
  )?;
  Ok((subject, true))
}

// ─── Versioned upsert ────────────────────────────────────────────────────────

/// A current record matching a draft's cardinality filter.
struct Match {
  record_id:   String,
  fields_json: String,
}

/// Create the draft's record, or update the newest matching current record
/// and retire any other matches.
fn upsert_record(
  tx: &Transaction<'_>,
  subject_id: Uuid,
  credential_id: Uuid,
  draft: &RecordDraft,
  now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
  let filter = draft.cardinality_filter()?;

  let mut matches = find_current(tx, subject_id, &filter)?.into_iter();
  if let Some(newest) = matches.next() {
    return update_matches(tx, newest, matches, credential_id, draft, &filter, now);
  }

  let record = SatelliteRecord::from_fields(draft.kind, &draft.fields)?;
  match insert_record(tx, subject_id, credential_id, &record, &filter, now) {
    Ok(record_id) => Ok(UpsertOutcome::Created { record_id, kind: draft.kind }),
    Err(Error::Sqlite(e)) if is_unique_violation(&e) => {
      // A current record holds the key slot but its stored fields did not
      // match the filter: written by another process, or with a value whose
      // JSON form compares unequal. Take that record over.
      tracing::warn!(kind = %draft.kind, "current record holds the cardinality key, updating it");
      match find_by_key(tx, subject_id, &filter)? {
        Some(holder) => update_matches(tx, holder, std::iter::empty(), credential_id, draft, &filter, now),
        None => Err(Error::Sqlite(e)),
      }
    }
    Err(e) => Err(e),
  }
}

/// Current records of the filter's kind belonging to the subject, directly or
/// through one of its credentials, newest first.
fn find_current(tx: &Transaction<'_>, subject_id: Uuid, filter: &CardinalityFilter) -> Result<Vec<Match>> {
  let mut sql = String::from(
    "SELECT r.record_id, r.fields_json
     FROM satellite_records r
     WHERE r.kind = ?1
       AND r.end_date IS NULL
       AND (r.subject_id = ?2 OR EXISTS (
             SELECT 1 FROM record_credentials rc
             JOIN credentials c ON c.credential_id = rc.credential_id
             WHERE rc.record_id = r.record_id AND c.subject_id = ?2))",
  );

  let mut params = vec![
    SqlValue::Text(encode_kind(filter.kind).to_owned()),
    SqlValue::Text(encode_uuid(subject_id)),
  ];
  for (field, value) in &filter.values {
    let n = params.len();
    sql.push_str(&format!(" AND json_extract(r.fields_json, ?{}) IS ?{}", n + 1, n + 2));
    params.push(SqlValue::Text(format!("$.{field}")));
    params.push(value.clone().map_or(SqlValue::Null, SqlValue::Text));
  }
  sql.push_str(" ORDER BY r.created_at DESC, r.rowid DESC");

  let mut stmt = tx.prepare(&sql)?;
  let rows = stmt
    .query_map(params_from_iter(params), |row| {
      Ok(Match { record_id: row.get(0)?, fields_json: row.get(1)? })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// The current record occupying the filter's `(subject, kind, key)` slot in
/// the unique index.
fn find_by_key(tx: &Transaction<'_>, subject_id: Uuid, filter: &CardinalityFilter) -> Result<Option<Match>> {
  let found = tx
    .query_row(
      "SELECT record_id, fields_json FROM satellite_records
       WHERE subject_id = ?1 AND kind = ?2 AND cardinality_key = ?3 AND end_date IS NULL",
      rusqlite::params![encode_uuid(subject_id), encode_kind(filter.kind), filter.key()],
      |row| Ok(Match { record_id: row.get(0)?, fields_json: row.get(1)? }),
    )
    .optional()?;
  Ok(found)
}

fn insert_record(
  tx: &Transaction<'_>,
  subject_id: Uuid,
  credential_id: Uuid,
  record: &SatelliteRecord,
  filter: &CardinalityFilter,
  now: DateTime<Utc>,
) -> Result<Uuid> {
  let record_id = Uuid::new_v4();
  tx.execute(
    "INSERT INTO satellite_records
       (record_id, subject_id, kind, fields_json, cardinality_key, created_at, updated_at, end_date)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, NULL)",
    rusqlite::params![
      encode_uuid(record_id),
      encode_uuid(subject_id),
      encode_kind(record.kind()),
      encode_fields(record)?,
      filter.key(),
      encode_dt(now),
    ],
  )?;
  link_credential(tx, &encode_uuid(record_id), credential_id, now)?;
  Ok(record_id)
}

/// Most recent wins: retire the stale matches, then overlay the draft onto the
/// newest one.
fn update_matches(
  tx: &Transaction<'_>,
  newest: Match,
  stale: impl Iterator<Item = Match>,
  credential_id: Uuid,
  draft: &RecordDraft,
  filter: &CardinalityFilter,
  now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
  let mut retired = Vec::new();
  for stale in stale {
    tx.execute(
      "UPDATE satellite_records SET end_date = ?1 WHERE record_id = ?2",
      rusqlite::params![encode_dt(now), stale.record_id],
    )?;
    retired.push(decode_uuid(&stale.record_id)?);
  }
  if !retired.is_empty() {
    tracing::warn!(
      kind = %draft.kind,
      kept = %newest.record_id,
      retired = retired.len(),
      "retired duplicate current records"
    );
  }

  let record = decode_record(draft.kind, &newest.fields_json)?.merged_with(&draft.fields)?;
  tx.execute(
    "UPDATE satellite_records
     SET fields_json = ?1, cardinality_key = ?2, updated_at = ?3
     WHERE record_id = ?4",
    rusqlite::params![encode_fields(&record)?, filter.key(), encode_dt(now), newest.record_id],
  )?;
  link_credential(tx, &newest.record_id, credential_id, now)?;

  Ok(UpsertOutcome::Updated {
    record_id: decode_uuid(&newest.record_id)?,
    kind: draft.kind,
    retired,
  })
}

fn link_credential(tx: &Transaction<'_>, record_id: &str, credential_id: Uuid, now: DateTime<Utc>) -> Result<()> {
  tx.execute(
    "INSERT OR IGNORE INTO record_credentials (record_id, credential_id, linked_at)
     VALUES (?1, ?2, ?3)",
    rusqlite::params![record_id, encode_uuid(credential_id), encode_dt(now)],
  )?;
  Ok(())
}
