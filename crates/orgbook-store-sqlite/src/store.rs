//! [`SqliteStore`] — the SQLite implementation of [`CredentialStore`].

use std::path::Path;

use chrono::{SubsecRound as _, Utc};
use rusqlite::{OptionalExtension as _, Transaction};
use uuid::Uuid;

use orgbook_core::{
  credential::{Claim, Credential},
  issuer::{
    CredentialType, CredentialTypeSpec, Issuer, IssuerRegistration, IssuerSpec, RegisteredIssuer,
    Schema,
  },
  record::{RecordKind, StoredRecord},
  store::{CredentialStore, IngestReceipt, NewCredential},
  subject::Subject,
};

use crate::{
  encode::{
    encode_dt, encode_kind, encode_processor_config, encode_uuid, RawClaim, RawCredential,
    RawCredentialType, RawIssuer, RawRecord, RawSchema, RawSubject,
  },
  schema::SCHEMA,
  upsert::ingest_tx,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An OrgBook store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted. All calls
/// are serialised on the connection's thread.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Registration ────────────────────────────────────────────────────────────

fn register_tx(conn: &mut rusqlite::Connection, registration: IssuerRegistration) -> Result<RegisteredIssuer> {
  let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

  let issuer = upsert_issuer(&tx, &registration.issuer)?;

  let mut schemas = Vec::with_capacity(registration.credential_types.len());
  let mut credential_types = Vec::with_capacity(registration.credential_types.len());
  for spec in &registration.credential_types {
    let schema = get_or_create_schema(&tx, &issuer.did, spec)?;
    credential_types.push(upsert_credential_type(&tx, &issuer, &schema, spec)?);
    schemas.push(schema);
  }

  tx.commit()?;
  Ok(RegisteredIssuer { issuer, schemas, credential_types })
}

fn upsert_issuer(tx: &Transaction<'_>, spec: &IssuerSpec) -> Result<Issuer> {
  let existing = tx
    .query_row(
      &format!("SELECT {} FROM issuers WHERE did = ?1", RawIssuer::COLUMNS),
      rusqlite::params![spec.did],
      RawIssuer::from_row,
    )
    .optional()?;

  if let Some(raw) = existing {
    let mut issuer = raw.into_issuer()?;
    if issuer.name != spec.name {
      tx.execute(
        "UPDATE issuers SET name = ?1 WHERE issuer_id = ?2",
        rusqlite::params![spec.name, encode_uuid(issuer.issuer_id)],
      )?;
      issuer.name = spec.name.clone();
    }
    return Ok(issuer);
  }

  let issuer = Issuer {
    issuer_id:  Uuid::new_v4(),
    did:        spec.did.clone(),
    name:       spec.name.clone(),
    created_at: Utc::now().trunc_subsecs(6),
  };
  tx.execute(
    "INSERT INTO issuers (issuer_id, did, name, created_at) VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![
      encode_uuid(issuer.issuer_id),
      issuer.did,
      issuer.name,
      encode_dt(issuer.created_at),
    ],
  )?;
  Ok(issuer)
}

fn get_or_create_schema(tx: &Transaction<'_>, origin_did: &str, spec: &CredentialTypeSpec) -> Result<Schema> {
  let existing = tx
    .query_row(
      &format!(
        "SELECT {} FROM schemas WHERE origin_did = ?1 AND name = ?2 AND version = ?3",
        RawSchema::COLUMNS
      ),
      rusqlite::params![origin_did, spec.schema, spec.version],
      RawSchema::from_row,
    )
    .optional()?;

  if let Some(raw) = existing {
    return raw.into_schema();
  }

  let schema = Schema {
    schema_id:  Uuid::new_v4(),
    origin_did: origin_did.to_owned(),
    name:       spec.schema.clone(),
    version:    spec.version.clone(),
  };
  tx.execute(
    "INSERT INTO schemas (schema_id, origin_did, name, version) VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![encode_uuid(schema.schema_id), schema.origin_did, schema.name, schema.version],
  )?;
  Ok(schema)
}

/// Re-registration replaces the source claim, and the description and
/// processor configuration when given.
fn upsert_credential_type(
  tx: &Transaction<'_>,
  issuer: &Issuer,
  schema: &Schema,
  spec: &CredentialTypeSpec,
) -> Result<CredentialType> {
  let existing = tx
    .query_row(
      &format!(
        "SELECT {} FROM credential_types WHERE issuer_id = ?1 AND schema_id = ?2",
        RawCredentialType::COLUMNS
      ),
      rusqlite::params![encode_uuid(issuer.issuer_id), encode_uuid(schema.schema_id)],
      RawCredentialType::from_row,
    )
    .optional()?
    .map(RawCredentialType::into_credential_type)
    .transpose()?;

  let credential_type = match existing {
    Some(current) => CredentialType {
      source_claim: spec.source_claim.clone(),
      description: spec.description.clone().or(current.description),
      processor_config: spec.processor_config.clone().unwrap_or(current.processor_config),
      ..current
    },
    None => CredentialType {
      credential_type_id: Uuid::new_v4(),
      issuer_id:          issuer.issuer_id,
      schema_id:          schema.schema_id,
      description:        spec.description.clone(),
      source_claim:       spec.source_claim.clone(),
      processor_config:   spec.processor_config.clone().unwrap_or_default(),
    },
  };

  tx.execute(
    "INSERT INTO credential_types
       (credential_type_id, issuer_id, schema_id, description, source_claim, processor_config)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT (credential_type_id) DO UPDATE SET
       description      = excluded.description,
       source_claim     = excluded.source_claim,
       processor_config = excluded.processor_config",
    rusqlite::params![
      encode_uuid(credential_type.credential_type_id),
      encode_uuid(credential_type.issuer_id),
      encode_uuid(credential_type.schema_id),
      credential_type.description,
      credential_type.source_claim,
      encode_processor_config(&credential_type.processor_config)?,
    ],
  )?;
  Ok(credential_type)
}

// ─── CredentialStore impl ────────────────────────────────────────────────────

impl CredentialStore for SqliteStore {
  type Error = crate::Error;

  // ── Configuration ─────────────────────────────────────────────────────────

  async fn register_issuer(&self, registration: IssuerRegistration) -> Result<RegisteredIssuer> {
    self
      .conn
      .call(move |conn| Ok(register_tx(conn, registration)))
      .await?
  }

  async fn find_issuer(&self, did: String) -> Result<Option<Issuer>> {
    let raw: Option<RawIssuer> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM issuers WHERE did = ?1", RawIssuer::COLUMNS),
            rusqlite::params![did],
            RawIssuer::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawIssuer::into_issuer).transpose()
  }

  async fn find_schema(&self, origin_did: String, name: String, version: String) -> Result<Option<Schema>> {
    let raw: Option<RawSchema> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {} FROM schemas WHERE origin_did = ?1 AND name = ?2 AND version = ?3",
              RawSchema::COLUMNS
            ),
            rusqlite::params![origin_did, name, version],
            RawSchema::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSchema::into_schema).transpose()
  }

  async fn find_credential_type(&self, issuer_id: Uuid, schema_id: Uuid) -> Result<Option<CredentialType>> {
    let issuer_str = encode_uuid(issuer_id);
    let schema_str = encode_uuid(schema_id);

    let raw: Option<RawCredentialType> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {} FROM credential_types WHERE issuer_id = ?1 AND schema_id = ?2",
              RawCredentialType::COLUMNS
            ),
            rusqlite::params![issuer_str, schema_str],
            RawCredentialType::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCredentialType::into_credential_type).transpose()
  }

  // ── Ingestion ─────────────────────────────────────────────────────────────

  async fn ingest(&self, input: NewCredential) -> Result<IngestReceipt> {
    self
      .conn
      .call(move |conn| Ok(ingest_tx(conn, input)))
      .await?
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_subject(&self, source_id: String) -> Result<Option<Subject>> {
    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM subjects WHERE source_id = ?1", RawSubject::COLUMNS),
            rusqlite::params![source_id],
            RawSubject::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn get_credential(&self, credential_id: Uuid) -> Result<Option<Credential>> {
    let id_str = encode_uuid(credential_id);

    let raw: Option<RawCredential> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM credentials WHERE credential_id = ?1", RawCredential::COLUMNS),
            rusqlite::params![id_str],
            RawCredential::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCredential::into_credential).transpose()
  }

  async fn list_credentials(&self, subject_id: Uuid) -> Result<Vec<Credential>> {
    let id_str = encode_uuid(subject_id);

    let raws: Vec<RawCredential> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM credentials WHERE subject_id = ?1
           ORDER BY created_at DESC, rowid DESC",
          RawCredential::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawCredential::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCredential::into_credential).collect()
  }

  async fn get_claims(&self, credential_id: Uuid) -> Result<Vec<Claim>> {
    let id_str = encode_uuid(credential_id);

    let raws: Vec<RawClaim> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM claims WHERE credential_id = ?1 ORDER BY position",
          RawClaim::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawClaim::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawClaim::into_claim).collect()
  }

  async fn get_records(
    &self,
    subject_id:         Uuid,
    kind:               Option<RecordKind>,
    include_historical: bool,
  ) -> Result<Vec<StoredRecord>> {
    let subject_str = encode_uuid(subject_id);
    let kind_str    = kind.map(encode_kind);

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM satellite_records
           WHERE subject_id = ?1
             AND (?2 IS NULL OR kind = ?2)
             AND (?3 OR end_date IS NULL)
           ORDER BY created_at DESC, rowid DESC",
          RawRecord::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt
          .query_map(
            rusqlite::params![subject_str, kind_str, include_historical],
            RawRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut links = conn.prepare(
          "SELECT credential_id FROM record_credentials
           WHERE record_id = ?1 ORDER BY linked_at, rowid",
        )?;
        for row in &mut rows {
          row.credential_ids = links
            .query_map(rusqlite::params![row.record_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }
}
