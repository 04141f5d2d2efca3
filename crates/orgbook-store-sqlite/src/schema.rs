//! SQL schema for the OrgBook SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS issuers (
    issuer_id   TEXT PRIMARY KEY,
    did         TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schemas (
    schema_id   TEXT PRIMARY KEY,
    origin_did  TEXT NOT NULL,
    name        TEXT NOT NULL,
    version     TEXT NOT NULL,
    UNIQUE (origin_did, name, version)
);

CREATE TABLE IF NOT EXISTS credential_types (
    credential_type_id TEXT PRIMARY KEY,
    issuer_id          TEXT NOT NULL REFERENCES issuers(issuer_id),
    schema_id          TEXT NOT NULL REFERENCES schemas(schema_id),
    description        TEXT,
    source_claim       TEXT NOT NULL,
    processor_config   TEXT NOT NULL DEFAULT '[]',   -- JSON array of rules
    UNIQUE (issuer_id, schema_id)
);

-- Subjects are never deleted.
CREATE TABLE IF NOT EXISTS subjects (
    subject_id  TEXT PRIMARY KEY,
    source_id   TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

-- Credentials and claims are written once and never modified.
CREATE TABLE IF NOT EXISTS credentials (
    credential_id      TEXT PRIMARY KEY,
    subject_id         TEXT NOT NULL REFERENCES subjects(subject_id),
    credential_type_id TEXT NOT NULL REFERENCES credential_types(credential_type_id),
    wallet_id          TEXT,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS claims (
    claim_id       TEXT PRIMARY KEY,
    credential_id  TEXT NOT NULL REFERENCES credentials(credential_id),
    position       INTEGER NOT NULL,   -- order in the credential payload
    name           TEXT NOT NULL,
    value          TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS satellite_records (
    record_id        TEXT PRIMARY KEY,
    subject_id       TEXT NOT NULL REFERENCES subjects(subject_id),
    kind             TEXT NOT NULL,   -- 'name' | 'address' | 'person' | 'contact'
    fields_json      TEXT NOT NULL,   -- full field map, nulls included
    cardinality_key  TEXT NOT NULL,   -- sha-256 of the cardinality field/value tuple
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    end_date         TEXT             -- NULL while current
);

CREATE TABLE IF NOT EXISTS record_credentials (
    record_id      TEXT NOT NULL REFERENCES satellite_records(record_id),
    credential_id  TEXT NOT NULL REFERENCES credentials(credential_id),
    linked_at      TEXT NOT NULL,
    PRIMARY KEY (record_id, credential_id)
);

-- At most one current record per subject, kind and cardinality values.
CREATE UNIQUE INDEX IF NOT EXISTS satellite_records_current_idx
    ON satellite_records(subject_id, kind, cardinality_key)
    WHERE end_date IS NULL;

CREATE INDEX IF NOT EXISTS credentials_subject_idx ON credentials(subject_id);
CREATE INDEX IF NOT EXISTS claims_credential_idx   ON claims(credential_id);
CREATE INDEX IF NOT EXISTS records_subject_idx     ON satellite_records(subject_id, kind);
CREATE INDEX IF NOT EXISTS record_credentials_idx  ON record_credentials(credential_id);

PRAGMA user_version = 1;
";
