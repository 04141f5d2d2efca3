//! Subject — the stable identity that all credentials about one entity share.
//!
//! A subject is created the first time its issuer-defined source identifier
//! is seen and is never deleted. It holds identity metadata only; everything
//! else hangs off its credentials and satellite records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id: Uuid,
  /// Opaque identifier taken from the credential type's source claim.
  pub source_id:  String,
  pub created_at: DateTime<Utc>,
}
