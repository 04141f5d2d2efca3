//! Proof construction: choose which stored credential answers each attribute
//! of a verifier's proof request, then hand the selection to the wallet.
//!
//! Selection policy is first-match: for every requested attribute the first
//! candidate the wallet offers is used. There is no ranking between several
//! eligible credentials, so the outcome follows the wallet's response order.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  retry::RetryPolicy,
  wallet::WalletClient,
  Error, Result,
};

// ─── Proof request ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRequest {
  /// Claim name on the credential.
  pub name:         String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub restrictions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateRequest {
  pub name:         String,
  /// Comparison operator, e.g. `">="`.
  pub p_type:       String,
  pub p_value:      i64,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub restrictions: Vec<Value>,
}

/// A verifier's request, keyed by referent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
  pub name:                 String,
  pub version:              String,
  pub nonce:                String,
  #[serde(default)]
  pub requested_attributes: BTreeMap<String, AttributeRequest>,
  #[serde(default)]
  pub requested_predicates: BTreeMap<String, PredicateRequest>,
}

impl ProofRequest {
  /// A new, empty request with a fresh decimal nonce.
  pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      name:                 name.into(),
      version:              version.into(),
      nonce:                Uuid::new_v4().as_u128().to_string(),
      requested_attributes: BTreeMap::new(),
      requested_predicates: BTreeMap::new(),
    }
  }

  pub fn add_requested_attribute(
    &mut self,
    referent: impl Into<String>,
    name: impl Into<String>,
    restrictions: Vec<Value>,
  ) -> &mut Self {
    self
      .requested_attributes
      .insert(referent.into(), AttributeRequest { name: name.into(), restrictions });
    self
  }

  pub fn add_requested_predicate(
    &mut self,
    referent: impl Into<String>,
    predicate: PredicateRequest,
  ) -> &mut Self {
    self.requested_predicates.insert(referent.into(), predicate);
    self
  }

  pub fn to_json(&self) -> Result<Value> { Ok(serde_json::to_value(self)?) }
}

// ─── Wallet candidates ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialInfo {
  /// Wallet-assigned credential id.
  pub referent:    String,
  #[serde(default)]
  pub attrs:       BTreeMap<String, String>,
  #[serde(default)]
  pub schema_id:   Option<String>,
  #[serde(default)]
  pub cred_def_id: Option<String>,
  #[serde(default)]
  pub rev_reg_id:  Option<String>,
  #[serde(default)]
  pub cred_rev_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCredential {
  pub cred_info: CredentialInfo,
  #[serde(default)]
  pub interval:  Option<Value>,
}

/// Candidates per requested referent, in the order the wallet offered them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsForProof {
  #[serde(default)]
  pub attrs:      BTreeMap<String, Vec<CandidateCredential>>,
  #[serde(default)]
  pub predicates: BTreeMap<String, Vec<CandidateCredential>>,
}

/// The wallet's answer to a credentials-for-proof-request query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofCandidates {
  pub referents:   Vec<String>,
  pub credentials: CredentialsForProof,
}

// ─── Selection payload ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedAttribute {
  pub cred_id:  String,
  pub revealed: bool,
}

/// The selection the wallet consumes to build a proof.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedCredentials {
  pub self_attested_attributes: BTreeMap<String, String>,
  /// Predicates are not selected yet; always empty.
  pub requested_predicates:     BTreeMap<String, Value>,
  pub requested_attributes:     BTreeMap<String, RequestedAttribute>,
}

/// A caller-supplied claim value, sent as a self-attested attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
  pub claim_name:  String,
  pub claim_value: String,
}

/// Pick the first candidate for every attribute the wallet returned.
pub fn select_credentials(
  candidates: &CredentialsForProof,
  filters: &[Filter],
) -> Result<RequestedCredentials> {
  let requested_attributes = candidates
    .attrs
    .iter()
    .map(|(referent, offered)| {
      let first = offered.first().ok_or_else(|| Error::NoCandidateCredential {
        attribute: referent.clone(),
      })?;
      Ok((
        referent.clone(),
        RequestedAttribute { cred_id: first.cred_info.referent.clone(), revealed: true },
      ))
    })
    .collect::<Result<BTreeMap<_, _>>>()?;

  let self_attested_attributes = filters
    .iter()
    .map(|f| (f.claim_name.clone(), f.claim_value.clone()))
    .collect();

  Ok(RequestedCredentials {
    self_attested_attributes,
    requested_predicates: BTreeMap::new(),
    requested_attributes,
  })
}

// ─── Manager ─────────────────────────────────────────────────────────────────

/// What [`ProofManager::construct_proof`] hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructedProof {
  pub requested_credentials: RequestedCredentials,
  pub proof:                 Value,
}

/// Builds one proof for one subject.
pub struct ProofManager<W> {
  wallet:        Arc<W>,
  retry:         RetryPolicy,
  proof_request: ProofRequest,
  source_id:     String,
  filters:       Vec<Filter>,
}

impl<W: WalletClient> ProofManager<W> {
  pub fn new(wallet: Arc<W>, proof_request: ProofRequest, source_id: impl Into<String>) -> Self {
    Self {
      wallet,
      retry: RetryPolicy::default(),
      proof_request,
      source_id: source_id.into(),
      filters: Vec::new(),
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn add_filter(&mut self, claim_name: impl Into<String>, claim_value: impl Into<String>) {
    self.filters.push(Filter {
      claim_name:  claim_name.into(),
      claim_value: claim_value.into(),
    });
  }

  pub async fn construct_proof(&self) -> Result<ConstructedProof> {
    tracing::info!(
      source_id = %self.source_id,
      request = %self.proof_request.name,
      attributes = self.proof_request.requested_attributes.len(),
      "constructing proof"
    );

    let candidates = self
      .retry
      .run("credentials for proof request", || {
        self
          .retry
          .deadline(self.wallet.get_credentials_for_proof_request(&self.source_id, &self.proof_request))
      })
      .await?;

    let requested_credentials = select_credentials(&candidates.credentials, &self.filters)?;

    let proof = self
      .retry
      .run("create proof", || {
        self.retry.deadline(self.wallet.create_proof(
          &self.source_id,
          &self.proof_request,
          &candidates,
          &requested_credentials,
        ))
      })
      .await?;

    tracing::info!(
      source_id = %self.source_id,
      revealed = requested_credentials.requested_attributes.len(),
      "proof constructed"
    );

    Ok(ConstructedProof { requested_credentials, proof })
  }
}

#[cfg(test)]
mod tests {
  use std::{future::Future, sync::Mutex};

  use serde_json::json;

  use super::*;
  use crate::wallet::WalletError;

  /// One credential per holder; records which holder each call was made for.
  struct PerHolderWallet {
    seen: Mutex<Vec<String>>,
  }

  impl WalletClient for PerHolderWallet {
    fn store_credential<'a>(
      &'a self,
      holder: &'a str,
      _: &'a Value,
      _: &'a Value,
    ) -> impl Future<Output = std::result::Result<String, WalletError>> + Send + 'a {
      async move { Ok(format!("{}-cred", holder.to_lowercase())) }
    }

    fn get_credentials_for_proof_request<'a>(
      &'a self,
      holder: &'a str,
      request: &'a ProofRequest,
    ) -> impl Future<Output = std::result::Result<ProofCandidates, WalletError>> + Send + 'a {
      async move {
        self.seen.lock().unwrap().push(holder.to_owned());
        let referent = format!("{}-cred", holder.to_lowercase());
        let attrs: serde_json::Map<String, Value> = request
          .requested_attributes
          .keys()
          .map(|k| (k.clone(), json!([{ "cred_info": { "referent": referent } }])))
          .collect();
        serde_json::from_value(json!({ "referents": [], "credentials": { "attrs": attrs } }))
          .map_err(|e| WalletError::InvalidResponse(e.to_string()))
      }
    }

    fn create_proof<'a>(
      &'a self,
      holder: &'a str,
      _: &'a ProofRequest,
      _: &'a ProofCandidates,
      _: &'a RequestedCredentials,
    ) -> impl Future<Output = std::result::Result<Value, WalletError>> + Send + 'a {
      async move { Ok(json!({ "holder": holder })) }
    }
  }

  fn candidates(value: Value) -> CredentialsForProof { serde_json::from_value(value).unwrap() }

  #[test]
  fn selects_the_single_candidate_for_an_attribute() {
    let c = candidates(json!({
      "attrs": {
        "email_attr": [
          { "cred_info": { "referent": "cred-1", "attrs": { "email": "a@b.com" } }, "interval": null }
        ]
      },
      "predicates": {}
    }));

    let selection = select_credentials(&c, &[]).unwrap();
    assert_eq!(
      serde_json::to_value(&selection.requested_attributes["email_attr"]).unwrap(),
      json!({ "revealed": true, "cred_id": "cred-1" })
    );
    assert!(selection.self_attested_attributes.is_empty());
    assert!(selection.requested_predicates.is_empty());
  }

  #[test]
  fn first_offered_candidate_wins() {
    let c = candidates(json!({
      "attrs": {
        "name_attr": [
          { "cred_info": { "referent": "newer" } },
          { "cred_info": { "referent": "older" } }
        ]
      }
    }));
    let selection = select_credentials(&c, &[]).unwrap();
    assert_eq!(selection.requested_attributes["name_attr"].cred_id, "newer");
  }

  #[test]
  fn attribute_without_candidates_fails() {
    let c = candidates(json!({ "attrs": { "email_attr": [] } }));
    let err = select_credentials(&c, &[]).unwrap_err();
    assert!(matches!(err, Error::NoCandidateCredential { attribute } if attribute == "email_attr"));
  }

  #[test]
  fn filters_become_self_attested_attributes() {
    let filters = [Filter { claim_name: "purpose".into(), claim_value: "audit".into() }];
    let selection = select_credentials(&CredentialsForProof::default(), &filters).unwrap();
    assert_eq!(selection.self_attested_attributes["purpose"], "audit");
    assert!(selection.requested_attributes.is_empty());
  }

  #[test]
  fn proof_request_serialises_in_ledger_shape() {
    let mut request = ProofRequest::new("verify-email", "1.0");
    request.add_requested_attribute(
      "email_attr",
      "email",
      vec![json!({ "schema_id": "did:sov:ABC:2:Test:1.0" })],
    );

    let value = request.to_json().unwrap();
    assert_eq!(value["name"], "verify-email");
    assert_eq!(value["requested_attributes"]["email_attr"]["name"], "email");
    assert!(value["nonce"].as_str().unwrap().chars().all(|c| c.is_ascii_digit()));
    assert_eq!(value["requested_predicates"], json!({}));
  }

  #[tokio::test]
  async fn proofs_only_see_the_subjects_own_wallet() {
    let wallet = Arc::new(PerHolderWallet { seen: Mutex::new(Vec::new()) });
    let mut request = ProofRequest::new("verify-email", "1.0");
    request.add_requested_attribute("email_attr", "email", vec![]);

    let acme = ProofManager::new(wallet.clone(), request.clone(), "Acme")
      .with_retry(RetryPolicy::none())
      .construct_proof()
      .await
      .unwrap();
    let globex = ProofManager::new(wallet.clone(), request, "Globex")
      .with_retry(RetryPolicy::none())
      .construct_proof()
      .await
      .unwrap();

    assert_eq!(*wallet.seen.lock().unwrap(), vec!["Acme".to_owned(), "Globex".to_owned()]);
    assert_eq!(acme.requested_credentials.requested_attributes["email_attr"].cred_id, "acme-cred");
    assert_eq!(globex.requested_credentials.requested_attributes["email_attr"].cred_id, "globex-cred");
    assert_eq!(acme.proof, json!({ "holder": "Acme" }));
  }
}
