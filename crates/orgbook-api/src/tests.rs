//! Router tests against an in-memory SQLite store and a stub wallet.

use std::{future::Future, sync::Arc};

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use orgbook_core::{
  ingest::CredentialManager,
  proof::{ProofCandidates, ProofRequest, RequestedCredentials},
  retry::RetryPolicy,
  wallet::{WalletClient, WalletError},
};
use orgbook_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{admin_router, api_router};

struct StubWallet;

impl WalletClient for StubWallet {
  fn store_credential<'a>(
    &'a self,
    _holder: &'a str,
    _credential: &'a Value,
    _credential_definition_metadata: &'a Value,
  ) -> impl Future<Output = Result<String, WalletError>> + Send + 'a {
    async { Ok("wallet-ref".to_owned()) }
  }

  fn get_credentials_for_proof_request<'a>(
    &'a self,
    _holder: &'a str,
    request: &'a ProofRequest,
  ) -> impl Future<Output = Result<ProofCandidates, WalletError>> + Send + 'a {
    async move {
      let attrs: serde_json::Map<String, Value> = request
        .requested_attributes
        .keys()
        .map(|k| (k.clone(), json!([{ "cred_info": { "referent": "wallet-ref" } }])))
        .collect();
      serde_json::from_value(json!({ "referents": [], "credentials": { "attrs": attrs } }))
        .map_err(|e| WalletError::InvalidResponse(e.to_string()))
    }
  }

  fn create_proof<'a>(
    &'a self,
    _holder: &'a str,
    _request: &'a ProofRequest,
    _candidates: &'a ProofCandidates,
    _selection: &'a RequestedCredentials,
  ) -> impl Future<Output = Result<Value, WalletError>> + Send + 'a {
    async { Ok(json!({ "proof": {} })) }
  }
}

async fn app() -> Router {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let manager = CredentialManager::new(Arc::new(store), Arc::new(StubWallet)).with_retry(RetryPolicy::none());
  Router::new()
    .nest("/api", api_router(manager.clone()))
    .nest("/api/admin", admin_router(manager))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let builder = Request::builder()
    .method(method)
    .uri(uri)
    .header(header::CONTENT_TYPE, "application/json");
  let req = match body {
    Some(b) => builder.body(Body::from(b.to_string())).unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, json)
}

fn registration() -> Value {
  json!({
    "issuer": { "did": "did:sov:ABC", "name": "Test Issuer" },
    "credential_types": [{
      "schema": "Test",
      "version": "1.0",
      "source_claim": "legal_name",
      "processor_config": [{
        "model": "contact",
        "fields": { "email": { "input": "email", "from": "claim" } },
        "cardinality_fields": ["email"]
      }]
    }]
  })
}

fn credential(schema_id: &str) -> Value {
  json!({
    "credential": {
      "schema_id": schema_id,
      "values": {
        "email":      { "raw": "a@b.com", "encoded": "1" },
        "legal_name": { "raw": "Acme", "encoded": "2" }
      }
    }
  })
}

async fn seeded() -> (Router, Value) {
  let app = app().await;
  let (status, _) = call(&app, "POST", "/api/admin/issuers", Some(registration())).await;
  assert_eq!(status, StatusCode::CREATED);
  let (status, receipt) =
    call(&app, "POST", "/api/credentials", Some(credential("did:sov:ABC:2:Test:1.0"))).await;
  assert_eq!(status, StatusCode::CREATED, "{receipt}");
  (app, receipt)
}

// ─── Ingest and reads ────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_returns_receipt() {
  let (_, receipt) = seeded().await;
  assert_eq!(receipt["subject"]["source_id"], "Acme");
  assert_eq!(receipt["subject_created"], true);
  assert_eq!(receipt["records"][0]["action"], "created");
  assert_eq!(receipt["records"][0]["kind"], "contact");
}

#[tokio::test]
async fn subject_and_records_are_readable_by_source_id() {
  let (app, _) = seeded().await;

  let (status, subject) = call(&app, "GET", "/api/subjects/Acme", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(subject["credentials"].as_array().unwrap().len(), 1);

  let (status, records) = call(&app, "GET", "/api/subjects/Acme/records?kind=contact", None).await;
  assert_eq!(status, StatusCode::OK);
  let records = records.as_array().unwrap();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0]["record"]["data"]["email"], "a@b.com");
  assert_eq!(records[0]["end_date"], Value::Null);

  let (_, none) = call(&app, "GET", "/api/subjects/Acme/records?kind=address", None).await;
  assert!(none.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn credential_is_returned_with_claims() {
  let (app, receipt) = seeded().await;
  let id = receipt["credential"]["credential_id"].as_str().unwrap();

  let (status, body) = call(&app, "GET", &format!("/api/credentials/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["wallet_id"], "wallet-ref");
  assert_eq!(body["claims"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_subject_is_404() {
  let app = app().await;
  let (status, body) = call(&app, "GET", "/api/subjects/Nobody", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].as_str().unwrap().contains("Nobody"));
}

// ─── Error mapping ───────────────────────────────────────────────────────────

#[tokio::test]
async fn unregistered_issuer_is_422() {
  let app = app().await;
  let (status, body) =
    call(&app, "POST", "/api/credentials", Some(credential("did:sov:XYZ:2:Test:1.0"))).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["class"], "configuration");
}

#[tokio::test]
async fn malformed_schema_id_is_400() {
  let app = app().await;
  let (status, body) = call(&app, "POST", "/api/credentials", Some(credential("not-a-schema"))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["class"], "data");
}

#[tokio::test]
async fn invalid_registration_is_422() {
  let app = app().await;
  let mut body = registration();
  body["credential_types"][0]["processor_config"][0]["model"] = json!("vehicle");
  let (status, _) = call(&app, "POST", "/api/admin/issuers", Some(body)).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ─── Proofs ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn proof_selects_credentials() {
  let (app, _) = seeded().await;
  let mut request = ProofRequest::new("email-check", "1.0");
  request.add_requested_attribute("email_attr", "email", vec![]);

  let (status, body) = call(
    &app,
    "POST",
    "/api/proofs",
    Some(json!({ "source_id": "Acme", "proof_request": request, "filters": { "purpose": "audit" } })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(
    body["requested_credentials"]["requested_attributes"]["email_attr"],
    json!({ "cred_id": "wallet-ref", "revealed": true })
  );
  assert_eq!(body["requested_credentials"]["self_attested_attributes"]["purpose"], "audit");
}

#[tokio::test]
async fn empty_proof_request_is_400() {
  let app = app().await;
  let request = ProofRequest::new("nothing", "1.0");
  let (status, _) = call(
    &app,
    "POST",
    "/api/proofs",
    Some(json!({ "source_id": "Acme", "proof_request": request })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}
