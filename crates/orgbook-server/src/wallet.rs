//! [`HttpWalletClient`]: a [`WalletClient`] that talks JSON over HTTP to a
//! holder agent. Every subject has its own holder wallet on the agent,
//! addressed by the subject's source id.
//!
//! | Call | Endpoint |
//! |------|----------|
//! | probe | `GET  {base}/status` |
//! | store credential | `POST {base}/holders/{source_id}/credentials` |
//! | credentials for proof request | `POST {base}/holders/{source_id}/proof-requests/credentials` |
//! | create proof | `POST {base}/holders/{source_id}/proofs` |

use std::{
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use orgbook_core::{
  proof::{ProofCandidates, ProofRequest, RequestedCredentials},
  wallet::{WalletClient, WalletError},
};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::WalletConfig;

/// Cheap to clone; clones share the connection pool and the stopped flag.
#[derive(Clone)]
pub struct HttpWalletClient {
  client:   Client,
  base_url: Url,
  timeout:  Duration,
  stopped:  Arc<AtomicBool>,
}

#[derive(Deserialize)]
struct StoredCredential {
  referent: String,
}

impl HttpWalletClient {
  /// Build the client and check that the agent answers.
  pub async fn start(config: &WalletConfig) -> Result<Self, WalletError> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| WalletError::Unavailable(format!("invalid base url {:?}: {e}", config.base_url)))?;
    if base_url.cannot_be_a_base() {
      return Err(WalletError::Unavailable(format!("{base_url} cannot be a base url")));
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| WalletError::Unavailable(format!("failed to build HTTP client: {e}")))?;

    let wallet = Self { client, base_url, timeout, stopped: Arc::new(AtomicBool::new(false)) };

    let resp = wallet
      .client
      .get(wallet.endpoint(&["status"])?)
      .send()
      .await
      .map_err(|e| wallet.send_error(e))?;
    if !resp.status().is_success() {
      return Err(WalletError::Unavailable(format!("status probe → {}", resp.status())));
    }

    tracing::info!(base_url = %wallet.base_url, "wallet agent reachable");
    Ok(wallet)
  }

  /// Close the client for every clone. Later calls fail without reaching
  /// the agent; requests already in flight complete on their own.
  pub fn stop(&self) {
    if !self.stopped.swap(true, Ordering::AcqRel) {
      tracing::info!(base_url = %self.base_url, "wallet client stopped");
    }
  }

  pub fn is_stopped(&self) -> bool { self.stopped.load(Ordering::Acquire) }

  fn endpoint(&self, segments: &[&str]) -> Result<Url, WalletError> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|()| WalletError::Unavailable(format!("{} cannot be a base url", self.base_url)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn send_error(&self, err: reqwest::Error) -> WalletError {
    if err.is_timeout() {
      WalletError::Timeout(self.timeout)
    } else {
      WalletError::Unavailable(err.to_string())
    }
  }

  async fn post<T: DeserializeOwned>(&self, holder: &str, path: &[&str], body: Value) -> Result<T, WalletError> {
    if self.is_stopped() {
      return Err(WalletError::Unavailable("wallet client stopped".into()));
    }

    let mut segments = vec!["holders", holder];
    segments.extend_from_slice(path);
    let url = self.endpoint(&segments)?;

    let resp = self
      .client
      .post(url.clone())
      .json(&body)
      .send()
      .await
      .map_err(|e| self.send_error(e))?;

    let status = resp.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
      return Err(WalletError::Unavailable(format!("POST {url} → {status}")));
    }
    if !status.is_success() {
      let detail = resp.text().await.unwrap_or_default();
      return Err(WalletError::Rejected(format!("POST {url} → {status}: {detail}")));
    }

    resp
      .json()
      .await
      .map_err(|e| WalletError::InvalidResponse(format!("POST {url}: {e}")))
  }
}

impl WalletClient for HttpWalletClient {
  fn store_credential<'a>(
    &'a self,
    holder: &'a str,
    credential: &'a Value,
    credential_definition_metadata: &'a Value,
  ) -> impl Future<Output = Result<String, WalletError>> + Send + 'a {
    async move {
      let stored: StoredCredential = self
        .post(
          holder,
          &["credentials"],
          json!({
            "credential": credential,
            "credential_definition_metadata": credential_definition_metadata,
          }),
        )
        .await?;
      Ok(stored.referent)
    }
  }

  fn get_credentials_for_proof_request<'a>(
    &'a self,
    holder: &'a str,
    request: &'a ProofRequest,
  ) -> impl Future<Output = Result<ProofCandidates, WalletError>> + Send + 'a {
    async move {
      self
        .post(holder, &["proof-requests", "credentials"], json!({ "proof_request": request }))
        .await
    }
  }

  fn create_proof<'a>(
    &'a self,
    holder: &'a str,
    request: &'a ProofRequest,
    candidates: &'a ProofCandidates,
    selection: &'a RequestedCredentials,
  ) -> impl Future<Output = Result<Value, WalletError>> + Send + 'a {
    async move {
      self
        .post(
          holder,
          &["proofs"],
          json!({
            "proof_request": request,
            "credentials": candidates.credentials,
            "requested_credentials": selection,
          }),
        )
        .await
    }
  }
}

#[cfg(test)]
mod tests {
  use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    routing::{get, post},
  };
  use tokio::net::TcpListener;

  use super::*;

  async fn agent(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
  }

  fn config(base_url: String) -> WalletConfig { WalletConfig { base_url, timeout_secs: 5 } }

  /// Referents and candidates are derived from the holder in the path.
  fn healthy() -> Router {
    Router::new()
      .route("/status", get(|| async { Json(json!({ "ready": true })) }))
      .route(
        "/holders/{holder}/credentials",
        post(|Path(holder): Path<String>, Json(body): Json<Value>| async move {
          assert!(body["credential"]["schema_id"].is_string());
          Json(json!({ "referent": format!("{holder}/ref-1") }))
        }),
      )
      .route(
        "/holders/{holder}/proof-requests/credentials",
        post(|Path(holder): Path<String>| async move {
          Json(json!({
            "referents": ["email_attr"],
            "credentials": {
              "attrs": { "email_attr": [{ "cred_info": { "referent": format!("{holder}/ref-1") } }] },
              "predicates": {}
            }
          }))
        }),
      )
  }

  #[tokio::test]
  async fn calls_are_addressed_to_the_subjects_holder() {
    let wallet = HttpWalletClient::start(&config(agent(healthy()).await)).await.unwrap();

    let referent = wallet
      .store_credential("Acme Widgets", &json!({ "schema_id": "did:sov:ABC:2:Test:1.0" }), &json!({}))
      .await
      .unwrap();
    assert_eq!(referent, "Acme Widgets/ref-1");

    let request = ProofRequest::new("p", "1.0");
    let acme = wallet.get_credentials_for_proof_request("Acme Widgets", &request).await.unwrap();
    let globex = wallet.get_credentials_for_proof_request("Globex", &request).await.unwrap();
    assert_eq!(acme.credentials.attrs["email_attr"][0].cred_info.referent, "Acme Widgets/ref-1");
    assert_eq!(globex.credentials.attrs["email_attr"][0].cred_info.referent, "Globex/ref-1");
  }

  #[tokio::test]
  async fn stop_closes_every_clone() {
    let wallet = HttpWalletClient::start(&config(agent(healthy()).await)).await.unwrap();
    let shared = wallet.clone();

    wallet.stop();
    assert!(shared.is_stopped());

    let err = shared.store_credential("Acme", &json!({ "schema_id": "x" }), &json!({})).await.unwrap_err();
    assert!(matches!(err, WalletError::Unavailable(ref m) if m.contains("stopped")), "{err}");
  }

  #[tokio::test]
  async fn server_errors_are_transient_and_client_errors_are_not() {
    let router = Router::new()
      .route("/status", get(|| async { "ok" }))
      .route("/holders/{holder}/credentials", post(|| async { StatusCode::SERVICE_UNAVAILABLE }))
      .route("/holders/{holder}/proofs", post(|| async { (StatusCode::BAD_REQUEST, "bad proof") }));
    let wallet = HttpWalletClient::start(&config(agent(router).await)).await.unwrap();

    let err = wallet.store_credential("Acme", &json!({}), &json!({})).await.unwrap_err();
    assert!(err.is_transient(), "{err}");

    let err = wallet
      .create_proof(
        "Acme",
        &ProofRequest::new("p", "1.0"),
        &ProofCandidates::default(),
        &RequestedCredentials::default(),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, WalletError::Rejected(ref m) if m.contains("bad proof")));
  }

  #[tokio::test]
  async fn start_fails_when_agent_is_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = HttpWalletClient::start(&config(format!("http://{addr}")))
      .await
      .err()
      .unwrap();
    assert!(err.is_transient());
  }
}
