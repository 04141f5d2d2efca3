//! OrgBook HTTP server: configuration, admin authentication, the HTTP wallet
//! client, and the assembled router.

pub mod auth;
pub mod error;
pub mod wallet;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::{Router, middleware, routing::get};
use orgbook_core::{
  ingest::CredentialManager,
  issuer::IssuerRegistration,
  retry::RetryPolicy,
  store::CredentialStore,
  wallet::WalletClient,
};
use serde::Deserialize;

use auth::{AuthConfig, require_admin};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `ORGBOOK__*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  pub store_path:          PathBuf,
  /// JSON array of issuer registrations applied at startup.
  #[serde(default)]
  pub issuers_path:        Option<PathBuf>,
  pub admin_username:      String,
  pub admin_password_hash: String,
  pub wallet:              WalletConfig,
  #[serde(default)]
  pub retry:               RetryPolicy,
}

fn default_host() -> String { "127.0.0.1".into() }

fn default_port() -> u16 { 8080 }

/// Holder agent connection. Each subject has its own holder wallet on the
/// agent, addressed by the subject's source id.
#[derive(Deserialize, Clone, Debug)]
pub struct WalletConfig {
  pub base_url:     String,
  #[serde(default = "default_wallet_timeout")]
  pub timeout_secs: u64,
}

fn default_wallet_timeout() -> u64 { 30 }

// ─── Application state ───────────────────────────────────────────────────────

pub struct AppState<S, W> {
  pub manager: CredentialManager<S, W>,
  pub auth:    Arc<AuthConfig>,
}

impl<S, W> Clone for AppState<S, W> {
  fn clone(&self) -> Self {
    Self { manager: self.manager.clone(), auth: self.auth.clone() }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// `/api/*` is public, `/api/admin/*` requires Basic auth.
pub fn router<S, W>(state: AppState<S, W>) -> Router
where
  S: CredentialStore + 'static,
  W: WalletClient + 'static,
{
  let admin = orgbook_api::admin_router(state.manager.clone())
    .layer(middleware::from_fn_with_state(state.auth, require_admin));

  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", orgbook_api::api_router(state.manager))
    .nest("/api/admin", admin)
}

/// Apply the issuer registrations in `path`, in file order.
pub async fn preload_issuers<S, W>(manager: &CredentialManager<S, W>, path: &std::path::Path) -> anyhow::Result<usize>
where
  S: CredentialStore,
  W: WalletClient,
{
  let text = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read issuers file {path:?}"))?;
  let registrations: Vec<IssuerRegistration> = serde_json::from_str(&text)
    .with_context(|| format!("failed to parse issuers file {path:?}"))?;

  let count = registrations.len();
  for registration in registrations {
    let did = registration.issuer.did.clone();
    manager
      .register_issuer(registration)
      .await
      .with_context(|| format!("failed to register issuer {did}"))?;
  }
  Ok(count)
}
