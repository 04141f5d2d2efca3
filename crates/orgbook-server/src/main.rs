//! orgbook-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `ORGBOOK__*` environment variables, opens the SQLite store, connects to
//! the wallet agent, and serves the registry API over HTTP.
//!
//! # Password hash generation
//!
//! ```
//! cargo run -p orgbook-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use orgbook_core::ingest::CredentialManager;
use orgbook_server::{AppState, ServerConfig, auth::AuthConfig, wallet::HttpWalletClient};
use orgbook_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "OrgBook credential registry server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let hash = orgbook_server::auth::hash_password(&password)?;
    println!("{hash}");
    return Ok(());
  }

  let server_cfg = load_config(cli.config)?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let wallet = HttpWalletClient::start(&server_cfg.wallet)
    .await
    .with_context(|| format!("failed to reach wallet agent at {}", server_cfg.wallet.base_url))?;

  let manager = CredentialManager::new(Arc::new(store), Arc::new(wallet.clone()))
    .with_retry(server_cfg.retry);

  if let Some(path) = &server_cfg.issuers_path {
    let count = orgbook_server::preload_issuers(&manager, &expand_tilde(path)).await?;
    tracing::info!(count, "preloaded issuer registrations");
  }

  let state = AppState {
    manager,
    auth: Arc::new(AuthConfig {
      username:      server_cfg.admin_username.clone(),
      password_hash: server_cfg.admin_password_hash.clone(),
    }),
  };

  let app = orgbook_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      tokio::signal::ctrl_c().await.ok();
      tracing::info!("shutdown requested");
    })
    .await
    .context("server error")?;

  wallet.stop();
  Ok(())
}

/// Layer `ORGBOOK__*` environment variables over the optional TOML file.
fn load_config(path: PathBuf) -> anyhow::Result<ServerConfig> {
  let env = config::Environment::with_prefix("ORGBOOK")
    .prefix_separator("__")
    .separator("__");

  config::Config::builder()
    .add_source(config::File::from(path.clone()).required(false))
    .add_source(env)
    .build()
    .with_context(|| format!("failed to read configuration from {path:?}"))?
    .try_deserialize()
    .context("configuration is incomplete or malformed")
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
