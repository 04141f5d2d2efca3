//! Bounded retry with exponential backoff for calls that leave the process.
//!
//! Only [`Error::is_retryable`] failures are retried. Configuration and data
//! errors are returned immediately.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{wallet::WalletError, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Retries after the initial attempt.
  pub max_retries:   u32,
  /// First backoff delay; doubles on each retry.
  pub base_delay_ms: u64,
  /// Per-attempt deadline for wallet calls.
  pub timeout_ms:    u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_retries: 3, base_delay_ms: 200, timeout_ms: 10_000 }
  }
}

impl RetryPolicy {
  /// No retries, no waiting; useful in tests.
  pub fn none() -> Self { Self { max_retries: 0, base_delay_ms: 0, timeout_ms: 10_000 } }

  pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }

  fn delay(&self, attempt: u32) -> Duration {
    Duration::from_millis(self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt)))
  }

  /// Run `f` until it succeeds, fails permanently, or retries run out.
  pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let mut attempt = 0;
    loop {
      match f().await {
        Err(e) if e.is_retryable() && attempt < self.max_retries => {
          let delay = self.delay(attempt);
          attempt += 1;
          tracing::warn!(
            attempt,
            max_retries = self.max_retries,
            "{operation} failed, retrying in {delay:?}: {e}"
          );
          tokio::time::sleep(delay).await;
        }
        other => return other,
      }
    }
  }

  /// Bound one wallet call by the per-attempt timeout.
  pub async fn deadline<T, Fut>(&self, fut: Fut) -> Result<T>
  where
    Fut: Future<Output = Result<T, WalletError>>,
  {
    match tokio::time::timeout(self.timeout(), fut).await {
      Ok(result) => Ok(result?),
      Err(_) => Err(Error::Wallet(WalletError::Timeout(self.timeout()))),
    }
  }
}
