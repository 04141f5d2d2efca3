//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use orgbook_core::{Error as CoreError, ErrorClass};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Core(e) => match (e.root(), e.class()) {
        (CoreError::Store { retryable: false, .. }, _) => StatusCode::INTERNAL_SERVER_ERROR,
        (_, ErrorClass::Transient) => StatusCode::SERVICE_UNAVAILABLE,
        (_, ErrorClass::Configuration) => StatusCode::UNPROCESSABLE_ENTITY,
        (_, ErrorClass::Data) => StatusCode::BAD_REQUEST,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = match &self {
      ApiError::Core(e) => {
        if status.is_server_error() {
          tracing::error!(error = %e, "request failed");
        }
        let class = match e.class() {
          ErrorClass::Configuration => "configuration",
          ErrorClass::Data => "data",
          ErrorClass::Transient => "transient",
        };
        json!({ "error": e.to_string(), "class": class })
      }
      other => json!({ "error": other.to_string() }),
    };
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn core_error_classes_map_to_statuses() {
    let config = ApiError::from(CoreError::UnknownIssuer { did: "did:sov:X".into() });
    assert_eq!(config.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let data = ApiError::from(CoreError::MalformedCredential("no values".into()));
    assert_eq!(data.status(), StatusCode::BAD_REQUEST);

    let transient = ApiError::from(CoreError::Wallet(
      orgbook_core::wallet::WalletError::Unavailable("down".into()),
    ));
    assert_eq!(transient.status(), StatusCode::SERVICE_UNAVAILABLE);

    let store = ApiError::from(CoreError::Store {
      retryable: false,
      source:    "disk full".into(),
    });
    assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
  }
}
