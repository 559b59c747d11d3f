//! HTTP API request and response types.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::fifo::{FifoConfig, FifoError, FifoManager, TicketOverrides};

/// Shared application state.
pub type AppState = Arc<FifoManager>;

/// Query parameters for `/fifo/new`. Durations use the `1h45m` token
/// syntax; `0` disables the respective timeout.
#[derive(Deserialize, Default)]
pub struct NewFifoParams {
    pub wait_timeout: Option<String>,
    pub accept_timeout: Option<String>,
    pub done_timeout: Option<String>,
    pub unused_destroy_timeout: Option<String>,
    pub allow_overrides: Option<bool>,
}

impl NewFifoParams {
    pub fn into_config(self) -> Result<FifoConfig, ApiError> {
        let mut config = FifoConfig::default();
        if let Some(s) = self.wait_timeout {
            config.wait_timeout = parse_duration(&s)?;
        }
        if let Some(s) = self.accept_timeout {
            config.accept_timeout = parse_duration(&s)?;
        }
        if let Some(s) = self.done_timeout {
            config.done_timeout = parse_duration(&s)?;
        }
        if let Some(s) = self.unused_destroy_timeout {
            config.unused_destroy_timeout = parse_duration(&s)?;
        }
        if let Some(allow) = self.allow_overrides {
            config.allow_overrides = allow;
        }
        Ok(config)
    }
}

/// Query parameters for `/fifo/{uuid}/ticket`.
#[derive(Deserialize, Default)]
pub struct TicketParams {
    pub wait_timeout: Option<String>,
    pub accept_timeout: Option<String>,
    pub done_timeout: Option<String>,
}

impl TicketParams {
    pub fn into_overrides(self) -> Result<TicketOverrides, ApiError> {
        Ok(TicketOverrides {
            wait_timeout: self.wait_timeout.as_deref().map(parse_duration).transpose()?,
            accept_timeout: self
                .accept_timeout
                .as_deref()
                .map(parse_duration)
                .transpose()?,
            done_timeout: self.done_timeout.as_deref().map(parse_duration).transpose()?,
        })
    }
}

#[derive(Serialize)]
pub struct FifoCreatedResponse {
    pub uuid: Uuid,
}

#[derive(Serialize)]
pub struct TicketCreatedResponse {
    pub ticket: Uuid,
}

/// Handler-level errors, mapped to status codes per the API contract.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Fifo(#[from] FifoError),
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Fifo(FifoError::Store(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) | Self::Fifo(FifoError::FifoMismatch) => StatusCode::BAD_REQUEST,
            Self::Fifo(FifoError::FifoNotFound(_)) | Self::Fifo(FifoError::TicketNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Fifo(FifoError::WaitTimeout) => StatusCode::REQUEST_TIMEOUT,
            Self::Fifo(FifoError::TicketGone) => StatusCode::GONE,
            Self::Fifo(FifoError::Store(e)) => {
                error!(error = %e, "store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn parse_uuid(s: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(s).map_err(|_| ApiError::BadRequest(format!("invalid uuid: {s}")))
}

pub fn parse_duration(s: &str) -> Result<std::time::Duration, ApiError> {
    crate::duration::parse(s).map_err(|_| ApiError::BadRequest(format!("invalid duration: {s}")))
}
