// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Metrics gather failed: {0}")]
    Gather(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport write failed: {0}")]
    TransportWrite(String),

    #[error("Maximum connections reached")]
    CapacityExceeded,

    #[error("Hub control loop is not running")]
    HubUnavailable,

    #[error("Metrics encoding error: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::CapacityExceeded | AppError::HubUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            },
            AppError::Gather(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Gather(_) => "GATHER_001",
            AppError::Serialization(_) => "JSON_001",
            AppError::TransportWrite(_) => "TRANSPORT_001",
            AppError::CapacityExceeded => "HUB_001",
            AppError::HubUnavailable => "HUB_002",
            AppError::Encode(_) => "ENCODE_001",
            AppError::Config(_) => "CONFIG_001",
            AppError::InvalidConfig(_) => "CONFIG_002",
            AppError::Unauthorized => "AUTH_001",
            AppError::Io(_) => "IO_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Unauthorized => "Authentication required".to_string(),
            AppError::CapacityExceeded => {
                "Maximum connections reached, try again later".to_string()
            },
            AppError::HubUnavailable => "Service is shutting down".to_string(),
            AppError::Gather(_) => "Metrics source unavailable".to_string(),
            _ => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        let mut response = (status, axum::Json(body)).into_response();
        if matches!(self, AppError::Unauthorized) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Basic realm=\"Restricted\""),
            );
        }
        response
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(Box::new(err))
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::HubUnavailable
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for AppError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        AppError::HubUnavailable
    }
}
