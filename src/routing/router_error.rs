use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::Error as JsonError;

use super::function_identity::FunctionIdentity;

#[derive(thiserror::Error, Debug)]
pub enum RouterError {
    #[error("no trigger matches {method} {host}{path}")]
    NoRoute {
        method: String,
        host: String,
        path: String,
    },

    #[error("unable to resolve backend for function {0}: {1}")]
    Resolution(FunctionIdentity, String),

    #[error("function {function} unreachable after {attempts} attempts: {reason}")]
    RetriesExhausted {
        function: FunctionIdentity,
        attempts: u32,
        timed_out: bool,
        reason: String,
    },

    #[error("trigger {0} has no function to route to")]
    NoFunction(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("triggers {0} and {1} match the same requests")]
    ConflictingTriggers(String, String),

    #[error("invalid trigger {0}: {1}")]
    InvalidTrigger(String, String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] JsonError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResponseError for RouterError {
    fn status_code(&self) -> StatusCode {
        match self {
            RouterError::NoRoute { .. } => StatusCode::NOT_FOUND,
            RouterError::Resolution(..) | RouterError::NoFunction(_) => StatusCode::BAD_GATEWAY,
            RouterError::RetriesExhausted { timed_out: true, .. } => StatusCode::GATEWAY_TIMEOUT,
            RouterError::RetriesExhausted { .. } => StatusCode::BAD_GATEWAY,
            RouterError::BadRequest(_)
            | RouterError::ConflictingTriggers(..)
            | RouterError::InvalidTrigger(..)
            | RouterError::Json(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Generic bodies only: addresses and executor output stay in the logs.
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            RouterError::NoRoute { .. } => "not found".to_string(),
            RouterError::Resolution(..)
            | RouterError::NoFunction(_)
            | RouterError::RetriesExhausted { .. } => {
                "error: function unavailable".to_string()
            }
            RouterError::BadRequest(_)
            | RouterError::ConflictingTriggers(..)
            | RouterError::InvalidTrigger(..)
            | RouterError::Json(_) => self.to_string(),
            _ => "internal server error".to_string(),
        };
        HttpResponse::build(status)
            .content_type("text/plain; charset=utf-8")
            .body(body)
    }
}
