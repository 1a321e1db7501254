// src/error.rs

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;

use crate::api::grok_client::CompletionError;
use crate::api::paypal_client::PayPalError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Server configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    QuotaExceeded(String),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("payment provider error: {0}")]
    Provider(#[from] PayPalError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl actix_web::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Configuration(_)
            | Self::Completion(_)
            | Self::Provider(_)
            | Self::Database(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
