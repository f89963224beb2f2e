use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::validation::FieldErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("The given data was invalid.")]
    Validation(FieldErrors),

    /// Shared by unknown email and wrong password.
    #[error("Invalid username or password.")]
    InvalidCredentials,

    #[error("Unauthenticated.")]
    Unauthenticated,

    #[error("Invalid provider.")]
    InvalidProvider { valid_providers: Vec<&'static str> },

    #[error("Unable to authenticate with {0}.")]
    ProviderAuth(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidProvider { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::InvalidCredentials | AppError::Unauthenticated | AppError::ProviderAuth(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Undecodable bodies are reported like any other invalid input. Type errors
/// name the offending field when the decoder reports a path.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let detail = rejection.body_text();
        let mut errors = FieldErrors::default();
        match &rejection {
            JsonRejection::JsonDataError(_) => match rejected_field(&detail) {
                Some(field) => errors.add(field, format!("The {field} field has an invalid value.")),
                None => errors.add("body", detail.clone()),
            },
            JsonRejection::MissingJsonContentType(_) => {
                errors.add("body", "The request body must be JSON.")
            }
            _ => errors.add("body", detail),
        }
        AppError::Validation(errors)
    }
}

/// Field path from a message like `...target type: name: invalid type: ...`.
fn rejected_field(detail: &str) -> Option<&str> {
    let (_, rest) = detail.split_once("target type: ")?;
    let (path, _) = rest.split_once(": ")?;
    let valid = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    valid.then_some(path)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation(errors) => json!({
                "message": self.to_string(),
                "errors": errors,
            }),
            AppError::InvalidProvider { valid_providers } => json!({
                "error": self.to_string(),
                "valid_providers": valid_providers,
            }),
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                json!({ "error": "Internal server error." })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
