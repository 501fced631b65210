use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bank::{ValidationError, password::HashError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("{0}")]
    Invalid(#[from] ValidationError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Oops! You must be logged in to do that!")]
    Unauthorized,

    #[error("You must own a store in order to edit it!")]
    NotOwner,

    #[error("Failed Login")]
    InvalidCredentials,

    #[error("That email is already registered")]
    EmailTaken,

    #[error("Password reset token is invalid or has expired!")]
    InvalidResetToken,

    #[error("Database error: {0}")]
    Database(#[from] redis::RedisError),

    #[error("Search error: {0}")]
    Search(#[from] meilisearch_sdk::errors::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("{0}")]
    Credentials(#[from] HashError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            AppError::Invalid { .. } | AppError::EmailTaken => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::NotOwner => StatusCode::FORBIDDEN,
            AppError::InvalidResetToken => StatusCode::GONE,
            AppError::Database { .. }
            | AppError::Search { .. }
            | AppError::Corrupt { .. }
            | AppError::Credentials { .. }
            | AppError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("{self}");
        }

        let errors: Vec<String> = match &self {
            AppError::Invalid(problems) => problems.messages().to_vec(),
            other => vec![other.to_string()],
        };

        (status, Json(json!({ "errors": errors }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::AppError;
    use bank::{ValidationError, password::HashError};

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::MalformedPayload.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("Store").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::NotOwner.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::InvalidResetToken.status(), StatusCode::GONE);
        assert_eq!(
            AppError::from(ValidationError::single("nope")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(AppError::NotFound("Store").to_string(), "Store not found");
        assert_eq!(
            AppError::from(ValidationError(vec!["a".into(), "b".into()])).to_string(),
            "a, b"
        );
    }
}
