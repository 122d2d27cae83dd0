//! Error handler for credentials and launches.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Every failure the credential and launch cores can produce.
#[derive(Debug, Error)]
pub enum Error {
    #[error("token is not a compact JWT: {0}")]
    MalformedToken(String),

    #[error("token signature does not match")]
    SignatureInvalid,

    #[error("token claims are not acceptable: {0}")]
    InvalidToken(&'static str),

    #[error("refresh token is not the active one")]
    RevokedToken,

    #[error("token expired at {expired_at}")]
    ExpiredToken { expired_at: u64 },

    #[error("no user named {0}")]
    UserNotFound(String),

    #[error("signature method {0:?} is not supported")]
    UnsupportedSignatureMethod(String),

    #[error("launch URL is not absolute: {0}")]
    InvalidLaunchUrl(#[from] url::ParseError),

    #[error("launch URL query repeats parameter {0:?}")]
    ConflictingParameter(String),

    #[error("private key cannot be loaded")]
    Key(#[from] crate::crypto::KeyError),

    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("invalid configuration, {details}")]
    Config { details: String },

    #[error("credential cache failed")]
    Cache(#[source] BoxError),

    #[error("identity lookup failed")]
    Identity(#[source] BoxError),
}

impl Error {
    /// Wrap a credential cache failure.
    pub fn cache<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Cache(Box::new(err))
    }

    /// Wrap an identity lookup failure.
    pub fn identity<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Identity(Box::new(err))
    }

    /// Whether the caller presented a bad credential, as opposed to an
    /// infrastructure or configuration fault.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::MalformedToken(_)
                | Error::SignatureInvalid
                | Error::InvalidToken(_)
                | Error::RevokedToken
                | Error::ExpiredToken { .. }
                | Error::UserNotFound(_)
        )
    }

    /// Short label used for logs and metrics.
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            Error::MalformedToken(_) => "malformed",
            Error::SignatureInvalid => "signature",
            Error::InvalidToken(_) => "claims",
            Error::RevokedToken => "revoked",
            Error::ExpiredToken { .. } => "expired",
            Error::UserNotFound(_) => "user_not_found",
            _ => "internal",
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let unauthorized = ResponseError::default()
            .status(StatusCode::UNAUTHORIZED)
            .title("Invalid token.");

        let response = match &self {
            // Which check failed stays in the logs.
            Error::ExpiredToken { .. } => unauthorized.title("Expired token."),
            err if err.is_auth_failure() => {
                tracing::debug!(reason = err.reason(), %err, "rejected credential");
                unauthorized
            },

            Error::Validation(errors) => ResponseError::default()
                .title("There were validation errors with your request.")
                .details(&self.to_string())
                .status(StatusCode::BAD_REQUEST)
                .errors(errors),

            err => {
                tracing::error!(error = ?err, "server returned 500 status");
                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
