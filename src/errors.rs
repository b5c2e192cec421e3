use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Malformed phone number input. Fails fast, before any provider call.
    InvalidNumber(String),
    /// Zero usable provider signals were collected; no record is produced.
    InsufficientData(String),
    /// A provider's rolling quota is exhausted.
    QuotaExceeded {
        /// Source id of the exhausted provider.
        source: String,
    },
    /// Internal scoring invariant violation (e.g. non-positive weight).
    Aggregation(String),
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidNumber(msg) => write!(f, "Invalid phone number: {}", msg),
            AppError::InsufficientData(msg) => write!(f, "Insufficient data: {}", msg),
            AppError::QuotaExceeded { source } => {
                write!(f, "Quota exceeded for provider '{}'", source)
            }
            AppError::Aggregation(msg) => write!(f, "Aggregation error: {}", msg),
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::DatabaseError(e) => Some(e),
            AppError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::InvalidNumber(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InsufficientData(msg) => {
                tracing::error!("Analysis failed, no usable evidence: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "No provider data could be collected for this number".to_string(),
                )
            }
            AppError::QuotaExceeded { source } => {
                tracing::warn!("Provider quota exhausted: {}", source);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Provider quota exhausted, retry later".to_string(),
                )
            }
            AppError::Aggregation(msg) => {
                tracing::error!("Aggregation invariant violated: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal scoring error".to_string(),
                )
            }
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

// Make AppError cloneable for the WithContext variant.
impl Clone for AppError {
    /// Note: `sqlx::Error` is not cloneable, so `DatabaseError` is simplified
    /// to `RowNotFound` during cloning.
    fn clone(&self) -> Self {
        match self {
            AppError::InvalidNumber(msg) => AppError::InvalidNumber(msg.clone()),
            AppError::InsufficientData(msg) => AppError::InsufficientData(msg.clone()),
            AppError::QuotaExceeded { source } => AppError::QuotaExceeded {
                source: source.clone(),
            },
            AppError::Aggregation(msg) => AppError::Aggregation(msg.clone()),
            AppError::DatabaseError(_e) => AppError::DatabaseError(sqlx::Error::RowNotFound),
            AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
            AppError::BadRequest(msg) => AppError::BadRequest(msg.clone()),
            AppError::InternalError(msg) => AppError::InternalError(msg.clone()),
            AppError::WithContext { source, context } => AppError::WithContext {
                source: source.clone(),
                context: context.clone(),
            },
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

/// Classification of a single-source collection failure.
///
/// Stored on the `CollectedEvidence` failure records; a per-source failure
/// degrades evidence but never aborts the analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The source did not answer within its timeout.
    Timeout,
    /// The source rejected our credentials.
    Auth,
    /// The source's rolling quota is exhausted.
    QuotaExceeded,
    /// The source answered with a non-success HTTP status.
    Http,
    /// The source answered with a payload we could not normalize.
    Malformed,
    /// The source's circuit breaker is open after repeated failures.
    CircuitOpen,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Auth => "auth",
            FailureKind::QuotaExceeded => "quota_exceeded",
            FailureKind::Http => "http",
            FailureKind::Malformed => "malformed",
            FailureKind::CircuitOpen => "circuit_open",
        };
        write!(f, "{}", s)
    }
}

/// A failure while fetching or normalizing one provider's response.
///
/// Never surfaces to the caller; the Evidence Collector absorbs these into
/// the run's failure records.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub source: String,
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(source: &str, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(source: &str) -> Self {
        Self::new(source, FailureKind::Timeout, "request timed out")
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider '{}' failed ({}): {}", self.source, self.kind, self.message)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::InternalError(format!("HTTP client error: {}", err))
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    #[allow(dead_code)]
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: f(),
        })
    }
}
