//! Closed error taxonomy and RFC 7807 problem-document conversion.
//!
//! Pattern adapted from holo-host/rust/holo-gateway/src/types/error.rs: one
//! enum per failure family, each carrying a generic wire-safe message while
//! the `Display`/`source()` chain keeps the full detail for logs.

use hyper::StatusCode;
use serde::Serialize;

/// Closed error code taxonomy (§7). Every code the core emits is a variant
/// here; nothing ad hoc reaches the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorCode {
    // Enrollment
    InvalidToken,
    InsecureTransport,
    InvalidPlatform,
    InvalidCertificate,
    CertificateTooLarge,
    KeyMismatch,
    CryptoError,
    // Certificate
    Null,
    Expired,
    NotYetValid,
    ChainMissing,
    ChainValidationFailed,
    ChainBuildError,
    MissingCN,
    InvalidCNFormat,
    InvalidNodeId,
    // Command
    NotEnrolled,
    PayloadTooLarge,
    PayloadTooDeep,
    InvalidPayload,
    NullPayload,
    UnknownCommandType,
    ExecutionException,
    InvalidMetric,
    // Node
    NodeNotFound,
    NodeDecommissioned,
    AlreadyInMaintenance,
    NotInMaintenance,
    NameAlreadyExists,
    // Capacity
    ReservationNotFound,
    ReservationExpired,
    InsufficientMemory,
    InsufficientDisk,
    // Console
    BlockedPattern,
    NotSubscribed,
    ServerNotFound,
    TenantMismatch,
    // Cross-cutting
    RateLimited,
    Unauthorized,
    Forbidden,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidToken => "InvalidToken",
            Self::InsecureTransport => "InsecureTransport",
            Self::InvalidPlatform => "InvalidPlatform",
            Self::InvalidCertificate => "InvalidCertificate",
            Self::CertificateTooLarge => "CertificateTooLarge",
            Self::KeyMismatch => "KeyMismatch",
            Self::CryptoError => "CryptoError",
            Self::Null => "Null",
            Self::Expired => "Expired",
            Self::NotYetValid => "NotYetValid",
            Self::ChainMissing => "ChainMissing",
            Self::ChainValidationFailed => "ChainValidationFailed",
            Self::ChainBuildError => "ChainBuildError",
            Self::MissingCN => "MissingCN",
            Self::InvalidCNFormat => "InvalidCNFormat",
            Self::InvalidNodeId => "InvalidNodeId",
            Self::NotEnrolled => "NotEnrolled",
            Self::PayloadTooLarge => "PayloadTooLarge",
            Self::PayloadTooDeep => "PayloadTooDeep",
            Self::InvalidPayload => "InvalidPayload",
            Self::NullPayload => "NullPayload",
            Self::UnknownCommandType => "UnknownCommandType",
            Self::ExecutionException => "ExecutionException",
            Self::InvalidMetric => "InvalidMetric",
            Self::NodeNotFound => "NodeNotFound",
            Self::NodeDecommissioned => "NodeDecommissioned",
            Self::AlreadyInMaintenance => "AlreadyInMaintenance",
            Self::NotInMaintenance => "NotInMaintenance",
            Self::NameAlreadyExists => "NameAlreadyExists",
            Self::ReservationNotFound => "ReservationNotFound",
            Self::ReservationExpired => "ReservationExpired",
            Self::InsufficientMemory => "InsufficientMemory",
            Self::InsufficientDisk => "InsufficientDisk",
            Self::BlockedPattern => "BlockedPattern",
            Self::NotSubscribed => "NotSubscribed",
            Self::ServerNotFound => "ServerNotFound",
            Self::TenantMismatch => "TenantMismatch",
            Self::RateLimited => "RateLimited",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::Internal => "Internal",
        }
    }
}

/// Main error type for gridkeep operations.
#[derive(Debug, thiserror::Error)]
pub enum GridkeepError {
    #[error("{code}: {detail}")]
    Typed { code: ErrorCode, detail: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl GridkeepError {
    pub fn typed(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Typed {
            code,
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Typed { code, .. } => *code,
            Self::Database(_) | Self::Cache(_) | Self::Bus(_) => ErrorCode::Internal,
            Self::Config(_) => ErrorCode::Internal,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// The message that is safe to put on the wire. Internal failures are
    /// always generic here; the full detail stays in `Display`/logs.
    pub fn public_detail(&self) -> String {
        match self {
            Self::Typed { detail, .. } => detail.clone(),
            Self::Database(_) | Self::Cache(_) | Self::Bus(_) | Self::Config(_) => {
                "An internal error occurred".to_string()
            }
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        use ErrorCode::*;
        match self.code() {
            InvalidToken | InvalidPlatform | InvalidCertificate | CertificateTooLarge
            | KeyMismatch | PayloadTooLarge | PayloadTooDeep | InvalidPayload | NullPayload
            | UnknownCommandType | AlreadyInMaintenance | NotInMaintenance | NameAlreadyExists
            | BlockedPattern | InvalidNodeId | InvalidCNFormat | InvalidMetric => StatusCode::BAD_REQUEST,
            InsecureTransport => StatusCode::UPGRADE_REQUIRED,
            Unauthorized | NotEnrolled => StatusCode::UNAUTHORIZED,
            Forbidden | TenantMismatch | NodeDecommissioned => StatusCode::FORBIDDEN,
            NodeNotFound | ServerNotFound | NotSubscribed | ReservationNotFound | Null
            | MissingCN | ChainMissing => StatusCode::NOT_FOUND,
            Expired | NotYetValid | ReservationExpired | ChainValidationFailed
            | ChainBuildError | InsufficientMemory | InsufficientDisk | CryptoError
            | ExecutionException => StatusCode::UNPROCESSABLE_ENTITY,
            RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// RFC 7807 problem-document wire envelope.
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub instance: String,
    #[serde(rename = "traceId")]
    pub trace_id: String,
    #[serde(rename = "errorCode")]
    pub error_code: &'static str,
}

impl GridkeepError {
    pub fn into_problem_details(self, instance: impl Into<String>, trace_id: impl Into<String>) -> ProblemDetails {
        let status = self.status_code();
        let code = self.code();
        ProblemDetails {
            problem_type: format!("https://gridkeep.dev/errors/{}", code.as_str()),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            status: status.as_u16(),
            detail: self.public_detail(),
            instance: instance.into(),
            trace_id: trace_id.into(),
            error_code: code.as_str(),
        }
    }
}

impl From<std::io::Error> for GridkeepError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GridkeepError {
    fn from(err: serde_json::Error) -> Self {
        Self::typed(ErrorCode::InvalidPayload, format!("JSON error: {err}"))
    }
}

impl From<sqlx::Error> for GridkeepError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<redis::RedisError> for GridkeepError {
    fn from(err: redis::RedisError) -> Self {
        Self::Cache(err.to_string())
    }
}

impl From<async_nats::Error> for GridkeepError {
    fn from(err: async_nats::Error) -> Self {
        Self::Bus(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for GridkeepError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::typed(ErrorCode::Unauthorized, format!("JWT error: {err}"))
    }
}

impl From<rcgen::Error> for GridkeepError {
    fn from(err: rcgen::Error) -> Self {
        Self::typed(ErrorCode::CryptoError, format!("Certificate processing failed: {err}"))
    }
}

/// Result type alias for gridkeep operations.
pub type Result<T> = std::result::Result<T, GridkeepError>;
