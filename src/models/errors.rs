//! Centralized Error Handling Module
//!
//! Every failure in the pipeline carries a unique error code so that batch logs
//! and the `error` column of emitted assessments can be grepped by category.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - FETCH_xxx: activity-service errors
//! - ADDRESS_xxx: address validation
//! - CFG_xxx: configuration errors
//! - CHECKPOINT_xxx / SINK_xxx: pipeline errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// Whether the retry policy should try this call again
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Fetch Errors
    // ============================================
    /// Network failure, timeout, HTTP 429/5xx or malformed payload
    FetchTransient,
    /// Authentication rejection or a request the service will never accept
    FetchFatal,

    // ============================================
    // Address Errors
    // ============================================
    /// Address is not `0x` + 40 hex characters
    InvalidAddress,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Weight map missing a factor, negative, or not summing to 1.0
    InvalidWeights,
    /// Any other invalid configuration value
    ConfigInvalidValue,
    /// Missing required environment variable
    ConfigMissingEnv,

    // ============================================
    // Pipeline Errors
    // ============================================
    /// The checkpoint could not be persisted; the run must halt
    CheckpointWriteFailed,
    /// The checkpoint on disk cannot be parsed
    CheckpointCorrupt,
    /// Result sink refused a record
    SinkWriteFailed,

    // ============================================
    // Generic Errors
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchTransient => "FETCH_TRANSIENT",
            Self::FetchFatal => "FETCH_FATAL",

            Self::InvalidAddress => "ADDRESS_INVALID",

            Self::InvalidWeights => "CFG_INVALID_WEIGHTS",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::ConfigMissingEnv => "CFG_MISSING_ENV",

            Self::CheckpointWriteFailed => "CHECKPOINT_WRITE_FAILED",
            Self::CheckpointCorrupt => "CHECKPOINT_CORRUPT",
            Self::SinkWriteFailed => "SINK_WRITE_FAILED",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchTransient)
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// Transient fetch failure (will be retried)
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FetchTransient, msg)
    }

    /// Rate limited by the remote service
    pub fn rate_limited() -> Self {
        Self::new(ErrorCode::FetchTransient, "Rate limited (HTTP 429)")
    }

    /// Timed out waiting for the remote service
    pub fn timeout(after_ms: u128) -> Self {
        Self::new(
            ErrorCode::FetchTransient,
            format!("Request timed out after {}ms", after_ms),
        )
    }

    /// Non-retryable fetch failure
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FetchFatal, msg)
    }

    /// Invalid wallet address
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    /// Invalid weight configuration
    pub fn invalid_weights(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidWeights, msg)
    }

    /// Invalid configuration value
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalidValue, msg)
    }

    /// Missing environment variable
    pub fn missing_env(key_name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingEnv,
            format!("Missing environment variable: {}", key_name),
        )
    }

    /// Checkpoint write failed
    pub fn checkpoint_write(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::with_source(ErrorCode::CheckpointWriteFailed, msg, source)
    }

    /// Checkpoint content is unreadable
    pub fn checkpoint_corrupt(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::CheckpointCorrupt, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "IO error", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::FetchTransient, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::FetchTransient, "Connection failed")
        } else if err.is_decode() {
            Self::new(ErrorCode::FetchTransient, format!("Malformed response: {}", err))
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 || status.is_server_error() {
                Self::new(ErrorCode::FetchTransient, format!("HTTP error: {}", status))
            } else {
                Self::new(ErrorCode::FetchFatal, format!("HTTP error: {}", status))
            }
        } else {
            Self::new(ErrorCode::FetchTransient, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::FetchTransient, "JSON parse error", err)
    }
}
