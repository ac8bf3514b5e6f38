//! Error types for the Aegis core library.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Validation | Malformed trigger conditions, steps, input fields |
//! | E2001-E2099 | NotFound | Unknown alert, playbook or run ids |
//! | E3001-E3099 | Conflict | Optimistic concurrency check lost, caller must retry |
//! | E4001-E4099 | Step | Step handler failures, timeouts, escalation guard |
//! | E5001-E5099 | Engine | Persistence unreachable, run cannot safely proceed |
//! | E6001-E6099 | Storage | Database connection, query, migration errors |
//! | E7001-E7099 | Config | Environment and configuration file errors |
//! | E9001-E9099 | General | Internal, IO, serialization errors |

use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

/// The main error type for the Aegis core library.
#[derive(Debug, Error)]
pub enum AegisError {
    // ========================================================================
    // Validation Errors (E1001-E1099)
    // ========================================================================
    /// Generic validation failure (bad field value, missing required field)
    #[error("[E1001] Validation error: {0}")]
    Validation(String),

    /// Trigger condition rejected at playbook save time
    #[error("[E1002] Invalid trigger condition: {0}")]
    InvalidTriggerCondition(String),

    /// Step configuration rejected at playbook save time
    #[error("[E1003] Invalid step {index}: {message}")]
    InvalidStep { index: u32, message: String },

    // ========================================================================
    // NotFound Errors (E2001-E2099)
    // ========================================================================
    /// Alert id is unknown
    #[error("[E2001] Alert not found: {0}")]
    AlertNotFound(Uuid),

    /// Playbook id is unknown
    #[error("[E2002] Playbook not found: {0}")]
    PlaybookNotFound(Uuid),

    /// Run id is unknown
    #[error("[E2003] Run not found: {0}")]
    RunNotFound(Uuid),

    // ========================================================================
    // Conflict Errors (E3001-E3099)
    // ========================================================================
    /// Concurrent alert write lost the optimistic version check
    #[error("[E3001] Concurrent update conflict on alert {alert_id} (expected version {expected})")]
    Conflict { alert_id: Uuid, expected: i64 },

    /// Alert status transition violates the monotonic status order
    #[error("[E3002] Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// An active run already holds the (playbook, alert) admission key
    #[error("[E3003] Run already active for playbook {playbook_id} on alert {alert_id}")]
    DuplicateRun { playbook_id: Uuid, alert_id: Uuid },

    // ========================================================================
    // Step Execution Errors (E4001-E4099)
    // ========================================================================
    /// Step handler reported a failure; retried per policy before surfacing
    #[error("[E4001] Step execution failed for action '{action}': {message}")]
    StepExecution { action: String, message: String },

    /// No handler registered for an action kind
    #[error("[E4002] No handler registered for action '{0}'")]
    HandlerNotRegistered(String),

    /// An alert may be escalated at most once per run
    #[error("[E4003] Escalation guard tripped for run {run_id}: alert already escalated by this run")]
    EscalationGuard { run_id: Uuid },

    // ========================================================================
    // Engine Fatal Errors (E5001-E5099)
    // ========================================================================
    /// The persistence adapter is unreachable; step effects cannot be confirmed
    #[error("[E5001] Engine fatal: {0}")]
    EngineFatal(String),

    // ========================================================================
    // Storage Errors (E6001-E6099)
    // ========================================================================
    /// Failed to establish database connection
    #[error("[E6001] Database connection failed: {0}")]
    DatabaseConnectionFailed(String),

    /// Database query execution failed
    #[error("[E6002] Database query failed: {0}")]
    DatabaseQueryFailed(String),

    /// Database migration failed
    #[error("[E6003] Database migration failed: {0}")]
    DatabaseMigrationFailed(String),

    /// Database pool exhausted or unavailable
    #[error("[E6004] Database pool unavailable: {0}")]
    DatabasePoolUnavailable(String),

    // ========================================================================
    // Configuration Errors (E7001-E7099)
    // ========================================================================
    /// Required environment variable is missing
    #[error("[E7001] Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// Configuration file parse error
    #[error("[E7002] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// Invalid configuration value
    #[error("[E7003] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    // ========================================================================
    // General Errors (E9001-E9099)
    // ========================================================================
    /// Internal error (catch-all for unexpected conditions)
    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("[E9002] IO error: {0}")]
    IoError(String),

    /// Serialization/deserialization error
    #[error("[E9003] Serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for Aegis operations.
pub type AegisResult<T> = Result<T, AegisError>;

// ============================================================================
// From trait implementations for seamless error propagation
// ============================================================================

impl From<sqlx::Error> for AegisError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => AegisError::DatabasePoolUnavailable(err.to_string()),
            sqlx::Error::PoolClosed => {
                AegisError::DatabasePoolUnavailable("Connection pool is closed".to_string())
            }
            sqlx::Error::Configuration(_) => AegisError::DatabaseConnectionFailed(err.to_string()),
            sqlx::Error::Database(db_err) => AegisError::DatabaseQueryFailed(db_err.to_string()),
            _ => AegisError::DatabaseQueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AegisError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AegisError::DatabaseMigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for AegisError {
    fn from(err: serde_json::Error) -> Self {
        AegisError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for AegisError {
    fn from(err: serde_yaml::Error) -> Self {
        AegisError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for AegisError {
    fn from(err: std::io::Error) -> Self {
        AegisError::IoError(err.to_string())
    }
}

impl From<config::ConfigError> for AegisError {
    fn from(err: config::ConfigError) -> Self {
        AegisError::ConfigParseError(err.to_string())
    }
}

// ============================================================================
// Error categorization helpers
// ============================================================================

impl AegisError {
    /// Returns true if the caller should retry the operation as-is.
    ///
    /// Conflict maps to a retryable 409-equivalent at the API boundary.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AegisError::Conflict { .. }
                | AegisError::DuplicateRun { .. }
                | AegisError::DatabasePoolUnavailable(_)
        )
    }

    /// Returns true if this error reflects bad input (400-equivalent).
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            AegisError::Validation(_)
                | AegisError::InvalidTriggerCondition(_)
                | AegisError::InvalidStep { .. }
                | AegisError::InvalidStatusTransition { .. }
        )
    }

    /// Returns true if this error names an unknown entity (404-equivalent).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AegisError::AlertNotFound(_)
                | AegisError::PlaybookNotFound(_)
                | AegisError::RunNotFound(_)
        )
    }

    /// Returns true if this error is related to storage operations.
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            AegisError::DatabaseConnectionFailed(_)
                | AegisError::DatabaseQueryFailed(_)
                | AegisError::DatabaseMigrationFailed(_)
                | AegisError::DatabasePoolUnavailable(_)
        )
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            AegisError::Validation(_) => "E1001",
            AegisError::InvalidTriggerCondition(_) => "E1002",
            AegisError::InvalidStep { .. } => "E1003",
            AegisError::AlertNotFound(_) => "E2001",
            AegisError::PlaybookNotFound(_) => "E2002",
            AegisError::RunNotFound(_) => "E2003",
            AegisError::Conflict { .. } => "E3001",
            AegisError::InvalidStatusTransition { .. } => "E3002",
            AegisError::DuplicateRun { .. } => "E3003",
            AegisError::StepExecution { .. } => "E4001",
            AegisError::HandlerNotRegistered(_) => "E4002",
            AegisError::EscalationGuard { .. } => "E4003",
            AegisError::EngineFatal(_) => "E5001",
            AegisError::DatabaseConnectionFailed(_) => "E6001",
            AegisError::DatabaseQueryFailed(_) => "E6002",
            AegisError::DatabaseMigrationFailed(_) => "E6003",
            AegisError::DatabasePoolUnavailable(_) => "E6004",
            AegisError::MissingEnvVar(_) => "E7001",
            AegisError::ConfigParseError(_) => "E7002",
            AegisError::InvalidConfigValue { .. } => "E7003",
            AegisError::Internal(_) => "E9001",
            AegisError::IoError(_) => "E9002",
            AegisError::SerializationError(_) => "E9003",
        }
    }

    /// Log this error with a severity matching its category.
    pub fn log(&self) {
        let code = self.error_code();
        if self.is_retryable() || self.is_validation_error() || self.is_not_found() {
            warn!(error_code = %code, "{}", self);
        } else {
            error!(error_code = %code, "{}", self);
        }
    }
}
