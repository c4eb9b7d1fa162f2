//! Error types for the array control plane
//!
//! Provides structured error types for credentials reloads, array probing,
//! volume identifier resolution, and the transport connectors. Every error
//! maps to an RPC-style status code so request paths can surface it to the
//! orchestrator unchanged.

use crate::context::RequestContext;
use thiserror::Error;

/// Unified error type for the control plane
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Credentials Reload Errors
    // =========================================================================
    #[error("File ('{path}') error: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse the credentials [{0}]")]
    ConfigParse(String),

    #[error("Arrays details are not provided in the credentials file")]
    ConfigEmpty,

    #[error("invalid value for {field} at index [{index}]")]
    ConfigValidation { index: usize, field: &'static str },

    #[error("Duplicate ArrayID [{array_id}] found in storageArrayList parameter")]
    ConfigDuplicate { array_id: String },

    #[error(
        "'isDefaultArray' parameter located in multiple places ArrayId: {array_id}. \
         'isDefaultArray' parameter should present only once in the storageArrayList"
    )]
    ConfigDefaultConflict { array_id: String },

    #[error("unable to initialize the array client for {array_id} [{reason}]")]
    ConfigClientInit { array_id: String, reason: String },

    // =========================================================================
    // Probe Errors
    // =========================================================================
    #[error("Unable to login to array {array_id}. Error: {reason}")]
    Unauthenticated { array_id: String, reason: String },

    #[error("Unable to login to array {array_id}. Verify hostname/IP address of the array. Error: {reason}")]
    Unreachable { array_id: String, reason: String },

    #[error("Array client not found for array {array_id}")]
    ArrayNotFound { array_id: String },

    #[error("All arrays are not working. Could not proceed further")]
    AllArraysUnavailable,

    #[error("Controller service has not been probed")]
    NotProbed,

    // =========================================================================
    // Identifier Errors
    // =========================================================================
    #[error("Invalid volume identifier '{id}': {reason}")]
    MalformedIdentifier { id: String, reason: String },

    #[error("No default array found in the driver configuration")]
    NoDefaultArray,

    #[error("Invalid driver configuration provided. At least one array should be present")]
    NoArraysConfigured,

    // =========================================================================
    // Array Operation Errors
    // =========================================================================
    #[error("Array operation failed: {array_id} - {operation}: {reason}")]
    ArrayOperationFailed {
        array_id: String,
        operation: String,
        reason: String,
    },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Transport error: {protocol} - {reason}")]
    Transport { protocol: String, reason: String },

    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    // =========================================================================
    // Watch / Metrics / IO Errors
    // =========================================================================
    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// RPC-style status code an error is reported with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    InvalidArgument,
    FailedPrecondition,
    NotFound,
    Unavailable,
    Internal,
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::InvalidArgument => write!(f, "InvalidArgument"),
            StatusCode::FailedPrecondition => write!(f, "FailedPrecondition"),
            StatusCode::NotFound => write!(f, "NotFound"),
            StatusCode::Unavailable => write!(f, "Unavailable"),
            StatusCode::Internal => write!(f, "Internal"),
        }
    }
}

/// User-visible status: a code plus a message tagged with the run id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error {
    /// Status code this error is reported with
    pub fn code(&self) -> StatusCode {
        match self {
            // Bad input from the caller or a bad credentials file
            Error::MalformedIdentifier { .. }
            | Error::NoDefaultArray
            | Error::NoArraysConfigured
            | Error::ArrayNotFound { .. }
            | Error::Configuration(_)
            | Error::ConfigParse(_)
            | Error::ConfigEmpty
            | Error::ConfigValidation { .. }
            | Error::ConfigDuplicate { .. }
            | Error::ConfigDefaultConflict { .. } => StatusCode::InvalidArgument,

            // The plugin cannot serve until an array is usable
            Error::Unauthenticated { .. }
            | Error::Unreachable { .. }
            | Error::AllArraysUnavailable
            | Error::NotProbed
            | Error::ConfigClientInit { .. } => StatusCode::FailedPrecondition,

            Error::DeviceNotFound { .. } => StatusCode::NotFound,

            Error::ArrayOperationFailed { .. } | Error::Transport { .. } => {
                StatusCode::Unavailable
            }

            Error::Internal(_)
            | Error::ConfigIo { .. }
            | Error::Watch(_)
            | Error::Metrics(_)
            | Error::Io(_) => StatusCode::Internal,
        }
    }

    /// Render the error for the caller, tagged with the context's run id
    pub fn to_status(&self, ctx: &RequestContext) -> Status {
        Status {
            code: self.code(),
            message: ctx.message(&self.to_string()),
        }
    }

    /// Whether this error was raised while loading the credentials file
    pub fn is_reload_error(&self) -> bool {
        matches!(
            self,
            Error::ConfigIo { .. }
                | Error::ConfigParse(_)
                | Error::ConfigEmpty
                | Error::ConfigValidation { .. }
                | Error::ConfigDuplicate { .. }
                | Error::ConfigDefaultConflict { .. }
                | Error::ConfigClientInit { .. }
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.code(), StatusCode::InvalidArgument) && !self.is_reload_error()
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Unreachable { .. }
                | Error::AllArraysUnavailable
                | Error::ArrayOperationFailed { .. }
                | Error::Transport { .. }
        )
    }
}

/// Result type alias for the control plane
pub type Result<T> = std::result::Result<T, Error>;
