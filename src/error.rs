//! Error handling for statebus-rs
//!
//! This module defines the crate error type and a Result alias used
//! throughout the coordination layer.
//!
//! Only [`StateBusError::UnknownProperty`], [`StateBusError::InvalidSchema`] and
//! [`StateBusError::KindMismatch`] indicate programmer errors. Everything else is
//! recoverable: a worker that hits a lock timeout or a full ring buffer drops
//! the message and carries on.

use thiserror::Error;

/// Main error type for statebus-rs operations
#[derive(Error, Debug)]
pub enum StateBusError {
    /// A property name that the compiled schema does not contain
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    /// The property declarations could not be compiled into a layout
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A value whose shape does not match the declared property kind
    #[error("Kind mismatch for property '{property}': {message}")]
    KindMismatch { property: String, message: String },

    /// The control channel spin lock could not be acquired
    #[error("Lock timeout after {attempts} attempts")]
    LockTimeout { attempts: u32 },

    /// The control channel ring buffer is at capacity
    #[error("Ring buffer full (capacity {capacity})")]
    BufferFull { capacity: u32 },

    /// A versioned read that never observed a stable version
    #[error("Inconsistent snapshot of property '{0}'")]
    InconsistentSnapshot(String),

    /// The capture source failed; fatal to the producer only
    #[error("Capture source failure: {0}")]
    CaptureSourceFailure(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StateBusError>,
    },
}

impl StateBusError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        StateBusError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a kind mismatch error for a property
    pub fn kind_mismatch(property: impl Into<String>, message: impl Into<String>) -> Self {
        StateBusError::KindMismatch {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Whether the error is a transient drop that the caller may ignore
    pub fn is_transient(&self) -> bool {
        match self {
            StateBusError::LockTimeout { .. }
            | StateBusError::BufferFull { .. }
            | StateBusError::InconsistentSnapshot(_) => true,
            StateBusError::WithContext { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for statebus-rs operations
pub type Result<T> = std::result::Result<T, StateBusError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StateBusError::UnknownProperty("playerPos".to_string());
        assert_eq!(err.to_string(), "Unknown property: playerPos");
    }

    #[test]
    fn test_error_with_context() {
        let err = StateBusError::InvalidSchema("duplicate name".to_string());
        let with_ctx = err.with_context("Failed to compile schema");
        assert!(with_ctx.to_string().contains("Failed to compile schema"));
    }

    #[test]
    fn test_transient_errors() {
        assert!(StateBusError::LockTimeout { attempts: 10 }.is_transient());
        assert!(StateBusError::BufferFull { capacity: 4 }
            .with_context("send")
            .is_transient());
        assert!(!StateBusError::UnknownProperty("x".into()).is_transient());
    }

    #[test]
    fn test_kind_mismatch_error() {
        let err = StateBusError::kind_mismatch("currentPath", "expected path value");
        assert!(err.to_string().contains("currentPath"));
        assert!(err.to_string().contains("expected path value"));
    }
}
