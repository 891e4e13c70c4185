//! Error types for Trellis
//!
//! This module defines the error taxonomy used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! ## Taxonomy
//!
//! - `ScopeUnresolved`: an operation requiring a location chain or scope key
//!   was invoked before one was available. Raised synchronously, before any
//!   cache-source call.
//! - `SourceOperation`: the cache source rejected a call. Propagated to the
//!   caller after local in-flight state is reset.
//! - `Key` / `Param`: validation failures from the key and parameter models.
//!
//! Absence of a subscribe capability on a source is NOT an error; it
//! degrades to "no live invalidation".

use crate::params::ParamError;
use crate::types::KeyError;
use thiserror::Error;

/// Result type alias for Trellis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache binding operations
#[derive(Debug, Error)]
pub enum Error {
    /// Operation invoked before its containment context resolved
    #[error("Scope unresolved for '{operation}': {reason}")]
    ScopeUnresolved {
        /// Operation that was attempted
        operation: String,
        /// Why the context could not be resolved
        reason: String,
    },

    /// The cache source rejected an operation
    #[error("Source operation '{operation}' failed: {message}")]
    SourceOperation {
        /// Operation that failed
        operation: String,
        /// Failure detail from the source
        message: String,
    },

    /// Key validation failure
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    /// Parameter validation failure
    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),
}

impl Error {
    /// Build a `ScopeUnresolved` error
    pub fn unresolved(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ScopeUnresolved {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Build a `SourceOperation` error
    pub fn source(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SourceOperation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether this is a `ScopeUnresolved` error
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Error::ScopeUnresolved { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_display() {
        let err = Error::unresolved("create", "no location chain available");
        let msg = err.to_string();
        assert!(msg.contains("create"));
        assert!(msg.contains("no location chain available"));
        assert!(err.is_unresolved());
    }

    #[test]
    fn test_source_display() {
        let err = Error::source("action", "activation refused");
        let msg = err.to_string();
        assert!(msg.contains("action"));
        assert!(msg.contains("activation refused"));
        assert!(!err.is_unresolved());
    }

    #[test]
    fn test_key_error_conversion() {
        let err: Error = KeyError::EmptyDeclaration.into();
        assert!(matches!(err, Error::Key(_)));
    }

    #[test]
    fn test_param_error_conversion() {
        let err: Error = ParamError::UnsupportedValue {
            key: "bad".to_string(),
            type_name: "Object",
        }
        .into();
        assert!(matches!(err, Error::Param(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn ok() -> Result<i32> {
            Ok(7)
        }
        assert_eq!(ok().unwrap(), 7);
    }
}
