//! Error types for the endpoint tree and its descriptors.

use crate::path::Path;

/// A caller-caused validation failure.
///
/// These are recovered at the request boundary and reported to the caller
/// as an error response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// The attribute or method does not accept writes.
    #[error("endpoint '{0}' is not writeable")]
    NotWriteable(String),

    /// The endpoint exists but is not an attribute.
    #[error("endpoint '{0}' is not an attribute")]
    NotAttribute(String),

    /// The endpoint exists but is not a method.
    #[error("endpoint '{0}' is not a method")]
    NotMethod(String),

    /// A parameter name that the method does not declare.
    #[error("method '{method}' does not take parameter '{name}'")]
    UnknownParameter {
        /// Method being called.
        method: String,
        /// Offending parameter name.
        name: String,
    },

    /// A required parameter with no default was not supplied.
    #[error("method '{method}' requires parameter '{name}'")]
    MissingParameter {
        /// Method being called.
        method: String,
        /// Missing parameter name.
        name: String,
    },

    /// A value rejected by its descriptor.
    #[error("invalid value for {typeid}: {reason}")]
    InvalidValue {
        /// Type identifier of the descriptor that rejected the value.
        typeid: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A method returned something that does not fit its declared returns.
    #[error("method '{method}' returned an invalid result: {reason}")]
    InvalidReturn {
        /// Method that was called.
        method: String,
        /// Why the result was rejected.
        reason: String,
    },
}

impl ValidationError {
    pub(crate) fn invalid(typeid: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            typeid,
            reason: reason.into(),
        }
    }
}

/// Errors raised while reading or mutating the endpoint tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// A path segment did not resolve.
    #[error("no endpoint at '{0}'")]
    NotFound(Path),

    /// A write was rejected by validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No subscription with this id exists on the given sink.
    #[error("no subscription with id {0}")]
    UnknownSubscription(u64),
}
