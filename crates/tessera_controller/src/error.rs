//! Error types for controllers, hook runs and request handling.

use tessera_model::{ModelError, ValidationError};

/// A programming error detected while building a controller.
///
/// These are never recovered: a controller that fails to build does not
/// exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    /// The same hook identity was declared twice.
    #[error("hook {hook} already declared as '{name}'")]
    DuplicateHook {
        /// Type name of the hook.
        hook: &'static str,
        /// Name it was first declared under.
        name: String,
    },

    /// Two hook identities were declared under the same name.
    #[error("hook name '{0}' already in use")]
    DuplicateHookName(String),

    /// A part bound a function to a hook the controller does not declare.
    #[error("part '{part}' function '{func}' hooks into undeclared hook {hook}")]
    UnknownHook {
        /// Part name.
        part: String,
        /// Bound function name.
        func: String,
        /// Type name of the hook.
        hook: &'static str,
    },

    /// A part bound more than one function to the same hook.
    #[error("part '{part}' binds more than one function to {hook}")]
    MultipleBindings {
        /// Part name.
        part: String,
        /// Type name of the hook.
        hook: &'static str,
    },

    /// Two parts share a name.
    #[error("part '{0}' already added")]
    DuplicatePart(String),

    /// Two fields share a name in the block.
    #[error("endpoint '{0}' already exists")]
    DuplicateEndpoint(String),

    /// The part already belongs to another controller.
    #[error("part '{0}' is already attached to a controller")]
    AlreadyAttached(String),

    /// The process already hosts a controller with this mri.
    #[error("controller '{0}' already registered with the process")]
    DuplicateController(String),
}

/// Failure of a hook function or of the hook run itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HookError {
    /// The run must stop now; siblings are already being stopped.
    #[error("aborted: {0}")]
    Aborted(String),

    /// The hook function failed.
    #[error("{0}")]
    Failed(String),

    /// Parameters did not fit the bound function.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The hook is not declared by this controller.
    #[error("hook {0} is not declared by this controller")]
    UndeclaredHook(&'static str),

    /// No execution context was supplied for a participating part.
    #[error("no context for part '{part}'")]
    MissingContext {
        /// Part name.
        part: String,
    },

    /// The hook function panicked.
    #[error("part '{part}' panicked: {message}")]
    Panicked {
        /// Part name.
        part: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// Anything else.
    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl HookError {
    /// Shorthand for [`HookError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Shorthand for [`HookError::Aborted`].
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted(message.into())
    }

    /// Returns `true` for the abort class, which skips waiting on siblings.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

/// Failure while handling a request, reported to the caller as an error
/// response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// Path resolution or tree mutation failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The caller supplied something invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A lifecycle hook run failed.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// A put or post handler reported failure.
    #[error("{0}")]
    Handler(String),

    /// No controller is registered under the first path segment.
    #[error("no controller '{0}'")]
    UnknownController(String),

    /// Anything else, including handler panics.
    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl RequestError {
    /// Shorthand for [`RequestError::Handler`].
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

/// Errors from the process registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// The process was created outside a Tokio runtime.
    #[error("a process must be created inside a Tokio runtime")]
    NoRuntime,

    /// A controller with this mri is already registered.
    #[error("controller '{0}' already registered")]
    DuplicateController(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_aborted_is_abort() {
        assert!(HookError::aborted("stop").is_abort());
        assert!(!HookError::failed("x").is_abort());
        assert!(!HookError::Unexpected("x".into()).is_abort());
    }

    #[test]
    fn validation_errors_pass_through_transparently() {
        let inner = ValidationError::NotWriteable("gain".into());
        let err = RequestError::from(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
        let err = RequestError::from(HookError::from(inner.clone()));
        assert_eq!(err.to_string(), inner.to_string());
    }
}
