//! Error types shared across the core's components.

/// Result alias used throughout this crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// The four error kinds the core surfaces to callers (see the error
/// handling design in the spec this crate implements).
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// An argument was out of its valid range (negative interval, attempt
    /// below 1, randomization factor outside `[0, 1]`, non-positive pool
    /// size, empty entry name). Raised synchronously; never mutates state.
    #[error("validation failed: {message}")]
    Validation {
        /// Human-readable description of what was invalid.
        message: String,
    },

    /// A named configuration was requested but never registered.
    #[error("configuration {name:?} not found")]
    ConfigurationNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// A factory or plug-in constructor failed.
    #[error("instantiation failed: {message}")]
    Instantiation {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl CoreError {
    /// Build a [`CoreError::Validation`] from a message.
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
        }
    }

    /// Build a [`CoreError::ConfigurationNotFound`] for `name`.
    pub fn configuration_not_found(name: impl Into<String>) -> Self {
        CoreError::ConfigurationNotFound { name: name.into() }
    }

    /// Build a [`CoreError::Instantiation`] wrapping an optional cause.
    pub fn instantiation<E>(message: impl Into<String>, source: Option<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CoreError::Instantiation {
            message: message.into(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }
}
