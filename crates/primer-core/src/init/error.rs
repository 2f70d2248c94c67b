//! Initialization errors

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by [`ensure_initialized`](crate::init::ensure_initialized)
#[derive(Debug, Clone, Error)]
pub enum InitError {
    /// The initializer raised an ordinary error. The type is now permanently
    /// erroneous; only the call that ran the initializer sees this variant.
    #[error("Exception in initializer of type {type_name}: {cause}")]
    ExceptionInInitializer {
        /// Type whose initializer failed
        type_name: String,
        /// Underlying error
        #[source]
        cause: Arc<dyn Error + Send + Sync>,
    },

    /// Initialization was attempted earlier and failed
    #[error("Could not initialize type {type_name}")]
    PreviouslyFailed {
        /// Type in the error state
        type_name: String,
    },

    /// An unrecoverable failure raised inside an initializer
    #[error("Unrecoverable error: {0}")]
    Unrecoverable(String),
}

impl InitError {
    /// Name of the type the error is about, when known
    pub fn type_name(&self) -> Option<&str> {
        match self {
            InitError::ExceptionInInitializer { type_name, .. }
            | InitError::PreviouslyFailed { type_name } => Some(type_name),
            InitError::Unrecoverable(_) => None,
        }
    }
}

/// What an initializer returns when it does not complete normally
#[derive(Debug)]
pub enum Thrown {
    /// Ordinary program error; wrapped in [`InitError::ExceptionInInitializer`]
    Exception(Box<dyn Error + Send + Sync>),

    /// Already classified failure; propagated as is
    Error(InitError),
}

impl Thrown {
    /// Raise an ordinary program error
    pub fn exception(error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Thrown::Exception(error.into())
    }

    /// Raise an unrecoverable error
    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Thrown::Error(InitError::Unrecoverable(message.into()))
    }

    /// Classify a failure of `type_name`'s initializer
    pub(crate) fn into_init_error(self, type_name: &str) -> InitError {
        match self {
            Thrown::Exception(cause) => InitError::ExceptionInInitializer {
                type_name: type_name.to_string(),
                cause: Arc::from(cause),
            },
            Thrown::Error(error) => error,
        }
    }
}

// Lets initializers use `?` on nested ensure_initialized calls
impl From<InitError> for Thrown {
    fn from(error: InitError) -> Self {
        Thrown::Error(error)
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Thrown::Exception(e) => write!(f, "{}", e),
            Thrown::Error(e) => write!(f, "{}", e),
        }
    }
}
