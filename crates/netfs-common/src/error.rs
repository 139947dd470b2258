//! Error types for NetworkFilesystem reconciliation
//!
//! Every error is scoped to a single resource name. None of them is fatal to
//! the process: the controller's error policy logs the error and requeues the
//! name, with a delay chosen by [`Error::is_retryable`].

use thiserror::Error;

/// Main error type for network filesystem operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error (fetch or write against the resource store)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A resource this reconciliation depends on does not exist (yet)
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (e.g. "ShareManager")
        kind: String,
        /// Resource name
        name: String,
    },

    /// An ordering or readiness precondition is not met yet
    #[error("waiting on {name}: {message}")]
    Waiting {
        /// Name of the NetworkFilesystem being reconciled
        name: String,
        /// What the reconciliation is waiting for
        message: String,
    },

    /// The endpoint subset of a headless Service has an unexpected shape
    ///
    /// These do not heal on their own and need operator intervention.
    #[error("endpoint {name} is misconfigured: {message}")]
    EndpointShape {
        /// Name of the Endpoints object
        name: String,
        /// Description of the violation
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a not-found error for a dependency
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a waiting error for an unmet precondition
    pub fn waiting(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Waiting {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create an endpoint shape violation error
    pub fn endpoint_shape(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::EndpointShape {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Check if this error is expected to clear on its own
    ///
    /// Write conflicts and throttling are retryable; other 4xx API errors
    /// and shape violations are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    matches!(ae.code, 409 | 429) || !(400..500).contains(&ae.code)
                }
                _ => true,
            },
            Error::NotFound { .. } => true,
            Error::Waiting { .. } => true,
            Error::EndpointShape { .. } => false,
            Error::Serialization { .. } => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
