//! Provisioner error types.
//!
//! Every failure is reported as a [`ProvisionError`].  Like the rest of the
//! data model it is [`Serialize`]/[`Deserialize`] so it can be handed back to
//! the reconciliation controller inside a
//! [`ProvisionerMessage`](crate::message::ProvisionerMessage).
//!
//! A failed provisioning call additionally returns the volume that had been
//! built so far, wrapped in a [`ProvisionFailure`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ProvisioningState, Volume};

/// Unified error type for provisioner operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// A required storage class parameter is missing.
    #[error("parameter '{0}' not found")]
    MissingParameter(String),

    /// The caller supplied a malformed claim or volume.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing directory already exists.
    #[error("volume path {0} already exists")]
    VolumeAlreadyExists(String),

    /// Creating the backing directory failed.
    #[error("create {path} failed: {reason}")]
    CreateFailed {
        /// Directory that was being created.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Removing the backing directory failed.
    #[error("delete {path} failed: {reason}")]
    DeleteFailed {
        /// Directory that was being removed.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The operation did not finish within its deadline.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
}

impl ProvisionError {
    pub fn create_failed<E: std::fmt::Display>(path: impl Into<String>, e: E) -> Self {
        Self::CreateFailed {
            path: path.into(),
            reason: e.to_string(),
        }
    }

    pub fn delete_failed<E: std::fmt::Display>(path: impl Into<String>, e: E) -> Self {
        Self::DeleteFailed {
            path: path.into(),
            reason: e.to_string(),
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Configuration and argument errors never go away on their own, and a
    /// failed create is tied to a name that must not be reused: a new attempt
    /// has to go through a fresh provisioning call.  Delete failures and
    /// deadlines are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MissingParameter(_)
            | Self::InvalidArgument(_)
            | Self::VolumeAlreadyExists(_)
            | Self::CreateFailed { .. } => false,
            Self::DeleteFailed { .. } | Self::DeadlineExceeded(_) => true,
        }
    }
}

/// A failed provisioning call.
///
/// Carries the error, whether the call is complete, and the volume as far as
/// it had been built.  The controller needs the partial volume to decide on
/// cleanup: when `state` is [`ProvisioningState::InBackground`] the
/// directory named by `volume` may exist.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
#[error("provisioning {state}: {error}")]
pub struct ProvisionFailure {
    #[source]
    pub error: ProvisionError,
    pub state: ProvisioningState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Box<Volume>>,
}

impl ProvisionFailure {
    /// A terminal failure before any volume was built.
    pub fn rejected(error: ProvisionError) -> Self {
        Self {
            error,
            state: ProvisioningState::Finished,
            volume: None,
        }
    }

    /// A failure after the volume had been built.
    pub fn with_volume(error: ProvisionError, state: ProvisioningState, volume: Volume) -> Self {
        Self {
            error,
            state,
            volume: Some(Box::new(volume)),
        }
    }
}

impl From<ProvisionError> for ProvisionFailure {
    fn from(error: ProvisionError) -> Self {
        Self::rejected(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProvisionError::MissingParameter("path".into());
        assert_eq!(err.to_string(), "parameter 'path' not found");

        let err = ProvisionError::create_failed("/mnt/local/v", "permission denied");
        assert_eq!(
            err.to_string(),
            "create /mnt/local/v failed: permission denied"
        );
    }

    #[test]
    fn retry_classification() {
        assert!(!ProvisionError::MissingParameter("path".into()).is_retryable());
        assert!(!ProvisionError::VolumeAlreadyExists("/x".into()).is_retryable());
        assert!(!ProvisionError::create_failed("/x", "eio").is_retryable());
        assert!(ProvisionError::delete_failed("/x", "eio").is_retryable());
        assert!(ProvisionError::DeadlineExceeded("delete /x".into()).is_retryable());
    }

    #[test]
    fn failure_display_includes_state() {
        let failure = ProvisionFailure::rejected(ProvisionError::MissingParameter("path".into()));
        assert_eq!(
            failure.to_string(),
            "provisioning finished: parameter 'path' not found"
        );
        assert!(failure.volume.is_none());
    }

    #[test]
    fn error_serde_roundtrip() {
        let err = ProvisionError::delete_failed("/mnt/local/v", "device busy");
        let json = serde_json::to_string(&err).expect("serialize");
        let de: ProvisionError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err, de);
    }
}
