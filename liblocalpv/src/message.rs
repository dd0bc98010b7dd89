//! Provisioner protocol messages.
//!
//! [`ProvisionerMessage`] is the envelope exchanged with the reconciliation
//! controller: the controller sends one *request* variant and receives the
//! matching *response* variant (or [`ProvisionerMessage::Error`]).  Messages
//! travel as JSON.

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, ProvisionFailure};
use crate::types::*;

/// Top-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProvisionerMessage {
    // ----- Requests --------------------------------------------------------
    /// Provision a volume for a claim.
    Provision(ProvisionOptions),
    /// Delete a previously provisioned volume.
    Delete(Volume),
    /// Query provisioner info.
    GetInfo,

    // ----- Responses -------------------------------------------------------
    /// A volume was provisioned.
    Provisioned {
        volume: Volume,
        state: ProvisioningState,
    },
    /// Provisioning failed; may carry a partially built volume.
    ProvisionFailed(ProvisionFailure),
    /// The volume's storage is gone.
    Deleted,
    /// Provisioner information.
    Info(ProvisionerInfo),
    /// An error occurred.
    Error(ProvisionError),
}

impl ProvisionerMessage {
    /// Whether this is a failure response.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ProvisionFailed(_) | Self::Error(_))
    }
}

impl std::fmt::Display for ProvisionerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provision(opts) => write!(
                f,
                "Provision(claim={}, class={})",
                opts.claim.name, opts.storage_class.name
            ),
            Self::Delete(vol) => write!(f, "Delete({})", vol.name),
            Self::GetInfo => f.write_str("GetInfo"),
            Self::Provisioned { volume, state } => {
                write!(f, "Provisioned({}, {})", volume.name, state)
            }
            Self::ProvisionFailed(failure) => write!(f, "ProvisionFailed({})", failure),
            Self::Deleted => f.write_str("Deleted"),
            Self::Info(info) => write!(f, "Info(name={})", info.name),
            Self::Error(e) => write!(f, "Error({})", e),
        }
    }
}
