//! Provisioner configuration.
//!
//! The library never reads the process environment by itself: the binary
//! builds a [`ProvisionerConfig`] once at startup and injects it.
//!
//! Environment variables:
//! - `NODE_NAME`: identity of the node this process runs on.  Required; it is
//!   written into the node affinity of every volume.
//! - `LOCALPV_PROVISIONER_NAME`: name storage classes use to select this
//!   provisioner.  Defaults to `local-provisioner`.
//! - `LOCALPV_OP_TIMEOUT_SECS`: deadline for a single filesystem operation.
//!   Defaults to `30`.

use std::time::Duration;

use crate::error::ProvisionError;

pub const ENV_NODE_NAME: &str = "NODE_NAME";
pub const ENV_PROVISIONER_NAME: &str = "LOCALPV_PROVISIONER_NAME";
pub const ENV_OP_TIMEOUT_SECS: &str = "LOCALPV_OP_TIMEOUT_SECS";

pub const DEFAULT_PROVISIONER_NAME: &str = "local-provisioner";
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime configuration of a provisioner process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerConfig {
    /// Node whose local filesystem hosts the volumes.
    pub node_name: String,
    /// Provisioner name referenced by storage classes.
    pub provisioner_name: String,
    /// Deadline for a single directory create or remove.
    pub op_timeout: Duration,
}

impl ProvisionerConfig {
    /// Configuration with defaults for everything but the node identity.
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            provisioner_name: DEFAULT_PROVISIONER_NAME.to_owned(),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ProvisionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProvisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let node_name = lookup(ENV_NODE_NAME)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                ProvisionError::InvalidArgument(format!("{ENV_NODE_NAME} is not set"))
            })?;

        let provisioner_name = lookup(ENV_PROVISIONER_NAME)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROVISIONER_NAME.to_owned());

        let op_timeout = match lookup(ENV_OP_TIMEOUT_SECS) {
            None => DEFAULT_OP_TIMEOUT,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ProvisionError::InvalidArgument(format!(
                        "{ENV_OP_TIMEOUT_SECS} must be a positive number of seconds, got {raw:?}"
                    )));
                }
            },
        };

        Ok(Self {
            node_name: node_name.trim().to_owned(),
            provisioner_name,
            op_timeout,
        })
    }
}
