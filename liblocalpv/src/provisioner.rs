//! Provisioner service trait.
//!
//! The reconciliation controller calls [`Provisioner::provision`] when a claim
//! needs a volume and [`Provisioner::delete`] once a released volume must be
//! destroyed.  Implementations hold no per-volume state between calls, so
//! calls for different claims may run concurrently.

use async_trait::async_trait;

use crate::error::{ProvisionError, ProvisionFailure};
use crate::types::{ProvisionOptions, ProvisionerInfo, ProvisioningState, Volume};

/// Volume lifecycle: provisioning and deprovisioning.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision a volume for `options.claim` using `options.storage_class`.
    ///
    /// On success the returned [`Volume`] is fully populated and its backing
    /// storage exists.  On failure the [`ProvisionFailure`] carries the volume
    /// as far as it had been built.
    async fn provision(
        &self,
        options: ProvisionOptions,
    ) -> Result<(Volume, ProvisioningState), ProvisionFailure>;

    /// Destroy the backing storage of `volume`.
    ///
    /// This is idempotent: deleting a volume whose storage is already gone
    /// succeeds.
    async fn delete(&self, volume: &Volume) -> Result<(), ProvisionError>;

    /// Return information about this provisioner.
    fn info(&self) -> ProvisionerInfo;
}
