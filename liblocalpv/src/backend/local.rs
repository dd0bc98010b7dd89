//! Local directory storage backend.
//!
//! [`LocalDirProvisioner`] backs every volume with one directory on the local
//! filesystem of the node it runs on, and pins the volume to that node.
//!
//! # On-disk layout
//!
//! ```text
//! <class path>/
//!   <claim name>-<uuid>/    # mode 0775, removed recursively on delete
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::config::{DEFAULT_OP_TIMEOUT, DEFAULT_PROVISIONER_NAME, ProvisionerConfig};
use crate::error::{ProvisionError, ProvisionFailure};
use crate::naming;
use crate::provisioner::Provisioner;
use crate::types::*;

/// Permission bits of a volume directory: owner and group rwx, no world access.
pub const VOLUME_DIR_MODE: u32 = 0o775;

/// Filesystem operations behind a volume's lifecycle.
#[async_trait]
pub(crate) trait VolumeDirs: Send + Sync + std::fmt::Debug {
    /// Create the volume directory `path`; see [`create_volume_dir`].
    async fn create(&self, path: &Path) -> std::io::Result<()>;

    /// Remove the tree rooted at `path`.
    async fn remove_all(&self, path: &Path) -> std::io::Result<()>;
}

/// Directories on the host filesystem.
#[derive(Debug)]
struct HostDirs;

#[async_trait]
impl VolumeDirs for HostDirs {
    async fn create(&self, path: &Path) -> std::io::Result<()> {
        create_volume_dir(path).await
    }

    async fn remove_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_dir_all(path).await
    }
}

/// Provisioner backed by plain directories on the local node.
///
/// Holds no per-volume state; every call derives everything it needs from its
/// arguments, so calls for different claims may run concurrently.
#[derive(Debug, Clone)]
pub struct LocalDirProvisioner {
    /// Name storage classes use to select this provisioner.
    name: String,
    /// Node written into the affinity of every volume.
    node_name: String,
    /// Deadline for a single directory create or remove.
    op_timeout: Duration,
    dirs: Arc<dyn VolumeDirs>,
}

impl LocalDirProvisioner {
    /// Create a provisioner pinning volumes to `node_name`.
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_PROVISIONER_NAME.to_owned(),
            node_name: node_name.into(),
            op_timeout: DEFAULT_OP_TIMEOUT,
            dirs: Arc::new(HostDirs),
        }
    }

    pub fn from_config(config: &ProvisionerConfig) -> Self {
        Self {
            name: config.provisioner_name.clone(),
            node_name: config.node_name.clone(),
            op_timeout: config.op_timeout,
            dirs: Arc::new(HostDirs),
        }
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_dirs(mut self, dirs: Arc<dyn VolumeDirs>) -> Self {
        self.dirs = dirs;
        self
    }

    /// Build the volume for `options` without touching the filesystem.
    fn build_volume(&self, options: &ProvisionOptions, name: String, path: String) -> Volume {
        let claim = &options.claim;
        let capacity = claim
            .storage_request()
            .map(|q| BTreeMap::from([(RESOURCE_STORAGE.to_owned(), q.clone())]))
            .unwrap_or_default();

        Volume {
            name,
            capacity,
            access_modes: claim.access_modes.clone(),
            volume_mode: claim.volume_mode,
            reclaim_policy: ReclaimPolicy::Delete,
            storage_class_name: options.storage_class.name.clone(),
            local: LocalVolumeSource { path },
            node_affinity: Some(VolumeNodeAffinity::pinned_to(&self.node_name)),
        }
    }
}

/// Validate the parts of a claim the provisioner depends on.
///
/// The claim name becomes a single path component under the class root, so
/// it may not contain a separator or be a `.`/`..` component.
fn validate_claim(claim: &StorageClaim) -> Result<(), ProvisionError> {
    if claim.name.is_empty() {
        return Err(ProvisionError::InvalidArgument(
            "claim name must not be empty".to_owned(),
        ));
    }
    if claim.name.contains(['/', '\0']) || claim.name == "." || claim.name == ".." {
        return Err(ProvisionError::InvalidArgument(format!(
            "claim name {:?} is not a valid path component",
            claim.name
        )));
    }
    if claim.storage_request().is_none() {
        return Err(ProvisionError::InvalidArgument(format!(
            "claim {} has no {RESOURCE_STORAGE} request",
            claim.name
        )));
    }
    Ok(())
}

/// Create a single volume directory with [`VOLUME_DIR_MODE`].
///
/// Fails with [`ErrorKind::AlreadyExists`] if `path` exists.  Parent
/// directories are not created.  The mode is applied explicitly after
/// creation so the process umask cannot narrow it; if that fails the fresh
/// directory is removed again, so on error the directory does not exist.
pub(crate) async fn create_volume_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.mode(VOLUME_DIR_MODE);
    builder.create(path).await?;

    let perms = std::fs::Permissions::from_mode(VOLUME_DIR_MODE);
    if let Err(e) = tokio::fs::set_permissions(path, perms).await {
        if let Err(cleanup) = tokio::fs::remove_dir(path).await {
            warn!(
                path = %path.display(),
                error = %cleanup,
                "failed to remove directory after chmod failure"
            );
        }
        return Err(e);
    }
    Ok(())
}

/// Check that `path` can be handed to a recursive remove.
fn check_delete_path(volume: &Volume) -> Result<&Path, ProvisionError> {
    let path = volume.backend_path();
    if volume.local.path.is_empty() {
        return Err(ProvisionError::InvalidArgument(format!(
            "volume {} has no local path",
            volume.name
        )));
    }
    // Refuse relative paths and the filesystem root.
    if !path.is_absolute() || path.parent().is_none() {
        return Err(ProvisionError::InvalidArgument(format!(
            "volume {} has unusable local path {}",
            volume.name,
            path.display()
        )));
    }
    Ok(path)
}

// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

#[async_trait]
impl Provisioner for LocalDirProvisioner {
    #[instrument(skip(self, options), fields(claim = %options.claim.name))]
    async fn provision(
        &self,
        options: ProvisionOptions,
    ) -> Result<(Volume, ProvisioningState), ProvisionFailure> {
        validate_claim(&options.claim)?;
        let root = naming::class_root(&options.storage_class)?;

        let name = naming::volume_name(&options.claim.name);
        let path = naming::backend_path(root, &name);
        let path_str = path.to_string_lossy().into_owned();
        let volume = self.build_volume(&options, name, path_str.clone());

        info!(path = %path_str, "creating volume directory");
        match tokio::time::timeout(self.op_timeout, self.dirs.create(&path)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ProvisionFailure::with_volume(
                    ProvisionError::VolumeAlreadyExists(path_str),
                    ProvisioningState::Finished,
                    volume,
                ));
            }
            Ok(Err(e)) => {
                return Err(ProvisionFailure::with_volume(
                    ProvisionError::create_failed(path_str, e),
                    ProvisioningState::Finished,
                    volume,
                ));
            }
            Err(_) => {
                warn!(
                    path = %path_str,
                    timeout = ?self.op_timeout,
                    "volume directory creation timed out"
                );
                return Err(ProvisionFailure::with_volume(
                    ProvisionError::DeadlineExceeded(format!("create {path_str}")),
                    ProvisioningState::InBackground,
                    volume,
                ));
            }
        }

        info!(volume = %volume.name, path = %path_str, "volume directory created");
        Ok((volume, ProvisioningState::Finished))
    }

    #[instrument(skip(self, volume), fields(volume = %volume.name))]
    async fn delete(&self, volume: &Volume) -> Result<(), ProvisionError> {
        let path = check_delete_path(volume)?;

        info!(path = %path.display(), "deleting volume directory");
        match tokio::time::timeout(self.op_timeout, self.dirs.remove_all(path)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "volume directory already gone");
            }
            Ok(Err(e)) => {
                return Err(ProvisionError::delete_failed(volume.local.path.clone(), e));
            }
            Err(_) => {
                return Err(ProvisionError::DeadlineExceeded(format!(
                    "delete {}",
                    path.display()
                )));
            }
        }

        info!(path = %path.display(), "volume directory deleted");
        Ok(())
    }

    fn info(&self) -> ProvisionerInfo {
        ProvisionerInfo {
            name: self.name.clone(),
            node_name: self.node_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn make_provisioner() -> LocalDirProvisioner {
        LocalDirProvisioner::new("test-node")
    }

    /// Operations that never complete.
    #[derive(Debug)]
    struct StalledDirs;

    #[async_trait]
    impl VolumeDirs for StalledDirs {
        async fn create(&self, _path: &Path) -> std::io::Result<()> {
            std::future::pending().await
        }

        async fn remove_all(&self, _path: &Path) -> std::io::Result<()> {
            std::future::pending().await
        }
    }

    /// Operations that fail immediately with a fixed error kind.
    #[derive(Debug)]
    struct FailingDirs(ErrorKind);

    #[async_trait]
    impl VolumeDirs for FailingDirs {
        async fn create(&self, _path: &Path) -> std::io::Result<()> {
            Err(std::io::Error::from(self.0))
        }

        async fn remove_all(&self, _path: &Path) -> std::io::Result<()> {
            Err(std::io::Error::from(self.0))
        }
    }

    fn options(root: &Path, claim_name: &str) -> ProvisionOptions {
        ProvisionOptions {
            claim: StorageClaim {
                name: claim_name.into(),
                access_modes: vec![AccessMode::ReadWriteOnce],
                volume_mode: Some(VolumeMode::Filesystem),
                resources: ResourceRequirements {
                    requests: BTreeMap::from([(RESOURCE_STORAGE.into(), "5Gi".into())]),
                },
                ..Default::default()
            },
            storage_class: StorageClass {
                name: "local".into(),
                parameters: BTreeMap::from([(
                    naming::PARAM_PATH.into(),
                    root.to_string_lossy().into_owned(),
                )]),
            },
        }
    }

    #[tokio::test]
    async fn provision_and_delete_volume() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = make_provisioner();

        let (vol, state) = provisioner
            .provision(options(tmp.path(), "data-1"))
            .await
            .unwrap();

        assert_eq!(state, ProvisioningState::Finished);
        assert!(vol.name.starts_with("data-1-"));
        assert_eq!(vol.backend_path(), tmp.path().join(&vol.name));
        assert!(vol.backend_path().is_dir());

        let mode = std::fs::metadata(vol.backend_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o775);

        provisioner.delete(&vol).await.unwrap();
        assert!(!vol.backend_path().exists());
    }

    #[tokio::test]
    async fn provision_copies_claim_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = make_provisioner();

        let (vol, _) = provisioner
            .provision(options(tmp.path(), "data-1"))
            .await
            .unwrap();

        assert_eq!(vol.storage_capacity(), Some(&Quantity::from("5Gi")));
        assert_eq!(vol.access_modes, vec![AccessMode::ReadWriteOnce]);
        assert_eq!(vol.volume_mode, Some(VolumeMode::Filesystem));
        assert_eq!(vol.reclaim_policy, ReclaimPolicy::Delete);
        assert_eq!(vol.storage_class_name, "local");
        assert_eq!(vol.pinned_node(), Some("test-node"));
    }

    #[tokio::test]
    async fn provision_without_path_parameter() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = make_provisioner();
        let mut opts = options(tmp.path(), "data-1");
        opts.storage_class.parameters.clear();

        let failure = provisioner.provision(opts).await.unwrap_err();
        assert_eq!(
            failure.error,
            ProvisionError::MissingParameter("path".into())
        );
        assert_eq!(failure.state, ProvisioningState::Finished);
        assert!(failure.volume.is_none());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn provision_rejects_incomplete_claim() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = make_provisioner();

        let failure = provisioner
            .provision(options(tmp.path(), ""))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ProvisionError::InvalidArgument(_)));

        let mut opts = options(tmp.path(), "data-1");
        opts.claim.resources.requests.clear();
        let failure = provisioner.provision(opts).await.unwrap_err();
        assert!(matches!(failure.error, ProvisionError::InvalidArgument(_)));

        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn provision_rejects_claim_names_leaving_the_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let outside = tmp.path().join("escape");
        let provisioner = make_provisioner();

        let names = [
            outside.to_string_lossy().into_owned(),
            "../escape".to_owned(),
            "a/b".to_owned(),
            "..".to_owned(),
            ".".to_owned(),
            "nul\0byte".to_owned(),
        ];
        for name in names {
            let failure = provisioner
                .provision(options(&root, &name))
                .await
                .unwrap_err();
            assert!(
                matches!(failure.error, ProvisionError::InvalidArgument(_)),
                "{name:?}"
            );
            assert!(failure.volume.is_none(), "{name:?}");
        }

        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn provision_reports_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner =
            make_provisioner().with_dirs(Arc::new(FailingDirs(ErrorKind::AlreadyExists)));

        let failure = provisioner
            .provision(options(tmp.path(), "data-1"))
            .await
            .unwrap_err();

        let vol = failure.volume.expect("partial volume");
        assert_eq!(
            failure.error,
            ProvisionError::VolumeAlreadyExists(vol.local.path.clone())
        );
        assert_eq!(failure.state, ProvisioningState::Finished);
        assert!(!failure.error.is_retryable());
        assert_eq!(vol.pinned_node(), Some("test-node"));
    }

    #[tokio::test]
    async fn provision_deadline_leaves_work_in_background() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = make_provisioner()
            .with_op_timeout(Duration::ZERO)
            .with_dirs(Arc::new(StalledDirs));

        let failure = provisioner
            .provision(options(tmp.path(), "data-1"))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ProvisionError::DeadlineExceeded(_)));
        assert_eq!(failure.state, ProvisioningState::InBackground);
        let vol = failure.volume.expect("partial volume");
        assert!(vol.name.starts_with("data-1-"));
        assert_eq!(vol.backend_path(), tmp.path().join(&vol.name));
    }

    #[tokio::test]
    async fn provision_into_missing_root_returns_partial_volume() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("absent");
        let provisioner = make_provisioner();

        let failure = provisioner
            .provision(options(&root, "data-1"))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ProvisionError::CreateFailed { .. }));
        assert_eq!(failure.state, ProvisioningState::Finished);
        let vol = failure.volume.expect("partial volume");
        assert!(vol.local.path.starts_with(root.to_str().unwrap()));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn create_volume_dir_refuses_existing_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vol");

        create_volume_dir(&path).await.unwrap();
        let err = create_volume_dir(&path).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = make_provisioner();

        let (vol, _) = provisioner
            .provision(options(tmp.path(), "data-1"))
            .await
            .unwrap();

        provisioner.delete(&vol).await.unwrap();
        provisioner.delete(&vol).await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_nested_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = make_provisioner();

        let (vol, _) = provisioner
            .provision(options(tmp.path(), "data-1"))
            .await
            .unwrap();
        let nested = vol.backend_path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("file"), b"payload").unwrap();
        std::fs::write(vol.backend_path().join("top"), b"payload").unwrap();

        provisioner.delete(&vol).await.unwrap();
        assert!(!vol.backend_path().exists());
        assert!(tmp.path().exists());
    }

    #[tokio::test]
    async fn delete_deadline_is_retryable() {
        let tmp = tempfile::tempdir().unwrap();
        let (vol, _) = make_provisioner()
            .provision(options(tmp.path(), "data-1"))
            .await
            .unwrap();

        let stalled = make_provisioner()
            .with_op_timeout(Duration::ZERO)
            .with_dirs(Arc::new(StalledDirs));
        let err = stalled.delete(&vol).await.unwrap_err();
        assert!(matches!(err, ProvisionError::DeadlineExceeded(_)));
        assert!(err.is_retryable());
        assert!(vol.backend_path().is_dir());
    }

    #[tokio::test]
    async fn delete_reports_io_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let locked = tmp.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        let provisioner = make_provisioner();

        let (vol, _) = provisioner
            .provision(options(&locked, "data-1"))
            .await
            .unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o500)).unwrap();

        // Permission bits do not bind root.
        let canary = locked.join("canary");
        if std::fs::create_dir(&canary).is_ok() {
            std::fs::remove_dir(&canary).unwrap();
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let err = provisioner.delete(&vol).await.unwrap_err();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        match &err {
            ProvisionError::DeleteFailed { path, .. } => assert_eq!(*path, vol.local.path),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_retryable());
        assert!(vol.backend_path().exists());

        provisioner.delete(&vol).await.unwrap();
        assert!(!vol.backend_path().exists());
    }

    #[tokio::test]
    async fn delete_reports_injected_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let (vol, _) = make_provisioner()
            .provision(options(tmp.path(), "data-1"))
            .await
            .unwrap();

        let failing =
            make_provisioner().with_dirs(Arc::new(FailingDirs(ErrorKind::PermissionDenied)));
        let err = failing.delete(&vol).await.unwrap_err();
        match &err {
            ProvisionError::DeleteFailed { path, .. } => assert_eq!(*path, vol.local.path),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_retryable());
        assert!(vol.backend_path().is_dir());
    }

    #[tokio::test]
    async fn delete_rejects_unusable_paths() {
        let provisioner = make_provisioner();
        let (mut vol, _) = {
            let tmp = tempfile::tempdir().unwrap();
            provisioner
                .provision(options(tmp.path(), "data-1"))
                .await
                .unwrap()
        };

        for bad in ["", "relative/dir", "/"] {
            vol.local.path = bad.into();
            let err = provisioner.delete(&vol).await.unwrap_err();
            assert!(matches!(err, ProvisionError::InvalidArgument(_)), "{bad}");
        }
    }

    #[test]
    fn provisioner_info() {
        let cfg = ProvisionerConfig {
            provisioner_name: "rk8s.io/local".into(),
            ..ProvisionerConfig::new("node-a")
        };
        let info = LocalDirProvisioner::from_config(&cfg).info();
        assert_eq!(info.name, "rk8s.io/local");
        assert_eq!(info.node_name, "node-a");
    }
}
