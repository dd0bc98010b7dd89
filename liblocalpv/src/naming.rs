//! Volume name and backing path derivation.
//!
//! A volume's directory is fully determined by its name and the storage
//! class `path` parameter:
//!
//! ```text
//! <class path>/
//!   <claim name>-<uuid>/     # one directory per volume
//! ```

use std::path::{Path, PathBuf};

use crate::error::ProvisionError;
use crate::types::StorageClass;

/// Storage class parameter naming the root directory of the class.
pub const PARAM_PATH: &str = "path";

/// Derive a fresh volume name for `claim_name`.
///
/// Every call yields a new UUID v4 suffix, so two calls never produce the
/// same name, even for the same claim.
pub fn volume_name(claim_name: &str) -> String {
    format!("{claim_name}-{}", uuid::Uuid::new_v4())
}

/// Directory backing the volume `name` under the class root `root`.
pub fn backend_path(root: impl AsRef<Path>, name: &str) -> PathBuf {
    root.as_ref().join(name)
}

/// Look up the root directory of a storage class.
///
/// The root must be absolute: volume paths derived from it are handed back to
/// [`delete`](crate::Provisioner::delete), which only accepts absolute paths.
pub fn class_root(class: &StorageClass) -> Result<&str, ProvisionError> {
    let path = match class.parameters.get(PARAM_PATH) {
        Some(path) if !path.is_empty() => path,
        _ => return Err(ProvisionError::MissingParameter(PARAM_PATH.to_owned())),
    };
    if !Path::new(path).is_absolute() {
        return Err(ProvisionError::InvalidArgument(format!(
            "parameter '{PARAM_PATH}' must be an absolute path, got {path:?}"
        )));
    }
    Ok(path)
}
