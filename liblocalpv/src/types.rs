//! Core types: claims, storage classes, volumes, and node affinity.
//!
//! The shapes mirror the platform's own `PersistentVolumeClaim`,
//! `StorageClass` and `PersistentVolume` objects closely enough that they can
//! be exchanged as JSON with the reconciliation controller (field names are
//! camelCase on the wire).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Resource name of the storage request / capacity entry.
pub const RESOURCE_STORAGE: &str = "storage";

/// Well-known node label holding the node's hostname.
pub const LABEL_HOSTNAME: &str = "kubernetes.io/hostname";

// ---------------------------------------------------------------------------
// Quantities & modes
// ---------------------------------------------------------------------------

/// A resource quantity such as `"5Gi"`.
///
/// Quantities are carried verbatim from the claim to the volume; they are
/// never parsed or normalised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Quantity(pub String);

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Quantity {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// How a volume may be mounted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Read-write by a single node.
    ReadWriteOnce,
    /// Read-only by many nodes.
    ReadOnlyMany,
    /// Read-write by many nodes.
    ReadWriteMany,
    /// Read-write by a single pod.
    ReadWriteOncePod,
}

/// Whether the volume is consumed as a filesystem or a raw block device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VolumeMode {
    Filesystem,
    Block,
}

/// What happens to the backing storage once the volume is released.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReclaimPolicy {
    /// The backing storage is destroyed together with the volume.
    Delete,
    /// The backing storage outlives the volume.
    Retain,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Resource requests of a claim, keyed by resource name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: BTreeMap<String, Quantity>,
}

/// A request for storage submitted by a workload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClaim {
    /// Claim name; the volume name is derived from it.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub access_modes: Vec<AccessMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mode: Option<VolumeMode>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

impl StorageClaim {
    /// The requested storage capacity, if any.
    pub fn storage_request(&self) -> Option<&Quantity> {
        self.resources.requests.get(RESOURCE_STORAGE)
    }
}

/// A storage class: a named bundle of provisioning parameters.
///
/// The local directory backend requires a `path` parameter naming the root
/// directory under which volumes of this class are created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClass {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Everything a single provisioning call needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionOptions {
    pub claim: StorageClaim,
    pub storage_class: StorageClass,
}

// ---------------------------------------------------------------------------
// Node affinity
// ---------------------------------------------------------------------------

/// Operator of a [`NodeSelectorRequirement`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

/// A single `key <operator> values` constraint on node labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: NodeSelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Requirements that must all hold (logical AND).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorTerm {
    #[serde(default)]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

/// Terms of which at least one must hold (logical OR).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    #[serde(default)]
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

/// Placement constraint attached to a volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeNodeAffinity {
    pub required: NodeSelector,
}

impl VolumeNodeAffinity {
    /// Affinity that admits exactly one node, matched by hostname label.
    pub fn pinned_to(node_name: &str) -> Self {
        Self {
            required: NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: vec![NodeSelectorRequirement {
                        key: LABEL_HOSTNAME.to_owned(),
                        operator: NodeSelectorOperator::In,
                        values: vec![node_name.to_owned()],
                    }],
                }],
            },
        }
    }

    /// Return the node this affinity pins to, when it has the single-term,
    /// single-hostname shape produced by [`Self::pinned_to`].
    pub fn pinned_node(&self) -> Option<&str> {
        let [term] = self.required.node_selector_terms.as_slice() else {
            return None;
        };
        let [req] = term.match_expressions.as_slice() else {
            return None;
        };
        match (req.key.as_str(), req.operator, req.values.as_slice()) {
            (LABEL_HOSTNAME, NodeSelectorOperator::In, [node]) => Some(node.as_str()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Volume descriptor
// ---------------------------------------------------------------------------

/// Backing location of a local volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalVolumeSource {
    pub path: String,
}

/// A provisioned volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Globally unique volume name, `<claim>-<uuid>`.
    pub name: String,
    /// Capacity copied verbatim from the claim's requests.
    pub capacity: BTreeMap<String, Quantity>,
    #[serde(default)]
    pub access_modes: Vec<AccessMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mode: Option<VolumeMode>,
    pub reclaim_policy: ReclaimPolicy,
    #[serde(default)]
    pub storage_class_name: String,
    pub local: LocalVolumeSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_affinity: Option<VolumeNodeAffinity>,
}

impl Volume {
    /// The directory backing this volume.
    pub fn backend_path(&self) -> &Path {
        Path::new(&self.local.path)
    }

    pub fn storage_capacity(&self) -> Option<&Quantity> {
        self.capacity.get(RESOURCE_STORAGE)
    }

    /// The node the volume is bound to, if its affinity pins one.
    pub fn pinned_node(&self) -> Option<&str> {
        self.node_affinity.as_ref()?.pinned_node()
    }
}

// ---------------------------------------------------------------------------
// Provisioning outcome
// ---------------------------------------------------------------------------

/// Whether a provisioning call has reached a final answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProvisioningState {
    /// The call is complete; it will not make further progress on its own.
    Finished,
    /// The call was cut short and its filesystem effect is unknown.  The
    /// caller must treat the volume as possibly created and clean up through
    /// the delete path.
    InBackground,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => f.write_str("finished"),
            Self::InBackground => f.write_str("in background"),
        }
    }
}

/// Information about a running provisioner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionerInfo {
    /// Name storage classes use to select this provisioner.
    pub name: String,
    /// Node whose local filesystem hosts the volumes.
    pub node_name: String,
    pub version: String,
}
