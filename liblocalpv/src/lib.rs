//! # liblocalpv — local directory volumes for RK8s
//!
//! `liblocalpv` provisions and deprovisions directory-backed volumes that are
//! pinned to the node hosting the directory.  A claim is mapped onto a fresh
//! directory `<class path>/<claim name>-<uuid>`, and the returned [`Volume`]
//! carries a node affinity that restricts consumers to this node.  Deleting a
//! volume removes its directory tree; removing an absent tree succeeds.
//!
//! The crate follows the RK8s conventions: Tokio for filesystem I/O,
//! `tracing` for observability, `thiserror` for structured errors.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Data model: claims, storage classes, `Volume`, node affinity. |
//! | [`error`] | [`ProvisionError`] and [`ProvisionFailure`]. |
//! | [`naming`] | Volume name and backing path derivation. |
//! | [`provisioner`] | [`Provisioner`] trait: provision / delete. |
//! | [`backend`] | The local directory backend. |
//! | [`message`] | [`ProvisionerMessage`] request/response envelope. |
//! | [`service`] | Dispatch of envelopes onto a [`Provisioner`]. |
//! | [`config`] | Environment-driven [`ProvisionerConfig`]. |

pub mod backend;
pub mod config;
pub mod error;
pub mod message;
pub mod naming;
pub mod provisioner;
pub mod service;
pub mod types;

pub use backend::local::LocalDirProvisioner;
pub use config::ProvisionerConfig;
pub use error::{ProvisionError, ProvisionFailure};
pub use message::ProvisionerMessage;
pub use provisioner::Provisioner;
pub use types::*;
