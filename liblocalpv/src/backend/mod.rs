//! Storage backend implementations.
//!
//! Each backend module provides a concrete type that implements
//! [`Provisioner`](crate::provisioner::Provisioner).

pub mod local;
