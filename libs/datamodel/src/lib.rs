//! Data model shared by the nodecheck crates.
//!
//! - [`NodeBootstrappingConfiguration`]: the parameter tree a node's startup
//!   payload is rendered from. It is an owned tree, so `Clone` is a full deep
//!   copy and scenario copies never share state with the cluster's base
//!   configuration.
//! - [`ClusterModel`]: the cluster properties scenarios select on.
//! - [`NodeBootstrapping`]: the rendered payload handed to the create call.
//! - [`ConfigHash`]: a stable fingerprint of any serializable value.

mod cluster;
mod error;
mod hash;
mod nbc;

pub use cluster::*;
pub use error::MutationError;
pub use hash::ConfigHash;
pub use nbc::*;
