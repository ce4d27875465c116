//! # nodecheck-id
//!
//! Identifiers used by a nodecheck run.
//!
//! - [`RunId`]: one per invocation, `run_{ulid}`. Stamped on every
//!   provisioned resource as a tag so stray resources can be traced back.
//! - [`VmssName`]: the generated name of a transient scale set,
//!   `abtest` followed by four lowercase letters.
//! - [`NameRegistry`]: hands out `VmssName`s that are unique within a run.

mod error;
mod types;

pub use error::IdError;
pub use types::{NameRegistry, RunId, VmssName};
use ulid::Ulid;
