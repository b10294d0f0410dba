//! Error surface for the render graph. Wraps the RHI's error type and adds
//! the failure modes that only make sense once resources and nodes have
//! dependencies on each other.

use thiserror::Error;

use rg_rhi::RhiError;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// A node referenced a `ResourceId` the registry has no entry for, or
    /// that entry was retired by a previous frame's compile.
    #[error("unknown resource {0:?}")]
    UnknownResource(crate::ResourceId),

    /// A node read or wrote a resource using a stale version: the handle was
    /// obtained before a later `write()` bumped the version, so the node's
    /// view of the resource's dependency chain is outdated.
    #[error("resource {0:?} used at version {1}, but current version is {2}")]
    VersionMismatch(crate::ResourceId, u32, u32),
}

impl GraphError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GraphError::Rhi(e) if e.is_recoverable())
    }
}
