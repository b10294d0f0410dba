//! Resource registry (C5): the render graph's resource data model.
//!
//! The registry alternates between two states per the frame lifecycle:
//! `Registering` while nodes are being authored (the graph accepts new
//! resource declarations and node uses), and `Compiled` once the compiler
//! has materialized everything and the executor is recording. `retire()`
//! returns the registry to `Registering` for the next frame, dropping
//! transient entries and resetting the lifetime bookkeeping on entries that
//! survive (imported/named resources).

use std::collections::HashMap;

use rg_rhi::{Buffer, Texture};

use crate::error::GraphError;
use crate::handle::{ResourceId, ResourceKind};

/// Sentinel `last_use` for a resource whose liveness extends past this
/// frame's authored nodes (every named/imported resource — see the resolver,
/// C7).
pub const ENDLESS: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegistryState {
    Registering,
    Compiled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceOrigin {
    /// Lives only for the frame that created it; returned to the transient
    /// cache at `retire()`.
    Transient,
    /// Supplied by the embedder (a persistent engine-owned resource, or a
    /// swapchain image) and kept across frames under a stable name.
    Imported,
}

pub(crate) enum CompiledResource {
    Buffer(Box<dyn Buffer>),
    Texture(Box<dyn Texture>),
    /// A named texture slot reserved for a presentation image that hasn't
    /// been acquired from the swapchain yet (C10). Filled in by the present
    /// phase of the executor before any node reading it runs.
    PendingPresent,
}

pub(crate) struct ResourceEntry {
    pub kind: ResourceKind,
    pub origin: ResourceOrigin,
    pub name: Option<String>,
    pub version: u32,
    pub compiled: Option<CompiledResource>,
    pub first_use: Option<usize>,
    pub last_use: Option<usize>,
}

#[derive(Default)]
pub struct ResourceRegistry {
    pub(crate) state_inner: Option<RegistryState>,
    pub(crate) entries: Vec<ResourceEntry>,
    pub(crate) named: HashMap<String, u32>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self { state_inner: Some(RegistryState::Registering), entries: Vec::new(), named: HashMap::new() }
    }

    pub(crate) fn state(&self) -> RegistryState {
        self.state_inner.unwrap_or(RegistryState::Registering)
    }

    fn require_registering(&self) {
        assert_eq!(self.state(), RegistryState::Registering, "registry is not accepting new resource declarations mid-compile");
    }

    pub fn declare_transient(&mut self, kind: ResourceKind) -> ResourceId {
        self.require_registering();
        let index = self.entries.len() as u32;
        self.entries.push(ResourceEntry { kind, origin: ResourceOrigin::Transient, name: None, version: 0, compiled: None, first_use: None, last_use: None });
        ResourceId { index, version: 0 }
    }

    /// Imports a resource under a stable name. If the name was already
    /// imported in a previous frame the existing slot (and its current
    /// version) is reused rather than allocating a new one, so a node
    /// re-authored every frame against the same named handle keeps seeing
    /// monotonically increasing versions rather than resetting to zero.
    pub fn import_named(&mut self, name: &str, kind: ResourceKind, compiled: Option<CompiledResource>) -> ResourceId {
        self.require_registering();
        if let Some(&index) = self.named.get(name) {
            let entry = &mut self.entries[index as usize];
            entry.kind = kind;
            if compiled.is_some() {
                entry.compiled = compiled;
            }
            entry.first_use = None;
            entry.last_use = None;
            return ResourceId { index, version: entry.version };
        }
        let index = self.entries.len() as u32;
        self.entries.push(ResourceEntry { kind, origin: ResourceOrigin::Imported, name: Some(name.to_string()), version: 0, compiled, first_use: None, last_use: None });
        self.named.insert(name.to_string(), index);
        ResourceId { index, version: 0 }
    }

    pub fn is_named(&self, id: ResourceId) -> bool {
        matches!(self.entry(id), Ok(e) if matches!(e.origin, ResourceOrigin::Imported))
    }

    pub(crate) fn entry(&self, id: ResourceId) -> Result<&ResourceEntry, GraphError> {
        let entry = self.entries.get(id.index as usize).ok_or(GraphError::UnknownResource(id))?;
        if entry.version != id.version {
            return Err(GraphError::VersionMismatch(id, id.version, entry.version));
        }
        Ok(entry)
    }

    pub(crate) fn entry_mut(&mut self, id: ResourceId) -> Result<&mut ResourceEntry, GraphError> {
        let current_version = self.entries.get(id.index as usize).map(|e| e.version).ok_or(GraphError::UnknownResource(id))?;
        if current_version != id.version {
            return Err(GraphError::VersionMismatch(id, id.version, current_version));
        }
        Ok(&mut self.entries[id.index as usize])
    }

    /// Bumps a resource's version after a write, returning the new handle.
    /// A node that still holds the pre-write `ResourceId` will fail version
    /// validation the next time it's resolved, surfacing the read-before-write
    /// ordering bug rather than silently reading stale data.
    pub fn bump_version(&mut self, id: ResourceId) -> Result<ResourceId, GraphError> {
        let entry = self.entry_mut(id)?;
        entry.version += 1;
        Ok(ResourceId { index: id.index, version: entry.version })
    }

    pub(crate) fn set_lifetime(&mut self, index: u32, first: usize, last: usize) {
        let entry = &mut self.entries[index as usize];
        entry.first_use = Some(first);
        entry.last_use = Some(last);
    }

    pub(crate) fn mark_compiled(&mut self) {
        self.state_inner = Some(RegistryState::Compiled);
    }

    /// Drops transient entries and resets lifetime bookkeeping on the rest,
    /// returning the registry to `Registering` for the next frame. Transient
    /// entries' compiled resources are handed back to the caller so they can
    /// be released into the transient cache (C4) rather than destroyed.
    pub(crate) fn retire(&mut self) -> Vec<(u64, CompiledResource)> {
        let mut released = Vec::new();
        let mut keep = Vec::with_capacity(self.entries.len());
        let mut remap: HashMap<u32, u32> = HashMap::new();
        for (old_index, mut entry) in self.entries.drain(..).enumerate() {
            match entry.origin {
                ResourceOrigin::Transient => {
                    if let Some(compiled) = entry.compiled.take() {
                        released.push((entry.kind.descriptor_hash(), compiled));
                    }
                }
                ResourceOrigin::Imported => {
                    entry.first_use = None;
                    entry.last_use = None;
                    let new_index = keep.len() as u32;
                    remap.insert(old_index as u32, new_index);
                    keep.push(entry);
                }
            }
        }
        self.entries = keep;
        self.named.retain(|_, index| {
            if let Some(&new_index) = remap.get(index) {
                *index = new_index;
                true
            } else {
                false
            }
        });
        self.state_inner = Some(RegistryState::Registering);
        released
    }
}
