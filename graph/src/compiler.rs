//! Compiler (C8): turns an authored (registering-state) graph into an
//! executable one.
//!
//! Three passes, in order, matter for correctness:
//!
//! 1. Pipeline readiness is checked *before* anything else touches the
//!    transient cache or the device. A node with an unresolved pipeline slot
//!    aborts the whole compile with `RhiError::NotReady`, and because nothing
//!    has been materialized yet, the caller can simply retry next frame —
//!    there is no partial state to unwind.
//! 2. Resource materialization: transient resources are pulled from (or, on
//!    a miss, created and later released into) the transient cache; named
//!    resources use whatever was imported for them.
//! 3. Nodes are partitioned into the ones that execute against ordinary
//!    compiled resources and the ones that write the swapchain-imported
//!    image, so the executor can run the latter as a dedicated present pass.

use log::debug;

use rg_rhi::cache::TransientCache;
use rg_rhi::{Buffer, Device, RhiError, Texture};

use crate::error::GraphError;
use crate::node::Node;
use crate::registry::{CompiledResource, ResourceKind, ResourceOrigin, ResourceRegistry};

pub(crate) struct CompiledGraph {
    pub nodes: Vec<Node>,
    pub present_node_indices: Vec<usize>,
}

fn check_pipelines_ready(nodes: &[Node]) -> Result<(), GraphError> {
    for node in nodes {
        if let Some(p) = &node.raster_pipeline {
            if p.get().is_none() {
                return Err(GraphError::Rhi(RhiError::NotReady(format!("raster pipeline for node '{}' is still compiling", node.name))));
            }
        }
        if let Some(p) = &node.compute_pipeline {
            if p.get().is_none() {
                return Err(GraphError::Rhi(RhiError::NotReady(format!("compute pipeline for node '{}' is still compiling", node.name))));
            }
        }
    }
    Ok(())
}

fn materialize_resources(
    registry: &mut ResourceRegistry,
    device: &dyn Device,
    buffer_cache: &mut TransientCache<Box<dyn Buffer>>,
    texture_cache: &mut TransientCache<Box<dyn Texture>>,
) -> Result<(), GraphError> {
    for entry in registry.entries.iter_mut() {
        if entry.compiled.is_some() {
            continue;
        }
        if entry.first_use.is_none() {
            // Declared but never referenced by a node; nothing to materialize.
            continue;
        }
        if !matches!(entry.origin, ResourceOrigin::Transient) {
            continue;
        }
        let hash = entry.kind.descriptor_hash();
        entry.compiled = Some(match &entry.kind {
            ResourceKind::Buffer(desc) => {
                let buffer = match buffer_cache.acquire(hash) {
                    Some(b) => b,
                    None => device.create_buffer(desc)?,
                };
                CompiledResource::Buffer(buffer)
            }
            ResourceKind::Texture(desc) => {
                let texture = match texture_cache.acquire(hash) {
                    Some(t) => t,
                    None => device.create_texture(desc)?,
                };
                CompiledResource::Texture(texture)
            }
        });
    }
    Ok(())
}

/// A node is a present node if any of its outputs targets a named resource
/// that the registry is still waiting to bind to an acquired swapchain image
/// (C10: the presentation slot is `PendingPresent` until the executor's
/// present phase acquires a frame).
fn is_present_node(node: &Node, registry: &ResourceRegistry) -> bool {
    node.outputs.iter().any(|use_| match registry.entries.get(use_.resource.index as usize) {
        Some(entry) => matches!(&entry.compiled, Some(CompiledResource::PendingPresent)) || (entry.compiled.is_none() && registry.is_named(use_.resource)),
        None => false,
    })
}

pub(crate) fn compile(
    mut nodes: Vec<Node>,
    registry: &mut ResourceRegistry,
    device: &dyn Device,
    buffer_cache: &mut TransientCache<Box<dyn Buffer>>,
    texture_cache: &mut TransientCache<Box<dyn Texture>>,
) -> Result<CompiledGraph, GraphError> {
    check_pipelines_ready(&nodes)?;
    materialize_resources(registry, device, buffer_cache, texture_cache)?;
    registry.mark_compiled();

    let mut present_node_indices = Vec::new();
    let mut present: Vec<Node> = Vec::new();
    let mut execute: Vec<Node> = Vec::new();
    for node in nodes.drain(..) {
        if is_present_node(&node, registry) {
            present.push(node);
        } else {
            execute.push(node);
        }
    }
    let split = execute.len();
    execute.extend(present);
    for i in split..execute.len() {
        present_node_indices.push(i);
    }

    debug!("compiled render graph: {} execute node(s), {} present node(s)", split, execute.len() - split);
    Ok(CompiledGraph { nodes: execute, present_node_indices })
}
