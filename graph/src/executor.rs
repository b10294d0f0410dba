//! Executor and barrier engine (C9).
//!
//! [`pre_transition_resources`] runs once per frame, before any node: it
//! walks every resource used anywhere in the frame and issues a single
//! batched barrier bringing each to the access state of its first use, from
//! `Undefined`. This establishes one authoritative initial layout for the
//! whole frame rather than leaving each node to discover its own first touch.
//!
//! [`run_nodes`]/[`run_present_nodes`] then run compiled nodes in authored
//! order. Before each node, every resource it declared is checked against the
//! access state it was left in by whatever touched it last (seeded by the
//! pre-transition pass for a first touch, so that resolves to a no-op); any
//! transition that isn't a no-op (`skip_sync_if_continuous`) is derived into
//! a barrier and all of a node's barriers are recorded as a single batched
//! `pipeline_barrier` call, never one call per resource.
//!
//! The presentation image is a special case: it's borrowed from the
//! swapchain for the duration of one `acquire_next_image` call rather than
//! owned by the registry like every other compiled resource, so present
//! nodes are run through [`run_present_nodes`], which takes that borrowed
//! texture directly instead of looking it up in the registry.

use std::collections::HashMap;

use rg_rhi::{AccessState, BarrierRequest, BufferBarrier, CommandEncoder, LayoutMode, Texture, TextureBarrier};

use crate::descriptor_cache::FrameDescriptorCache;
use crate::error::GraphError;
use crate::handle::ResourceId;
use crate::node::Node;
use crate::registry::{CompiledResource, ResourceRegistry};
use crate::resolved::ResolvedResources;

/// Tracks the access state every touched resource was last left in, across
/// the whole frame (keyed by registry slot index, not by versioned id, since
/// a write bumps the version but the barrier engine still needs continuity
/// with the pre-write state).
pub(crate) type AccessTimeline = HashMap<u32, AccessState>;

fn resolve_node_resources<'a>(node: &Node, registry: &'a ResourceRegistry, present_override: Option<(ResourceId, &'a dyn Texture)>) -> Result<ResolvedResources<'a>, GraphError> {
    let mut resolved = ResolvedResources::new();
    for use_ in node.inputs.iter().chain(node.outputs.iter()) {
        if let Some((override_id, texture)) = present_override {
            if use_.resource == override_id {
                resolved.textures.insert(use_.resource, texture);
                continue;
            }
        }
        let entry = registry.entry(use_.resource)?;
        match entry.compiled.as_ref() {
            Some(CompiledResource::Buffer(b)) => {
                resolved.buffers.insert(use_.resource, b.as_ref());
            }
            Some(CompiledResource::Texture(t)) => {
                resolved.textures.insert(use_.resource, t.as_ref());
            }
            Some(CompiledResource::PendingPresent) | None => {
                return Err(GraphError::Rhi(rg_rhi::RhiError::ValidationFailure(format!(
                    "node '{}' references resource {:?} before it was materialized",
                    node.name, use_.resource
                ))));
            }
        }
    }
    Ok(resolved)
}

fn record_node_barriers(
    encoder: &mut dyn CommandEncoder,
    node: &Node,
    registry: &ResourceRegistry,
    timeline: &mut AccessTimeline,
    present_override: Option<(ResourceId, &dyn Texture)>,
) -> Result<(), GraphError> {
    let mut buf_refs: Vec<BufferBarrier> = Vec::new();
    let mut tex_refs: Vec<TextureBarrier> = Vec::new();

    for use_ in node.inputs.iter().chain(node.outputs.iter()) {
        let idx = use_.resource.index;
        let previous = timeline.get(&idx).copied().unwrap_or(AccessState::Undefined);
        let next = use_.access;
        let request = BarrierRequest { previous, next, layout_mode: LayoutMode::Canonical, skip_sync_if_continuous: true };
        if rg_rhi::derive_barrier(request).is_some() {
            if let Some((override_id, texture)) = present_override {
                if use_.resource == override_id {
                    tex_refs.push(TextureBarrier { texture, src: previous, dst: next });
                    timeline.insert(idx, next);
                    continue;
                }
            }
            match registry.entry(use_.resource)?.compiled.as_ref() {
                Some(CompiledResource::Buffer(b)) => buf_refs.push(BufferBarrier { buffer: b.as_ref(), src: previous, dst: next }),
                Some(CompiledResource::Texture(t)) => tex_refs.push(TextureBarrier { texture: t.as_ref(), src: previous, dst: next }),
                _ => {}
            }
        }
        timeline.insert(idx, next);
    }

    if !buf_refs.is_empty() || !tex_refs.is_empty() {
        encoder.pipeline_barrier(&buf_refs, &tex_refs);
    }
    Ok(())
}

/// Issues one batched barrier transitioning every resource touched anywhere
/// in `nodes` to the access state of its first use this frame, from
/// `Undefined`, before any node records its own commands. This establishes
/// the single authoritative initial layout for the frame; each node's own
/// barrier (recorded later by [`run_nodes`]/[`run_present_nodes`]) then only
/// has to account for transitions *between* uses, since its first touch was
/// already brought to the right state here and resolves to a no-op.
pub(crate) fn pre_transition_resources(
    encoder: &mut dyn CommandEncoder,
    nodes: &[Node],
    registry: &ResourceRegistry,
    timeline: &mut AccessTimeline,
    present_override: Option<(ResourceId, &dyn Texture)>,
) -> Result<(), GraphError> {
    let mut buf_refs: Vec<BufferBarrier> = Vec::new();
    let mut tex_refs: Vec<TextureBarrier> = Vec::new();

    for node in nodes {
        for use_ in node.inputs.iter().chain(node.outputs.iter()) {
            let idx = use_.resource.index;
            if timeline.contains_key(&idx) {
                continue;
            }
            let next = use_.access;
            let request = BarrierRequest { previous: AccessState::Undefined, next, layout_mode: LayoutMode::Canonical, skip_sync_if_continuous: true };
            if rg_rhi::derive_barrier(request).is_some() {
                if let Some((override_id, texture)) = present_override {
                    if use_.resource == override_id {
                        tex_refs.push(TextureBarrier { texture, src: AccessState::Undefined, dst: next });
                        timeline.insert(idx, next);
                        continue;
                    }
                }
                match registry.entry(use_.resource)?.compiled.as_ref() {
                    Some(CompiledResource::Buffer(b)) => buf_refs.push(BufferBarrier { buffer: b.as_ref(), src: AccessState::Undefined, dst: next }),
                    Some(CompiledResource::Texture(t)) => tex_refs.push(TextureBarrier { texture: t.as_ref(), src: AccessState::Undefined, dst: next }),
                    _ => {}
                }
            }
            timeline.insert(idx, next);
        }
    }

    if !buf_refs.is_empty() || !tex_refs.is_empty() {
        encoder.pipeline_barrier(&buf_refs, &tex_refs);
    }
    Ok(())
}

/// Runs every node in `nodes` in order, recording barriers ahead of each and
/// invoking its closure. `timeline` carries the last-known access state for
/// every resource across calls, so a later call (the present pass) continues
/// exactly where this one left off rather than re-transitioning from
/// `Undefined`.
pub(crate) fn run_nodes(encoder: &mut dyn CommandEncoder, nodes: &mut [Node], registry: &ResourceRegistry, descriptor_cache: &mut FrameDescriptorCache, timeline: &mut AccessTimeline) -> Result<(), GraphError> {
    for node in nodes.iter_mut() {
        record_node_barriers(encoder, node, registry, timeline, None)?;
        let resolved = resolve_node_resources(node, registry, None)?;
        if let Some(exec) = node.execute.take() {
            exec(encoder, &resolved, descriptor_cache);
        }
    }
    Ok(())
}

/// Like [`run_nodes`], but resolves `present_resource` (the resource every
/// present node's output targets) against a texture borrowed directly from
/// the swapchain's current acquired frame rather than through the registry.
pub(crate) fn run_present_nodes(
    encoder: &mut dyn CommandEncoder,
    nodes: &mut [Node],
    registry: &ResourceRegistry,
    descriptor_cache: &mut FrameDescriptorCache,
    timeline: &mut AccessTimeline,
    present_resource: ResourceId,
    present_texture: &dyn Texture,
) -> Result<(), GraphError> {
    for node in nodes.iter_mut() {
        record_node_barriers(encoder, node, registry, timeline, Some((present_resource, present_texture)))?;
        let resolved = resolve_node_resources(node, registry, Some((present_resource, present_texture)))?;
        if let Some(exec) = node.execute.take() {
            exec(encoder, &resolved, descriptor_cache);
        }
    }
    Ok(())
}

/// Transitions the presentation image to `AccessState::Present` ahead of
/// `Queue::submit` + `Swapchain::present` (C10).
pub(crate) fn transition_to_present(encoder: &mut dyn CommandEncoder, timeline: &mut AccessTimeline, present_resource: ResourceId, present_texture: &dyn Texture) {
    let idx = present_resource.index;
    let previous = timeline.get(&idx).copied().unwrap_or(AccessState::Undefined);
    let request = BarrierRequest { previous, next: AccessState::Present, layout_mode: LayoutMode::Canonical, skip_sync_if_continuous: true };
    if rg_rhi::derive_barrier(request).is_some() {
        let barrier = TextureBarrier { texture: present_texture, src: previous, dst: AccessState::Present };
        encoder.pipeline_barrier(&[], &[barrier]);
    }
    timeline.insert(idx, AccessState::Present);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ResourceKind;
    use crate::mock::{MockCommandEncoder, MockDevice};
    use crate::node::{NodeId, NodeResourceUse};
    use crate::registry::ResourceRegistry;
    use rg_rhi::{BufferDescriptor, BufferUsage, Device, MemoryUsage};

    fn node_with_uses(id: u32, name: &str, uses: Vec<NodeResourceUse>) -> Node {
        Node { name: name.to_string(), id: NodeId(id), inputs: Vec::new(), outputs: uses, raster_pipeline: None, compute_pipeline: None, execute: None }
    }

    /// A compute producer writing a buffer, followed by a consumer reading it
    /// as a shader resource, must see exactly one barrier transitioning it
    /// from the write state to the read state — not a no-op, and not
    /// re-derived from `Undefined`.
    #[test]
    fn compute_write_then_shader_read_produces_one_transition_barrier() {
        let device = MockDevice::default();
        let mut registry = ResourceRegistry::new();
        let desc = BufferDescriptor::new(256, BufferUsage::STORAGE, MemoryUsage::GpuOnly);
        let rid = registry.declare_transient(ResourceKind::Buffer(desc.clone()));

        let mut nodes = vec![
            node_with_uses(0, "producer", vec![NodeResourceUse { resource: rid, access: AccessState::ComputeShaderWrite }]),
            node_with_uses(1, "consumer", vec![NodeResourceUse { resource: rid, access: AccessState::ComputeShaderReadOther }]),
        ];
        crate::resolver::resolve_lifetimes(&nodes, &mut registry);
        registry.entry_mut(rid).unwrap().compiled = Some(crate::registry::CompiledResource::Buffer(device.create_buffer(&desc).unwrap()));
        registry.mark_compiled();

        let mut encoder = MockCommandEncoder::default();
        let pool = device.create_descriptor_pool(8).unwrap();
        let mut descriptor_cache = crate::descriptor_cache::FrameDescriptorCache::new(pool);
        let mut timeline = AccessTimeline::new();
        run_nodes(&mut encoder, &mut nodes, &registry, &mut descriptor_cache, &mut timeline).unwrap();

        assert_eq!(encoder.barrier_log.len(), 2, "each node gets exactly one batched barrier call");
        assert_eq!(encoder.barrier_log[0].0, vec![(AccessState::Undefined, AccessState::ComputeShaderWrite)]);
        assert_eq!(encoder.barrier_log[1].0, vec![(AccessState::ComputeShaderWrite, AccessState::ComputeShaderReadOther)]);
    }

    /// Two resources each first touched by a different node still collapse
    /// into a single batched `pipeline_barrier` call for the pre-transition
    /// pass, and `run_nodes` afterward records no further barrier for either
    /// resource's first use since the timeline was already seeded.
    #[test]
    fn pre_transition_batches_every_first_use_into_one_call_and_run_nodes_skips_it() {
        let device = MockDevice::default();
        let mut registry = ResourceRegistry::new();
        let desc = BufferDescriptor::new(256, BufferUsage::STORAGE, MemoryUsage::GpuOnly);
        let a = registry.declare_transient(ResourceKind::Buffer(desc.clone()));
        let b = registry.declare_transient(ResourceKind::Buffer(desc.clone()));

        let mut nodes = vec![
            node_with_uses(0, "first", vec![NodeResourceUse { resource: a, access: AccessState::ComputeShaderWrite }]),
            node_with_uses(1, "second", vec![NodeResourceUse { resource: b, access: AccessState::ComputeShaderWrite }]),
        ];
        crate::resolver::resolve_lifetimes(&nodes, &mut registry);
        registry.entry_mut(a).unwrap().compiled = Some(crate::registry::CompiledResource::Buffer(device.create_buffer(&desc).unwrap()));
        registry.entry_mut(b).unwrap().compiled = Some(crate::registry::CompiledResource::Buffer(device.create_buffer(&desc).unwrap()));
        registry.mark_compiled();

        let mut encoder = MockCommandEncoder::default();
        let pool = device.create_descriptor_pool(8).unwrap();
        let mut descriptor_cache = crate::descriptor_cache::FrameDescriptorCache::new(pool);
        let mut timeline = AccessTimeline::new();

        pre_transition_resources(&mut encoder, &nodes, &registry, &mut timeline, None).unwrap();
        assert_eq!(encoder.barrier_log.len(), 1, "both resources' first-use transitions land in one batched call");
        assert_eq!(
            encoder.barrier_log[0].0,
            vec![(AccessState::Undefined, AccessState::ComputeShaderWrite), (AccessState::Undefined, AccessState::ComputeShaderWrite)]
        );

        run_nodes(&mut encoder, &mut nodes, &registry, &mut descriptor_cache, &mut timeline).unwrap();
        assert_eq!(encoder.barrier_log.len(), 1, "run_nodes must not re-transition a resource whose first use the pre-pass already covered");
    }
}
