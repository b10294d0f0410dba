//! Resource lifetime resolver (C7).
//!
//! Walks the authored node list once and records, per resource, the index of
//! the first and last node that touches it. Named resources are pinned to
//! `ENDLESS` since they outlive this frame's node list by construction. This
//! pass never reorders nodes or aliases resources — nodes execute in
//! authored order; lifetime information exists purely to tell the compiler
//! when a transient resource may be released back to the cache.

use std::collections::HashMap;

use crate::node::Node;
use crate::registry::{ResourceRegistry, ENDLESS};

pub(crate) fn resolve_lifetimes(nodes: &[Node], registry: &mut ResourceRegistry) {
    let mut first: HashMap<u32, usize> = HashMap::new();
    let mut last: HashMap<u32, usize> = HashMap::new();

    for (node_index, node) in nodes.iter().enumerate() {
        for use_ in node.inputs.iter().chain(node.outputs.iter()) {
            let idx = use_.resource.index;
            first.entry(idx).or_insert(node_index);
            last.insert(idx, node_index);
        }
    }

    for (idx, first_use) in first {
        let is_named = registry.entries[idx as usize].name.is_some();
        let last_use = if is_named { ENDLESS } else { last[&idx] };
        registry.set_lifetime(idx, first_use, last_use);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ResourceKind;
    use crate::node::{NodeId, NodeResourceUse};
    use rg_rhi::{AccessState, BufferDescriptor, BufferUsage, MemoryUsage};

    fn dummy_node(id: u32, uses: Vec<NodeResourceUse>) -> Node {
        Node { name: format!("node{id}"), id: NodeId(id), inputs: uses, outputs: Vec::new(), raster_pipeline: None, compute_pipeline: None, execute: None }
    }

    #[test]
    fn transient_resource_lifetime_spans_first_to_last_use() {
        let mut registry = ResourceRegistry::new();
        let desc = BufferDescriptor::new(256, BufferUsage::STORAGE, MemoryUsage::GpuOnly);
        let rid = registry.declare_transient(ResourceKind::Buffer(desc));

        let nodes = vec![
            dummy_node(0, vec![]),
            dummy_node(1, vec![NodeResourceUse { resource: rid, access: AccessState::ComputeShaderReadOther }]),
            dummy_node(2, vec![]),
            dummy_node(3, vec![NodeResourceUse { resource: rid, access: AccessState::ComputeShaderReadOther }]),
        ];
        resolve_lifetimes(&nodes, &mut registry);

        let entry = registry.entry(rid).unwrap();
        assert_eq!(entry.first_use, Some(1));
        assert_eq!(entry.last_use, Some(3));
    }

    #[test]
    fn named_resource_lifetime_is_endless() {
        let mut registry = ResourceRegistry::new();
        let desc = BufferDescriptor::new(256, BufferUsage::STORAGE, MemoryUsage::GpuOnly);
        let rid = registry.import_named("persistent", ResourceKind::Buffer(desc), None);

        let nodes = vec![dummy_node(0, vec![NodeResourceUse { resource: rid, access: AccessState::ComputeShaderReadOther }])];
        resolve_lifetimes(&nodes, &mut registry);

        let entry = registry.entry(rid).unwrap();
        assert_eq!(entry.last_use, Some(ENDLESS));
    }
}
