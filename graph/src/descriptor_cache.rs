//! Per-command-buffer descriptor-set caching (C11).
//!
//! Binding the same `(set index, bound resources)` tuple twice within one
//! command buffer — common when a pass re-binds a material between draws
//! that happen to share it — allocates a descriptor set once and reuses it
//! for the rest of that command buffer. The cache is reset (and its pool's
//! sets freed) once per frame; nothing here survives across frames, unlike
//! the transient resource cache (C4).

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use fnv::FnvHasher;

use rg_rhi::{DescriptorPool, DescriptorSet, DescriptorSetLayout, RhiError};

use crate::handle::ResourceId;

/// What a single binding within a set is bound to, for hashing purposes.
/// Two calls that bind the same resources the same way produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingValue {
    Buffer(ResourceId),
    /// A dynamic uniform/storage buffer binding. `offset` isn't part of the
    /// descriptor write itself (Vulkan dynamic offsets are supplied at bind
    /// time, not at descriptor-update time) but is still hashed here so two
    /// binds through the same buffer at different offsets don't collide and
    /// reuse a set whose offset no longer matches what the caller intended.
    DynamicBuffer { resource: ResourceId, offset: u32 },
    Texture(ResourceId),
    TextureArray(Vec<ResourceId>),
    StaticSampler(u64),
    /// A binding this cache doesn't need to distinguish (e.g. a binding left
    /// at its layout default). Two `Unknown` bindings always collide, so a
    /// caller binding anything meaningful should use a more specific variant.
    Unknown,
}

/// Computes the cache key for a descriptor set from its set index and the
/// ordered list of what each binding in it is bound to.
pub fn descriptor_set_key(set_index: u32, bindings: &[BindingValue]) -> u64 {
    let mut hasher = FnvHasher::default();
    set_index.hash(&mut hasher);
    bindings.hash(&mut hasher);
    hasher.finish()
}

/// Extracts the dynamic offsets from `bindings`, in binding order, for the
/// `dynamic_offsets` argument `RenderPass`/`ComputePass::bind_descriptor_set`
/// expects. Bindings that aren't `DynamicBuffer` contribute nothing — the
/// count and order of the *dynamic* bindings is what must line up with the
/// layout, not the position within `bindings` as a whole.
pub fn dynamic_offsets(bindings: &[BindingValue]) -> Vec<u32> {
    bindings
        .iter()
        .filter_map(|b| match b {
            BindingValue::DynamicBuffer { offset, .. } => Some(*offset),
            _ => None,
        })
        .collect()
}

/// Default descriptor pool capacity backing a frame's cache, sized generously
/// since allocation only happens on a cache miss and the pool is reset (not
/// grown) every frame.
pub const DEFAULT_MAX_DESCRIPTOR_SETS_PER_FRAME: u32 = 256;

pub struct FrameDescriptorCache {
    pool: Box<dyn DescriptorPool>,
    cached: HashMap<u64, Box<dyn DescriptorSet>>,
}

impl FrameDescriptorCache {
    pub fn new(pool: Box<dyn DescriptorPool>) -> Self {
        Self { pool, cached: HashMap::new() }
    }

    /// Returns the cached set for `key`, or allocates a fresh one from the
    /// underlying pool and lets `build` populate its bindings before caching it.
    pub fn get_or_insert_with(
        &mut self,
        key: u64,
        layout: &dyn DescriptorSetLayout,
        build: impl FnOnce(&mut dyn DescriptorSet),
    ) -> Result<&dyn DescriptorSet, RhiError> {
        if !self.cached.contains_key(&key) {
            let mut set = self.pool.allocate_set(layout)?;
            build(set.as_mut());
            self.cached.insert(key, set);
        }
        Ok(self.cached.get(&key).expect("just inserted").as_ref())
    }

    /// Drops every cached set and resets the backing pool. Call once per
    /// frame, after the frame's command buffers have been submitted.
    pub fn reset(&mut self) -> Result<(), RhiError> {
        self.cached.clear();
        self.pool.reset()
    }

    pub fn cached_set_count(&self) -> usize {
        self.cached.len()
    }
}

#[cfg(test)]
mod tests {
    use rg_rhi::Device;

    use super::*;
    use crate::handle::ResourceId;
    use crate::mock::MockDevice;

    #[test]
    fn rebinding_the_same_key_reuses_the_cached_set() {
        let device = MockDevice::default();
        let pool = device.create_descriptor_pool(8).unwrap();
        let mut cache = FrameDescriptorCache::new(pool);
        let layout = device.create_descriptor_set_layout(&[]).unwrap();

        let key = descriptor_set_key(0, &[BindingValue::StaticSampler(42)]);
        cache.get_or_insert_with(key, layout.as_ref(), |_set| {}).unwrap();
        cache.get_or_insert_with(key, layout.as_ref(), |_set| panic!("should not rebuild a cached set")).unwrap();

        assert_eq!(cache.cached_set_count(), 1);

        cache.reset().unwrap();
        assert_eq!(cache.cached_set_count(), 0);
    }

    #[test]
    fn different_binding_values_produce_different_keys() {
        let a = descriptor_set_key(0, &[BindingValue::Texture(ResourceId::default())]);
        let b = descriptor_set_key(0, &[BindingValue::StaticSampler(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn a_dynamic_buffer_at_a_different_offset_produces_a_different_key() {
        let resource = ResourceId::default();
        let a = descriptor_set_key(0, &[BindingValue::DynamicBuffer { resource, offset: 0 }]);
        let b = descriptor_set_key(0, &[BindingValue::DynamicBuffer { resource, offset: 256 }]);
        assert_ne!(a, b);
    }

    #[test]
    fn dynamic_offsets_extracts_only_dynamic_bindings_in_order() {
        let resource = ResourceId::default();
        let bindings = [
            BindingValue::Texture(resource),
            BindingValue::DynamicBuffer { resource, offset: 128 },
            BindingValue::StaticSampler(7),
            BindingValue::DynamicBuffer { resource, offset: 512 },
        ];
        assert_eq!(dynamic_offsets(&bindings), vec![128, 512]);
    }
}
