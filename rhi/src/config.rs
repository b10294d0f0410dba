//! Device/frame-level tunables, constructed programmatically by the embedding
//! engine. No file or environment parsing lives here — this crate has no CLI
//! surface.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Number of device-frame slots rotated through by `begin_frame`/`end_frame`.
    pub frames_in_flight: u32,
    /// Upper bound on command buffers batch-allocated per (frame slot, queue) pool
    /// before a new pool is created.
    pub max_command_buffers_per_pool: u32,
    /// Enables the validation layer stack. Independently of this flag, the
    /// `LUME_VALIDATION` environment variable can also request validation at
    /// device-creation time.
    pub enable_validation: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { frames_in_flight: 2, max_command_buffers_per_pool: 32, enable_validation: cfg!(debug_assertions) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// Frames a transient resource may sit idle in the cache before eviction.
    pub transient_cache_evict_after_frames: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { transient_cache_evict_after_frames: 3 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let device = DeviceConfig::default();
        assert_eq!(device.frames_in_flight, 2);
        assert_eq!(device.max_command_buffers_per_pool, 32);
        let graph = GraphConfig::default();
        assert_eq!(graph.transient_cache_evict_after_frames, 3);
    }
}
