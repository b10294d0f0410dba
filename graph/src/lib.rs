//! Frame-scoped render graph built on top of `rg-rhi`: a small dataflow
//! compiler for GPU work. An embedder declares the buffers/textures a frame
//! touches and the nodes that read/write them, tagged with the access state
//! each use needs; `RenderGraph::execute_frame` resolves resource lifetimes,
//! materializes transient resources, derives the barriers between uses, and
//! runs everything in the order it was authored.
//!
//! Shader reflection, descriptor-set *layout* derivation, and scene-level
//! rendering policy all live above this crate; what's here is the mechanical
//! part — dependency bookkeeping, barrier insertion, and resource reuse.

mod compiler;
mod descriptor_cache;
mod error;
mod executor;
mod graph;
mod handle;
#[cfg(test)]
mod mock;
mod node;
mod registry;
mod resolved;
mod resolver;

pub use descriptor_cache::{descriptor_set_key, dynamic_offsets, BindingValue, FrameDescriptorCache, DEFAULT_MAX_DESCRIPTOR_SETS_PER_FRAME};
pub use error::GraphError;
pub use graph::RenderGraph;
pub use handle::{ComputePipelineHandle, PipelineSlot, RasterPipelineHandle, ResourceId, ResourceKind};
pub use node::{Node, NodeBuilder, NodeId, NodeResourceUse};
pub use registry::ENDLESS;
pub use resolved::ResolvedResources;
