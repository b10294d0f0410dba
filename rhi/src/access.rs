//! Canonical GPU access-state taxonomy and barrier derivation (C1).
//!
//! Every point at which a resource is touched by the GPU is expressed as one
//! `AccessState` variant. Each variant maps to exactly one
//! (pipeline-stage mask, access mask, image layout) triple via [`access_info`].
//! Barriers are derived purely from pairs of access states, never from
//! backend-specific state, so the render graph can reason about
//! synchronization without knowing anything about Vulkan.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StageMask: u32 {
        const TOP_OF_PIPE      = 1 << 0;
        const BOTTOM_OF_PIPE   = 1 << 1;
        const DRAW_INDIRECT    = 1 << 2;
        const VERTEX_INPUT     = 1 << 3;
        const VERTEX_SHADER    = 1 << 4;
        const FRAGMENT_SHADER  = 1 << 5;
        const EARLY_FRAGMENT   = 1 << 6;
        const LATE_FRAGMENT    = 1 << 7;
        const COLOR_OUTPUT     = 1 << 8;
        const COMPUTE_SHADER   = 1 << 9;
        const TRANSFER         = 1 << 10;
        const HOST             = 1 << 11;
        const RAY_TRACING      = 1 << 12;
        const AS_BUILD         = 1 << 13;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMask: u32 {
        const INDIRECT_COMMAND_READ  = 1 << 0;
        const INDEX_READ             = 1 << 1;
        const VERTEX_ATTRIBUTE_READ  = 1 << 2;
        const UNIFORM_READ           = 1 << 3;
        const SHADER_READ            = 1 << 4;
        const SHADER_WRITE           = 1 << 5;
        const COLOR_ATTACHMENT_READ  = 1 << 6;
        const COLOR_ATTACHMENT_WRITE = 1 << 7;
        const DEPTH_STENCIL_READ     = 1 << 8;
        const DEPTH_STENCIL_WRITE    = 1 << 9;
        const TRANSFER_READ          = 1 << 10;
        const TRANSFER_WRITE         = 1 << 11;
        const HOST_READ              = 1 << 12;
        const HOST_WRITE             = 1 << 13;
        const MEMORY_READ            = 1 << 14;
        const MEMORY_WRITE           = 1 << 15;
        const AS_READ                = 1 << 16;
        const AS_WRITE                = 1 << 17;
    }
}

/// Image layout an access state requires (or `None` for buffer-only states).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    PresentSrcKhr,
}

/// Layout-selection strategy a caller may opt into for a particular access request.
/// Most callers leave this at `Canonical`; `General`/`GeneralAndPresentation` are
/// escape hatches for resources shared across unusual access patterns (e.g. a
/// texture bound both as storage image and later presented).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutMode {
    #[default]
    Canonical,
    General,
    GeneralAndPresentation,
}

/// The canonical, closed enumeration of GPU access states. Every node input/output
/// in the render graph carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessState {
    Undefined,

    VertexShaderReadUniformBuffer,
    VertexShaderReadSampledImageOrUniformTexelBuffer,
    VertexShaderReadOther,

    FragmentShaderReadUniformBuffer,
    FragmentShaderReadSampledImageOrUniformTexelBuffer,
    FragmentShaderReadColorInputAttachment,
    FragmentShaderReadDepthStencilInputAttachment,
    FragmentShaderReadOther,

    ComputeShaderReadUniformBuffer,
    ComputeShaderReadSampledImageOrUniformTexelBuffer,
    ComputeShaderReadOther,
    ComputeShaderWrite,

    AnyShaderReadUniformBuffer,
    AnyShaderReadSampledImageOrUniformTexelBuffer,
    AnyShaderReadOther,
    AnyShaderWrite,

    VertexBufferRead,
    IndexBufferRead,
    IndirectBufferRead,

    TransferRead,
    TransferWrite,
    HostRead,
    HostWrite,

    ColorAttachmentRead,
    ColorAttachmentWrite,
    ColorAttachmentReadWrite,

    DepthStencilAttachmentRead,
    DepthStencilAttachmentWrite,
    DepthStencilAttachmentReadWrite,
    DepthWriteStencilReadOnly,
    DepthReadOnlyStencilWrite,

    General,
    Present,

    RayTracingShaderReadUniformBuffer,
    RayTracingShaderReadSampledImageOrUniformTexelBuffer,
    RayTracingShaderReadColorInputAttachment,
    RayTracingShaderReadDepthStencilInputAttachment,
    RayTracingShaderReadAccelerationStructure,
    RayTracingShaderReadOther,

    AccelerationStructureBuildRead,
    AccelerationStructureBuildWrite,
    AccelerationStructureBuildReadWrite,
    AccelerationStructureBufferWrite,
}

/// (stage mask, access mask, image layout) triple for a single access state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessInfo {
    pub stage_mask: StageMask,
    pub access_mask: AccessMask,
    pub layout: ImageLayout,
}

const fn info(stage_mask: StageMask, access_mask: AccessMask, layout: ImageLayout) -> AccessInfo {
    AccessInfo { stage_mask, access_mask, layout }
}

/// Returns the canonical (stage, access, layout) triple for an access state.
pub const fn access_info(state: AccessState) -> AccessInfo {
    use AccessState::*;
    match state {
        Undefined => info(StageMask::TOP_OF_PIPE, AccessMask::empty(), ImageLayout::Undefined),

        VertexShaderReadUniformBuffer => info(StageMask::VERTEX_SHADER, AccessMask::UNIFORM_READ, ImageLayout::Undefined),
        VertexShaderReadSampledImageOrUniformTexelBuffer => info(StageMask::VERTEX_SHADER, AccessMask::SHADER_READ, ImageLayout::ShaderReadOnlyOptimal),
        VertexShaderReadOther => info(StageMask::VERTEX_SHADER, AccessMask::SHADER_READ, ImageLayout::Undefined),

        FragmentShaderReadUniformBuffer => info(StageMask::FRAGMENT_SHADER, AccessMask::UNIFORM_READ, ImageLayout::Undefined),
        FragmentShaderReadSampledImageOrUniformTexelBuffer => info(StageMask::FRAGMENT_SHADER, AccessMask::SHADER_READ, ImageLayout::ShaderReadOnlyOptimal),
        FragmentShaderReadColorInputAttachment => info(StageMask::FRAGMENT_SHADER, AccessMask::COLOR_ATTACHMENT_READ, ImageLayout::ShaderReadOnlyOptimal),
        FragmentShaderReadDepthStencilInputAttachment => info(StageMask::FRAGMENT_SHADER, AccessMask::DEPTH_STENCIL_READ, ImageLayout::DepthStencilReadOnlyOptimal),
        FragmentShaderReadOther => info(StageMask::FRAGMENT_SHADER, AccessMask::SHADER_READ, ImageLayout::Undefined),

        ComputeShaderReadUniformBuffer => info(StageMask::COMPUTE_SHADER, AccessMask::UNIFORM_READ, ImageLayout::Undefined),
        ComputeShaderReadSampledImageOrUniformTexelBuffer => info(StageMask::COMPUTE_SHADER, AccessMask::SHADER_READ, ImageLayout::ShaderReadOnlyOptimal),
        ComputeShaderReadOther => info(StageMask::COMPUTE_SHADER, AccessMask::SHADER_READ, ImageLayout::Undefined),
        ComputeShaderWrite => info(StageMask::COMPUTE_SHADER, AccessMask::SHADER_WRITE, ImageLayout::General),

        AnyShaderReadUniformBuffer => info(
            StageMask::from_bits_truncate(StageMask::VERTEX_SHADER.bits() | StageMask::FRAGMENT_SHADER.bits() | StageMask::COMPUTE_SHADER.bits()),
            AccessMask::UNIFORM_READ,
            ImageLayout::Undefined,
        ),
        AnyShaderReadSampledImageOrUniformTexelBuffer => info(
            StageMask::from_bits_truncate(StageMask::VERTEX_SHADER.bits() | StageMask::FRAGMENT_SHADER.bits() | StageMask::COMPUTE_SHADER.bits()),
            AccessMask::SHADER_READ,
            ImageLayout::ShaderReadOnlyOptimal,
        ),
        AnyShaderReadOther => info(
            StageMask::from_bits_truncate(StageMask::VERTEX_SHADER.bits() | StageMask::FRAGMENT_SHADER.bits() | StageMask::COMPUTE_SHADER.bits()),
            AccessMask::SHADER_READ,
            ImageLayout::Undefined,
        ),
        AnyShaderWrite => info(
            StageMask::from_bits_truncate(StageMask::VERTEX_SHADER.bits() | StageMask::FRAGMENT_SHADER.bits() | StageMask::COMPUTE_SHADER.bits()),
            AccessMask::SHADER_WRITE,
            ImageLayout::General,
        ),

        VertexBufferRead => info(StageMask::VERTEX_INPUT, AccessMask::VERTEX_ATTRIBUTE_READ, ImageLayout::Undefined),
        IndexBufferRead => info(StageMask::VERTEX_INPUT, AccessMask::INDEX_READ, ImageLayout::Undefined),
        IndirectBufferRead => info(StageMask::DRAW_INDIRECT, AccessMask::INDIRECT_COMMAND_READ, ImageLayout::Undefined),

        TransferRead => info(StageMask::TRANSFER, AccessMask::TRANSFER_READ, ImageLayout::TransferSrcOptimal),
        TransferWrite => info(StageMask::TRANSFER, AccessMask::TRANSFER_WRITE, ImageLayout::TransferDstOptimal),
        HostRead => info(StageMask::HOST, AccessMask::HOST_READ, ImageLayout::Undefined),
        HostWrite => info(StageMask::HOST, AccessMask::HOST_WRITE, ImageLayout::Undefined),

        ColorAttachmentRead => info(StageMask::COLOR_OUTPUT, AccessMask::COLOR_ATTACHMENT_READ, ImageLayout::ColorAttachmentOptimal),
        ColorAttachmentWrite => info(StageMask::COLOR_OUTPUT, AccessMask::COLOR_ATTACHMENT_WRITE, ImageLayout::ColorAttachmentOptimal),
        ColorAttachmentReadWrite => info(
            StageMask::COLOR_OUTPUT,
            AccessMask::from_bits_truncate(AccessMask::COLOR_ATTACHMENT_READ.bits() | AccessMask::COLOR_ATTACHMENT_WRITE.bits()),
            ImageLayout::ColorAttachmentOptimal,
        ),

        DepthStencilAttachmentRead => info(
            StageMask::from_bits_truncate(StageMask::EARLY_FRAGMENT.bits() | StageMask::LATE_FRAGMENT.bits()),
            AccessMask::DEPTH_STENCIL_READ,
            ImageLayout::DepthStencilReadOnlyOptimal,
        ),
        DepthStencilAttachmentWrite => info(
            StageMask::from_bits_truncate(StageMask::EARLY_FRAGMENT.bits() | StageMask::LATE_FRAGMENT.bits()),
            AccessMask::DEPTH_STENCIL_WRITE,
            ImageLayout::DepthStencilAttachmentOptimal,
        ),
        DepthStencilAttachmentReadWrite => info(
            StageMask::from_bits_truncate(StageMask::EARLY_FRAGMENT.bits() | StageMask::LATE_FRAGMENT.bits()),
            AccessMask::from_bits_truncate(AccessMask::DEPTH_STENCIL_READ.bits() | AccessMask::DEPTH_STENCIL_WRITE.bits()),
            ImageLayout::DepthStencilAttachmentOptimal,
        ),
        DepthWriteStencilReadOnly => info(
            StageMask::from_bits_truncate(StageMask::EARLY_FRAGMENT.bits() | StageMask::LATE_FRAGMENT.bits()),
            AccessMask::from_bits_truncate(AccessMask::DEPTH_STENCIL_READ.bits() | AccessMask::DEPTH_STENCIL_WRITE.bits()),
            ImageLayout::DepthStencilAttachmentOptimal,
        ),
        DepthReadOnlyStencilWrite => info(
            StageMask::from_bits_truncate(StageMask::EARLY_FRAGMENT.bits() | StageMask::LATE_FRAGMENT.bits()),
            AccessMask::from_bits_truncate(AccessMask::DEPTH_STENCIL_READ.bits() | AccessMask::DEPTH_STENCIL_WRITE.bits()),
            ImageLayout::DepthStencilAttachmentOptimal,
        ),

        General => info(
            StageMask::from_bits_truncate(StageMask::VERTEX_SHADER.bits() | StageMask::FRAGMENT_SHADER.bits() | StageMask::COMPUTE_SHADER.bits()),
            AccessMask::from_bits_truncate(AccessMask::MEMORY_READ.bits() | AccessMask::MEMORY_WRITE.bits()),
            ImageLayout::General,
        ),
        Present => info(StageMask::BOTTOM_OF_PIPE, AccessMask::MEMORY_READ, ImageLayout::PresentSrcKhr),

        RayTracingShaderReadUniformBuffer => info(StageMask::RAY_TRACING, AccessMask::UNIFORM_READ, ImageLayout::Undefined),
        RayTracingShaderReadSampledImageOrUniformTexelBuffer => info(StageMask::RAY_TRACING, AccessMask::SHADER_READ, ImageLayout::ShaderReadOnlyOptimal),
        RayTracingShaderReadColorInputAttachment => info(StageMask::RAY_TRACING, AccessMask::COLOR_ATTACHMENT_READ, ImageLayout::ShaderReadOnlyOptimal),
        RayTracingShaderReadDepthStencilInputAttachment => info(StageMask::RAY_TRACING, AccessMask::DEPTH_STENCIL_READ, ImageLayout::DepthStencilReadOnlyOptimal),
        RayTracingShaderReadAccelerationStructure => info(StageMask::RAY_TRACING, AccessMask::AS_READ, ImageLayout::Undefined),
        RayTracingShaderReadOther => info(StageMask::RAY_TRACING, AccessMask::SHADER_READ, ImageLayout::Undefined),

        AccelerationStructureBuildRead => info(StageMask::AS_BUILD, AccessMask::AS_READ, ImageLayout::Undefined),
        AccelerationStructureBuildWrite => info(StageMask::AS_BUILD, AccessMask::AS_WRITE, ImageLayout::Undefined),
        AccelerationStructureBuildReadWrite => info(
            StageMask::AS_BUILD,
            AccessMask::from_bits_truncate(AccessMask::AS_READ.bits() | AccessMask::AS_WRITE.bits()),
            ImageLayout::Undefined,
        ),
        AccelerationStructureBufferWrite => info(StageMask::AS_BUILD, AccessMask::SHADER_WRITE, ImageLayout::Undefined),
    }
}

impl AccessState {
    pub fn info(self) -> AccessInfo {
        access_info(self)
    }

    /// True if this access state may write to the resource.
    pub fn is_write(self) -> bool {
        access_info(self).access_mask.intersects(
            AccessMask::SHADER_WRITE
                | AccessMask::COLOR_ATTACHMENT_WRITE
                | AccessMask::DEPTH_STENCIL_WRITE
                | AccessMask::TRANSFER_WRITE
                | AccessMask::HOST_WRITE
                | AccessMask::MEMORY_WRITE
                | AccessMask::AS_WRITE,
        )
    }

    /// True for a read that is not raster-specific (uniform/sampled/storage reads from
    /// vertex, fragment, compute, or ray-tracing stages; vertex/index/indirect buffer reads).
    pub fn is_common_read(self) -> bool {
        use AccessState::*;
        matches!(
            self,
            VertexShaderReadUniformBuffer
                | VertexShaderReadSampledImageOrUniformTexelBuffer
                | VertexShaderReadOther
                | FragmentShaderReadUniformBuffer
                | FragmentShaderReadSampledImageOrUniformTexelBuffer
                | FragmentShaderReadOther
                | ComputeShaderReadUniformBuffer
                | ComputeShaderReadSampledImageOrUniformTexelBuffer
                | ComputeShaderReadOther
                | AnyShaderReadUniformBuffer
                | AnyShaderReadSampledImageOrUniformTexelBuffer
                | AnyShaderReadOther
                | VertexBufferRead
                | IndexBufferRead
                | IndirectBufferRead
                | TransferRead
                | HostRead
                | RayTracingShaderReadUniformBuffer
                | RayTracingShaderReadSampledImageOrUniformTexelBuffer
                | RayTracingShaderReadOther
                | RayTracingShaderReadAccelerationStructure
                | AccelerationStructureBuildRead
        )
    }

    /// True for raster-only read states (color/depth-stencil input attachments).
    pub fn is_raster_read(self) -> bool {
        use AccessState::*;
        matches!(
            self,
            FragmentShaderReadColorInputAttachment
                | FragmentShaderReadDepthStencilInputAttachment
                | ColorAttachmentRead
                | DepthStencilAttachmentRead
                | RayTracingShaderReadColorInputAttachment
                | RayTracingShaderReadDepthStencilInputAttachment
        )
    }

    /// True for raster-only write states (color/depth-stencil attachment writes).
    pub fn is_raster_write(self) -> bool {
        use AccessState::*;
        matches!(
            self,
            ColorAttachmentWrite
                | ColorAttachmentReadWrite
                | DepthStencilAttachmentWrite
                | DepthStencilAttachmentReadWrite
                | DepthWriteStencilReadOnly
                | DepthReadOnlyStencilWrite
        )
    }
}

/// One side of a barrier request: the access state plus whether the caller wants to
/// skip emitting a barrier when the previous and next states are identical (used for
/// batched pre-transitions).
#[derive(Debug, Clone, Copy)]
pub struct BarrierRequest {
    pub previous: AccessState,
    pub next: AccessState,
    pub layout_mode: LayoutMode,
    pub skip_sync_if_continuous: bool,
}

/// A derived, backend-agnostic barrier: masks plus an optional image-layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedBarrier {
    pub src_stage_mask: StageMask,
    pub src_access_mask: AccessMask,
    pub dst_stage_mask: StageMask,
    pub dst_access_mask: AccessMask,
    pub layout_transition: Option<(ImageLayout, ImageLayout)>,
}

/// Derives a barrier from a request, or `None` when `skip_sync_if_continuous` applies
/// and `previous == next`.
pub fn derive_barrier(req: BarrierRequest) -> Option<DerivedBarrier> {
    if req.skip_sync_if_continuous && req.previous == req.next {
        return None;
    }

    let prev_info = access_info(req.previous);
    let next_info = access_info(req.next);

    let src_write = req.previous.is_write();

    let src_stage_mask = if prev_info.stage_mask.is_empty() {
        StageMask::TOP_OF_PIPE
    } else {
        prev_info.stage_mask
    };
    let dst_stage_mask = if next_info.stage_mask.is_empty() {
        StageMask::BOTTOM_OF_PIPE
    } else {
        next_info.stage_mask
    };

    let src_access_mask = if src_write { prev_info.access_mask } else { AccessMask::empty() };
    let dst_access_mask = if src_write { next_info.access_mask } else { AccessMask::empty() };

    let next_layout = match req.layout_mode {
        LayoutMode::Canonical => next_info.layout,
        LayoutMode::General => ImageLayout::General,
        LayoutMode::GeneralAndPresentation => {
            if matches!(req.next, AccessState::Present) {
                ImageLayout::PresentSrcKhr
            } else {
                ImageLayout::General
            }
        }
    };
    let needs_layout_transition = prev_info.layout != ImageLayout::Undefined
        && (src_write || prev_info.layout != next_layout);
    let layout_transition = if prev_info.layout != next_layout || needs_layout_transition {
        Some((prev_info.layout, next_layout))
    } else {
        None
    };

    Some(DerivedBarrier {
        src_stage_mask,
        src_access_mask,
        dst_stage_mask,
        dst_access_mask,
        layout_transition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuous_access_with_skip_yields_no_barrier() {
        let req = BarrierRequest {
            previous: AccessState::ColorAttachmentWrite,
            next: AccessState::ColorAttachmentWrite,
            layout_mode: LayoutMode::Canonical,
            skip_sync_if_continuous: true,
        };
        assert!(derive_barrier(req).is_none());
    }

    #[test]
    fn write_then_read_makes_destination_access_visible() {
        let req = BarrierRequest {
            previous: AccessState::ComputeShaderWrite,
            next: AccessState::FragmentShaderReadSampledImageOrUniformTexelBuffer,
            layout_mode: LayoutMode::Canonical,
            skip_sync_if_continuous: true,
        };
        let barrier = derive_barrier(req).expect("write->read must synchronize");
        assert!(barrier.src_stage_mask.contains(StageMask::COMPUTE_SHADER));
        assert!(barrier.dst_stage_mask.contains(StageMask::FRAGMENT_SHADER));
        assert_eq!(barrier.src_access_mask, AccessMask::SHADER_WRITE);
        assert_eq!(barrier.dst_access_mask, AccessMask::SHADER_READ);
        assert_eq!(barrier.layout_transition, Some((ImageLayout::General, ImageLayout::ShaderReadOnlyOptimal)));
    }

    #[test]
    fn pure_read_to_read_needs_no_memory_visibility_edge() {
        let req = BarrierRequest {
            previous: AccessState::VertexShaderReadUniformBuffer,
            next: AccessState::FragmentShaderReadUniformBuffer,
            layout_mode: LayoutMode::Canonical,
            skip_sync_if_continuous: true,
        };
        let barrier = derive_barrier(req).unwrap();
        assert!(barrier.src_access_mask.is_empty());
        assert!(barrier.dst_access_mask.is_empty());
    }

    #[test]
    fn canonical_layout_matches_access_info() {
        assert_eq!(access_info(AccessState::ColorAttachmentWrite).layout, ImageLayout::ColorAttachmentOptimal);
        assert_eq!(access_info(AccessState::Present).layout, ImageLayout::PresentSrcKhr);
    }

    #[test]
    fn classification_predicates() {
        assert!(AccessState::ComputeShaderWrite.is_write());
        assert!(!AccessState::FragmentShaderReadUniformBuffer.is_write());
        assert!(AccessState::VertexShaderReadUniformBuffer.is_common_read());
        assert!(AccessState::ColorAttachmentRead.is_raster_read());
        assert!(AccessState::DepthStencilAttachmentWrite.is_raster_write());
    }
}
