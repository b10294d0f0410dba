//! Resource creation descriptors: buffers, textures, views, render passes,
//! framebuffer cache keys, and pipeline descriptors (C2).
//!
//! All descriptors are structurally `Eq` + `Hash` so they can key the
//! transient resource cache (C4) and the render-pass/framebuffer caches (C3).

use bitflags::bitflags;
use fnv::FnvHasher;
use std::hash::{Hash, Hasher};

use crate::error::RhiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8Unorm,
    R8Uint,
    R8Sint,
    Rg8Unorm,
    Rg8Uint,
    Rg8Sint,
    Rgba8Unorm,
    Rgba8Uint,
    Rgba8Sint,
    Bgra8Unorm,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R32Uint,
    Rg32Uint,
    Rgba32Uint,
    Depth32Float,
    Depth24Stencil8,
    Bc1Unorm,
    Bc3Unorm,
    Bc4Unorm,
    Bc5Unorm,
    Bc7Unorm,
}

impl PixelFormat {
    pub fn aspect(self) -> AspectFlags {
        match self {
            PixelFormat::Depth32Float => AspectFlags::DEPTH,
            PixelFormat::Depth24Stencil8 => AspectFlags::DEPTH | AspectFlags::STENCIL,
            _ => AspectFlags::COLOR,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, PixelFormat::Depth32Float | PixelFormat::Depth24Stencil8)
    }

    pub fn is_block_compressed(self) -> bool {
        matches!(
            self,
            PixelFormat::Bc1Unorm | PixelFormat::Bc3Unorm | PixelFormat::Bc4Unorm | PixelFormat::Bc5Unorm | PixelFormat::Bc7Unorm
        )
    }

    /// Bytes per texel for uncompressed formats, or bytes per 4x4 block for BCn formats.
    fn unit_size_bytes(self) -> u32 {
        match self {
            PixelFormat::R8Unorm | PixelFormat::R8Uint | PixelFormat::R8Sint => 1,
            PixelFormat::Rg8Unorm | PixelFormat::Rg8Uint | PixelFormat::Rg8Sint | PixelFormat::R16Float => 2,
            PixelFormat::Rgba8Unorm
            | PixelFormat::Rgba8Uint
            | PixelFormat::Rgba8Sint
            | PixelFormat::Bgra8Unorm
            | PixelFormat::Rg16Float
            | PixelFormat::R32Float
            | PixelFormat::R32Uint
            | PixelFormat::Depth32Float
            | PixelFormat::Depth24Stencil8 => 4,
            PixelFormat::Rgba16Float | PixelFormat::Rg32Float | PixelFormat::Rg32Uint => 8,
            PixelFormat::Rgba32Float | PixelFormat::Rgba32Uint => 16,
            PixelFormat::Bc1Unorm | PixelFormat::Bc4Unorm => 8,
            PixelFormat::Bc3Unorm | PixelFormat::Bc5Unorm | PixelFormat::Bc7Unorm => 16,
        }
    }

    /// Returns (total bytes, bytes-per-row) for one mip level of (width, height) in this format.
    /// Block-compressed formats round width/height up to 4x4 blocks.
    pub fn level_size(self, width: u32, height: u32) -> (u64, u64) {
        if self.is_block_compressed() {
            let blocks_wide = (width.max(1) + 3) / 4;
            let blocks_high = (height.max(1) + 3) / 4;
            let bytes_per_row = blocks_wide as u64 * self.unit_size_bytes() as u64;
            (bytes_per_row * blocks_high as u64, bytes_per_row)
        } else {
            let bytes_per_row = width.max(1) as u64 * self.unit_size_bytes() as u64;
            (bytes_per_row * height.max(1) as u64, bytes_per_row)
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AspectFlags: u32 {
        const COLOR    = 1 << 0;
        const DEPTH    = 1 << 1;
        const STENCIL  = 1 << 2;
        const METADATA = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const TRANSFER_SRC  = 1 << 0;
        const TRANSFER_DST  = 1 << 1;
        const SAMPLED       = 1 << 2;
        const STORAGE       = 1 << 3;
        const COLOR         = 1 << 4;
        const DEPTH_STENCIL = 1 << 5;
        const TRANSIENT     = 1 << 6;
        const INPUT         = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureCreateFlags: u32 {
        const CUBE_COMPATIBLE = 1 << 0;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC          = 1 << 0;
        const TRANSFER_DST          = 1 << 1;
        const UNIFORM_TEXEL         = 1 << 2;
        const STORAGE_TEXEL         = 1 << 3;
        const UNIFORM               = 1 << 4;
        const STORAGE               = 1 << 5;
        const INDEX                 = 1 << 6;
        const VERTEX                = 1 << 7;
        const INDIRECT              = 1 << 8;
        const SHADER_DEVICE_ADDRESS = 1 << 9;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryUsage {
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
    CpuOnly,
    CpuCopy,
    GpuLazily,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryFlags: u32 {
        const DEDICATED          = 1 << 0;
        const PERSISTENT_MAPPING = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tiling {
    Optimal,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleCount {
    X1,
    X2,
    X4,
    X8,
}

/// Tightly packed per-layer mip chain supplied at texture creation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TextureInitialData {
    pub bytes: Vec<u8>,
}

impl Hash for TextureInitialData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.len().hash(state);
        // Hash a bounded prefix; full-content hashing would make descriptor
        // hashing proportional to texture size for no correctness benefit —
        // identical content always comes with an identical byte count here.
        let prefix_len = self.bytes.len().min(64);
        self.bytes[..prefix_len].hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub extent: (u32, u32, u32),
    pub array_layers: u32,
    pub mip_levels: u32,
    pub format: PixelFormat,
    pub samples: SampleCount,
    pub tiling: Tiling,
    pub usage: TextureUsage,
    pub create_flags: TextureCreateFlags,
    pub memory_usage: MemoryUsage,
    pub memory_flags: MemoryFlags,
    pub initial_data: Option<TextureInitialData>,
}

impl TextureDescriptor {
    fn base(extent: (u32, u32, u32), array_layers: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self {
            extent,
            array_layers,
            mip_levels: 1,
            format,
            samples: SampleCount::X1,
            tiling: Tiling::Optimal,
            usage,
            create_flags: TextureCreateFlags::empty(),
            memory_usage: MemoryUsage::GpuOnly,
            memory_flags: MemoryFlags::empty(),
            initial_data: None,
        }
    }

    pub fn texture_1d(width: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self::base((width, 1, 1), 1, format, usage)
    }

    pub fn texture_1d_array(width: u32, layers: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self::base((width, 1, 1), layers, format, usage)
    }

    pub fn texture_2d(width: u32, height: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self::base((width, height, 1), 1, format, usage)
    }

    pub fn texture_2d_array(width: u32, height: u32, layers: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self::base((width, height, 1), layers, format, usage)
    }

    pub fn texture_3d(width: u32, height: u32, depth: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        Self::base((width, height, depth), 1, format, usage)
    }

    pub fn cubemap(size: u32, format: PixelFormat, usage: TextureUsage) -> Result<Self, RhiError> {
        let mut desc = Self::base((size, size, 1), 6, format, usage);
        desc.create_flags |= TextureCreateFlags::CUBE_COMPATIBLE;
        desc.validate()?;
        Ok(desc)
    }

    pub fn cubemap_array(size: u32, layers: u32, format: PixelFormat, usage: TextureUsage) -> Result<Self, RhiError> {
        let mut desc = Self::base((size, size, 1), layers, format, usage);
        desc.create_flags |= TextureCreateFlags::CUBE_COMPATIBLE;
        desc.validate()?;
        Ok(desc)
    }

    /// Validates cubemap layer/aspect-ratio constraints and rejects memory usages
    /// that cannot back a texture allocation.
    pub fn validate(&self) -> Result<(), RhiError> {
        if self.memory_usage == MemoryUsage::CpuCopy {
            return Err(RhiError::ValidationFailure("CpuCopy memory usage is not valid for texture allocation".into()));
        }
        if self.create_flags.contains(TextureCreateFlags::CUBE_COMPATIBLE) {
            let (w, h, d) = self.extent;
            if w != h {
                return Err(RhiError::ValidationFailure("cubemap requires width == height".into()));
            }
            if d != 1 {
                return Err(RhiError::ValidationFailure("cubemap requires depth == 1".into()));
            }
            if self.array_layers == 6 {
                // single cubemap, fine
            } else if self.array_layers >= 6 && self.array_layers % 6 == 0 {
                // cubemap array, fine
            } else {
                return Err(RhiError::ValidationFailure(
                    "cubemap requires array_layers == 6 (or a multiple of 6 for cubemap arrays)".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Bytes to seed a buffer with at creation, uploaded via direct memcpy for
/// host-visible memory or a staging buffer plus immediate command submission
/// for device-local memory.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BufferInitialData {
    pub bytes: Vec<u8>,
}

impl Hash for BufferInitialData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.len().hash(state);
        // Bounded prefix, same rationale as TextureInitialData::hash above.
        let prefix_len = self.bytes.len().min(64);
        self.bytes[..prefix_len].hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory_usage: MemoryUsage,
    pub memory_flags: MemoryFlags,
    pub initial_data: Option<BufferInitialData>,
    /// Recorded after allocation for alignment tracking; zero before creation.
    pub allocated_size: u64,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage, memory_usage: MemoryUsage) -> Self {
        Self {
            size,
            usage,
            memory_usage,
            memory_flags: MemoryFlags::empty(),
            initial_data: None,
            allocated_size: 0,
        }
    }

    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewType {
    D1,
    D1Array,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewDescriptor {
    pub view_type: Option<ViewType>,
    pub format: Option<PixelFormat>,
    pub aspect: AspectFlags,
    pub base_mip: u32,
    /// `None` means "remaining levels from base_mip to the parent's mip count".
    pub level_count: Option<u32>,
}

impl Default for TextureViewDescriptor {
    fn default() -> Self {
        Self { view_type: None, format: None, aspect: AspectFlags::COLOR, base_mip: 0, level_count: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorAttachmentDescriptor {
    pub format: PixelFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub samples: SampleCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthAttachmentDescriptor {
    pub format: PixelFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub samples: SampleCount,
}

pub const MAX_COLOR_ATTACHMENTS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassDescriptor {
    pub color_attachments: Vec<ColorAttachmentDescriptor>,
    pub depth_attachment: Option<DepthAttachmentDescriptor>,
}

impl RenderPassDescriptor {
    pub fn validate(&self) -> Result<(), RhiError> {
        if self.color_attachments.len() > MAX_COLOR_ATTACHMENTS {
            return Err(RhiError::ValidationFailure(format!(
                "render pass supports at most {MAX_COLOR_ATTACHMENTS} color attachments, got {}",
                self.color_attachments.len()
            )));
        }
        if self.color_attachments.is_empty() && self.depth_attachment.is_none() {
            return Err(RhiError::ValidationFailure("render pass needs at least one color or depth attachment".into()));
        }
        Ok(())
    }

    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Imageless-framebuffer-compatible cache key: concrete texture views are supplied
/// at bind time, so the framebuffer only needs to know extent plus the usage/create
/// flags of each attachment slot to be reused across frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferCacheKey {
    pub extent: (u32, u32),
    pub attachments: Vec<(TextureUsage, TextureCreateFlags)>,
}

impl FramebufferCacheKey {
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizerState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub scissor_enabled: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self { polygon_mode: PolygonMode::Fill, cull_mode: CullMode::Back, front_face: FrontFace::CounterClockwise, scissor_enabled: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub op: BlendOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Per-stage compiled shader module. Byte-code and reflection are produced by
/// a shader compiler that lives outside this crate; this type only carries
/// the already-reflected result.
#[derive(Debug, Clone)]
pub struct ShaderModule {
    pub code: Vec<u32>,
    pub entry_point: String,
    pub stage: ShaderStage,
}

impl PartialEq for ShaderModule {
    fn eq(&self, other: &Self) -> bool {
        self.entry_point == other.entry_point && self.stage == other.stage && self.code == other.code
    }
}
impl Eq for ShaderModule {}

impl Hash for ShaderModule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entry_point.hash(state);
        self.stage.hash(state);
        self.code.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    TessControl,
    TessEvaluation,
    Compute,
    RayTracing,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RasterPipelineDescriptor {
    pub shaders: Vec<ShaderModule>,
    pub render_pass: RenderPassDescriptor,
    pub rasterizer: RasterizerState,
    pub blend_states: Vec<Option<BlendState>>,
    pub topology: PrimitiveTopology,
    pub samples: SampleCount,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_bias: bool,
    pub depth_compare: CompareOp,
}

impl RasterPipelineDescriptor {
    pub fn validate(&self) -> Result<(), RhiError> {
        let mut seen_stages = Vec::new();
        for shader in &self.shaders {
            if seen_stages.contains(&shader.stage) {
                return Err(RhiError::ValidationFailure(format!("duplicate pipeline stage {:?}", shader.stage)));
            }
            seen_stages.push(shader.stage);
        }
        self.render_pass.validate()
    }

    /// Full-state hash: two raster pipelines that share shaders but differ in
    /// blend/raster state must never collide.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadGroupExtent {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineDescriptor {
    pub shader: ShaderModule,
    pub thread_group_extent: ThreadGroupExtent,
}

impl ComputePipelineDescriptor {
    pub fn validate(&self) -> Result<(), RhiError> {
        if self.shader.stage != ShaderStage::Compute {
            return Err(RhiError::ValidationFailure("compute pipeline shader must be stage Compute".into()));
        }
        Ok(())
    }

    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cubemap_rejects_non_six_layers() {
        assert!(TextureDescriptor::cubemap_array(128, 5, PixelFormat::Rgba8Unorm, TextureUsage::SAMPLED).is_err());
        assert!(TextureDescriptor::cubemap(128, PixelFormat::Rgba8Unorm, TextureUsage::SAMPLED).is_ok());
    }

    #[test]
    fn render_pass_requires_an_attachment() {
        let desc = RenderPassDescriptor::default();
        assert!(desc.validate().is_err());
    }

    #[test]
    fn bc_format_rounds_up_to_4x4_blocks() {
        let (_, bytes_per_row) = PixelFormat::Bc1Unorm.level_size(7, 7);
        let blocks_wide = (7u32 + 3) / 4;
        assert_eq!(blocks_wide, 2);
        assert_eq!(bytes_per_row, blocks_wide as u64 * 8);
    }

    #[test]
    fn buffer_initial_data_carries_its_bytes() {
        let data = BufferInitialData { bytes: vec![1, 2, 3, 4] };
        assert_eq!(data.bytes, vec![1, 2, 3, 4]);
        let desc = BufferDescriptor { initial_data: Some(data), ..BufferDescriptor::new(4, BufferUsage::STORAGE, MemoryUsage::GpuOnly) };
        assert_eq!(desc.initial_data.as_ref().unwrap().bytes.len(), 4);
    }

    #[test]
    fn buffer_initial_data_hash_distinguishes_different_content_of_equal_length() {
        let mut hasher_a = FnvHasher::default();
        let mut hasher_b = FnvHasher::default();
        BufferInitialData { bytes: vec![1, 2, 3, 4] }.hash(&mut hasher_a);
        BufferInitialData { bytes: vec![9, 9, 9, 9] }.hash(&mut hasher_b);
        assert_ne!(hasher_a.finish(), hasher_b.finish());
    }

    #[test]
    fn hash_equality_implies_descriptor_equality() {
        let a = BufferDescriptor::new(1024, BufferUsage::UNIFORM, MemoryUsage::CpuToGpu);
        let b = BufferDescriptor::new(1024, BufferUsage::UNIFORM, MemoryUsage::CpuToGpu);
        let c = BufferDescriptor::new(2048, BufferUsage::UNIFORM, MemoryUsage::CpuToGpu);
        assert_eq!(a.stable_hash(), b.stable_hash());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn pipeline_desc_hash_distinguishes_blend_state() {
        let shader = ShaderModule { code: vec![1, 2, 3], entry_point: "main".into(), stage: ShaderStage::Fragment };
        let vs = ShaderModule { code: vec![4, 5, 6], entry_point: "main".into(), stage: ShaderStage::Vertex };
        let base = RasterPipelineDescriptor {
            shaders: vec![vs.clone(), shader.clone()],
            render_pass: RenderPassDescriptor {
                color_attachments: vec![ColorAttachmentDescriptor {
                    format: PixelFormat::Rgba8Unorm,
                    load_op: LoadOp::Clear,
                    store_op: StoreOp::Store,
                    samples: SampleCount::X1,
                }],
                depth_attachment: None,
            },
            rasterizer: RasterizerState::default(),
            blend_states: vec![None],
            topology: PrimitiveTopology::TriangleList,
            samples: SampleCount::X1,
            depth_test: false,
            depth_write: false,
            depth_bias: false,
            depth_compare: CompareOp::Always,
        };
        let mut blended = base.clone();
        blended.blend_states = vec![Some(BlendState {
            color: BlendComponent { src: BlendFactor::SrcAlpha, dst: BlendFactor::OneMinusSrcAlpha, op: BlendOp::Add },
            alpha: BlendComponent { src: BlendFactor::One, dst: BlendFactor::Zero, op: BlendOp::Add },
        })];
        assert_ne!(base.stable_hash(), blended.stable_hash());
    }

    #[test]
    fn duplicate_pipeline_stage_is_rejected() {
        let shader = ShaderModule { code: vec![1], entry_point: "main".into(), stage: ShaderStage::Vertex };
        let desc = RasterPipelineDescriptor {
            shaders: vec![shader.clone(), shader],
            render_pass: RenderPassDescriptor {
                color_attachments: vec![ColorAttachmentDescriptor {
                    format: PixelFormat::Rgba8Unorm,
                    load_op: LoadOp::Clear,
                    store_op: StoreOp::Store,
                    samples: SampleCount::X1,
                }],
                depth_attachment: None,
            },
            rasterizer: RasterizerState::default(),
            blend_states: vec![None],
            topology: PrimitiveTopology::TriangleList,
            samples: SampleCount::X1,
            depth_test: false,
            depth_write: false,
            depth_bias: false,
            depth_compare: CompareOp::Always,
        };
        assert!(desc.validate().is_err());
    }
}
