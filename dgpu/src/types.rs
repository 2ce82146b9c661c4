use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemoryDomain {
    HostVisible,
    DeviceLocal,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Extents2D {
    pub width: u32,
    pub height: u32,
}

impl Extents2D {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Offset2D {
    pub x: i32,
    pub y: i32,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rect2D {
    pub offset: Offset2D,
    pub extents: Extents2D,
}

impl Rect2D {
    pub fn from_extents(extents: Extents2D) -> Self {
        Self {
            offset: Offset2D::default(),
            extents,
        }
    }
}

/// Texel and vertex attribute formats understood by the backends.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Format {
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Float,
    Depth32,
    Depth32Stencil8,
    Depth24Stencil8,
}

impl Format {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            Format::Depth32 | Format::Depth32Stencil8 | Format::Depth24Stencil8
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, Format::Depth32Stencil8 | Format::Depth24Stencil8)
    }

    pub fn is_color(&self) -> bool {
        !self.is_depth()
    }

    /// The aspects an image of this format exposes.
    pub fn aspect(&self) -> ImageAspect {
        if self.has_stencil() {
            ImageAspect::DEPTH | ImageAspect::STENCIL
        } else if self.is_depth() {
            ImageAspect::DEPTH
        } else {
            ImageAspect::COLOR
        }
    }

    pub fn byte_size(&self) -> usize {
        match self {
            Format::Rgba8Unorm | Format::Rgba8Srgb | Format::Bgra8Unorm | Format::Bgra8Srgb => 4,
            Format::Rgba16Float => 8,
            Format::R32Float => 4,
            Format::Rg32Float => 8,
            Format::Rgb32Float => 12,
            Format::Rgba32Float => 16,
            Format::Depth32 | Format::Depth24Stencil8 => 4,
            Format::Depth32Stencil8 => 8,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SampleCount {
    #[default]
    One,
    Two,
    Four,
    Eight,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttachmentLoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttachmentStoreOp {
    Store,
    DontCare,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PipelineBindPoint {
    #[default]
    Graphics,
    Compute,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
    InputAttachment,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MipmapMode {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IndexType {
    Uint16,
    Uint32,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrontFace {
    Clockwise,
    #[default]
    CounterClockwise,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    #[default]
    LessOrEqual,
    Greater,
    Always,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VertexInputRate {
    #[default]
    Vertex,
    Instance,
}

#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
    #[cfg_attr(feature="serde", derive(Serialize, Deserialize))]
    pub struct ImageUsageFlags : u32 {
        const TRANSFER_SRC = 0b1;
        const TRANSFER_DST = 0b10;
        #[doc = "Can be sampled from (COMBINED_IMAGE_SAMPLER descriptor type)"]
        const SAMPLED = 0b100;
        const STORAGE = 0b1000;
        const COLOR_ATTACHMENT = 0b1_0000;
        const DEPTH_STENCIL_ATTACHMENT = 0b10_0000;
        const TRANSIENT_ATTACHMENT = 0b100_0000;
        #[doc = "Can be read by a subpass as an input attachment"]
        const INPUT_ATTACHMENT = 0b1000_0000;
    }
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
    #[cfg_attr(feature="serde", derive(Serialize, Deserialize))]
    pub struct BufferUsageFlags : u32 {
        const TRANSFER_SRC = 0b1;
        const TRANSFER_DST = 0b10;
        const UNIFORM_BUFFER = 0b100;
        const STORAGE_BUFFER = 0b1000;
        const INDEX_BUFFER = 0b1_0000;
        const VERTEX_BUFFER = 0b10_0000;
        const INDIRECT_BUFFER = 0b100_0000;
    }
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
    #[cfg_attr(feature="serde", derive(Serialize, Deserialize))]
    pub struct ImageAspect : u32 {
        const COLOR = 0b1;
        const DEPTH = 0b10;
        const STENCIL = 0b100;
    }
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
    #[cfg_attr(feature="serde", derive(Serialize, Deserialize))]
    pub struct ShaderStageFlags : u32 {
        const VERTEX = 0b1;
        const FRAGMENT = 0b10;
        const COMPUTE = 0b100;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
    #[cfg_attr(feature="serde", derive(Serialize, Deserialize))]
    pub struct PipelineStageFlags : u32 {
        const TOP_OF_PIPE = 0b1;
        const DRAW_INDIRECT = 0b10;
        const VERTEX_INPUT = 0b100;
        const VERTEX_SHADER = 0b1000;
        const FRAGMENT_SHADER = 0b1_0000;
        const EARLY_FRAGMENT_TESTS = 0b10_0000;
        const LATE_FRAGMENT_TESTS = 0b100_0000;
        const COLOR_ATTACHMENT_OUTPUT = 0b1000_0000;
        const TRANSFER = 0b1_0000_0000;
        const BOTTOM_OF_PIPE = 0b10_0000_0000;
        const ALL_GRAPHICS = 0b100_0000_0000;
        const ALL_COMMANDS = 0b1000_0000_0000;
    }
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
    #[cfg_attr(feature="serde", derive(Serialize, Deserialize))]
    pub struct AccessFlags : u32 {
        const INDIRECT_COMMAND_READ = 0b1;
        const INDEX_READ = 0b10;
        const VERTEX_ATTRIBUTE_READ = 0b100;
        const UNIFORM_READ = 0b1000;
        const INPUT_ATTACHMENT_READ = 0b1_0000;
        const SHADER_READ = 0b10_0000;
        const SHADER_WRITE = 0b100_0000;
        const COLOR_ATTACHMENT_READ = 0b1000_0000;
        const COLOR_ATTACHMENT_WRITE = 0b1_0000_0000;
        const DEPTH_STENCIL_ATTACHMENT_READ = 0b10_0000_0000;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 0b100_0000_0000;
        const TRANSFER_READ = 0b1000_0000_0000;
        const TRANSFER_WRITE = 0b1_0000_0000_0000;
        const MEMORY_READ = 0b10_0000_0000_0000;
        const MEMORY_WRITE = 0b100_0000_0000_0000;
    }
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
    #[cfg_attr(feature="serde", derive(Serialize, Deserialize))]
    pub struct DependencyFlags : u32 {
        const BY_REGION = 0b1;
    }
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
    #[cfg_attr(feature="serde", derive(Serialize, Deserialize))]
    pub struct AttachmentFlags : u32 {
        #[doc = "The attachment may share memory with other attachments"]
        const MAY_ALIAS = 0b1;
    }
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
    #[cfg_attr(feature="serde", derive(Serialize, Deserialize))]
    pub struct CommandBufferUsage : u32 {
        const ONE_TIME_SUBMIT = 0b1;
        const SIMULTANEOUS_USE = 0b10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_expose_depth_aspects() {
        assert_eq!(Format::Depth32.aspect(), ImageAspect::DEPTH);
        assert_eq!(
            Format::Depth24Stencil8.aspect(),
            ImageAspect::DEPTH | ImageAspect::STENCIL
        );
        assert_eq!(Format::Rgba16Float.aspect(), ImageAspect::COLOR);
        assert!(Format::Bgra8Srgb.is_color());
    }
}
