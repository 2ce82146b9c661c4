use ash::prelude::VkResult;
use ash::vk;

use crate::{
    AccessFlags, AddressMode, AttachmentFlags, AttachmentLoadOp, AttachmentStoreOp,
    BufferUsageFlags, ClearValue, CommandBufferUsage, CompareOp, CullMode, DependencyFlags,
    DescriptorType, FilterMode, Format, FrontFace, GpuError, GpuResult, ImageAspect, ImageLayout,
    ImageUsageFlags, IndexType, MipmapMode, PipelineBindPoint, PipelineStageFlags,
    PrimitiveTopology, SampleCount, ShaderStageFlags, SubpassTarget, VertexInputRate,
};

pub(crate) trait ToVk {
    type Target;

    fn to_vk(self) -> Self::Target;
}

macro_rules! case {
    ($value: expr, $target:expr, $outer:expr, $inner:expr) => {
        if $value.contains($outer) {
            $target |= $inner
        }
    };
}

/// Maps a failed Vulkan call onto [`GpuError`], keeping the swapchain and
/// pool conditions distinguishable.
pub(crate) trait VkResultExt<T> {
    fn call(self, name: &'static str) -> GpuResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn call(self, name: &'static str) -> GpuResult<T> {
        self.map_err(|e| to_gpu_error(name, e))
    }
}

pub(crate) fn to_gpu_error(call: &'static str, result: vk::Result) -> GpuError {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR => GpuError::SwapchainOutOfDate,
        vk::Result::SUBOPTIMAL_KHR => GpuError::SwapchainSuboptimal,
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
            GpuError::OutOfPoolMemory
        }
        vk::Result::TIMEOUT => GpuError::Timeout,
        other => GpuError::Api {
            call,
            result: format!("{other}"),
        },
    }
}

impl ToVk for Format {
    type Target = vk::Format;

    fn to_vk(self) -> Self::Target {
        match self {
            Format::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Format::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            Format::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            Format::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            Format::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
            Format::R32Float => vk::Format::R32_SFLOAT,
            Format::Rg32Float => vk::Format::R32G32_SFLOAT,
            Format::Rgb32Float => vk::Format::R32G32B32_SFLOAT,
            Format::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
            Format::Depth32 => vk::Format::D32_SFLOAT,
            Format::Depth32Stencil8 => vk::Format::D32_SFLOAT_S8_UINT,
            Format::Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
        }
    }
}

pub(crate) fn format_from_vk(format: vk::Format) -> Option<Format> {
    Some(match format {
        vk::Format::R8G8B8A8_UNORM => Format::Rgba8Unorm,
        vk::Format::R8G8B8A8_SRGB => Format::Rgba8Srgb,
        vk::Format::B8G8R8A8_UNORM => Format::Bgra8Unorm,
        vk::Format::B8G8R8A8_SRGB => Format::Bgra8Srgb,
        vk::Format::R16G16B16A16_SFLOAT => Format::Rgba16Float,
        vk::Format::D32_SFLOAT => Format::Depth32,
        vk::Format::D32_SFLOAT_S8_UINT => Format::Depth32Stencil8,
        vk::Format::D24_UNORM_S8_UINT => Format::Depth24Stencil8,
        _ => return None,
    })
}

impl ToVk for SampleCount {
    type Target = vk::SampleCountFlags;

    fn to_vk(self) -> Self::Target {
        match self {
            SampleCount::One => vk::SampleCountFlags::TYPE_1,
            SampleCount::Two => vk::SampleCountFlags::TYPE_2,
            SampleCount::Four => vk::SampleCountFlags::TYPE_4,
            SampleCount::Eight => vk::SampleCountFlags::TYPE_8,
        }
    }
}

impl ToVk for AttachmentLoadOp {
    type Target = vk::AttachmentLoadOp;

    fn to_vk(self) -> Self::Target {
        match self {
            AttachmentLoadOp::Load => vk::AttachmentLoadOp::LOAD,
            AttachmentLoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            AttachmentLoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

impl ToVk for AttachmentStoreOp {
    type Target = vk::AttachmentStoreOp;

    fn to_vk(self) -> Self::Target {
        match self {
            AttachmentStoreOp::Store => vk::AttachmentStoreOp::STORE,
            AttachmentStoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

impl ToVk for ImageLayout {
    type Target = vk::ImageLayout;

    fn to_vk(self) -> Self::Target {
        match self {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::General => vk::ImageLayout::GENERAL,
            ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilAttachment => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
            ImageLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

impl ToVk for PipelineBindPoint {
    type Target = vk::PipelineBindPoint;

    fn to_vk(self) -> Self::Target {
        match self {
            PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
        }
    }
}

impl ToVk for SubpassTarget {
    type Target = u32;

    fn to_vk(self) -> Self::Target {
        match self {
            SubpassTarget::External => vk::SUBPASS_EXTERNAL,
            SubpassTarget::Index(index) => index,
        }
    }
}

impl ToVk for DescriptorType {
    type Target = vk::DescriptorType;

    fn to_vk(self) -> Self::Target {
        match self {
            DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorType::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }
}

impl ToVk for FilterMode {
    type Target = vk::Filter;

    fn to_vk(self) -> Self::Target {
        match self {
            FilterMode::Nearest => vk::Filter::NEAREST,
            FilterMode::Linear => vk::Filter::LINEAR,
        }
    }
}

impl ToVk for MipmapMode {
    type Target = vk::SamplerMipmapMode;

    fn to_vk(self) -> Self::Target {
        match self {
            MipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
            MipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
        }
    }
}

impl ToVk for AddressMode {
    type Target = vk::SamplerAddressMode;

    fn to_vk(self) -> Self::Target {
        match self {
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }
}

impl ToVk for IndexType {
    type Target = vk::IndexType;

    fn to_vk(self) -> Self::Target {
        match self {
            IndexType::Uint16 => vk::IndexType::UINT16,
            IndexType::Uint32 => vk::IndexType::UINT32,
        }
    }
}

impl ToVk for FrontFace {
    type Target = vk::FrontFace;

    fn to_vk(self) -> Self::Target {
        match self {
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

impl ToVk for CullMode {
    type Target = vk::CullModeFlags;

    fn to_vk(self) -> Self::Target {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

impl ToVk for CompareOp {
    type Target = vk::CompareOp;

    fn to_vk(self) -> Self::Target {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

impl ToVk for PrimitiveTopology {
    type Target = vk::PrimitiveTopology;

    fn to_vk(self) -> Self::Target {
        match self {
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        }
    }
}

impl ToVk for VertexInputRate {
    type Target = vk::VertexInputRate;

    fn to_vk(self) -> Self::Target {
        match self {
            VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
            VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
        }
    }
}

impl ToVk for ClearValue {
    type Target = vk::ClearValue;

    fn to_vk(self) -> Self::Target {
        match self {
            ClearValue::Color(color) => vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

impl ToVk for ImageUsageFlags {
    type Target = vk::ImageUsageFlags;

    fn to_vk(self) -> Self::Target {
        let mut flags = vk::ImageUsageFlags::empty();
        case!(self, flags, ImageUsageFlags::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC);
        case!(self, flags, ImageUsageFlags::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST);
        case!(self, flags, ImageUsageFlags::SAMPLED, vk::ImageUsageFlags::SAMPLED);
        case!(self, flags, ImageUsageFlags::STORAGE, vk::ImageUsageFlags::STORAGE);
        case!(
            self,
            flags,
            ImageUsageFlags::COLOR_ATTACHMENT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        );
        case!(
            self,
            flags,
            ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        );
        case!(
            self,
            flags,
            ImageUsageFlags::TRANSIENT_ATTACHMENT,
            vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
        );
        case!(
            self,
            flags,
            ImageUsageFlags::INPUT_ATTACHMENT,
            vk::ImageUsageFlags::INPUT_ATTACHMENT
        );
        flags
    }
}

impl ToVk for BufferUsageFlags {
    type Target = vk::BufferUsageFlags;

    fn to_vk(self) -> Self::Target {
        let mut flags = vk::BufferUsageFlags::empty();
        case!(self, flags, BufferUsageFlags::TRANSFER_SRC, vk::BufferUsageFlags::TRANSFER_SRC);
        case!(self, flags, BufferUsageFlags::TRANSFER_DST, vk::BufferUsageFlags::TRANSFER_DST);
        case!(
            self,
            flags,
            BufferUsageFlags::UNIFORM_BUFFER,
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        case!(
            self,
            flags,
            BufferUsageFlags::STORAGE_BUFFER,
            vk::BufferUsageFlags::STORAGE_BUFFER
        );
        case!(self, flags, BufferUsageFlags::INDEX_BUFFER, vk::BufferUsageFlags::INDEX_BUFFER);
        case!(self, flags, BufferUsageFlags::VERTEX_BUFFER, vk::BufferUsageFlags::VERTEX_BUFFER);
        case!(
            self,
            flags,
            BufferUsageFlags::INDIRECT_BUFFER,
            vk::BufferUsageFlags::INDIRECT_BUFFER
        );
        flags
    }
}

impl ToVk for ImageAspect {
    type Target = vk::ImageAspectFlags;

    fn to_vk(self) -> Self::Target {
        let mut flags = vk::ImageAspectFlags::empty();
        case!(self, flags, ImageAspect::COLOR, vk::ImageAspectFlags::COLOR);
        case!(self, flags, ImageAspect::DEPTH, vk::ImageAspectFlags::DEPTH);
        case!(self, flags, ImageAspect::STENCIL, vk::ImageAspectFlags::STENCIL);
        flags
    }
}

impl ToVk for ShaderStageFlags {
    type Target = vk::ShaderStageFlags;

    fn to_vk(self) -> Self::Target {
        let mut flags = vk::ShaderStageFlags::empty();
        case!(self, flags, ShaderStageFlags::VERTEX, vk::ShaderStageFlags::VERTEX);
        case!(self, flags, ShaderStageFlags::FRAGMENT, vk::ShaderStageFlags::FRAGMENT);
        case!(self, flags, ShaderStageFlags::COMPUTE, vk::ShaderStageFlags::COMPUTE);
        flags
    }
}

impl ToVk for PipelineStageFlags {
    type Target = vk::PipelineStageFlags;

    fn to_vk(self) -> Self::Target {
        let mut flags = vk::PipelineStageFlags::empty();
        case!(self, flags, PipelineStageFlags::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE);
        case!(
            self,
            flags,
            PipelineStageFlags::DRAW_INDIRECT,
            vk::PipelineStageFlags::DRAW_INDIRECT
        );
        case!(
            self,
            flags,
            PipelineStageFlags::VERTEX_INPUT,
            vk::PipelineStageFlags::VERTEX_INPUT
        );
        case!(
            self,
            flags,
            PipelineStageFlags::VERTEX_SHADER,
            vk::PipelineStageFlags::VERTEX_SHADER
        );
        case!(
            self,
            flags,
            PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::FRAGMENT_SHADER
        );
        case!(
            self,
            flags,
            PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        );
        case!(
            self,
            flags,
            PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        );
        case!(
            self,
            flags,
            PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        case!(self, flags, PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER);
        case!(
            self,
            flags,
            PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        );
        case!(
            self,
            flags,
            PipelineStageFlags::ALL_GRAPHICS,
            vk::PipelineStageFlags::ALL_GRAPHICS
        );
        case!(
            self,
            flags,
            PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS
        );
        flags
    }
}

impl ToVk for AccessFlags {
    type Target = vk::AccessFlags;

    fn to_vk(self) -> Self::Target {
        let mut flags = vk::AccessFlags::empty();
        case!(
            self,
            flags,
            AccessFlags::INDIRECT_COMMAND_READ,
            vk::AccessFlags::INDIRECT_COMMAND_READ
        );
        case!(self, flags, AccessFlags::INDEX_READ, vk::AccessFlags::INDEX_READ);
        case!(
            self,
            flags,
            AccessFlags::VERTEX_ATTRIBUTE_READ,
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ
        );
        case!(self, flags, AccessFlags::UNIFORM_READ, vk::AccessFlags::UNIFORM_READ);
        case!(
            self,
            flags,
            AccessFlags::INPUT_ATTACHMENT_READ,
            vk::AccessFlags::INPUT_ATTACHMENT_READ
        );
        case!(self, flags, AccessFlags::SHADER_READ, vk::AccessFlags::SHADER_READ);
        case!(self, flags, AccessFlags::SHADER_WRITE, vk::AccessFlags::SHADER_WRITE);
        case!(
            self,
            flags,
            AccessFlags::COLOR_ATTACHMENT_READ,
            vk::AccessFlags::COLOR_ATTACHMENT_READ
        );
        case!(
            self,
            flags,
            AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
        case!(
            self,
            flags,
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
        );
        case!(
            self,
            flags,
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        case!(self, flags, AccessFlags::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ);
        case!(self, flags, AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE);
        case!(self, flags, AccessFlags::MEMORY_READ, vk::AccessFlags::MEMORY_READ);
        case!(self, flags, AccessFlags::MEMORY_WRITE, vk::AccessFlags::MEMORY_WRITE);
        flags
    }
}

impl ToVk for DependencyFlags {
    type Target = vk::DependencyFlags;

    fn to_vk(self) -> Self::Target {
        let mut flags = vk::DependencyFlags::empty();
        case!(self, flags, DependencyFlags::BY_REGION, vk::DependencyFlags::BY_REGION);
        flags
    }
}

impl ToVk for AttachmentFlags {
    type Target = vk::AttachmentDescriptionFlags;

    fn to_vk(self) -> Self::Target {
        let mut flags = vk::AttachmentDescriptionFlags::empty();
        case!(
            self,
            flags,
            AttachmentFlags::MAY_ALIAS,
            vk::AttachmentDescriptionFlags::MAY_ALIAS
        );
        flags
    }
}

impl ToVk for CommandBufferUsage {
    type Target = vk::CommandBufferUsageFlags;

    fn to_vk(self) -> Self::Target {
        let mut flags = vk::CommandBufferUsageFlags::empty();
        case!(
            self,
            flags,
            CommandBufferUsage::ONE_TIME_SUBMIT,
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        );
        case!(
            self,
            flags,
            CommandBufferUsage::SIMULTANEOUS_USE,
            vk::CommandBufferUsageFlags::SIMULTANEOUS_USE
        );
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_masks_convert_bit_by_bit() {
        let stages = PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | PipelineStageFlags::BOTTOM_OF_PIPE;
        assert_eq!(
            stages.to_vk(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::BOTTOM_OF_PIPE
        );
        assert_eq!(SubpassTarget::External.to_vk(), vk::SUBPASS_EXTERNAL);
    }

    #[test]
    fn swapchain_results_stay_recoverable() {
        assert!(to_gpu_error("vkAcquireNextImageKHR", vk::Result::ERROR_OUT_OF_DATE_KHR)
            .is_swapchain_recoverable());
        assert_eq!(
            to_gpu_error("vkAllocateDescriptorSets", vk::Result::ERROR_OUT_OF_POOL_MEMORY),
            GpuError::OutOfPoolMemory
        );
    }
}
