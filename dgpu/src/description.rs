use crate::{
    AccessFlags, AddressMode, AttachmentFlags, AttachmentLoadOp, AttachmentStoreOp, Buffer,
    BufferUsageFlags, ClearValue, CommandBuffer, CompareOp, CullMode, DependencyFlags,
    DescriptorSet, DescriptorSetLayout, DescriptorType, Extents2D, Fence, FilterMode, Format,
    FrontFace, Image, ImageAspect, ImageLayout, ImageUsageFlags, ImageView, MemoryDomain,
    MipmapMode, PipelineBindPoint, PipelineLayout, PipelineStageFlags, PrimitiveTopology, Rect2D,
    RenderPass, SampleCount, Sampler, Semaphore, ShaderModule, ShaderStageFlags, VertexInputRate,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceLimits {
    pub max_sampler_anisotropy: f32,
    pub max_bound_descriptor_sets: u32,
    pub max_push_constants_size: u32,
    pub min_storage_buffer_offset_alignment: u64,
    pub max_storage_buffer_range: u64,
}

#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub api_description: String,
    pub limits: DeviceLimits,
    pub depth_format: Format,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageDescription<'a> {
    pub label: Option<&'a str>,
    pub extents: Extents2D,
    pub format: Format,
    pub usage_flags: ImageUsageFlags,
    pub samples: SampleCount,
    pub memory_domain: MemoryDomain,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageViewDescription<'a> {
    pub label: Option<&'a str>,
    pub image: Image,
    pub format: Format,
    pub aspect: ImageAspect,
}

#[derive(Clone, Copy, Debug)]
pub struct BufferDescription<'a> {
    pub label: Option<&'a str>,
    pub size: usize,
    pub usage_flags: BufferUsageFlags,
    pub memory_domain: MemoryDomain,
}

#[derive(Clone, Copy, Debug)]
pub struct SamplerDescription<'a> {
    pub label: Option<&'a str>,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_mode: MipmapMode,
    pub address_mode: AddressMode,
    /// `None` disables anisotropic filtering.
    pub max_anisotropy: Option<f32>,
    pub min_lod: f32,
    pub max_lod: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentDescription {
    pub flags: AttachmentFlags,
    pub format: Format,
    pub samples: SampleCount,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
    pub stencil_load_op: AttachmentLoadOp,
    pub stencil_store_op: AttachmentStoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentReference {
    pub attachment: u32,
    pub layout: ImageLayout,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SubpassDescription {
    pub bind_point: PipelineBindPoint,
    pub input_attachments: Vec<AttachmentReference>,
    pub color_attachments: Vec<AttachmentReference>,
    pub depth_stencil_attachment: Option<AttachmentReference>,
}

/// Either side of a subpass dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubpassTarget {
    /// Work outside the render pass instance: previous frames, presentation.
    External,
    Index(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubpassDependency {
    pub src_subpass: SubpassTarget,
    pub dst_subpass: SubpassTarget,
    pub src_stage_mask: PipelineStageFlags,
    pub dst_stage_mask: PipelineStageFlags,
    pub src_access_mask: AccessFlags,
    pub dst_access_mask: AccessFlags,
    pub flags: DependencyFlags,
}

#[derive(Clone, Copy, Debug)]
pub struct RenderPassDescription<'a> {
    pub label: Option<&'a str>,
    pub attachments: &'a [AttachmentDescription],
    pub subpasses: &'a [SubpassDescription],
    pub dependencies: &'a [SubpassDependency],
}

#[derive(Clone, Copy, Debug)]
pub struct FramebufferDescription<'a> {
    pub label: Option<&'a str>,
    pub render_pass: RenderPass,
    pub attachments: &'a [ImageView],
    pub extents: Extents2D,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

#[derive(Clone, Copy, Debug)]
pub struct DescriptorSetLayoutDescription<'a> {
    pub label: Option<&'a str>,
    pub bindings: &'a [DescriptorSetLayoutBinding],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineLayoutDescription<'a> {
    pub label: Option<&'a str>,
    pub set_layouts: &'a [DescriptorSetLayout],
    pub push_constant_ranges: &'a [PushConstantRange],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorPoolSize {
    pub ty: DescriptorType,
    pub count: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct DescriptorPoolDescription<'a> {
    pub label: Option<&'a str>,
    pub max_sets: u32,
    pub pool_sizes: &'a [DescriptorPoolSize],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferRange {
    pub buffer: Buffer,
    pub offset: usize,
    pub range: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorImage {
    pub view: ImageView,
    pub sampler: Option<Sampler>,
    pub layout: ImageLayout,
}

#[derive(Clone, Copy, Debug)]
pub enum DescriptorResources<'a> {
    Buffers(&'a [BufferRange]),
    Images(&'a [DescriptorImage]),
}

impl<'a> DescriptorResources<'a> {
    pub fn len(&self) -> usize {
        match self {
            DescriptorResources::Buffers(buffers) => buffers.len(),
            DescriptorResources::Images(images) => images.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DescriptorWrite<'a> {
    pub set: DescriptorSet,
    pub binding: u32,
    pub first_element: u32,
    pub ty: DescriptorType,
    pub resources: DescriptorResources<'a>,
}

#[derive(Clone, Copy, Debug)]
pub struct ShaderModuleDescription<'a> {
    pub label: Option<&'a str>,
    pub source: &'a [u32],
}

#[derive(Clone, Copy, Debug)]
pub struct ShaderStage<'a> {
    pub module: ShaderModule,
    pub entry_point: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpecializationConstant {
    pub id: u32,
    pub value: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexBindingDescription {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttributeDescription {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RasterizationState {
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
}

#[derive(Clone, Copy, Debug)]
pub struct GraphicsPipelineDescription<'a> {
    pub label: Option<&'a str>,
    pub layout: PipelineLayout,
    pub render_pass: RenderPass,
    pub subpass: u32,
    pub vertex_stage: ShaderStage<'a>,
    pub fragment_stage: Option<ShaderStage<'a>>,
    pub vertex_bindings: &'a [VertexBindingDescription],
    pub vertex_attributes: &'a [VertexAttributeDescription],
    pub topology: PrimitiveTopology,
    pub rasterization: RasterizationState,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_attachment_count: u32,
    pub viewport: Rect2D,
    pub specialization: &'a [SpecializationConstant],
}

#[derive(Clone, Copy, Debug)]
pub struct RenderPassBeginInfo<'a> {
    pub render_pass: RenderPass,
    pub framebuffer: crate::Framebuffer,
    pub render_area: Rect2D,
    pub clear_values: &'a [ClearValue],
}

#[derive(Clone, Copy, Debug)]
pub struct SemaphoreWait {
    pub semaphore: Semaphore,
    pub stage: PipelineStageFlags,
}

#[derive(Clone, Copy, Debug)]
pub struct SubmitInfo<'a> {
    pub command_buffers: &'a [CommandBuffer],
    pub wait_semaphores: &'a [SemaphoreWait],
    pub signal_semaphores: &'a [Semaphore],
    pub fence: Option<Fence>,
}
