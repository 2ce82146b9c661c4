pub mod dummy;

#[cfg(feature = "vulkan")]
pub mod vulkan;

use crate::{
    Buffer, BufferDescription, CommandBuffer, CommandBufferUsage, DescriptorPool,
    DescriptorPoolDescription, DescriptorSet, DescriptorSetLayout,
    DescriptorSetLayoutDescription, DescriptorWrite, DeviceInfo, Fence, Framebuffer,
    FramebufferDescription, GpuResult, GraphicsPipeline, GraphicsPipelineDescription, Image,
    ImageDescription, ImageView, ImageViewDescription, IndexType, PipelineLayout,
    PipelineLayoutDescription, RenderPass, RenderPassBeginInfo, RenderPassDescription, Sampler,
    SamplerDescription, Semaphore, ShaderModule, ShaderModuleDescription, ShaderStageFlags,
    SubmitInfo,
};

/// The native graphics API as seen by the renderer.
///
/// Creation and destruction calls are synchronous. The recording calls are
/// `unsafe` because the caller must guarantee that the command buffer is in the
/// recording state and is not in use by the device.
pub trait Hal: Send + Sync {
    fn device_info(&self) -> DeviceInfo;
    fn device_wait_idle(&self) -> GpuResult<()>;

    fn create_image(&self, description: &ImageDescription) -> GpuResult<Image>;
    fn destroy_image(&self, image: Image) -> GpuResult<()>;
    fn create_image_view(&self, description: &ImageViewDescription) -> GpuResult<ImageView>;
    fn destroy_image_view(&self, view: ImageView) -> GpuResult<()>;

    fn create_buffer(&self, description: &BufferDescription) -> GpuResult<Buffer>;
    fn destroy_buffer(&self, buffer: Buffer) -> GpuResult<()>;
    /// Returns a pointer to the start of the host-visible memory of `buffer`.
    ///
    /// # Safety
    /// The pointer is valid for `buffer.size` bytes until `unmap_buffer` is
    /// called or the buffer is destroyed.
    unsafe fn map_buffer(&self, buffer: Buffer) -> GpuResult<*mut u8>;
    /// # Safety
    /// No pointer returned by `map_buffer` may be used afterwards.
    unsafe fn unmap_buffer(&self, buffer: Buffer) -> GpuResult<()>;

    fn create_sampler(&self, description: &SamplerDescription) -> GpuResult<Sampler>;
    fn destroy_sampler(&self, sampler: Sampler) -> GpuResult<()>;

    fn create_render_pass(&self, description: &RenderPassDescription) -> GpuResult<RenderPass>;
    fn destroy_render_pass(&self, render_pass: RenderPass) -> GpuResult<()>;
    fn create_framebuffer(&self, description: &FramebufferDescription)
        -> GpuResult<Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: Framebuffer) -> GpuResult<()>;

    fn create_descriptor_set_layout(
        &self,
        description: &DescriptorSetLayoutDescription,
    ) -> GpuResult<DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayout) -> GpuResult<()>;
    fn create_pipeline_layout(
        &self,
        description: &PipelineLayoutDescription,
    ) -> GpuResult<PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: PipelineLayout) -> GpuResult<()>;

    fn create_descriptor_pool(
        &self,
        description: &DescriptorPoolDescription,
    ) -> GpuResult<DescriptorPool>;
    fn reset_descriptor_pool(&self, pool: DescriptorPool) -> GpuResult<()>;
    fn destroy_descriptor_pool(&self, pool: DescriptorPool) -> GpuResult<()>;
    /// Fails with [`crate::GpuError::OutOfPoolMemory`] when the pool cannot
    /// satisfy the request.
    fn allocate_descriptor_sets(
        &self,
        pool: DescriptorPool,
        layouts: &[DescriptorSetLayout],
    ) -> GpuResult<Vec<DescriptorSet>>;
    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) -> GpuResult<()>;

    fn create_shader_module(&self, description: &ShaderModuleDescription)
        -> GpuResult<ShaderModule>;
    fn destroy_shader_module(&self, module: ShaderModule) -> GpuResult<()>;
    fn create_graphics_pipeline(
        &self,
        description: &GraphicsPipelineDescription,
    ) -> GpuResult<GraphicsPipeline>;
    fn destroy_graphics_pipeline(&self, pipeline: GraphicsPipeline) -> GpuResult<()>;

    fn allocate_command_buffers(&self, count: usize) -> GpuResult<Vec<CommandBuffer>>;
    fn free_command_buffers(&self, command_buffers: &[CommandBuffer]) -> GpuResult<()>;

    fn create_semaphore(&self, label: Option<&str>) -> GpuResult<Semaphore>;
    fn destroy_semaphore(&self, semaphore: Semaphore) -> GpuResult<()>;
    fn create_fence(&self, label: Option<&str>, signaled: bool) -> GpuResult<Fence>;
    fn destroy_fence(&self, fence: Fence) -> GpuResult<()>;
    fn wait_for_fence(&self, fence: Fence, timeout_ns: u64) -> GpuResult<()>;
    fn reset_fence(&self, fence: Fence) -> GpuResult<()>;

    /// # Safety
    /// The command buffer must not be pending execution.
    unsafe fn begin_command_buffer(
        &self,
        command_buffer: CommandBuffer,
        usage: CommandBufferUsage,
    ) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording.
    unsafe fn end_command_buffer(&self, command_buffer: CommandBuffer) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording outside a render pass.
    unsafe fn cmd_begin_render_pass(
        &self,
        command_buffer: CommandBuffer,
        info: &RenderPassBeginInfo,
    ) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording inside a render pass.
    unsafe fn cmd_next_subpass(&self, command_buffer: CommandBuffer) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording inside a render pass.
    unsafe fn cmd_end_render_pass(&self, command_buffer: CommandBuffer) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording.
    unsafe fn cmd_bind_graphics_pipeline(
        &self,
        command_buffer: CommandBuffer,
        pipeline: GraphicsPipeline,
    ) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording.
    unsafe fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: CommandBuffer,
        layout: PipelineLayout,
        first_set: u32,
        sets: &[DescriptorSet],
    ) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording.
    unsafe fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: CommandBuffer,
        first_binding: u32,
        buffers: &[Buffer],
        offsets: &[u64],
    ) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording.
    unsafe fn cmd_bind_index_buffer(
        &self,
        command_buffer: CommandBuffer,
        buffer: Buffer,
        offset: u64,
        index_type: IndexType,
    ) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording.
    unsafe fn cmd_push_constants(
        &self,
        command_buffer: CommandBuffer,
        layout: PipelineLayout,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording inside a render pass with a
    /// pipeline bound.
    unsafe fn cmd_draw_indexed(
        &self,
        command_buffer: CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> GpuResult<()>;
    /// # Safety
    /// The command buffer must be recording inside a render pass with a
    /// pipeline bound.
    unsafe fn cmd_draw_indexed_indirect(
        &self,
        command_buffer: CommandBuffer,
        buffer: Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) -> GpuResult<()>;

    /// Submits to the graphics queue.
    fn submit(&self, info: &SubmitInfo) -> GpuResult<()>;
}
