use std::sync::Arc;

use log::trace;

use crate::hal::dummy::DummyHal;
use crate::hal::Hal;
use crate::{
    Buffer, BufferDescription, CommandBuffer, DescriptorPool, DescriptorPoolDescription,
    DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutDescription, DescriptorWrite,
    DeviceInfo, DeviceLimits, Fence, Format, Framebuffer, FramebufferDescription, GpuError,
    GpuResult, GraphicsPipeline, GraphicsPipelineDescription, Image, ImageDescription, ImageView,
    ImageViewDescription, MemoryDomain, PipelineLayout, PipelineLayoutDescription, RenderPass,
    RenderPassDescription, Sampler, SamplerDescription, Semaphore, ShaderModule,
    ShaderModuleDescription, SubmitInfo,
};

/// Front-end over a [`Hal`] backend.
///
/// Cloning a `Device` is cheap: all clones share the same backend.
#[derive(Clone)]
pub struct Device {
    pub(crate) device_info: DeviceInfo,
    pub(crate) hal: Arc<dyn Hal>,
}

impl Device {
    pub fn new(hal: Arc<dyn Hal>) -> Self {
        let device_info = hal.device_info();
        log::info!(
            "Created device {} ({})",
            device_info.name,
            device_info.api_description
        );
        Self { device_info, hal }
    }

    /// A device backed by a fresh [`DummyHal`], returned alongside it so the
    /// caller can inspect what was recorded.
    pub fn dummy() -> (Self, Arc<DummyHal>) {
        let hal = Arc::new(DummyHal::default());
        (Self::new(hal.clone()), hal)
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.device_info.limits
    }

    pub fn depth_format(&self) -> Format {
        self.device_info.depth_format
    }

    pub fn hal(&self) -> &dyn Hal {
        self.hal.as_ref()
    }

    pub fn wait_idle(&self) -> GpuResult<()> {
        self.hal.device_wait_idle()
    }

    pub fn create_image(&self, description: &ImageDescription) -> GpuResult<Image> {
        if description.extents.area() == 0 {
            return Err(GpuError::invalid_description(
                description.label.unwrap_or("image"),
                format!("zero-sized extents {:?}", description.extents),
            ));
        }
        if description.usage_flags.is_empty() {
            return Err(GpuError::invalid_description(
                description.label.unwrap_or("image"),
                "no usage flags",
            ));
        }
        let image = self.hal.create_image(description)?;
        trace!("Created image {:?} ({:?})", description.label, image);
        Ok(image)
    }

    pub fn destroy_image(&self, image: Image) -> GpuResult<()> {
        self.hal.destroy_image(image)
    }

    pub fn create_image_view(&self, description: &ImageViewDescription) -> GpuResult<ImageView> {
        if !description.image.format.aspect().contains(description.aspect) {
            return Err(GpuError::invalid_description(
                description.label.unwrap_or("image view"),
                format!(
                    "aspect {:?} not available on a {:?} image",
                    description.aspect, description.image.format
                ),
            ));
        }
        self.hal.create_image_view(description)
    }

    pub fn destroy_image_view(&self, view: ImageView) -> GpuResult<()> {
        self.hal.destroy_image_view(view)
    }

    pub fn create_buffer(&self, description: &BufferDescription) -> GpuResult<Buffer> {
        if description.size == 0 {
            return Err(GpuError::invalid_description(
                description.label.unwrap_or("buffer"),
                "zero-sized buffer",
            ));
        }
        let buffer = self.hal.create_buffer(description)?;
        trace!(
            "Created buffer {:?} of {} bytes",
            description.label,
            description.size
        );
        Ok(buffer)
    }

    pub fn destroy_buffer(&self, buffer: Buffer) -> GpuResult<()> {
        self.hal.destroy_buffer(buffer)
    }

    /// Maps a host-visible buffer. The mapping is released when the returned
    /// guard is dropped.
    pub fn map_buffer(&self, buffer: Buffer) -> GpuResult<BufferMapping<'_>> {
        if buffer.memory_domain != MemoryDomain::HostVisible {
            return Err(GpuError::MappingFailed(format!(
                "buffer {:?} is not host visible",
                buffer
            )));
        }
        let ptr = unsafe { self.hal.map_buffer(buffer)? };
        Ok(BufferMapping {
            device: self,
            buffer,
            ptr,
        })
    }

    pub fn create_sampler(&self, description: &SamplerDescription) -> GpuResult<Sampler> {
        self.hal.create_sampler(description)
    }

    pub fn destroy_sampler(&self, sampler: Sampler) -> GpuResult<()> {
        self.hal.destroy_sampler(sampler)
    }

    pub fn create_render_pass(&self, description: &RenderPassDescription) -> GpuResult<RenderPass> {
        let render_pass = self.hal.create_render_pass(description)?;
        trace!(
            "Created render pass {:?}: {} attachments, {} subpasses, {} dependencies",
            description.label,
            description.attachments.len(),
            description.subpasses.len(),
            description.dependencies.len()
        );
        Ok(render_pass)
    }

    pub fn destroy_render_pass(&self, render_pass: RenderPass) -> GpuResult<()> {
        self.hal.destroy_render_pass(render_pass)
    }

    pub fn create_framebuffer(
        &self,
        description: &FramebufferDescription,
    ) -> GpuResult<Framebuffer> {
        for view in description.attachments {
            let owner = view.owner.extents;
            if owner.width < description.extents.width
                || owner.height < description.extents.height
            {
                return Err(GpuError::invalid_description(
                    description.label.unwrap_or("framebuffer"),
                    format!(
                        "attachment extents {:?} are smaller than framebuffer extents {:?}",
                        view.owner.extents, description.extents
                    ),
                ));
            }
        }
        self.hal.create_framebuffer(description)
    }

    pub fn destroy_framebuffer(&self, framebuffer: Framebuffer) -> GpuResult<()> {
        self.hal.destroy_framebuffer(framebuffer)
    }

    pub fn create_descriptor_set_layout(
        &self,
        description: &DescriptorSetLayoutDescription,
    ) -> GpuResult<DescriptorSetLayout> {
        let mut seen = description
            .bindings
            .iter()
            .map(|b| b.binding)
            .collect::<Vec<_>>();
        seen.sort_unstable();
        if seen.windows(2).any(|w| w[0] == w[1]) {
            return Err(GpuError::invalid_description(
                description.label.unwrap_or("descriptor set layout"),
                "duplicate binding slot",
            ));
        }
        self.hal.create_descriptor_set_layout(description)
    }

    pub fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayout) -> GpuResult<()> {
        self.hal.destroy_descriptor_set_layout(layout)
    }

    pub fn create_pipeline_layout(
        &self,
        description: &PipelineLayoutDescription,
    ) -> GpuResult<PipelineLayout> {
        let limits = self.limits();
        if description.set_layouts.len() as u32 > limits.max_bound_descriptor_sets {
            return Err(GpuError::invalid_description(
                description.label.unwrap_or("pipeline layout"),
                format!(
                    "{} set layouts exceed the device limit of {}",
                    description.set_layouts.len(),
                    limits.max_bound_descriptor_sets
                ),
            ));
        }
        for range in description.push_constant_ranges {
            if range.offset + range.size > limits.max_push_constants_size {
                return Err(GpuError::invalid_description(
                    description.label.unwrap_or("pipeline layout"),
                    format!("push constant range {:?} exceeds the device limit", range),
                ));
            }
        }
        self.hal.create_pipeline_layout(description)
    }

    pub fn destroy_pipeline_layout(&self, layout: PipelineLayout) -> GpuResult<()> {
        self.hal.destroy_pipeline_layout(layout)
    }

    pub fn create_descriptor_pool(
        &self,
        description: &DescriptorPoolDescription,
    ) -> GpuResult<DescriptorPool> {
        self.hal.create_descriptor_pool(description)
    }

    pub fn reset_descriptor_pool(&self, pool: DescriptorPool) -> GpuResult<()> {
        self.hal.reset_descriptor_pool(pool)
    }

    pub fn destroy_descriptor_pool(&self, pool: DescriptorPool) -> GpuResult<()> {
        self.hal.destroy_descriptor_pool(pool)
    }

    pub fn allocate_descriptor_sets(
        &self,
        pool: DescriptorPool,
        layouts: &[DescriptorSetLayout],
    ) -> GpuResult<Vec<DescriptorSet>> {
        self.hal.allocate_descriptor_sets(pool, layouts)
    }

    pub fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) -> GpuResult<()> {
        let writes = writes
            .iter()
            .filter(|w| !w.resources.is_empty())
            .copied()
            .collect::<Vec<_>>();
        if writes.is_empty() {
            return Ok(());
        }
        self.hal.update_descriptor_sets(&writes)
    }

    pub fn create_shader_module(
        &self,
        description: &ShaderModuleDescription,
    ) -> GpuResult<ShaderModule> {
        if description.source.is_empty() {
            return Err(GpuError::invalid_description(
                description.label.unwrap_or("shader module"),
                "empty SPIR-V",
            ));
        }
        self.hal.create_shader_module(description)
    }

    pub fn destroy_shader_module(&self, module: ShaderModule) -> GpuResult<()> {
        self.hal.destroy_shader_module(module)
    }

    pub fn create_graphics_pipeline(
        &self,
        description: &GraphicsPipelineDescription,
    ) -> GpuResult<GraphicsPipeline> {
        let pipeline = self.hal.create_graphics_pipeline(description)?;
        trace!(
            "Created graphics pipeline {:?} for subpass {}",
            description.label,
            description.subpass
        );
        Ok(pipeline)
    }

    pub fn destroy_graphics_pipeline(&self, pipeline: GraphicsPipeline) -> GpuResult<()> {
        self.hal.destroy_graphics_pipeline(pipeline)
    }

    pub fn allocate_command_buffers(&self, count: usize) -> GpuResult<Vec<CommandBuffer>> {
        self.hal.allocate_command_buffers(count)
    }

    pub fn free_command_buffers(&self, command_buffers: &[CommandBuffer]) -> GpuResult<()> {
        if command_buffers.is_empty() {
            return Ok(());
        }
        self.hal.free_command_buffers(command_buffers)
    }

    pub fn create_semaphore(&self, label: Option<&str>) -> GpuResult<Semaphore> {
        self.hal.create_semaphore(label)
    }

    pub fn destroy_semaphore(&self, semaphore: Semaphore) -> GpuResult<()> {
        self.hal.destroy_semaphore(semaphore)
    }

    pub fn create_fence(&self, label: Option<&str>, signaled: bool) -> GpuResult<Fence> {
        self.hal.create_fence(label, signaled)
    }

    pub fn destroy_fence(&self, fence: Fence) -> GpuResult<()> {
        self.hal.destroy_fence(fence)
    }

    pub fn wait_for_fence(&self, fence: Fence, timeout_ns: u64) -> GpuResult<()> {
        self.hal.wait_for_fence(fence, timeout_ns)
    }

    pub fn reset_fence(&self, fence: Fence) -> GpuResult<()> {
        self.hal.reset_fence(fence)
    }

    pub fn submit(&self, info: &SubmitInfo) -> GpuResult<()> {
        self.hal.submit(info)
    }
}

/// A live host mapping of a buffer.
pub struct BufferMapping<'a> {
    device: &'a Device,
    buffer: Buffer,
    ptr: *mut u8,
}

impl<'a> BufferMapping<'a> {
    pub fn buffer(&self) -> Buffer {
        self.buffer
    }

    /// Copies `data` into the buffer at `offset`.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> GpuResult<()> {
        let end = offset
            .checked_add(data.len())
            .ok_or_else(|| GpuError::MappingFailed("write range overflows".into()))?;
        if end > self.buffer.size {
            return Err(GpuError::MappingFailed(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.buffer.size
            )));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len());
        }
        Ok(())
    }
}

impl<'a> Drop for BufferMapping<'a> {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.device.hal.unmap_buffer(self.buffer) } {
            log::error!("Failed to unmap buffer {:?}: {e}", self.buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{BufferUsageFlags, MemoryDomain};

    use super::*;

    fn host_buffer(device: &Device, size: usize) -> Buffer {
        device
            .create_buffer(&BufferDescription {
                label: Some("test buffer"),
                size,
                usage_flags: BufferUsageFlags::STORAGE_BUFFER,
                memory_domain: MemoryDomain::HostVisible,
            })
            .unwrap()
    }

    #[test]
    fn mapping_writes_land_in_buffer() {
        let (device, hal) = Device::dummy();
        let buffer = host_buffer(&device, 16);
        {
            let mut mapping = device.map_buffer(buffer).unwrap();
            mapping.write(4, &[1, 2, 3, 4]).unwrap();
        }
        let contents = hal.buffer_contents(buffer).unwrap();
        assert_eq!(&contents[4..8], &[1, 2, 3, 4]);
        assert!(!hal.is_mapped(buffer));
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let (device, _hal) = Device::dummy();
        let buffer = host_buffer(&device, 8);
        let mut mapping = device.map_buffer(buffer).unwrap();
        assert!(mapping.write(6, &[0; 4]).is_err());
    }

    #[test]
    fn zero_sized_buffers_are_invalid() {
        let (device, _hal) = Device::dummy();
        let result = device.create_buffer(&BufferDescription {
            label: Some("empty"),
            size: 0,
            usage_flags: BufferUsageFlags::STORAGE_BUFFER,
            memory_domain: MemoryDomain::HostVisible,
        });
        assert!(matches!(result, Err(GpuError::InvalidDescription { .. })));
    }
}
