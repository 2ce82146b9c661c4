use dgpu::{
    Buffer, CommandBuffer, DescriptorPool, DescriptorSetLayout, Device, Fence, Framebuffer,
    GraphicsPipeline, Image, ImageView, PipelineLayout, RenderPass, Sampler, Semaphore,
    ShaderModule,
};
use log::{error, trace};
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::error::RendererResult;

/// Groups of GPU objects, declared in the order they are released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum ReleaseStage {
    CommandBuffersAndSync,
    Pipelines,
    RenderPass,
    Framebuffers,
    DescriptorPool,
    Samplers,
    PipelineLayouts,
    DescriptorSetLayouts,
    Buffers,
    Attachments,
    ShaderModules,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GpuObject {
    CommandBuffer(CommandBuffer),
    Semaphore(Semaphore),
    Fence(Fence),
    GraphicsPipeline(GraphicsPipeline),
    RenderPass(RenderPass),
    Framebuffer(Framebuffer),
    DescriptorPool(DescriptorPool),
    Sampler(Sampler),
    PipelineLayout(PipelineLayout),
    DescriptorSetLayout(DescriptorSetLayout),
    Buffer(Buffer),
    Image(Image),
    ImageView(ImageView),
    ShaderModule(ShaderModule),
}

impl GpuObject {
    fn release(self, device: &Device) -> RendererResult<()> {
        match self {
            GpuObject::CommandBuffer(command_buffer) => {
                device.free_command_buffers(&[command_buffer])?
            }
            GpuObject::Semaphore(semaphore) => device.destroy_semaphore(semaphore)?,
            GpuObject::Fence(fence) => device.destroy_fence(fence)?,
            GpuObject::GraphicsPipeline(pipeline) => device.destroy_graphics_pipeline(pipeline)?,
            GpuObject::RenderPass(render_pass) => device.destroy_render_pass(render_pass)?,
            GpuObject::Framebuffer(framebuffer) => device.destroy_framebuffer(framebuffer)?,
            GpuObject::DescriptorPool(pool) => device.destroy_descriptor_pool(pool)?,
            GpuObject::Sampler(sampler) => device.destroy_sampler(sampler)?,
            GpuObject::PipelineLayout(layout) => device.destroy_pipeline_layout(layout)?,
            GpuObject::DescriptorSetLayout(layout) => {
                device.destroy_descriptor_set_layout(layout)?
            }
            GpuObject::Buffer(buffer) => device.destroy_buffer(buffer)?,
            GpuObject::Image(image) => device.destroy_image(image)?,
            GpuObject::ImageView(view) => device.destroy_image_view(view)?,
            GpuObject::ShaderModule(module) => device.destroy_shader_module(module)?,
        }
        Ok(())
    }
}

/// Objects waiting to be released, bucketed by [`ReleaseStage`].
///
/// Within a stage, objects are released in the order they were pushed.
#[derive(Debug, Default)]
pub struct TeardownList {
    stages: [Vec<GpuObject>; ReleaseStage::COUNT],
}

impl TeardownList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: ReleaseStage, object: GpuObject) {
        self.stages[stage as usize].push(object);
    }

    pub fn extend(&mut self, stage: ReleaseStage, objects: impl IntoIterator<Item = GpuObject>) {
        self.stages[stage as usize].extend(objects);
    }

    pub fn len(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(Vec::is_empty)
    }

    /// Releases every pending stage up to and including `last`.
    pub fn release_through(&mut self, device: &Device, last: ReleaseStage) -> RendererResult<()> {
        for stage in ReleaseStage::iter().take_while(|stage| *stage <= last) {
            for object in std::mem::take(&mut self.stages[stage as usize]) {
                trace!("Releasing {:?} ({:?})", object, stage);
                object.release(device)?;
            }
        }
        Ok(())
    }

    pub fn release(&mut self, device: &Device) -> RendererResult<()> {
        self.release_through(device, ReleaseStage::ShaderModules)
    }

    /// Releases objects created by a construction step that failed. Release
    /// errors are logged so the caller can report the original failure.
    pub fn rollback(mut self, device: &Device) {
        if let Err(e) = self.release(device) {
            error!("Failed to release partially created objects: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use dgpu::dummy::HalEvent;
    use dgpu::{
        BufferDescription, BufferUsageFlags, Handle, HandleType, MemoryDomain,
        SamplerDescription,
    };

    use super::*;

    #[test]
    fn objects_are_released_by_stage_then_push_order() {
        let (device, hal) = Device::dummy();
        let buffer = device
            .create_buffer(&BufferDescription {
                label: Some("buffer"),
                size: 16,
                usage_flags: BufferUsageFlags::STORAGE_BUFFER,
                memory_domain: MemoryDomain::HostVisible,
            })
            .unwrap();
        let sampler = device
            .create_sampler(&SamplerDescription {
                label: Some("sampler"),
                mag_filter: dgpu::FilterMode::Linear,
                min_filter: dgpu::FilterMode::Linear,
                mipmap_mode: dgpu::MipmapMode::Linear,
                address_mode: dgpu::AddressMode::Repeat,
                max_anisotropy: None,
                min_lod: 0.0,
                max_lod: 1.0,
            })
            .unwrap();
        let fence = device.create_fence(Some("fence"), true).unwrap();
        let semaphore = device.create_semaphore(Some("semaphore")).unwrap();
        hal.clear_events();

        let mut list = TeardownList::new();
        list.push(ReleaseStage::Buffers, GpuObject::Buffer(buffer));
        list.push(ReleaseStage::Samplers, GpuObject::Sampler(sampler));
        list.push(ReleaseStage::CommandBuffersAndSync, GpuObject::Fence(fence));
        list.push(
            ReleaseStage::CommandBuffersAndSync,
            GpuObject::Semaphore(semaphore),
        );
        assert_eq!(list.len(), 4);
        list.release(&device).unwrap();
        assert!(list.is_empty());

        let destroyed = hal
            .events()
            .into_iter()
            .filter_map(|event| match event {
                HalEvent::Destroyed { ty, id } => Some((ty, id)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            destroyed,
            vec![
                (HandleType::Fence, fence.id()),
                (HandleType::Semaphore, semaphore.id()),
                (HandleType::Sampler, sampler.id()),
                (HandleType::Buffer, buffer.id()),
            ]
        );
    }

    #[test]
    fn partial_release_keeps_later_stages() {
        let (device, hal) = Device::dummy();
        let fence = device.create_fence(None, false).unwrap();
        let semaphore = device.create_semaphore(None).unwrap();
        let mut list = TeardownList::new();
        list.push(ReleaseStage::CommandBuffersAndSync, GpuObject::Fence(fence));
        list.push(ReleaseStage::ShaderModules, GpuObject::Semaphore(semaphore));

        list.release_through(&device, ReleaseStage::Attachments)
            .unwrap();
        assert!(!hal.is_live(HandleType::Fence, fence.id()));
        assert!(hal.is_live(HandleType::Semaphore, semaphore.id()));
        assert_eq!(list.len(), 1);
    }
}
