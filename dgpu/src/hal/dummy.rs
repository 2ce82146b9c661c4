//! A host-memory backend.
//!
//! Every object is a number, buffers are plain byte arrays and command buffers
//! are lists of [`RecordedCommand`]s, which makes the backend suitable for
//! inspecting what a renderer records without a GPU.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    Buffer, BufferDescription, BufferRange, ClearValue, CommandBuffer, CommandBufferUsage,
    CullMode, DescriptorImage, DescriptorPool, DescriptorPoolDescription, DescriptorResources,
    DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBinding,
    DescriptorSetLayoutDescription, DescriptorType, DescriptorWrite, DeviceInfo, DeviceLimits,
    Extents2D, Fence, Format, Framebuffer, FramebufferDescription, FrontFace, GpuError,
    GpuResult, GraphicsPipeline, GraphicsPipelineDescription, HandleType, Image,
    ImageDescription, ImageUsageFlags, ImageView, ImageViewDescription, IndexType,
    MemoryDomain, PipelineLayout, PipelineLayoutDescription, Rect2D, RenderPass,
    RenderPassBeginInfo, RenderPassDescription, SampleCount, Sampler, SamplerDescription,
    Semaphore, ShaderModule, ShaderModuleDescription, ShaderStageFlags, SpecializationConstant,
    SubmitInfo, Swapchain, SwapchainImage,
};
use crate::{AcquiredImage, ImageAspect};

use super::Hal;

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    Begin {
        usage: CommandBufferUsage,
    },
    BeginRenderPass {
        render_pass: RenderPass,
        framebuffer: Framebuffer,
        render_area: Rect2D,
        clear_values: Vec<ClearValue>,
    },
    NextSubpass,
    EndRenderPass,
    BindGraphicsPipeline(GraphicsPipeline),
    BindDescriptorSets {
        layout: PipelineLayout,
        first_set: u32,
        sets: Vec<DescriptorSet>,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<Buffer>,
    },
    BindIndexBuffer {
        buffer: Buffer,
        index_type: IndexType,
    },
    PushConstants {
        stages: ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndexedIndirect {
        buffer: Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    End,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HalEvent {
    Created {
        ty: HandleType,
        id: u64,
        label: Option<String>,
    },
    Destroyed {
        ty: HandleType,
        id: u64,
    },
    PoolReset(DescriptorPool),
    WaitIdle,
    Submitted {
        command_buffers: Vec<CommandBuffer>,
        wait_semaphores: Vec<Semaphore>,
        signal_semaphores: Vec<Semaphore>,
        fence: Option<Fence>,
    },
    Acquired {
        image_index: u32,
    },
    Presented {
        image_index: u32,
        wait: Semaphore,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDescriptorWrite {
    pub binding: u32,
    pub first_element: u32,
    pub ty: DescriptorType,
    pub buffers: Vec<BufferRange>,
    pub images: Vec<DescriptorImage>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DummyPipelineInfo {
    pub render_pass: RenderPass,
    pub layout: PipelineLayout,
    pub subpass: u32,
    pub color_attachment_count: u32,
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
    pub depth_test: bool,
    pub vertex_attribute_count: usize,
    pub viewport: Rect2D,
    pub specialization: Vec<SpecializationConstant>,
}

#[derive(Default)]
struct DummyPool {
    max_sets: u32,
    capacity: HashMap<DescriptorType, u32>,
    used_sets: u32,
    used: HashMap<DescriptorType, u32>,
    sets: Vec<u64>,
}

struct InjectedCreationError {
    ty: HandleType,
    skip: usize,
    error: GpuError,
}

#[derive(Default)]
struct DummyState {
    live: HashMap<u64, HandleType>,
    buffers: HashMap<u64, Box<[u8]>>,
    mapped: HashSet<u64>,
    layouts: HashMap<u64, Vec<DescriptorSetLayoutBinding>>,
    pools: HashMap<u64, DummyPool>,
    descriptor_writes: HashMap<u64, Vec<RecordedDescriptorWrite>>,
    render_passes: HashMap<u64, usize>,
    framebuffers: HashMap<u64, Vec<ImageView>>,
    pipelines: HashMap<u64, DummyPipelineInfo>,
    command_buffers: HashMap<u64, Vec<RecordedCommand>>,
    fences: HashMap<u64, bool>,
    events: Vec<HalEvent>,
    acquire_errors: Vec<GpuError>,
    suboptimal_acquires: u32,
    present_errors: Vec<GpuError>,
    creation_errors: Vec<InjectedCreationError>,
    descriptor_update_errors: Vec<GpuError>,
}

pub struct DummyHal {
    next_id: AtomicU64,
    limits: DeviceLimits,
    state: Mutex<DummyState>,
}

impl Default for DummyHal {
    fn default() -> Self {
        Self::with_limits(DeviceLimits {
            max_sampler_anisotropy: 16.0,
            max_bound_descriptor_sets: 8,
            max_push_constants_size: 128,
            min_storage_buffer_offset_alignment: 16,
            max_storage_buffer_range: 1 << 27,
        })
    }
}

impl DummyHal {
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            limits,
            state: Mutex::default(),
        }
    }

    /// The commands recorded into `command_buffer` since it last began recording.
    pub fn recorded_commands(&self, command_buffer: CommandBuffer) -> Vec<RecordedCommand> {
        self.state()
            .command_buffers
            .get(&command_buffer.id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn buffer_contents(&self, buffer: Buffer) -> Option<Vec<u8>> {
        self.state().buffers.get(&buffer.id).map(|b| b.to_vec())
    }

    pub fn is_mapped(&self, buffer: Buffer) -> bool {
        self.state().mapped.contains(&buffer.id)
    }

    pub fn descriptor_writes(&self, set: DescriptorSet) -> Vec<RecordedDescriptorWrite> {
        self.state()
            .descriptor_writes
            .get(&set.id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn layout_bindings(&self, layout: DescriptorSetLayout) -> Option<Vec<DescriptorSetLayoutBinding>> {
        self.state().layouts.get(&layout.id).cloned()
    }

    pub fn framebuffer_attachments(&self, framebuffer: Framebuffer) -> Option<Vec<ImageView>> {
        self.state().framebuffers.get(&framebuffer.id).cloned()
    }

    pub fn pipeline_info(&self, pipeline: GraphicsPipeline) -> Option<DummyPipelineInfo> {
        self.state().pipelines.get(&pipeline.id).cloned()
    }

    pub fn events(&self) -> Vec<HalEvent> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    /// Number of live objects of the given type.
    pub fn live_count(&self, ty: HandleType) -> usize {
        self.state().live.values().filter(|t| **t == ty).count()
    }

    pub fn is_live(&self, ty: HandleType, id: u64) -> bool {
        self.state().live.get(&id) == Some(&ty)
    }

    /// Makes the next acquire on a [`DummySwapchain`] fail with `error`.
    pub fn fail_next_acquire(&self, error: GpuError) {
        self.state().acquire_errors.push(error);
    }

    /// Makes the next successful acquire on a [`DummySwapchain`] report a
    /// suboptimal swapchain.
    pub fn report_next_acquire_suboptimal(&self) {
        self.state().suboptimal_acquires += 1;
    }

    /// Makes the next present on a [`DummySwapchain`] fail with `error`.
    pub fn fail_next_present(&self, error: GpuError) {
        self.state().present_errors.push(error);
    }

    /// Makes the next descriptor set update fail with `error` before writing
    /// anything.
    pub fn fail_next_descriptor_update(&self, error: GpuError) {
        self.state().descriptor_update_errors.push(error);
    }

    /// Makes the next creation of an object of type `ty` fail with `error`.
    pub fn fail_next_creation(&self, ty: HandleType, error: GpuError) {
        self.fail_creation_after(ty, 0, error);
    }

    /// Lets `skip` objects of type `ty` be created, then fails the next one
    /// with `error`.
    pub fn fail_creation_after(&self, ty: HandleType, skip: usize, error: GpuError) {
        self.state()
            .creation_errors
            .push(InjectedCreationError { ty, skip, error });
    }

    fn state(&self) -> MutexGuard<'_, DummyState> {
        self.state.lock().expect("Failed to lock dummy hal state")
    }

    fn create_object(&self, ty: HandleType, label: Option<&str>) -> GpuResult<u64> {
        let mut state = self.state();
        if let Some(i) = state.creation_errors.iter().position(|e| e.ty == ty) {
            let injected = &mut state.creation_errors[i];
            if injected.skip == 0 {
                return Err(state.creation_errors.remove(i).error);
            }
            injected.skip -= 1;
        }
        let id = self.next_id.fetch_add(1, Relaxed);
        state.live.insert(id, ty);
        state.events.push(HalEvent::Created {
            ty,
            id,
            label: label.map(ToOwned::to_owned),
        });
        Ok(id)
    }

    fn destroy_object(&self, ty: HandleType, id: u64) -> GpuResult<()> {
        let mut state = self.state();
        match state.live.get(&id) {
            Some(live_ty) if *live_ty == ty => {
                state.live.remove(&id);
                state.events.push(HalEvent::Destroyed { ty, id });
                Ok(())
            }
            _ => Err(GpuError::InvalidHandle),
        }
    }

    fn record(&self, command_buffer: CommandBuffer, command: RecordedCommand) -> GpuResult<()> {
        let mut state = self.state();
        let commands = state
            .command_buffers
            .get_mut(&command_buffer.id)
            .ok_or(GpuError::InvalidHandle)?;
        commands.push(command);
        Ok(())
    }
}

impl Hal for DummyHal {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Dummy device".into(),
            api_description: "Dummy HAL".into(),
            limits: self.limits,
            depth_format: Format::Depth32,
        }
    }

    fn device_wait_idle(&self) -> GpuResult<()> {
        self.state().events.push(HalEvent::WaitIdle);
        Ok(())
    }

    fn create_image(&self, description: &ImageDescription) -> GpuResult<Image> {
        let id = self.create_object(HandleType::Image, description.label)?;
        Ok(Image {
            id,
            extents: description.extents,
            format: description.format,
            usage_flags: description.usage_flags,
        })
    }

    fn destroy_image(&self, image: Image) -> GpuResult<()> {
        self.destroy_object(HandleType::Image, image.id)
    }

    fn create_image_view(&self, description: &ImageViewDescription) -> GpuResult<ImageView> {
        if !self.is_live(HandleType::Image, description.image.id) {
            return Err(GpuError::InvalidHandle);
        }
        let id = self.create_object(HandleType::ImageView, description.label)?;
        Ok(ImageView {
            id,
            owner: description.image,
            aspect: description.aspect,
        })
    }

    fn destroy_image_view(&self, view: ImageView) -> GpuResult<()> {
        self.destroy_object(HandleType::ImageView, view.id)
    }

    fn create_buffer(&self, description: &BufferDescription) -> GpuResult<Buffer> {
        let id = self.create_object(HandleType::Buffer, description.label)?;
        self.state()
            .buffers
            .insert(id, vec![0u8; description.size].into_boxed_slice());
        Ok(Buffer {
            id,
            size: description.size,
            usage_flags: description.usage_flags,
            memory_domain: description.memory_domain,
        })
    }

    fn destroy_buffer(&self, buffer: Buffer) -> GpuResult<()> {
        self.destroy_object(HandleType::Buffer, buffer.id)?;
        let mut state = self.state();
        state.buffers.remove(&buffer.id);
        state.mapped.remove(&buffer.id);
        Ok(())
    }

    unsafe fn map_buffer(&self, buffer: Buffer) -> GpuResult<*mut u8> {
        let mut state = self.state();
        if !state.mapped.insert(buffer.id) {
            return Err(GpuError::MappingFailed(format!(
                "buffer {:?} is already mapped",
                buffer
            )));
        }
        let storage = state
            .buffers
            .get_mut(&buffer.id)
            .ok_or(GpuError::InvalidHandle)?;
        Ok(storage.as_mut_ptr())
    }

    unsafe fn unmap_buffer(&self, buffer: Buffer) -> GpuResult<()> {
        if self.state().mapped.remove(&buffer.id) {
            Ok(())
        } else {
            Err(GpuError::MappingFailed(format!(
                "buffer {:?} is not mapped",
                buffer
            )))
        }
    }

    fn create_sampler(&self, description: &SamplerDescription) -> GpuResult<Sampler> {
        Ok(Sampler::new(
            self.create_object(HandleType::Sampler, description.label)?,
        ))
    }

    fn destroy_sampler(&self, sampler: Sampler) -> GpuResult<()> {
        self.destroy_object(HandleType::Sampler, sampler.id)
    }

    fn create_render_pass(&self, description: &RenderPassDescription) -> GpuResult<RenderPass> {
        let id = self.create_object(HandleType::RenderPass, description.label)?;
        self.state()
            .render_passes
            .insert(id, description.attachments.len());
        Ok(RenderPass::new(id))
    }

    fn destroy_render_pass(&self, render_pass: RenderPass) -> GpuResult<()> {
        self.destroy_object(HandleType::RenderPass, render_pass.id)
    }

    fn create_framebuffer(&self, description: &FramebufferDescription) -> GpuResult<Framebuffer> {
        let attachment_count = self
            .state()
            .render_passes
            .get(&description.render_pass.id)
            .copied()
            .ok_or(GpuError::InvalidHandle)?;
        if attachment_count != description.attachments.len() {
            return Err(GpuError::invalid_description(
                description.label.unwrap_or("framebuffer"),
                format!(
                    "render pass declares {attachment_count} attachments, got {}",
                    description.attachments.len()
                ),
            ));
        }
        let id = self.create_object(HandleType::Framebuffer, description.label)?;
        self.state()
            .framebuffers
            .insert(id, description.attachments.to_vec());
        Ok(Framebuffer::new(id))
    }

    fn destroy_framebuffer(&self, framebuffer: Framebuffer) -> GpuResult<()> {
        self.destroy_object(HandleType::Framebuffer, framebuffer.id)
    }

    fn create_descriptor_set_layout(
        &self,
        description: &DescriptorSetLayoutDescription,
    ) -> GpuResult<DescriptorSetLayout> {
        let id = self.create_object(HandleType::DescriptorSetLayout, description.label)?;
        self.state()
            .layouts
            .insert(id, description.bindings.to_vec());
        Ok(DescriptorSetLayout::new(id))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayout) -> GpuResult<()> {
        self.destroy_object(HandleType::DescriptorSetLayout, layout.id)
    }

    fn create_pipeline_layout(
        &self,
        description: &PipelineLayoutDescription,
    ) -> GpuResult<PipelineLayout> {
        Ok(PipelineLayout::new(self.create_object(
            HandleType::PipelineLayout,
            description.label,
        )?))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayout) -> GpuResult<()> {
        self.destroy_object(HandleType::PipelineLayout, layout.id)
    }

    fn create_descriptor_pool(
        &self,
        description: &DescriptorPoolDescription,
    ) -> GpuResult<DescriptorPool> {
        let id = self.create_object(HandleType::DescriptorPool, description.label)?;
        let mut pool = DummyPool {
            max_sets: description.max_sets,
            ..Default::default()
        };
        for size in description.pool_sizes {
            *pool.capacity.entry(size.ty).or_default() += size.count;
        }
        self.state().pools.insert(id, pool);
        Ok(DescriptorPool::new(id))
    }

    fn reset_descriptor_pool(&self, pool: DescriptorPool) -> GpuResult<()> {
        let mut state = self.state();
        let dummy_pool = state.pools.get_mut(&pool.id).ok_or(GpuError::InvalidHandle)?;
        let sets = std::mem::take(&mut dummy_pool.sets);
        dummy_pool.used_sets = 0;
        dummy_pool.used.clear();
        for set in sets {
            state.live.remove(&set);
            state.descriptor_writes.remove(&set);
        }
        state.events.push(HalEvent::PoolReset(pool));
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPool) -> GpuResult<()> {
        self.reset_descriptor_pool(pool)?;
        self.destroy_object(HandleType::DescriptorPool, pool.id)?;
        self.state().pools.remove(&pool.id);
        Ok(())
    }

    fn allocate_descriptor_sets(
        &self,
        pool: DescriptorPool,
        layouts: &[DescriptorSetLayout],
    ) -> GpuResult<Vec<DescriptorSet>> {
        {
            let mut state = self.state();
            let mut requested: HashMap<DescriptorType, u32> = HashMap::new();
            for layout in layouts {
                let bindings = state.layouts.get(&layout.id).ok_or(GpuError::InvalidHandle)?;
                for binding in bindings {
                    *requested.entry(binding.ty).or_default() += binding.count;
                }
            }
            let dummy_pool = state.pools.get_mut(&pool.id).ok_or(GpuError::InvalidHandle)?;
            if dummy_pool.used_sets + layouts.len() as u32 > dummy_pool.max_sets {
                return Err(GpuError::OutOfPoolMemory);
            }
            for (ty, count) in &requested {
                let used = dummy_pool.used.get(ty).copied().unwrap_or_default();
                let capacity = dummy_pool.capacity.get(ty).copied().unwrap_or_default();
                if used + count > capacity {
                    return Err(GpuError::OutOfPoolMemory);
                }
            }
            dummy_pool.used_sets += layouts.len() as u32;
            for (ty, count) in requested {
                *dummy_pool.used.entry(ty).or_default() += count;
            }
        }

        let sets = layouts
            .iter()
            .map(|_| {
                self.create_object(HandleType::DescriptorSet, None)
                    .map(DescriptorSet::new)
            })
            .collect::<GpuResult<Vec<_>>>()?;
        let mut state = self.state();
        if let Some(dummy_pool) = state.pools.get_mut(&pool.id) {
            dummy_pool.sets.extend(sets.iter().map(|s| s.id));
        }
        Ok(sets)
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) -> GpuResult<()> {
        let mut state = self.state();
        if !state.descriptor_update_errors.is_empty() {
            return Err(state.descriptor_update_errors.remove(0));
        }
        for write in writes {
            if state.live.get(&write.set.id) != Some(&HandleType::DescriptorSet) {
                return Err(GpuError::InvalidHandle);
            }
            let (buffers, images) = match write.resources {
                DescriptorResources::Buffers(buffers) => (buffers.to_vec(), vec![]),
                DescriptorResources::Images(images) => (vec![], images.to_vec()),
            };
            for range in &buffers {
                if range.offset + range.range > range.buffer.size {
                    return Err(GpuError::invalid_description(
                        format!("descriptor set {:?}", write.set),
                        format!("range {:?} exceeds the buffer", range),
                    ));
                }
            }
            let recorded = state.descriptor_writes.entry(write.set.id).or_default();
            recorded.retain(|w| !(w.binding == write.binding && w.first_element == write.first_element));
            recorded.push(RecordedDescriptorWrite {
                binding: write.binding,
                first_element: write.first_element,
                ty: write.ty,
                buffers,
                images,
            });
        }
        Ok(())
    }

    fn create_shader_module(&self, description: &ShaderModuleDescription) -> GpuResult<ShaderModule> {
        Ok(ShaderModule::new(
            self.create_object(HandleType::ShaderModule, description.label)?,
        ))
    }

    fn destroy_shader_module(&self, module: ShaderModule) -> GpuResult<()> {
        self.destroy_object(HandleType::ShaderModule, module.id)
    }

    fn create_graphics_pipeline(
        &self,
        description: &GraphicsPipelineDescription,
    ) -> GpuResult<GraphicsPipeline> {
        let id = self.create_object(HandleType::GraphicsPipeline, description.label)?;
        self.state().pipelines.insert(
            id,
            DummyPipelineInfo {
                render_pass: description.render_pass,
                layout: description.layout,
                subpass: description.subpass,
                color_attachment_count: description.color_attachment_count,
                front_face: description.rasterization.front_face,
                cull_mode: description.rasterization.cull_mode,
                depth_test: description
                    .depth_stencil
                    .map(|d| d.depth_test_enable)
                    .unwrap_or(false),
                vertex_attribute_count: description.vertex_attributes.len(),
                viewport: description.viewport,
                specialization: description.specialization.to_vec(),
            },
        );
        Ok(GraphicsPipeline::new(id))
    }

    fn destroy_graphics_pipeline(&self, pipeline: GraphicsPipeline) -> GpuResult<()> {
        self.destroy_object(HandleType::GraphicsPipeline, pipeline.id)
    }

    fn allocate_command_buffers(&self, count: usize) -> GpuResult<Vec<CommandBuffer>> {
        let command_buffers = (0..count)
            .map(|_| {
                self.create_object(HandleType::CommandBuffer, None)
                    .map(CommandBuffer::new)
            })
            .collect::<GpuResult<Vec<_>>>()?;
        let mut state = self.state();
        for command_buffer in &command_buffers {
            state.command_buffers.insert(command_buffer.id, vec![]);
        }
        Ok(command_buffers)
    }

    fn free_command_buffers(&self, command_buffers: &[CommandBuffer]) -> GpuResult<()> {
        for command_buffer in command_buffers {
            self.destroy_object(HandleType::CommandBuffer, command_buffer.id)?;
            self.state().command_buffers.remove(&command_buffer.id);
        }
        Ok(())
    }

    fn create_semaphore(&self, label: Option<&str>) -> GpuResult<Semaphore> {
        Ok(Semaphore::new(self.create_object(HandleType::Semaphore, label)?))
    }

    fn destroy_semaphore(&self, semaphore: Semaphore) -> GpuResult<()> {
        self.destroy_object(HandleType::Semaphore, semaphore.id)
    }

    fn create_fence(&self, label: Option<&str>, signaled: bool) -> GpuResult<Fence> {
        let id = self.create_object(HandleType::Fence, label)?;
        self.state().fences.insert(id, signaled);
        Ok(Fence::new(id))
    }

    fn destroy_fence(&self, fence: Fence) -> GpuResult<()> {
        self.destroy_object(HandleType::Fence, fence.id)?;
        self.state().fences.remove(&fence.id);
        Ok(())
    }

    fn wait_for_fence(&self, fence: Fence, _timeout_ns: u64) -> GpuResult<()> {
        match self.state().fences.get(&fence.id) {
            Some(true) => Ok(()),
            // Nothing would ever signal it
            Some(false) => Err(GpuError::Timeout),
            None => Err(GpuError::InvalidHandle),
        }
    }

    fn reset_fence(&self, fence: Fence) -> GpuResult<()> {
        let mut state = self.state();
        let signaled = state.fences.get_mut(&fence.id).ok_or(GpuError::InvalidHandle)?;
        *signaled = false;
        Ok(())
    }

    unsafe fn begin_command_buffer(
        &self,
        command_buffer: CommandBuffer,
        usage: CommandBufferUsage,
    ) -> GpuResult<()> {
        let mut state = self.state();
        let commands = state
            .command_buffers
            .get_mut(&command_buffer.id)
            .ok_or(GpuError::InvalidHandle)?;
        commands.clear();
        commands.push(RecordedCommand::Begin { usage });
        Ok(())
    }

    unsafe fn end_command_buffer(&self, command_buffer: CommandBuffer) -> GpuResult<()> {
        self.record(command_buffer, RecordedCommand::End)
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        command_buffer: CommandBuffer,
        info: &RenderPassBeginInfo,
    ) -> GpuResult<()> {
        self.record(
            command_buffer,
            RecordedCommand::BeginRenderPass {
                render_pass: info.render_pass,
                framebuffer: info.framebuffer,
                render_area: info.render_area,
                clear_values: info.clear_values.to_vec(),
            },
        )
    }

    unsafe fn cmd_next_subpass(&self, command_buffer: CommandBuffer) -> GpuResult<()> {
        self.record(command_buffer, RecordedCommand::NextSubpass)
    }

    unsafe fn cmd_end_render_pass(&self, command_buffer: CommandBuffer) -> GpuResult<()> {
        self.record(command_buffer, RecordedCommand::EndRenderPass)
    }

    unsafe fn cmd_bind_graphics_pipeline(
        &self,
        command_buffer: CommandBuffer,
        pipeline: GraphicsPipeline,
    ) -> GpuResult<()> {
        self.record(command_buffer, RecordedCommand::BindGraphicsPipeline(pipeline))
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: CommandBuffer,
        layout: PipelineLayout,
        first_set: u32,
        sets: &[DescriptorSet],
    ) -> GpuResult<()> {
        self.record(
            command_buffer,
            RecordedCommand::BindDescriptorSets {
                layout,
                first_set,
                sets: sets.to_vec(),
            },
        )
    }

    unsafe fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: CommandBuffer,
        first_binding: u32,
        buffers: &[Buffer],
        _offsets: &[u64],
    ) -> GpuResult<()> {
        self.record(
            command_buffer,
            RecordedCommand::BindVertexBuffers {
                first_binding,
                buffers: buffers.to_vec(),
            },
        )
    }

    unsafe fn cmd_bind_index_buffer(
        &self,
        command_buffer: CommandBuffer,
        buffer: Buffer,
        _offset: u64,
        index_type: IndexType,
    ) -> GpuResult<()> {
        self.record(
            command_buffer,
            RecordedCommand::BindIndexBuffer { buffer, index_type },
        )
    }

    unsafe fn cmd_push_constants(
        &self,
        command_buffer: CommandBuffer,
        _layout: PipelineLayout,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> GpuResult<()> {
        self.record(
            command_buffer,
            RecordedCommand::PushConstants {
                stages,
                offset,
                data: data.to_vec(),
            },
        )
    }

    unsafe fn cmd_draw_indexed(
        &self,
        command_buffer: CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> GpuResult<()> {
        self.record(
            command_buffer,
            RecordedCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            },
        )
    }

    unsafe fn cmd_draw_indexed_indirect(
        &self,
        command_buffer: CommandBuffer,
        buffer: Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) -> GpuResult<()> {
        self.record(
            command_buffer,
            RecordedCommand::DrawIndexedIndirect {
                buffer,
                offset,
                draw_count,
                stride,
            },
        )
    }

    fn submit(&self, info: &SubmitInfo) -> GpuResult<()> {
        let mut state = self.state();
        for command_buffer in info.command_buffers {
            let recorded = state
                .command_buffers
                .get(&command_buffer.id)
                .ok_or(GpuError::InvalidHandle)?;
            if recorded.last() != Some(&RecordedCommand::End) {
                return Err(GpuError::invalid_description(
                    format!("command buffer {:?}", command_buffer),
                    "submitted before recording finished",
                ));
            }
        }
        if let Some(fence) = info.fence {
            // Work completes instantly
            *state.fences.get_mut(&fence.id).ok_or(GpuError::InvalidHandle)? = true;
        }
        state.events.push(HalEvent::Submitted {
            command_buffers: info.command_buffers.to_vec(),
            wait_semaphores: info.wait_semaphores.iter().map(|w| w.semaphore).collect(),
            signal_semaphores: info.signal_semaphores.to_vec(),
            fence: info.fence,
        });
        Ok(())
    }
}

/// A swapchain over [`DummyHal`] images, presenting in round-robin order.
pub struct DummySwapchain {
    hal: Arc<DummyHal>,
    format: Format,
    extents: Extents2D,
    image_count: usize,
    images: Vec<SwapchainImage>,
    next_image: u32,
}

impl DummySwapchain {
    pub fn new(
        hal: Arc<DummyHal>,
        image_count: usize,
        extents: Extents2D,
        format: Format,
    ) -> GpuResult<Self> {
        let mut swapchain = Self {
            hal,
            format,
            extents,
            image_count,
            images: vec![],
            next_image: 0,
        };
        swapchain.create_images()?;
        Ok(swapchain)
    }

    fn create_images(&mut self) -> GpuResult<()> {
        for i in 0..self.image_count {
            let label = format!("Swapchain image {i}");
            let image = self.hal.create_image(&ImageDescription {
                label: Some(&label),
                extents: self.extents,
                format: self.format,
                usage_flags: ImageUsageFlags::COLOR_ATTACHMENT,
                samples: SampleCount::One,
                memory_domain: MemoryDomain::DeviceLocal,
            })?;
            let view = self.hal.create_image_view(&ImageViewDescription {
                label: Some(&label),
                image,
                format: self.format,
                aspect: ImageAspect::COLOR,
            })?;
            self.images.push(SwapchainImage { image, view });
        }
        Ok(())
    }

    fn destroy_images(&mut self) -> GpuResult<()> {
        for image in std::mem::take(&mut self.images) {
            self.hal.destroy_image_view(image.view)?;
            self.hal.destroy_image(image.image)?;
        }
        Ok(())
    }
}

impl Swapchain for DummySwapchain {
    fn num_images(&self) -> usize {
        self.images.len()
    }

    fn surface_format(&self) -> Format {
        self.format
    }

    fn extents(&self) -> Extents2D {
        self.extents
    }

    fn images(&self) -> &[SwapchainImage] {
        &self.images
    }

    fn acquire_next_image(
        &mut self,
        _signal: Semaphore,
        _timeout_ns: u64,
    ) -> GpuResult<AcquiredImage> {
        let mut state = self.hal.state();
        if !state.acquire_errors.is_empty() {
            return Err(state.acquire_errors.remove(0));
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count as u32;
        state.events.push(HalEvent::Acquired { image_index: index });
        let suboptimal = state.suboptimal_acquires > 0;
        if suboptimal {
            state.suboptimal_acquires -= 1;
        }
        Ok(AcquiredImage { index, suboptimal })
    }

    fn present(&mut self, image_index: u32, wait: Semaphore) -> GpuResult<()> {
        let mut state = self.hal.state();
        state.events.push(HalEvent::Presented { image_index, wait });
        if !state.present_errors.is_empty() {
            return Err(state.present_errors.remove(0));
        }
        Ok(())
    }

    fn recreate(&mut self, extents: Extents2D) -> GpuResult<()> {
        self.destroy_images()?;
        self.extents = extents;
        self.next_image = 0;
        self.create_images()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DescriptorPoolSize, DescriptorSetLayoutBinding};

    fn layout(hal: &DummyHal, count: u32) -> DescriptorSetLayout {
        hal.create_descriptor_set_layout(&DescriptorSetLayoutDescription {
            label: None,
            bindings: &[DescriptorSetLayoutBinding {
                binding: 0,
                ty: DescriptorType::CombinedImageSampler,
                count,
                stages: ShaderStageFlags::FRAGMENT,
            }],
        })
        .unwrap()
    }

    #[test]
    fn pool_capacity_is_enforced() {
        let hal = DummyHal::default();
        let pool = hal
            .create_descriptor_pool(&DescriptorPoolDescription {
                label: None,
                max_sets: 2,
                pool_sizes: &[DescriptorPoolSize {
                    ty: DescriptorType::CombinedImageSampler,
                    count: 10,
                }],
            })
            .unwrap();
        let big = layout(&hal, 8);
        hal.allocate_descriptor_sets(pool, &[big]).unwrap();
        assert_eq!(
            hal.allocate_descriptor_sets(pool, &[big]),
            Err(GpuError::OutOfPoolMemory)
        );
        hal.reset_descriptor_pool(pool).unwrap();
        hal.allocate_descriptor_sets(pool, &[big]).unwrap();
    }

    #[test]
    fn double_destroy_is_an_invalid_handle() {
        let hal = DummyHal::default();
        let semaphore = hal.create_semaphore(None).unwrap();
        hal.destroy_semaphore(semaphore).unwrap();
        assert_eq!(hal.destroy_semaphore(semaphore), Err(GpuError::InvalidHandle));
    }

    #[test]
    fn swapchain_reports_injected_acquire_errors_once() {
        let hal = Arc::new(DummyHal::default());
        let mut swapchain = DummySwapchain::new(
            hal.clone(),
            2,
            Extents2D {
                width: 4,
                height: 4,
            },
            Format::Bgra8Srgb,
        )
        .unwrap();
        let semaphore = hal.create_semaphore(None).unwrap();
        hal.fail_next_acquire(GpuError::SwapchainOutOfDate);
        assert_eq!(
            swapchain.acquire_next_image(semaphore, u64::MAX),
            Err(GpuError::SwapchainOutOfDate)
        );
        assert_eq!(swapchain.acquire_next_image(semaphore, u64::MAX).unwrap().index, 0);
        assert_eq!(swapchain.acquire_next_image(semaphore, u64::MAX).unwrap().index, 1);
        assert_eq!(swapchain.acquire_next_image(semaphore, u64::MAX).unwrap().index, 0);
    }

    #[test]
    fn injected_creation_failures_match_the_object_type() {
        let hal = DummyHal::default();
        hal.fail_next_creation(HandleType::Fence, GpuError::Allocation("full".into()));
        hal.create_semaphore(None).unwrap();
        assert_eq!(
            hal.create_fence(None, false),
            Err(GpuError::Allocation("full".into()))
        );
        hal.create_fence(None, false).unwrap();
        assert_eq!(hal.live_count(HandleType::Fence), 1);

        hal.fail_creation_after(HandleType::Fence, 1, GpuError::Timeout);
        hal.create_fence(None, false).unwrap();
        assert_eq!(hal.create_fence(None, false), Err(GpuError::Timeout));
        assert_eq!(hal.live_count(HandleType::Fence), 2);
    }

    #[test]
    fn suboptimal_acquires_still_return_an_image() {
        let hal = Arc::new(DummyHal::default());
        let mut swapchain = DummySwapchain::new(
            hal.clone(),
            2,
            Extents2D {
                width: 4,
                height: 4,
            },
            Format::Bgra8Srgb,
        )
        .unwrap();
        let semaphore = hal.create_semaphore(None).unwrap();
        hal.report_next_acquire_suboptimal();
        assert_eq!(
            swapchain.acquire_next_image(semaphore, u64::MAX),
            Ok(AcquiredImage {
                index: 0,
                suboptimal: true,
            })
        );
        assert!(!swapchain.acquire_next_image(semaphore, u64::MAX).unwrap().suboptimal);
    }
}
