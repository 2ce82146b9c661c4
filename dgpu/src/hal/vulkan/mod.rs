mod swapchain;
pub(crate) mod util;

pub use swapchain::VulkanSwapchain;

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::{Mutex, RwLock};

use ash::vk::{self, Handle as _};
use ash::{Entry, Instance};
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocatorDebugSettings, MemoryLocation};
use log::{debug, info};

use crate::hal::Hal;
use crate::{
    Buffer, BufferDescription, CommandBuffer, CommandBufferUsage, DescriptorPool,
    DescriptorPoolDescription, DescriptorResources, DescriptorSet, DescriptorSetLayout,
    DescriptorSetLayoutDescription, DescriptorWrite, DeviceInfo, DeviceLimits, Fence, Format,
    Framebuffer, FramebufferDescription, GpuError, GpuResult, GraphicsPipeline,
    GraphicsPipelineDescription, Image, ImageDescription, ImageView, ImageViewDescription,
    IndexType, MemoryDomain, PipelineLayout, PipelineLayoutDescription, RenderPass,
    RenderPassBeginInfo, RenderPassDescription, Sampler, SamplerDescription, Semaphore,
    ShaderModule, ShaderModuleDescription, ShaderStageFlags, SubmitInfo,
};

use self::util::{to_gpu_error, ToVk, VkResultExt};

#[derive(Clone, Copy, Debug)]
pub struct VulkanQueue {
    pub handle: vk::Queue,
    pub family_index: u32,
}

/// Vulkan objects created by the application and adopted by [`VulkanHal`].
///
/// The device must have been created with the swapchain extension enabled.
/// Neither the instance nor the device is destroyed by the hal.
pub struct VulkanDeviceContext {
    pub entry: Entry,
    pub instance: Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub graphics_queue: VulkanQueue,
    pub present_queue: VulkanQueue,
    pub log_allocations: bool,
}

pub struct VulkanHal {
    pub(crate) entry: Entry,
    pub(crate) instance: Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    pub(crate) graphics_queue: VulkanQueue,
    pub(crate) present_queue: VulkanQueue,
    device_name: String,
    limits: vk::PhysicalDeviceLimits,
    depth_format: Format,
    command_pool: vk::CommandPool,

    memory_allocator: RwLock<Allocator>,
    buffer_allocations: Mutex<HashMap<u64, Allocation>>,
    image_allocations: Mutex<HashMap<u64, Allocation>>,
}

impl VulkanHal {
    const DEPTH_FORMAT_CANDIDATES: [Format; 3] = [
        Format::Depth32,
        Format::Depth32Stencil8,
        Format::Depth24Stencil8,
    ];

    pub fn from_raw(context: VulkanDeviceContext) -> GpuResult<Self> {
        let VulkanDeviceContext {
            entry,
            instance,
            physical_device,
            device,
            graphics_queue,
            present_queue,
            log_allocations,
        } = context;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown device".to_owned());
        let depth_format = Self::pick_depth_format(&instance, physical_device)?;

        let command_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(graphics_queue.family_index)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                get_allocation_callbacks(),
            )
        }
        .call("vkCreateCommandPool")?;

        let allocator_create_desc = AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: AllocatorDebugSettings {
                log_memory_information: log_allocations,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations,
                log_frees: log_allocations,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        };
        let allocator = Allocator::new(&allocator_create_desc)
            .map_err(|e| GpuError::Allocation(e.to_string()))?;

        info!(
            "Vulkan hal on {device_name}, depth format {:?}",
            depth_format
        );

        Ok(Self {
            entry,
            instance,
            physical_device,
            device,
            graphics_queue,
            present_queue,
            device_name,
            limits: properties.limits,
            depth_format,
            command_pool,
            memory_allocator: RwLock::new(allocator),
            buffer_allocations: Mutex::default(),
            image_allocations: Mutex::default(),
        })
    }

    /// The first depth format usable as an optimally tiled depth attachment.
    pub fn pick_depth_format(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
    ) -> GpuResult<Format> {
        Self::DEPTH_FORMAT_CANDIDATES
            .into_iter()
            .find(|format| {
                let properties = unsafe {
                    instance.get_physical_device_format_properties(physical_device, format.to_vk())
                };
                properties
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or_else(|| {
                GpuError::invalid_description("depth attachment", "no supported depth format")
            })
    }

    fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        memory_domain: MemoryDomain,
        linear: bool,
    ) -> GpuResult<Allocation> {
        let location = match memory_domain {
            MemoryDomain::HostVisible => MemoryLocation::CpuToGpu,
            MemoryDomain::DeviceLocal => MemoryLocation::GpuOnly,
        };
        let allocation_create_desc = AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        };
        self.memory_allocator
            .write()
            .expect("Failed to lock memory allocator")
            .allocate(&allocation_create_desc)
            .map_err(|e| GpuError::Allocation(e.to_string()))
    }

    fn free_memory(&self, allocation: Allocation) -> GpuResult<()> {
        self.memory_allocator
            .write()
            .expect("Failed to lock memory allocator")
            .free(allocation)
            .map_err(|e| GpuError::Allocation(e.to_string()))
    }

    /// Registers an image owned by someone else, such as the presentation
    /// engine. Destroying the returned handle only forgets it.
    pub(crate) fn wrap_raw_image(
        &self,
        image: vk::Image,
        description: &ImageDescription,
    ) -> Image {
        Image {
            id: image.as_raw(),
            extents: description.extents,
            format: description.format,
            usage_flags: description.usage_flags,
        }
    }
}

impl Drop for VulkanHal {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_command_pool(self.command_pool, get_allocation_callbacks());
        }
    }
}

impl Hal for VulkanHal {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.device_name.clone(),
            api_description: "Vulkan 1.3".into(),
            limits: DeviceLimits {
                max_sampler_anisotropy: self.limits.max_sampler_anisotropy,
                max_bound_descriptor_sets: self.limits.max_bound_descriptor_sets,
                max_push_constants_size: self.limits.max_push_constants_size,
                min_storage_buffer_offset_alignment: self
                    .limits
                    .min_storage_buffer_offset_alignment,
                max_storage_buffer_range: self.limits.max_storage_buffer_range as u64,
            },
            depth_format: self.depth_format,
        }
    }

    fn device_wait_idle(&self) -> GpuResult<()> {
        unsafe { self.device.device_wait_idle() }.call("vkDeviceWaitIdle")
    }

    fn create_image(&self, description: &ImageDescription) -> GpuResult<Image> {
        let image_create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(description.format.to_vk())
            .extent(vk::Extent3D {
                width: description.extents.width,
                height: description.extents.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(description.samples.to_vk())
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(description.usage_flags.to_vk())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe {
            self.device
                .create_image(&image_create_info, get_allocation_callbacks())
        }
        .call("vkCreateImage")?;

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let fallback_name = format!("Memory allocation for image {:?}", image);
        let allocation = self.allocate_memory(
            description.label.unwrap_or(&fallback_name),
            requirements,
            description.memory_domain,
            false,
        )?;
        unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        }
        .call("vkBindImageMemory")?;
        self.image_allocations
            .lock()
            .expect("Failed to lock image allocations")
            .insert(image.as_raw(), allocation);

        Ok(self.wrap_raw_image(image, description))
    }

    fn destroy_image(&self, image: Image) -> GpuResult<()> {
        let allocation = self
            .image_allocations
            .lock()
            .expect("Failed to lock image allocations")
            .remove(&image.id);
        // Images without an allocation belong to the presentation engine
        if let Some(allocation) = allocation {
            self.free_memory(allocation)?;
            unsafe {
                self.device
                    .destroy_image(vk::Image::from_raw(image.id), get_allocation_callbacks())
            };
        }
        Ok(())
    }

    fn create_image_view(&self, description: &ImageViewDescription) -> GpuResult<ImageView> {
        let image_view_info = vk::ImageViewCreateInfo::default()
            .image(vk::Image::from_raw(description.image.id))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(description.format.to_vk())
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(description.aspect.to_vk())
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let view = unsafe {
            self.device
                .create_image_view(&image_view_info, get_allocation_callbacks())
        }
        .call("vkCreateImageView")?;
        Ok(ImageView {
            id: view.as_raw(),
            owner: description.image,
            aspect: description.aspect,
        })
    }

    fn destroy_image_view(&self, view: ImageView) -> GpuResult<()> {
        unsafe {
            self.device
                .destroy_image_view(vk::ImageView::from_raw(view.id), get_allocation_callbacks())
        };
        Ok(())
    }

    fn create_buffer(&self, description: &BufferDescription) -> GpuResult<Buffer> {
        let buffer_create_info = vk::BufferCreateInfo::default()
            .size(description.size as u64)
            .usage(description.usage_flags.to_vk())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            self.device
                .create_buffer(&buffer_create_info, get_allocation_callbacks())
        }
        .call("vkCreateBuffer")?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let fallback_name = format!("Memory allocation for buffer {:?}", buffer);
        let allocation = self.allocate_memory(
            description.label.unwrap_or(&fallback_name),
            requirements,
            description.memory_domain,
            true,
        )?;
        unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        }
        .call("vkBindBufferMemory")?;
        self.buffer_allocations
            .lock()
            .expect("Failed to lock buffer allocations")
            .insert(buffer.as_raw(), allocation);

        Ok(Buffer {
            id: buffer.as_raw(),
            size: description.size,
            usage_flags: description.usage_flags,
            memory_domain: description.memory_domain,
        })
    }

    fn destroy_buffer(&self, buffer: Buffer) -> GpuResult<()> {
        let allocation = self
            .buffer_allocations
            .lock()
            .expect("Failed to lock buffer allocations")
            .remove(&buffer.id)
            .ok_or(GpuError::InvalidHandle)?;
        self.free_memory(allocation)?;
        unsafe {
            self.device
                .destroy_buffer(vk::Buffer::from_raw(buffer.id), get_allocation_callbacks())
        };
        Ok(())
    }

    unsafe fn map_buffer(&self, buffer: Buffer) -> GpuResult<*mut u8> {
        // Host visible allocations stay persistently mapped
        let allocations = self
            .buffer_allocations
            .lock()
            .expect("Failed to lock buffer allocations");
        let allocation = allocations.get(&buffer.id).ok_or(GpuError::InvalidHandle)?;
        allocation
            .mapped_ptr()
            .map(|ptr| ptr.as_ptr().cast::<u8>())
            .ok_or_else(|| {
                GpuError::MappingFailed(format!("buffer {:?} has no host mapping", buffer))
            })
    }

    unsafe fn unmap_buffer(&self, _buffer: Buffer) -> GpuResult<()> {
        Ok(())
    }

    fn create_sampler(&self, description: &SamplerDescription) -> GpuResult<Sampler> {
        let mut sampler_create_info = vk::SamplerCreateInfo::default()
            .mag_filter(description.mag_filter.to_vk())
            .min_filter(description.min_filter.to_vk())
            .mipmap_mode(description.mipmap_mode.to_vk())
            .address_mode_u(description.address_mode.to_vk())
            .address_mode_v(description.address_mode.to_vk())
            .address_mode_w(description.address_mode.to_vk())
            .mip_lod_bias(0.0)
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(description.min_lod)
            .max_lod(description.max_lod)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .unnormalized_coordinates(false);
        if let Some(max_anisotropy) = description.max_anisotropy {
            sampler_create_info = sampler_create_info
                .anisotropy_enable(true)
                .max_anisotropy(max_anisotropy);
        }
        let sampler = unsafe {
            self.device
                .create_sampler(&sampler_create_info, get_allocation_callbacks())
        }
        .call("vkCreateSampler")?;
        Ok(Sampler::new(sampler.as_raw()))
    }

    fn destroy_sampler(&self, sampler: Sampler) -> GpuResult<()> {
        unsafe {
            self.device
                .destroy_sampler(vk::Sampler::from_raw(sampler.id), get_allocation_callbacks())
        };
        Ok(())
    }

    fn create_render_pass(&self, description: &RenderPassDescription) -> GpuResult<RenderPass> {
        let attachments = description
            .attachments
            .iter()
            .map(|a| {
                vk::AttachmentDescription::default()
                    .flags(a.flags.to_vk())
                    .format(a.format.to_vk())
                    .samples(a.samples.to_vk())
                    .load_op(a.load_op.to_vk())
                    .store_op(a.store_op.to_vk())
                    .stencil_load_op(a.stencil_load_op.to_vk())
                    .stencil_store_op(a.stencil_store_op.to_vk())
                    .initial_layout(a.initial_layout.to_vk())
                    .final_layout(a.final_layout.to_vk())
            })
            .collect::<Vec<_>>();

        let to_vk_reference = |r: &crate::AttachmentReference| vk::AttachmentReference {
            attachment: r.attachment,
            layout: r.layout.to_vk(),
        };
        let references = description
            .subpasses
            .iter()
            .map(|s| {
                (
                    s.input_attachments.iter().map(to_vk_reference).collect::<Vec<_>>(),
                    s.color_attachments.iter().map(to_vk_reference).collect::<Vec<_>>(),
                    s.depth_stencil_attachment.as_ref().map(to_vk_reference),
                )
            })
            .collect::<Vec<_>>();
        let subpasses = description
            .subpasses
            .iter()
            .zip(&references)
            .map(|(subpass, (inputs, colors, depth))| {
                let vk_subpass = vk::SubpassDescription::default()
                    .pipeline_bind_point(subpass.bind_point.to_vk())
                    .input_attachments(inputs)
                    .color_attachments(colors);
                if let Some(depth) = depth {
                    vk_subpass.depth_stencil_attachment(depth)
                } else {
                    vk_subpass
                }
            })
            .collect::<Vec<_>>();
        let dependencies = description
            .dependencies
            .iter()
            .map(|d| {
                vk::SubpassDependency::default()
                    .src_subpass(d.src_subpass.to_vk())
                    .dst_subpass(d.dst_subpass.to_vk())
                    .src_stage_mask(d.src_stage_mask.to_vk())
                    .dst_stage_mask(d.dst_stage_mask.to_vk())
                    .src_access_mask(d.src_access_mask.to_vk())
                    .dst_access_mask(d.dst_access_mask.to_vk())
                    .dependency_flags(d.flags.to_vk())
            })
            .collect::<Vec<_>>();

        let render_pass_create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let render_pass = unsafe {
            self.device
                .create_render_pass(&render_pass_create_info, get_allocation_callbacks())
        }
        .call("vkCreateRenderPass")?;
        debug!("Created vulkan render pass {:?}", description.label);
        Ok(RenderPass::new(render_pass.as_raw()))
    }

    fn destroy_render_pass(&self, render_pass: RenderPass) -> GpuResult<()> {
        unsafe {
            self.device.destroy_render_pass(
                vk::RenderPass::from_raw(render_pass.id),
                get_allocation_callbacks(),
            )
        };
        Ok(())
    }

    fn create_framebuffer(&self, description: &FramebufferDescription) -> GpuResult<Framebuffer> {
        let attachments = description
            .attachments
            .iter()
            .map(|v| vk::ImageView::from_raw(v.id))
            .collect::<Vec<_>>();
        let framebuffer_create_info = vk::FramebufferCreateInfo::default()
            .render_pass(vk::RenderPass::from_raw(description.render_pass.id))
            .attachments(&attachments)
            .width(description.extents.width)
            .height(description.extents.height)
            .layers(1);
        let framebuffer = unsafe {
            self.device
                .create_framebuffer(&framebuffer_create_info, get_allocation_callbacks())
        }
        .call("vkCreateFramebuffer")?;
        Ok(Framebuffer::new(framebuffer.as_raw()))
    }

    fn destroy_framebuffer(&self, framebuffer: Framebuffer) -> GpuResult<()> {
        unsafe {
            self.device.destroy_framebuffer(
                vk::Framebuffer::from_raw(framebuffer.id),
                get_allocation_callbacks(),
            )
        };
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        description: &DescriptorSetLayoutDescription,
    ) -> GpuResult<DescriptorSetLayout> {
        let bindings = description
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.ty.to_vk())
                    .descriptor_count(b.count)
                    .stage_flags(b.stages.to_vk())
            })
            .collect::<Vec<_>>();
        let layout = unsafe {
            self.device.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings),
                get_allocation_callbacks(),
            )
        }
        .call("vkCreateDescriptorSetLayout")?;
        Ok(DescriptorSetLayout::new(layout.as_raw()))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayout) -> GpuResult<()> {
        unsafe {
            self.device.destroy_descriptor_set_layout(
                vk::DescriptorSetLayout::from_raw(layout.id),
                get_allocation_callbacks(),
            )
        };
        Ok(())
    }

    fn create_pipeline_layout(
        &self,
        description: &PipelineLayoutDescription,
    ) -> GpuResult<PipelineLayout> {
        let set_layouts = description
            .set_layouts
            .iter()
            .map(|l| vk::DescriptorSetLayout::from_raw(l.id))
            .collect::<Vec<_>>();
        let push_constant_ranges = description
            .push_constant_ranges
            .iter()
            .map(|r| vk::PushConstantRange {
                stage_flags: r.stages.to_vk(),
                offset: r.offset,
                size: r.size,
            })
            .collect::<Vec<_>>();
        let layout = unsafe {
            self.device.create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::default()
                    .set_layouts(&set_layouts)
                    .push_constant_ranges(&push_constant_ranges),
                get_allocation_callbacks(),
            )
        }
        .call("vkCreatePipelineLayout")?;
        Ok(PipelineLayout::new(layout.as_raw()))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayout) -> GpuResult<()> {
        unsafe {
            self.device.destroy_pipeline_layout(
                vk::PipelineLayout::from_raw(layout.id),
                get_allocation_callbacks(),
            )
        };
        Ok(())
    }

    fn create_descriptor_pool(
        &self,
        description: &DescriptorPoolDescription,
    ) -> GpuResult<DescriptorPool> {
        let pool_sizes = description
            .pool_sizes
            .iter()
            .filter(|s| s.count > 0)
            .map(|s| vk::DescriptorPoolSize {
                ty: s.ty.to_vk(),
                descriptor_count: s.count,
            })
            .collect::<Vec<_>>();
        let pool = unsafe {
            self.device.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .max_sets(description.max_sets)
                    .pool_sizes(&pool_sizes),
                get_allocation_callbacks(),
            )
        }
        .call("vkCreateDescriptorPool")?;
        Ok(DescriptorPool::new(pool.as_raw()))
    }

    fn reset_descriptor_pool(&self, pool: DescriptorPool) -> GpuResult<()> {
        unsafe {
            self.device.reset_descriptor_pool(
                vk::DescriptorPool::from_raw(pool.id),
                vk::DescriptorPoolResetFlags::empty(),
            )
        }
        .call("vkResetDescriptorPool")
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPool) -> GpuResult<()> {
        unsafe {
            self.device.destroy_descriptor_pool(
                vk::DescriptorPool::from_raw(pool.id),
                get_allocation_callbacks(),
            )
        };
        Ok(())
    }

    fn allocate_descriptor_sets(
        &self,
        pool: DescriptorPool,
        layouts: &[DescriptorSetLayout],
    ) -> GpuResult<Vec<DescriptorSet>> {
        let set_layouts = layouts
            .iter()
            .map(|l| vk::DescriptorSetLayout::from_raw(l.id))
            .collect::<Vec<_>>();
        let sets = unsafe {
            self.device.allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(vk::DescriptorPool::from_raw(pool.id))
                    .set_layouts(&set_layouts),
            )
        }
        .call("vkAllocateDescriptorSets")?;
        Ok(sets
            .into_iter()
            .map(|s| DescriptorSet::new(s.as_raw()))
            .collect())
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) -> GpuResult<()> {
        enum WriteInfos {
            Buffers(Vec<vk::DescriptorBufferInfo>),
            Images(Vec<vk::DescriptorImageInfo>),
        }
        let infos = writes
            .iter()
            .map(|w| match w.resources {
                DescriptorResources::Buffers(buffers) => WriteInfos::Buffers(
                    buffers
                        .iter()
                        .map(|b| vk::DescriptorBufferInfo {
                            buffer: vk::Buffer::from_raw(b.buffer.id),
                            offset: b.offset as u64,
                            range: b.range as u64,
                        })
                        .collect(),
                ),
                DescriptorResources::Images(images) => WriteInfos::Images(
                    images
                        .iter()
                        .map(|i| vk::DescriptorImageInfo {
                            sampler: i
                                .sampler
                                .map(|s| vk::Sampler::from_raw(s.id))
                                .unwrap_or_default(),
                            image_view: vk::ImageView::from_raw(i.view.id),
                            image_layout: i.layout.to_vk(),
                        })
                        .collect(),
                ),
            })
            .collect::<Vec<_>>();
        let vk_writes = writes
            .iter()
            .zip(&infos)
            .map(|(write, infos)| {
                let vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(vk::DescriptorSet::from_raw(write.set.id))
                    .dst_binding(write.binding)
                    .dst_array_element(write.first_element)
                    .descriptor_type(write.ty.to_vk());
                match infos {
                    WriteInfos::Buffers(buffers) => vk_write.buffer_info(buffers),
                    WriteInfos::Images(images) => vk_write.image_info(images),
                }
            })
            .collect::<Vec<_>>();
        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) };
        Ok(())
    }

    fn create_shader_module(&self, description: &ShaderModuleDescription) -> GpuResult<ShaderModule> {
        let module = unsafe {
            self.device.create_shader_module(
                &vk::ShaderModuleCreateInfo::default().code(description.source),
                get_allocation_callbacks(),
            )
        }
        .call("vkCreateShaderModule")?;
        Ok(ShaderModule::new(module.as_raw()))
    }

    fn destroy_shader_module(&self, module: ShaderModule) -> GpuResult<()> {
        unsafe {
            self.device.destroy_shader_module(
                vk::ShaderModule::from_raw(module.id),
                get_allocation_callbacks(),
            )
        };
        Ok(())
    }

    fn create_graphics_pipeline(
        &self,
        description: &GraphicsPipelineDescription,
    ) -> GpuResult<GraphicsPipeline> {
        let invalid_entry_point = |_| {
            GpuError::invalid_description(
                description.label.unwrap_or("graphics pipeline"),
                "shader entry point contains a NUL byte",
            )
        };
        let vertex_entry =
            CString::new(description.vertex_stage.entry_point).map_err(invalid_entry_point)?;
        let fragment_entry = description
            .fragment_stage
            .map(|stage| CString::new(stage.entry_point).map_err(invalid_entry_point))
            .transpose()?;

        let specialization_entries = description
            .specialization
            .iter()
            .enumerate()
            .map(|(i, constant)| vk::SpecializationMapEntry {
                constant_id: constant.id,
                offset: (i * std::mem::size_of::<u32>()) as u32,
                size: std::mem::size_of::<u32>(),
            })
            .collect::<Vec<_>>();
        let specialization_data = description
            .specialization
            .iter()
            .flat_map(|constant| constant.value.to_ne_bytes())
            .collect::<Vec<_>>();
        let specialization_info = vk::SpecializationInfo::default()
            .map_entries(&specialization_entries)
            .data(&specialization_data);

        let mut stages = vec![vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vk::ShaderModule::from_raw(description.vertex_stage.module.id))
            .name(&vertex_entry)
            .specialization_info(&specialization_info)];
        if let (Some(stage), Some(entry)) = (&description.fragment_stage, &fragment_entry) {
            stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(vk::ShaderModule::from_raw(stage.module.id))
                    .name(entry)
                    .specialization_info(&specialization_info),
            );
        }

        let vertex_bindings = description
            .vertex_bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: b.input_rate.to_vk(),
            })
            .collect::<Vec<_>>();
        let vertex_attributes = description
            .vertex_attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: a.format.to_vk(),
                offset: a.offset,
            })
            .collect::<Vec<_>>();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);
        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(description.topology.to_vk())
            .primitive_restart_enable(false);

        let extents = description.viewport.extents;
        let viewports = [vk::Viewport {
            x: description.viewport.offset.x as f32,
            y: description.viewport.offset.y as f32,
            width: extents.width as f32,
            height: extents.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D {
                x: description.viewport.offset.x,
                y: description.viewport.offset.y,
            },
            extent: vk::Extent2D {
                width: extents.width,
                height: extents.height,
            },
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(description.rasterization.cull_mode.to_vk())
            .front_face(description.rasterization.front_face.to_vk())
            .line_width(1.0);
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = description.depth_stencil.unwrap_or(crate::DepthStencilState {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: crate::CompareOp::Always,
        });
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_stencil.depth_test_enable)
            .depth_write_enable(depth_stencil.depth_write_enable)
            .depth_compare_op(depth_stencil.depth_compare_op.to_vk())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);
        let blend_attachments = (0..description.color_attachment_count)
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect::<Vec<_>>();
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .layout(vk::PipelineLayout::from_raw(description.layout.id))
            .render_pass(vk::RenderPass::from_raw(description.render_pass.id))
            .subpass(description.subpass);
        let pipelines = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_create_info],
                get_allocation_callbacks(),
            )
        }
        .map_err(|(_, e)| to_gpu_error("vkCreateGraphicsPipelines", e))?;
        Ok(GraphicsPipeline::new(pipelines[0].as_raw()))
    }

    fn destroy_graphics_pipeline(&self, pipeline: GraphicsPipeline) -> GpuResult<()> {
        unsafe {
            self.device
                .destroy_pipeline(vk::Pipeline::from_raw(pipeline.id), get_allocation_callbacks())
        };
        Ok(())
    }

    fn allocate_command_buffers(&self, count: usize) -> GpuResult<Vec<CommandBuffer>> {
        let command_buffers = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.command_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(count as u32),
            )
        }
        .call("vkAllocateCommandBuffers")?;
        Ok(command_buffers
            .into_iter()
            .map(|cb| CommandBuffer::new(cb.as_raw()))
            .collect())
    }

    fn free_command_buffers(&self, command_buffers: &[CommandBuffer]) -> GpuResult<()> {
        let command_buffers = command_buffers
            .iter()
            .map(|cb| vk::CommandBuffer::from_raw(cb.id))
            .collect::<Vec<_>>();
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &command_buffers)
        };
        Ok(())
    }

    fn create_semaphore(&self, _label: Option<&str>) -> GpuResult<Semaphore> {
        let semaphore = unsafe {
            self.device.create_semaphore(
                &vk::SemaphoreCreateInfo::default(),
                get_allocation_callbacks(),
            )
        }
        .call("vkCreateSemaphore")?;
        Ok(Semaphore::new(semaphore.as_raw()))
    }

    fn destroy_semaphore(&self, semaphore: Semaphore) -> GpuResult<()> {
        unsafe {
            self.device.destroy_semaphore(
                vk::Semaphore::from_raw(semaphore.id),
                get_allocation_callbacks(),
            )
        };
        Ok(())
    }

    fn create_fence(&self, _label: Option<&str>, signaled: bool) -> GpuResult<Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            self.device.create_fence(
                &vk::FenceCreateInfo::default().flags(flags),
                get_allocation_callbacks(),
            )
        }
        .call("vkCreateFence")?;
        Ok(Fence::new(fence.as_raw()))
    }

    fn destroy_fence(&self, fence: Fence) -> GpuResult<()> {
        unsafe {
            self.device
                .destroy_fence(vk::Fence::from_raw(fence.id), get_allocation_callbacks())
        };
        Ok(())
    }

    fn wait_for_fence(&self, fence: Fence, timeout_ns: u64) -> GpuResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[vk::Fence::from_raw(fence.id)], true, timeout_ns)
        }
        .call("vkWaitForFences")
    }

    fn reset_fence(&self, fence: Fence) -> GpuResult<()> {
        unsafe { self.device.reset_fences(&[vk::Fence::from_raw(fence.id)]) }
            .call("vkResetFences")
    }

    unsafe fn begin_command_buffer(
        &self,
        command_buffer: CommandBuffer,
        usage: CommandBufferUsage,
    ) -> GpuResult<()> {
        self.device
            .begin_command_buffer(
                vk::CommandBuffer::from_raw(command_buffer.id),
                &vk::CommandBufferBeginInfo::default().flags(usage.to_vk()),
            )
            .call("vkBeginCommandBuffer")
    }

    unsafe fn end_command_buffer(&self, command_buffer: CommandBuffer) -> GpuResult<()> {
        self.device
            .end_command_buffer(vk::CommandBuffer::from_raw(command_buffer.id))
            .call("vkEndCommandBuffer")
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        command_buffer: CommandBuffer,
        info: &RenderPassBeginInfo,
    ) -> GpuResult<()> {
        let clear_values = info
            .clear_values
            .iter()
            .map(|c| c.to_vk())
            .collect::<Vec<_>>();
        let render_pass_begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(vk::RenderPass::from_raw(info.render_pass.id))
            .framebuffer(vk::Framebuffer::from_raw(info.framebuffer.id))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D {
                    x: info.render_area.offset.x,
                    y: info.render_area.offset.y,
                },
                extent: vk::Extent2D {
                    width: info.render_area.extents.width,
                    height: info.render_area.extents.height,
                },
            })
            .clear_values(&clear_values);
        self.device.cmd_begin_render_pass(
            vk::CommandBuffer::from_raw(command_buffer.id),
            &render_pass_begin_info,
            vk::SubpassContents::INLINE,
        );
        Ok(())
    }

    unsafe fn cmd_next_subpass(&self, command_buffer: CommandBuffer) -> GpuResult<()> {
        self.device.cmd_next_subpass(
            vk::CommandBuffer::from_raw(command_buffer.id),
            vk::SubpassContents::INLINE,
        );
        Ok(())
    }

    unsafe fn cmd_end_render_pass(&self, command_buffer: CommandBuffer) -> GpuResult<()> {
        self.device
            .cmd_end_render_pass(vk::CommandBuffer::from_raw(command_buffer.id));
        Ok(())
    }

    unsafe fn cmd_bind_graphics_pipeline(
        &self,
        command_buffer: CommandBuffer,
        pipeline: GraphicsPipeline,
    ) -> GpuResult<()> {
        self.device.cmd_bind_pipeline(
            vk::CommandBuffer::from_raw(command_buffer.id),
            vk::PipelineBindPoint::GRAPHICS,
            vk::Pipeline::from_raw(pipeline.id),
        );
        Ok(())
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: CommandBuffer,
        layout: PipelineLayout,
        first_set: u32,
        sets: &[DescriptorSet],
    ) -> GpuResult<()> {
        let sets = sets
            .iter()
            .map(|s| vk::DescriptorSet::from_raw(s.id))
            .collect::<Vec<_>>();
        self.device.cmd_bind_descriptor_sets(
            vk::CommandBuffer::from_raw(command_buffer.id),
            vk::PipelineBindPoint::GRAPHICS,
            vk::PipelineLayout::from_raw(layout.id),
            first_set,
            &sets,
            &[],
        );
        Ok(())
    }

    unsafe fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: CommandBuffer,
        first_binding: u32,
        buffers: &[Buffer],
        offsets: &[u64],
    ) -> GpuResult<()> {
        let buffers = buffers
            .iter()
            .map(|b| vk::Buffer::from_raw(b.id))
            .collect::<Vec<_>>();
        self.device.cmd_bind_vertex_buffers(
            vk::CommandBuffer::from_raw(command_buffer.id),
            first_binding,
            &buffers,
            offsets,
        );
        Ok(())
    }

    unsafe fn cmd_bind_index_buffer(
        &self,
        command_buffer: CommandBuffer,
        buffer: Buffer,
        offset: u64,
        index_type: IndexType,
    ) -> GpuResult<()> {
        self.device.cmd_bind_index_buffer(
            vk::CommandBuffer::from_raw(command_buffer.id),
            vk::Buffer::from_raw(buffer.id),
            offset,
            index_type.to_vk(),
        );
        Ok(())
    }

    unsafe fn cmd_push_constants(
        &self,
        command_buffer: CommandBuffer,
        layout: PipelineLayout,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> GpuResult<()> {
        self.device.cmd_push_constants(
            vk::CommandBuffer::from_raw(command_buffer.id),
            vk::PipelineLayout::from_raw(layout.id),
            stages.to_vk(),
            offset,
            data,
        );
        Ok(())
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
        self.device.cmd_draw_indexed(
            vk::CommandBuffer::from_raw(command_buffer.id),
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        );
        Ok(())
    }

    unsafe fn cmd_draw_indexed_indirect(
        &self,
        command_buffer: CommandBuffer,
        buffer: Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) -> GpuResult<()> {
        self.device.cmd_draw_indexed_indirect(
            vk::CommandBuffer::from_raw(command_buffer.id),
            vk::Buffer::from_raw(buffer.id),
            offset,
            draw_count,
            stride,
        );
        Ok(())
    }

    fn submit(&self, info: &SubmitInfo) -> GpuResult<()> {
        let command_buffers = info
            .command_buffers
            .iter()
            .map(|cb| vk::CommandBuffer::from_raw(cb.id))
            .collect::<Vec<_>>();
        let wait_semaphores = info
            .wait_semaphores
            .iter()
            .map(|w| vk::Semaphore::from_raw(w.semaphore.id))
            .collect::<Vec<_>>();
        let wait_stages = info
            .wait_semaphores
            .iter()
            .map(|w| w.stage.to_vk())
            .collect::<Vec<_>>();
        let signal_semaphores = info
            .signal_semaphores
            .iter()
            .map(|s| vk::Semaphore::from_raw(s.id))
            .collect::<Vec<_>>();
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);
        let fence = info
            .fence
            .map(|f| vk::Fence::from_raw(f.id))
            .unwrap_or_default();
        unsafe {
            self.device
                .queue_submit(self.graphics_queue.handle, &[submit_info], fence)
        }
        .call("vkQueueSubmit")
    }
}

fn get_allocation_callbacks() -> Option<&'static vk::AllocationCallbacks<'static>> {
    None
}
