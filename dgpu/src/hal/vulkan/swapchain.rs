use std::sync::Arc;

use ash::khr::{surface, swapchain};
use ash::vk::{self, Handle as _};
use log::{info, warn};

use crate::{
    AcquiredImage, Extents2D, Format, GpuError, GpuResult, ImageAspect, ImageDescription,
    ImageUsageFlags, ImageView, MemoryDomain, SampleCount, Semaphore, Swapchain, SwapchainImage,
};

use super::util::{format_from_vk, ToVk, VkResultExt};
use super::{get_allocation_callbacks, VulkanHal};

/// Swapchain over a surface created by the application.
///
/// The surface is not destroyed when the swapchain is dropped.
pub struct VulkanSwapchain {
    hal: Arc<VulkanHal>,
    surface_instance: surface::Instance,
    swapchain_device: swapchain::Device,
    surface: vk::SurfaceKHR,
    data: SwapchainData,
}

struct SwapchainData {
    swapchain: vk::SwapchainKHR,
    surface_format: vk::SurfaceFormatKHR,
    format: Format,
    extents: Extents2D,
    images: Vec<SwapchainImage>,
}

impl VulkanSwapchain {
    const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;

    pub fn new(
        hal: Arc<VulkanHal>,
        surface: vk::SurfaceKHR,
        extents: Extents2D,
    ) -> GpuResult<Self> {
        let surface_instance = surface::Instance::new(&hal.entry, &hal.instance);
        let swapchain_device = swapchain::Device::new(&hal.instance, &hal.device);

        let supported_present = unsafe {
            surface_instance.get_physical_device_surface_support(
                hal.physical_device,
                hal.present_queue.family_index,
                surface,
            )
        }
        .call("vkGetPhysicalDeviceSurfaceSupportKHR")?;
        if !supported_present {
            return Err(GpuError::invalid_description(
                "swapchain",
                "the present queue cannot present to this surface",
            ));
        }

        let data = Self::create_data(
            &hal,
            &surface_instance,
            &swapchain_device,
            surface,
            extents,
            vk::SwapchainKHR::null(),
        )?;
        Ok(Self {
            hal,
            surface_instance,
            swapchain_device,
            surface,
            data,
        })
    }

    fn create_data(
        hal: &VulkanHal,
        surface_instance: &surface::Instance,
        swapchain_device: &swapchain::Device,
        surface: vk::SurfaceKHR,
        requested_extents: Extents2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> GpuResult<SwapchainData> {
        let pdevice = hal.physical_device;
        let surface_formats =
            unsafe { surface_instance.get_physical_device_surface_formats(pdevice, surface) }
                .call("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let capabilities =
            unsafe { surface_instance.get_physical_device_surface_capabilities(pdevice, surface) }
                .call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let present_modes = unsafe {
            surface_instance.get_physical_device_surface_present_modes(pdevice, surface)
        }
        .call("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        let surface_format = surface_formats
            .iter()
            .find(|f| f.format == Self::PREFERRED_FORMAT)
            .or_else(|| surface_formats.first())
            .copied()
            .ok_or_else(|| GpuError::invalid_description("swapchain", "no surface formats"))?;
        let format = format_from_vk(surface_format.format).ok_or_else(|| {
            GpuError::invalid_description(
                "swapchain",
                format!("unsupported surface format {:?}", surface_format.format),
            )
        })?;
        let present_mode = if present_modes.contains(&vk::PresentModeKHR::FIFO) {
            vk::PresentModeKHR::FIFO
        } else {
            present_modes
                .first()
                .copied()
                .unwrap_or(vk::PresentModeKHR::FIFO)
        };
        let transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };
        let extent = if capabilities.current_extent.width == u32::MAX {
            vk::Extent2D {
                width: requested_extents.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: requested_extents.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        } else {
            capabilities.current_extent
        };
        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_extent(extent)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .present_mode(present_mode)
            .pre_transform(transform)
            .image_usage(
                (ImageUsageFlags::COLOR_ATTACHMENT | ImageUsageFlags::TRANSFER_DST).to_vk(),
            )
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .old_swapchain(old_swapchain)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .image_array_layers(1)
            .clipped(true);
        let swapchain = unsafe {
            swapchain_device.create_swapchain(&swapchain_create_info, get_allocation_callbacks())
        }
        .call("vkCreateSwapchainKHR")?;

        let extents = Extents2D {
            width: extent.width,
            height: extent.height,
        };
        let raw_images = unsafe { swapchain_device.get_swapchain_images(swapchain) }
            .call("vkGetSwapchainImagesKHR")?;
        let mut images = Vec::with_capacity(raw_images.len());
        for (i, raw_image) in raw_images.into_iter().enumerate() {
            let label = format!("Swapchain image #{i}");
            let image = hal.wrap_raw_image(
                raw_image,
                &ImageDescription {
                    label: Some(&label),
                    extents,
                    format,
                    usage_flags: ImageUsageFlags::COLOR_ATTACHMENT
                        | ImageUsageFlags::TRANSFER_DST,
                    samples: SampleCount::One,
                    memory_domain: MemoryDomain::DeviceLocal,
                },
            );
            let view_info = vk::ImageViewCreateInfo::default()
                .image(raw_image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::R,
                    g: vk::ComponentSwizzle::G,
                    b: vk::ComponentSwizzle::B,
                    a: vk::ComponentSwizzle::A,
                })
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_array_layer(0)
                        .base_mip_level(0)
                        .layer_count(1)
                        .level_count(1),
                );
            let view = unsafe {
                hal.device
                    .create_image_view(&view_info, get_allocation_callbacks())
            }
            .call("vkCreateImageView")?;
            images.push(SwapchainImage {
                image,
                view: ImageView {
                    id: view.as_raw(),
                    owner: image,
                    aspect: ImageAspect::COLOR,
                },
            });
        }

        info!(
            "Created swapchain with {} images of {:?} at {}x{}",
            images.len(),
            format,
            extents.width,
            extents.height
        );

        Ok(SwapchainData {
            swapchain,
            surface_format,
            format,
            extents,
            images,
        })
    }

    fn destroy_data(&self, data: &SwapchainData) {
        for image in &data.images {
            unsafe {
                self.hal.device.destroy_image_view(
                    vk::ImageView::from_raw(image.view.id),
                    get_allocation_callbacks(),
                )
            };
        }
        unsafe {
            self.swapchain_device
                .destroy_swapchain(data.swapchain, get_allocation_callbacks())
        };
    }

    pub fn surface_color_space(&self) -> vk::ColorSpaceKHR {
        self.data.surface_format.color_space
    }
}

impl Swapchain for VulkanSwapchain {
    fn num_images(&self) -> usize {
        self.data.images.len()
    }

    fn surface_format(&self) -> Format {
        self.data.format
    }

    fn extents(&self) -> Extents2D {
        self.data.extents
    }

    fn images(&self) -> &[SwapchainImage] {
        &self.data.images
    }

    fn acquire_next_image(
        &mut self,
        signal: Semaphore,
        timeout_ns: u64,
    ) -> GpuResult<AcquiredImage> {
        let (index, suboptimal) = unsafe {
            self.swapchain_device.acquire_next_image(
                self.data.swapchain,
                timeout_ns,
                vk::Semaphore::from_raw(signal.id),
                vk::Fence::null(),
            )
        }
        .call("vkAcquireNextImageKHR")?;
        Ok(AcquiredImage { index, suboptimal })
    }

    fn present(&mut self, image_index: u32, wait: Semaphore) -> GpuResult<()> {
        let swapchains = [self.data.swapchain];
        let indices = [image_index];
        let wait_semaphores = [vk::Semaphore::from_raw(wait.id)];
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .image_indices(&indices)
            .wait_semaphores(&wait_semaphores);
        let suboptimal = unsafe {
            self.swapchain_device
                .queue_present(self.hal.present_queue.handle, &present_info)
        }
        .call("vkQueuePresentKHR")?;
        if suboptimal {
            return Err(GpuError::SwapchainSuboptimal);
        }
        Ok(())
    }

    fn recreate(&mut self, extents: Extents2D) -> GpuResult<()> {
        let data = Self::create_data(
            &self.hal,
            &self.surface_instance,
            &self.swapchain_device,
            self.surface,
            extents,
            self.data.swapchain,
        )?;
        let old_data = std::mem::replace(&mut self.data, data);
        self.destroy_data(&old_data);
        Ok(())
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.hal.device.device_wait_idle() } {
            warn!("Failed to wait for the device before destroying the swapchain: {e}");
        }
        let data = SwapchainData {
            swapchain: self.data.swapchain,
            surface_format: self.data.surface_format,
            format: self.data.format,
            extents: self.data.extents,
            images: std::mem::take(&mut self.data.images),
        };
        self.destroy_data(&data);
    }
}
