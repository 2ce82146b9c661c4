use dgpu::{Device, Extents2D, Framebuffer, FramebufferDescription, RenderPass, SwapchainImage};
use log::{debug, error};

use crate::attachment::FrameAttachments;
use crate::error::{ConstructionContext, RendererResult};

/// One framebuffer per swapchain image.
///
/// Framebuffers reference the shared attachments without owning them and
/// must be destroyed before them.
#[derive(Debug, Default)]
pub struct FrameTargetSet {
    framebuffers: Vec<Framebuffer>,
    extents: Extents2D,
}

impl FrameTargetSet {
    pub fn new(
        device: &Device,
        render_pass: RenderPass,
        swapchain_images: &[SwapchainImage],
        attachments: &FrameAttachments,
        extents: Extents2D,
    ) -> RendererResult<Self> {
        let mut framebuffers = Vec::with_capacity(swapchain_images.len());
        for (i, swapchain_image) in swapchain_images.iter().enumerate() {
            let views = [
                swapchain_image.view,
                attachments.depth.view,
                attachments.g_buffer[0].view,
                attachments.g_buffer[1].view,
                attachments.g_buffer[2].view,
                attachments.accumulation.view,
            ];
            let label = format!("Framebuffer #{i}");
            let framebuffer = device
                .create_framebuffer(&FramebufferDescription {
                    label: Some(&label),
                    render_pass,
                    attachments: &views,
                    extents,
                })
                .creating("framebuffer");
            match framebuffer {
                Ok(framebuffer) => framebuffers.push(framebuffer),
                Err(e) => {
                    for framebuffer in framebuffers {
                        if let Err(release) = device.destroy_framebuffer(framebuffer) {
                            error!("Failed to destroy framebuffer {framebuffer:?}: {release}");
                        }
                    }
                    return Err(e);
                }
            }
        }
        debug!(
            "Created {} framebuffers of {}x{}",
            framebuffers.len(),
            extents.width,
            extents.height
        );
        Ok(Self {
            framebuffers,
            extents,
        })
    }

    pub fn framebuffer(&self, image_index: usize) -> Option<Framebuffer> {
        self.framebuffers.get(image_index).copied()
    }

    pub fn framebuffers(&self) -> &[Framebuffer] {
        &self.framebuffers
    }

    pub fn extents(&self) -> Extents2D {
        self.extents
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    /// Destroys the framebuffers only; attachments and swapchain images are
    /// left alone.
    pub fn destroy(self, device: &Device) -> RendererResult<()> {
        for framebuffer in self.framebuffers {
            device.destroy_framebuffer(framebuffer)?;
        }
        Ok(())
    }

    pub(crate) fn into_framebuffers(self) -> Vec<Framebuffer> {
        self.framebuffers
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dgpu::dummy::DummySwapchain;
    use dgpu::{Format, HandleType, Swapchain};

    use super::*;
    use crate::render_graph::deferred_topology;

    #[test]
    fn one_framebuffer_per_swapchain_image() {
        let (device, hal) = Device::dummy();
        let extents = Extents2D {
            width: 320,
            height: 200,
        };
        let swapchain =
            DummySwapchain::new(Arc::clone(&hal), 2, extents, Format::Bgra8Srgb).unwrap();
        let attachments = FrameAttachments::new(&device, extents).unwrap();
        let render_pass = deferred_topology(swapchain.surface_format(), device.depth_format())
            .build(&device)
            .unwrap();

        let targets =
            FrameTargetSet::new(&device, render_pass, swapchain.images(), &attachments, extents)
                .unwrap();
        assert_eq!(targets.len(), 2);
        for (i, framebuffer) in targets.framebuffers().iter().enumerate() {
            let views = hal.framebuffer_attachments(*framebuffer).unwrap();
            assert_eq!(views.len(), 6);
            assert_eq!(views[0], swapchain.images()[i].view);
            assert_eq!(views[1], attachments.depth.view);
            assert_eq!(views[5], attachments.accumulation.view);
        }

        targets.destroy(&device).unwrap();
        assert_eq!(hal.live_count(HandleType::Framebuffer), 0);
        assert!(hal.is_live(
            HandleType::Image,
            dgpu::Handle::id(&attachments.depth.image)
        ));
    }
}
