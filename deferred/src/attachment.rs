use dgpu::{
    Device, Extents2D, Format, Image, ImageAspect, ImageDescription, ImageUsageFlags, ImageView,
    ImageViewDescription, MemoryDomain, SampleCount,
};
use log::{error, trace};
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::error::{ConstructionContext, RendererError, RendererResult};
use crate::teardown::{GpuObject, ReleaseStage, TeardownList};

/// The surfaces written by the geometry pass, in attachment order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumCount, EnumIter)]
pub enum GBufferChannel {
    DiffuseAlbedo,
    SpecularAlbedo,
    Normal,
}

impl GBufferChannel {
    pub fn format(self) -> Format {
        match self {
            GBufferChannel::DiffuseAlbedo | GBufferChannel::SpecularAlbedo => Format::Rgba8Unorm,
            GBufferChannel::Normal => Format::Rgba16Float,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GBufferChannel::DiffuseAlbedo => "G-buffer diffuse albedo",
            GBufferChannel::SpecularAlbedo => "G-buffer specular albedo",
            GBufferChannel::Normal => "G-buffer normal",
        }
    }
}

pub const ACCUMULATION_FORMAT: Format = Format::Rgba16Float;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentDescription<'a> {
    pub label: &'a str,
    pub format: Format,
    pub usage: ImageUsageFlags,
    pub extents: Extents2D,
}

/// A render target image with its full view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub image: Image,
    pub view: ImageView,
    /// A depth-only view for sampling, present on depth attachments.
    pub sampled_view: Option<ImageView>,
}

impl Attachment {
    /// The view bound when the attachment is sampled in a later pass.
    pub fn sampling_view(&self) -> ImageView {
        self.sampled_view.unwrap_or(self.view)
    }

    pub fn format(&self) -> Format {
        self.image.format
    }

    pub fn destroy(self, device: &Device) -> RendererResult<()> {
        if let Some(sampled_view) = self.sampled_view {
            device.destroy_image_view(sampled_view)?;
        }
        device.destroy_image_view(self.view)?;
        device.destroy_image(self.image)?;
        Ok(())
    }
}

pub struct AttachmentAllocator;

impl AttachmentAllocator {
    pub const COLOR_USAGE: ImageUsageFlags = ImageUsageFlags::COLOR_ATTACHMENT
        .union(ImageUsageFlags::SAMPLED)
        .union(ImageUsageFlags::INPUT_ATTACHMENT);
    pub const DEPTH_USAGE: ImageUsageFlags = ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        .union(ImageUsageFlags::SAMPLED)
        .union(ImageUsageFlags::INPUT_ATTACHMENT);

    pub fn allocate(
        device: &Device,
        description: &AttachmentDescription,
    ) -> RendererResult<Attachment> {
        let image = device
            .create_image(&ImageDescription {
                label: Some(description.label),
                extents: description.extents,
                format: description.format,
                usage_flags: description.usage,
                samples: SampleCount::One,
                memory_domain: MemoryDomain::DeviceLocal,
            })
            .creating("attachment image")?;
        let (view, sampled_view) = match Self::create_views(device, description, image) {
            Ok(views) => views,
            Err(e) => {
                if let Err(release) = device.destroy_image(image) {
                    error!("Failed to release attachment image {}: {release}", description.label);
                }
                return Err(e);
            }
        };
        trace!(
            "Allocated attachment {} ({:?}, {}x{})",
            description.label,
            description.format,
            description.extents.width,
            description.extents.height
        );
        Ok(Attachment {
            image,
            view,
            sampled_view,
        })
    }

    fn create_views(
        device: &Device,
        description: &AttachmentDescription,
        image: Image,
    ) -> RendererResult<(ImageView, Option<ImageView>)> {
        let view = device
            .create_image_view(&ImageViewDescription {
                label: Some(description.label),
                image,
                format: description.format,
                aspect: description.format.aspect(),
            })
            .creating("attachment view")?;
        if !description.format.is_depth() {
            return Ok((view, None));
        }
        let label = format!("{} (sampled)", description.label);
        let sampled_view = device
            .create_image_view(&ImageViewDescription {
                label: Some(&label),
                image,
                format: description.format,
                aspect: ImageAspect::DEPTH,
            })
            .creating("depth sampling view");
        match sampled_view {
            Ok(sampled_view) => Ok((view, Some(sampled_view))),
            Err(e) => {
                if let Err(release) = device.destroy_image_view(view) {
                    error!("Failed to release attachment view {}: {release}", description.label);
                }
                Err(e)
            }
        }
    }
}

/// Every off-screen attachment a frame renders into, shared by all
/// swapchain images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameAttachments {
    pub depth: Attachment,
    pub g_buffer: [Attachment; GBufferChannel::COUNT],
    pub accumulation: Attachment,
    pub extents: Extents2D,
}

impl FrameAttachments {
    /// Allocates the depth, G-buffer and accumulation attachments. If one
    /// fails, the ones already allocated are released.
    pub fn new(device: &Device, extents: Extents2D) -> RendererResult<Self> {
        let descriptions = std::iter::once(AttachmentDescription {
            label: "Depth",
            format: device.depth_format(),
            usage: AttachmentAllocator::DEPTH_USAGE,
            extents,
        })
        .chain(GBufferChannel::iter().map(|channel| AttachmentDescription {
            label: channel.label(),
            format: channel.format(),
            usage: AttachmentAllocator::COLOR_USAGE,
            extents,
        }))
        .chain(std::iter::once(AttachmentDescription {
            label: "Accumulation",
            format: ACCUMULATION_FORMAT,
            usage: AttachmentAllocator::COLOR_USAGE,
            extents,
        }));

        let mut allocated = Vec::with_capacity(GBufferChannel::COUNT + 2);
        for description in descriptions {
            match AttachmentAllocator::allocate(device, &description) {
                Ok(attachment) => allocated.push(attachment),
                Err(e) => {
                    for attachment in allocated {
                        if let Err(release) = attachment.destroy(device) {
                            error!("Failed to release a frame attachment: {release}");
                        }
                    }
                    return Err(e);
                }
            }
        }
        let [depth, diffuse, specular, normal, accumulation]: [Attachment; GBufferChannel::COUNT + 2] =
            allocated
                .try_into()
                .map_err(|_| RendererError::InvalidState {
                    operation: "allocate frame attachments",
                    state: "wrong attachment count".into(),
                })?;
        Ok(Self {
            depth,
            g_buffer: [diffuse, specular, normal],
            accumulation,
            extents,
        })
    }

    pub fn g_buffer(&self, channel: GBufferChannel) -> &Attachment {
        &self.g_buffer[channel as usize]
    }

    pub fn destroy(self, device: &Device) -> RendererResult<()> {
        for attachment in self.all() {
            attachment.destroy(device)?;
        }
        Ok(())
    }

    fn all(&self) -> [Attachment; GBufferChannel::COUNT + 2] {
        let [diffuse, specular, normal] = self.g_buffer;
        [self.depth, diffuse, specular, normal, self.accumulation]
    }

    /// Queues every view, then every image, for release.
    pub(crate) fn into_teardown(self, list: &mut TeardownList) {
        for attachment in self.all() {
            if let Some(sampled_view) = attachment.sampled_view {
                list.push(ReleaseStage::Attachments, GpuObject::ImageView(sampled_view));
            }
            list.push(ReleaseStage::Attachments, GpuObject::ImageView(attachment.view));
        }
        list.extend(
            ReleaseStage::Attachments,
            self.all().map(|attachment| GpuObject::Image(attachment.image)),
        );
    }
}

#[cfg(test)]
mod tests {
    use dgpu::{GpuError, HandleType};

    use super::*;

    #[test]
    fn frame_attachments_use_channel_formats() {
        let (device, hal) = Device::dummy();
        let extents = Extents2D {
            width: 640,
            height: 480,
        };
        let attachments = FrameAttachments::new(&device, extents).unwrap();

        assert_eq!(attachments.depth.format(), device.depth_format());
        assert!(attachments.depth.sampled_view.is_some());
        assert_eq!(
            attachments.g_buffer(GBufferChannel::SpecularAlbedo).format(),
            Format::Rgba8Unorm
        );
        assert_eq!(
            attachments.g_buffer(GBufferChannel::Normal).format(),
            Format::Rgba16Float
        );
        assert_eq!(attachments.accumulation.format(), ACCUMULATION_FORMAT);
        assert!(attachments
            .accumulation
            .image
            .usage_flags
            .contains(ImageUsageFlags::INPUT_ATTACHMENT));
        assert_eq!(hal.live_count(HandleType::Image), 5);
        assert_eq!(hal.live_count(HandleType::ImageView), 6);

        attachments.destroy(&device).unwrap();
        assert_eq!(hal.live_count(HandleType::Image), 0);
        assert_eq!(hal.live_count(HandleType::ImageView), 0);
    }

    #[test]
    fn zero_sized_viewports_fail_construction() {
        let (device, _hal) = Device::dummy();
        let result = FrameAttachments::new(&device, Extents2D::default());
        assert!(matches!(
            result,
            Err(crate::RendererError::Construction {
                object: "attachment image",
                ..
            })
        ));
    }

    #[test]
    fn failed_allocation_releases_earlier_attachments() {
        let (device, hal) = Device::dummy();
        let extents = Extents2D {
            width: 64,
            height: 64,
        };
        // The normal channel's image is the fourth.
        hal.fail_creation_after(HandleType::Image, 3, GpuError::Allocation("full".into()));
        let first = FrameAttachments::new(&device, extents);
        assert!(matches!(
            first,
            Err(crate::RendererError::Construction {
                object: "attachment image",
                ..
            })
        ));
        assert_eq!(hal.live_count(HandleType::Image), 0);
        assert_eq!(hal.live_count(HandleType::ImageView), 0);

        hal.fail_creation_after(HandleType::ImageView, 1, GpuError::Allocation("full".into()));
        assert!(matches!(
            FrameAttachments::new(&device, extents),
            Err(crate::RendererError::Construction {
                object: "depth sampling view",
                ..
            })
        ));
        assert_eq!(hal.live_count(HandleType::Image), 0);
        assert_eq!(hal.live_count(HandleType::ImageView), 0);

        let attachments = FrameAttachments::new(&device, extents).unwrap();
        assert_eq!(hal.live_count(HandleType::Image), 5);
        attachments.destroy(&device).unwrap();
    }
}
