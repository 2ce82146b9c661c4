use crate::{Extents2D, Format, GpuResult, Image, ImageView, Semaphore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwapchainImage {
    pub image: Image,
    pub view: ImageView,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AcquiredImage {
    pub index: u32,
    /// The image can still be presented, but the swapchain no longer matches
    /// the surface exactly.
    pub suboptimal: bool,
}

/// A set of presentable images rotating between the application and the
/// presentation engine.
pub trait Swapchain {
    fn num_images(&self) -> usize;
    fn surface_format(&self) -> Format;
    fn extents(&self) -> Extents2D;
    fn images(&self) -> &[SwapchainImage];

    /// Blocks until an image is available, then returns its index. `signal`
    /// is signalled once the presentation engine has released the image.
    ///
    /// Fails with [`crate::GpuError::SwapchainOutOfDate`] when the swapchain
    /// must be recreated before any further image can be acquired.
    fn acquire_next_image(
        &mut self,
        signal: Semaphore,
        timeout_ns: u64,
    ) -> GpuResult<AcquiredImage>;

    /// Queues `image_index` for presentation once `wait` is signalled.
    ///
    /// Fails with [`crate::GpuError::SwapchainOutOfDate`] or
    /// [`crate::GpuError::SwapchainSuboptimal`]; in both cases the
    /// presentation request was still consumed.
    fn present(&mut self, image_index: u32, wait: Semaphore) -> GpuResult<()>;

    /// Rebuilds the swapchain images for new surface extents. Every
    /// previously returned [`SwapchainImage`] becomes invalid.
    fn recreate(&mut self, extents: Extents2D) -> GpuResult<()>;
}
