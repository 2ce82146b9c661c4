use crate::{BufferUsageFlags, Extents2D, Format, ImageAspect, ImageUsageFlags, MemoryDomain};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum HandleType {
    Image,
    ImageView,
    Buffer,
    Sampler,
    RenderPass,
    Framebuffer,
    DescriptorSetLayout,
    PipelineLayout,
    DescriptorPool,
    DescriptorSet,
    ShaderModule,
    GraphicsPipeline,
    CommandBuffer,
    Semaphore,
    Fence,
}

pub trait Handle {
    fn id(&self) -> u64;
    fn handle_type(&self) -> HandleType;
}

macro_rules! define_handle {
    ($st_name:ident) => {
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
        pub struct $st_name {
            pub(crate) id: u64,
        }

        impl $st_name {
            pub(crate) fn new(id: u64) -> Self {
                assert!(id != 0, "ID 0 is reserved for null handles!");
                Self { id }
            }
        }

        impl Handle for $st_name {
            fn id(&self) -> u64 {
                self.id
            }

            fn handle_type(&self) -> HandleType {
                HandleType::$st_name
            }
        }
    };
}

define_handle!(Sampler);
define_handle!(RenderPass);
define_handle!(Framebuffer);
define_handle!(DescriptorSetLayout);
define_handle!(PipelineLayout);
define_handle!(DescriptorPool);
define_handle!(DescriptorSet);
define_handle!(ShaderModule);
define_handle!(GraphicsPipeline);
define_handle!(CommandBuffer);
define_handle!(Semaphore);
define_handle!(Fence);

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Image {
    pub(crate) id: u64,
    pub extents: Extents2D,
    pub format: Format,
    pub usage_flags: ImageUsageFlags,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ImageView {
    pub(crate) id: u64,
    pub owner: Image,
    pub aspect: ImageAspect,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Buffer {
    pub(crate) id: u64,
    pub size: usize,
    pub usage_flags: BufferUsageFlags,
    pub memory_domain: MemoryDomain,
}

impl Handle for Image {
    fn id(&self) -> u64 {
        self.id
    }

    fn handle_type(&self) -> HandleType {
        HandleType::Image
    }
}

impl Handle for ImageView {
    fn id(&self) -> u64 {
        self.id
    }

    fn handle_type(&self) -> HandleType {
        HandleType::ImageView
    }
}

impl Handle for Buffer {
    fn id(&self) -> u64 {
        self.id
    }

    fn handle_type(&self) -> HandleType {
        HandleType::Buffer
    }
}
