//! Descriptor-set layouts, the shared pipeline layout and the descriptor pool.
//!
//! Resources are split in two scopes: the frame-generic set (set 0) holds
//! everything shared by the whole frame, and one heap set (set 1) per
//! registered model holds that model's buffers.

use dgpu::{
    BufferRange, DescriptorImage, DescriptorPool, DescriptorPoolDescription, DescriptorPoolSize,
    DescriptorResources, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBinding,
    DescriptorSetLayoutDescription, DescriptorType, DescriptorWrite, Device, GpuError,
    PipelineLayout, PipelineLayoutDescription, PushConstantRange, ShaderStageFlags,
};
use log::{debug, trace};
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::attachment::GBufferChannel;
use crate::config::RendererConfiguration;
use crate::error::{ConstructionContext, RendererError, RendererResult};
use crate::teardown::{GpuObject, ReleaseStage, TeardownList};

/// Descriptor-set scopes; the discriminant is the set index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumCount, EnumIter)]
pub enum DescriptorSetKind {
    FrameGeneric = 0,
    Heap = 1,
}

impl DescriptorSetKind {
    pub fn set_index(self) -> u32 {
        self as u32
    }
}

/// Per-material texture slots, in binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumCount, EnumIter)]
pub enum MaterialTextureType {
    Diffuse,
    Ambient,
    Specular,
    Normal,
    Roughness,
}

impl MaterialTextureType {
    pub fn binding(self) -> u32 {
        FrameGenericBinding::TEXTURE_ARRAYS_START + self as u32
    }
}

pub struct FrameGenericBinding;

impl FrameGenericBinding {
    pub const MATRICES: u32 = 0;
    pub const DEPTH: u32 = 1;
    pub const TEXTURE_ARRAYS_START: u32 = 2;
    pub const ACCUMULATION: u32 = 7;
    pub const LIGHTS: u32 = 8;
    pub const MATERIALS: u32 = 9;
    pub const G_BUFFER_START: u32 = 10;

    pub fn g_buffer(channel: GBufferChannel) -> u32 {
        Self::G_BUFFER_START + channel as u32
    }
}

pub struct HeapBinding;

impl HeapBinding {
    pub const MODEL_MATRICES: u32 = 0;
    pub const INDICES: u32 = 1;
    pub const INDIRECT_COMMANDS: u32 = 2;
    pub const MATERIAL_IDS: u32 = 3;
    pub const VERTEX_CHANNELS_START: u32 = 4;

    pub fn vertex_channel(channel: u32) -> u32 {
        Self::VERTEX_CHANNELS_START + channel
    }
}

/// The material index pushed before each indirect draw.
pub const MATERIAL_INDEX_PUSH_CONSTANT: PushConstantRange = PushConstantRange {
    stages: ShaderStageFlags::VERTEX,
    offset: 0,
    size: std::mem::size_of::<u32>() as u32,
};

const FRAME_GENERIC_STORAGE_BUFFERS: u32 = 3;
const FRAME_GENERIC_ATTACHMENT_SAMPLERS: u32 = 2 + GBufferChannel::COUNT as u32;
const HEAP_FIXED_STORAGE_BUFFERS: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingCapacities {
    pub max_uniform_buffers: u32,
    pub max_storage_buffers: u32,
    pub max_combined_image_samplers: u32,
    pub max_material_instances: u32,
    pub max_models: u32,
}

impl BindingCapacities {
    pub fn max_sets(&self) -> u32 {
        self.max_models.saturating_add(1)
    }
}

impl From<&RendererConfiguration> for BindingCapacities {
    fn from(config: &RendererConfiguration) -> Self {
        Self {
            max_uniform_buffers: config.max_uniform_buffers,
            max_storage_buffers: config.max_storage_buffers,
            max_combined_image_samplers: config.max_combined_image_samplers(),
            max_material_instances: config.max_material_instances,
            max_models: config.max_registered_models,
        }
    }
}

/// What the current scene needs from the pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BindingRequirements {
    pub material_instances: u32,
    pub models: u32,
    pub vertex_channels: u32,
}

impl BindingRequirements {
    pub fn descriptor_sets(&self) -> u32 {
        self.models.saturating_add(1)
    }

    pub fn storage_buffers(&self) -> u32 {
        let per_model = HEAP_FIXED_STORAGE_BUFFERS.saturating_add(self.vertex_channels);
        FRAME_GENERIC_STORAGE_BUFFERS.saturating_add(self.models.saturating_mul(per_model))
    }

    pub fn combined_image_samplers(&self) -> u32 {
        FRAME_GENERIC_ATTACHMENT_SAMPLERS
            .saturating_add((MaterialTextureType::COUNT as u32).saturating_mul(self.material_instances))
    }

    /// Fails with [`RendererError::CapacityExceeded`] on the first resource
    /// that doesn't fit.
    pub fn check_capacity(&self, capacities: &BindingCapacities) -> RendererResult<()> {
        let checks = [
            (
                "material instances",
                self.material_instances,
                capacities.max_material_instances,
            ),
            ("registered models", self.models, capacities.max_models),
            (
                "storage buffers",
                self.storage_buffers(),
                capacities.max_storage_buffers,
            ),
            (
                "combined image samplers",
                self.combined_image_samplers(),
                capacities.max_combined_image_samplers,
            ),
        ];
        for (resource, requested, capacity) in checks {
            if requested > capacity {
                return Err(RendererError::CapacityExceeded {
                    resource,
                    requested,
                    capacity,
                });
            }
        }
        Ok(())
    }
}

/// Everything written into the frame-generic set.
#[derive(Clone, Debug)]
pub struct FrameGenericWrites {
    /// Matrices, lights and materials regions of the frame uniform buffer.
    pub uniform_ranges: [BufferRange; 3],
    pub depth: DescriptorImage,
    /// One array per texture type, one image per material instance.
    pub material_textures: [Vec<DescriptorImage>; MaterialTextureType::COUNT],
    pub accumulation: DescriptorImage,
    pub g_buffer: [DescriptorImage; GBufferChannel::COUNT],
}

#[derive(Debug)]
pub struct ResourceBindingModel {
    set_layouts: [DescriptorSetLayout; DescriptorSetKind::COUNT],
    pipeline_layout: PipelineLayout,
    pool: DescriptorPool,
    frame_generic_set: DescriptorSet,
    heap_sets: Vec<DescriptorSet>,
    requirements: BindingRequirements,
}

fn frame_generic_bindings(material_instances: u32) -> Vec<DescriptorSetLayoutBinding> {
    let storage = |binding, stages| DescriptorSetLayoutBinding {
        binding,
        ty: DescriptorType::StorageBuffer,
        count: 1,
        stages,
    };
    let sampled = |binding, count| DescriptorSetLayoutBinding {
        binding,
        ty: DescriptorType::CombinedImageSampler,
        count,
        stages: ShaderStageFlags::FRAGMENT,
    };

    let mut bindings = vec![
        storage(FrameGenericBinding::MATRICES, ShaderStageFlags::ALL_GRAPHICS),
        sampled(FrameGenericBinding::DEPTH, 1),
    ];
    bindings.extend(MaterialTextureType::iter().map(|ty| sampled(ty.binding(), material_instances)));
    bindings.push(sampled(FrameGenericBinding::ACCUMULATION, 1));
    bindings.push(storage(FrameGenericBinding::LIGHTS, ShaderStageFlags::FRAGMENT));
    bindings.push(storage(
        FrameGenericBinding::MATERIALS,
        ShaderStageFlags::FRAGMENT,
    ));
    bindings.extend(GBufferChannel::iter().map(|ch| sampled(FrameGenericBinding::g_buffer(ch), 1)));
    bindings
}

fn heap_bindings(vertex_channels: u32) -> Vec<DescriptorSetLayoutBinding> {
    (0..HeapBinding::VERTEX_CHANNELS_START + vertex_channels)
        .map(|binding| DescriptorSetLayoutBinding {
            binding,
            ty: DescriptorType::StorageBuffer,
            count: 1,
            stages: ShaderStageFlags::ALL_GRAPHICS,
        })
        .collect()
}

fn buffer_write(set: DescriptorSet, binding: u32, range: &BufferRange) -> DescriptorWrite<'_> {
    DescriptorWrite {
        set,
        binding,
        first_element: 0,
        ty: DescriptorType::StorageBuffer,
        resources: DescriptorResources::Buffers(std::slice::from_ref(range)),
    }
}

fn image_write(set: DescriptorSet, binding: u32, images: &[DescriptorImage]) -> DescriptorWrite<'_> {
    DescriptorWrite {
        set,
        binding,
        first_element: 0,
        ty: DescriptorType::CombinedImageSampler,
        resources: DescriptorResources::Images(images),
    }
}

impl ResourceBindingModel {
    /// Creates layouts, pipeline layout and pool, then allocates the
    /// frame-generic set. No heap set is allocated yet.
    pub fn build(
        device: &Device,
        capacities: &BindingCapacities,
        requirements: BindingRequirements,
    ) -> RendererResult<Self> {
        requirements.check_capacity(capacities)?;
        let mut created = TeardownList::new();
        match Self::create_objects(device, capacities, requirements, &mut created) {
            Ok(model) => {
                debug!(
                    "Built binding model for {} models and {} material instances",
                    requirements.models, requirements.material_instances
                );
                Ok(model)
            }
            Err(e) => {
                created.rollback(device);
                Err(e)
            }
        }
    }

    fn create_objects(
        device: &Device,
        capacities: &BindingCapacities,
        requirements: BindingRequirements,
        created: &mut TeardownList,
    ) -> RendererResult<Self> {
        let frame_generic_layout = device
            .create_descriptor_set_layout(&DescriptorSetLayoutDescription {
                label: Some("Frame-generic set layout"),
                bindings: &frame_generic_bindings(requirements.material_instances),
            })
            .creating("frame-generic descriptor set layout")?;
        created.push(
            ReleaseStage::DescriptorSetLayouts,
            GpuObject::DescriptorSetLayout(frame_generic_layout),
        );
        let heap_layout = device
            .create_descriptor_set_layout(&DescriptorSetLayoutDescription {
                label: Some("Heap set layout"),
                bindings: &heap_bindings(requirements.vertex_channels),
            })
            .creating("heap descriptor set layout")?;
        created.push(
            ReleaseStage::DescriptorSetLayouts,
            GpuObject::DescriptorSetLayout(heap_layout),
        );
        let set_layouts = [frame_generic_layout, heap_layout];

        let pipeline_layout = device
            .create_pipeline_layout(&PipelineLayoutDescription {
                label: Some("Deferred pipeline layout"),
                set_layouts: &set_layouts,
                push_constant_ranges: &[MATERIAL_INDEX_PUSH_CONSTANT],
            })
            .creating("pipeline layout")?;
        created.push(
            ReleaseStage::PipelineLayouts,
            GpuObject::PipelineLayout(pipeline_layout),
        );

        let pool = device
            .create_descriptor_pool(&DescriptorPoolDescription {
                label: Some("Deferred descriptor pool"),
                max_sets: capacities.max_sets(),
                pool_sizes: &[
                    DescriptorPoolSize {
                        ty: DescriptorType::UniformBuffer,
                        count: capacities.max_uniform_buffers,
                    },
                    DescriptorPoolSize {
                        ty: DescriptorType::CombinedImageSampler,
                        count: capacities.max_combined_image_samplers,
                    },
                    DescriptorPoolSize {
                        ty: DescriptorType::StorageBuffer,
                        count: capacities.max_storage_buffers,
                    },
                ],
            })
            .creating("descriptor pool")?;
        created.push(ReleaseStage::DescriptorPool, GpuObject::DescriptorPool(pool));

        let frame_generic_set = device
            .allocate_descriptor_sets(pool, &[frame_generic_layout])
            .creating("frame-generic descriptor set")?[0];

        Ok(Self {
            set_layouts,
            pipeline_layout,
            pool,
            frame_generic_set,
            heap_sets: vec![],
            requirements,
        })
    }

    /// Replaces every layout and the pool. The replacement is built before
    /// the current objects are released, so a failed rebuild leaves the
    /// current model intact.
    pub fn rebuild(
        &mut self,
        device: &Device,
        capacities: &BindingCapacities,
        requirements: BindingRequirements,
    ) -> RendererResult<()> {
        let rebuilt = Self::build(device, capacities, requirements)?;
        std::mem::replace(self, rebuilt).destroy_objects(device)
    }

    pub fn set_layout(&self, kind: DescriptorSetKind) -> DescriptorSetLayout {
        self.set_layouts[kind as usize]
    }

    pub fn pipeline_layout(&self) -> PipelineLayout {
        self.pipeline_layout
    }

    pub fn frame_generic_set(&self) -> DescriptorSet {
        self.frame_generic_set
    }

    pub fn heap_sets(&self) -> &[DescriptorSet] {
        &self.heap_sets
    }

    pub fn requirements(&self) -> BindingRequirements {
        self.requirements
    }

    pub fn allocate_heap_set(&mut self, device: &Device) -> RendererResult<DescriptorSet> {
        let set = device
            .allocate_descriptor_sets(self.pool, &[self.set_layout(DescriptorSetKind::Heap)])
            .creating("heap descriptor set")?[0];
        self.heap_sets.push(set);
        Ok(set)
    }

    pub fn write_frame_generic(
        &self,
        device: &Device,
        writes: &FrameGenericWrites,
    ) -> RendererResult<()> {
        let limits = device.limits();
        let alignment = limits.min_storage_buffer_offset_alignment.max(1) as usize;
        for range in &writes.uniform_ranges {
            if range.offset % alignment != 0 {
                return Err(RendererError::Construction {
                    object: "frame-generic descriptor set",
                    source: GpuError::invalid_description(
                        "frame uniform buffer",
                        format!(
                            "offset {} is not a multiple of the storage buffer alignment {}",
                            range.offset, alignment
                        ),
                    ),
                });
            }
            if range.range as u64 > limits.max_storage_buffer_range {
                return Err(RendererError::Construction {
                    object: "frame-generic descriptor set",
                    source: GpuError::invalid_description(
                        "frame uniform buffer",
                        format!(
                            "range of {} bytes exceeds the storage buffer limit {}",
                            range.range, limits.max_storage_buffer_range
                        ),
                    ),
                });
            }
        }
        for (ty, images) in MaterialTextureType::iter().zip(&writes.material_textures) {
            if images.len() != self.requirements.material_instances as usize {
                return Err(RendererError::Construction {
                    object: "frame-generic descriptor set",
                    source: GpuError::invalid_description(
                        format!("{ty:?} texture array"),
                        format!(
                            "expected {} images, got {}",
                            self.requirements.material_instances,
                            images.len()
                        ),
                    ),
                });
            }
        }

        let set = self.frame_generic_set;
        let [matrices, lights, materials] = &writes.uniform_ranges;
        let mut descriptor_writes = vec![
            buffer_write(set, FrameGenericBinding::MATRICES, matrices),
            image_write(
                set,
                FrameGenericBinding::DEPTH,
                std::slice::from_ref(&writes.depth),
            ),
        ];
        // Empty arrays are filtered out by the device
        descriptor_writes.extend(
            MaterialTextureType::iter()
                .zip(&writes.material_textures)
                .map(|(ty, images)| image_write(set, ty.binding(), images)),
        );
        descriptor_writes.push(image_write(
            set,
            FrameGenericBinding::ACCUMULATION,
            std::slice::from_ref(&writes.accumulation),
        ));
        descriptor_writes.push(buffer_write(set, FrameGenericBinding::LIGHTS, lights));
        descriptor_writes.push(buffer_write(set, FrameGenericBinding::MATERIALS, materials));
        descriptor_writes.extend(GBufferChannel::iter().map(|channel| {
            image_write(
                set,
                FrameGenericBinding::g_buffer(channel),
                std::slice::from_ref(&writes.g_buffer[channel as usize]),
            )
        }));

        device
            .update_descriptor_sets(&descriptor_writes)
            .creating("frame-generic descriptor set")?;
        trace!("Wrote {} frame-generic descriptors", descriptor_writes.len());
        Ok(())
    }

    pub fn destroy(self, device: &Device) -> RendererResult<()> {
        self.destroy_objects(device)
    }

    /// Queues the pool and layouts for release at their teardown stages.
    pub(crate) fn into_teardown(self, list: &mut TeardownList) {
        list.push(
            ReleaseStage::DescriptorPool,
            GpuObject::DescriptorPool(self.pool),
        );
        list.push(
            ReleaseStage::PipelineLayouts,
            GpuObject::PipelineLayout(self.pipeline_layout),
        );
        list.extend(
            ReleaseStage::DescriptorSetLayouts,
            self.set_layouts.map(GpuObject::DescriptorSetLayout),
        );
    }

    fn destroy_objects(&self, device: &Device) -> RendererResult<()> {
        device.destroy_descriptor_pool(self.pool)?;
        device.destroy_pipeline_layout(self.pipeline_layout)?;
        for layout in self.set_layouts {
            device.destroy_descriptor_set_layout(layout)?;
        }
        Ok(())
    }
}
