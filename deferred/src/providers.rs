//! Capabilities the renderer consumes from the rest of the application.
//!
//! The renderer never owns scene data: cameras, lights, textures, materials
//! and models are handed in through these traits, so tests can substitute
//! simple doubles.

use std::path::Path;

use dgpu::{
    CommandRecorder, DescriptorImage, DescriptorSet, Device, Extents2D, Format, GpuResult, Image,
    ImageLayout, ImageUsageFlags, ImageView, PipelineLayout, Sampler, ShaderModule,
};
use glam::Mat4;

use crate::binding_model::MaterialTextureType;
use crate::pipelines::PassKind;
use crate::uniform_buffer::{Light, MaterialConstants};

pub trait Camera {
    fn projection(&self) -> Mat4;
    fn view(&self) -> Mat4;
    fn viewport(&self) -> Extents2D;
}

pub trait LightSource {
    /// The lights in view space, in a stable order.
    fn transform_lights(&self, view: &Mat4) -> Vec<Light>;
    fn num_lights(&self) -> usize;
}

/// A sampled 2D texture resident on the GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Texture {
    pub image: Image,
    pub view: ImageView,
    pub sampler: Sampler,
}

impl Texture {
    pub fn descriptor_image(&self) -> DescriptorImage {
        DescriptorImage {
            view: self.view,
            sampler: Some(self.sampler),
            layout: ImageLayout::ShaderReadOnly,
        }
    }
}

/// Raw texel data to upload as a texture.
#[derive(Clone, Copy, Debug)]
pub struct TextureData<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
    pub extents: Extents2D,
    pub format: Format,
    pub usage_flags: ImageUsageFlags,
    pub sampler: Sampler,
}

pub trait TextureProvider {
    /// Loads a texture from disk. `Ok(None)` means the file does not exist.
    fn load_texture_2d(
        &mut self,
        device: &Device,
        path: &Path,
        format: Format,
        sampler: Sampler,
    ) -> GpuResult<Option<Texture>>;

    fn create_texture_from_data(
        &mut self,
        device: &Device,
        data: &TextureData,
    ) -> GpuResult<Texture>;

    fn destroy_texture(&mut self, device: &Device, texture: Texture) -> GpuResult<()>;
}

/// The shader modules of one pass pipeline. Both use `main` as entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassShaders {
    pub vertex: ShaderModule,
    pub fragment: ShaderModule,
}

pub trait MaterialProvider {
    /// One entry per material instance, in instance order.
    fn material_constants(&self) -> Vec<MaterialConstants>;
    fn material_instances_count(&self) -> u32;
    /// One image per material instance, in instance order.
    fn descriptor_image_infos(&self, ty: MaterialTextureType) -> Vec<DescriptorImage>;
    /// The texture substituted for anything that fails to load.
    fn set_fallback_texture(&mut self, texture: Texture);
    fn pass_shaders(&mut self, device: &Device, pass: PassKind) -> GpuResult<PassShaders>;
    fn reload_all_shaders(&mut self, device: &Device) -> GpuResult<()>;
    /// Releases shader modules and material textures.
    fn destroy(&mut self, device: &Device) -> GpuResult<()>;
}

/// A piece of registered geometry.
pub trait Model {
    fn name(&self) -> &str;

    /// Writes the model's buffers into its heap set. Called on every
    /// registration, since each one reallocates all heap sets.
    fn create_and_write_descriptor_sets(
        &mut self,
        device: &Device,
        heap_set: DescriptorSet,
    ) -> GpuResult<()>;

    fn bind_vertex_buffer(&self, recorder: &mut CommandRecorder) -> GpuResult<()>;
    fn bind_index_buffer(&self, recorder: &mut CommandRecorder) -> GpuResult<()>;

    /// Binds the heap set at `heap_set_index` and issues one indirect draw
    /// per material, pushing the material index as push constant.
    fn render_meshes_by_material(
        &self,
        recorder: &mut CommandRecorder,
        pipeline_layout: PipelineLayout,
        heap_set_index: u32,
    ) -> GpuResult<()>;
}
