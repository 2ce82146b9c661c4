#![allow(dead_code)]

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use deferred::binding_model::{HeapBinding, MaterialTextureType, MATERIAL_INDEX_PUSH_CONSTANT};
use deferred::material::{MaterialInstanceBuilder, MaterialLibrary, PassShaderCode};
use deferred::pipelines::{PassKind, VertexLayout};
use deferred::uniform_buffer::{Light, MaterialConstants};
use deferred::{
    Camera, FrameOrchestrator, LightSource, MaterialProvider, Model, PassShaders,
    RendererConfiguration, RendererProviders, Texture, TextureData, TextureProvider,
};
use dgpu::dummy::{DummyHal, DummySwapchain};
use dgpu::{
    AddressMode, Buffer, BufferDescription, BufferRange, BufferUsageFlags, CommandRecorder,
    DescriptorImage, DescriptorResources, DescriptorSet, DescriptorType, DescriptorWrite, Device,
    Extents2D,
    FilterMode, Format, GpuResult, ImageDescription, ImageViewDescription, IndexType,
    MemoryDomain, MipmapMode, PipelineLayout, SampleCount, Sampler, SamplerDescription,
};
use glam::{Mat4, Vec3, Vec4};

pub const VIEWPORT: Extents2D = Extents2D {
    width: 320,
    height: 240,
};

pub struct FixedCamera {
    pub viewport: Extents2D,
}

impl Camera for FixedCamera {
    fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            60f32.to_radians(),
            self.viewport.width as f32 / self.viewport.height as f32,
            0.1,
            100.0,
        )
    }

    fn view(&self) -> Mat4 {
        Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y)
    }

    fn viewport(&self) -> Extents2D {
        self.viewport
    }
}

/// Lights the test can add to or remove from after handing them to the
/// renderer.
#[derive(Clone, Default)]
pub struct SharedLights(pub Rc<RefCell<Vec<Light>>>);

impl LightSource for SharedLights {
    fn transform_lights(&self, view: &Mat4) -> Vec<Light> {
        self.0
            .borrow()
            .iter()
            .map(|light| Light {
                position: *view * light.position,
                ..*light
            })
            .collect()
    }

    fn num_lights(&self) -> usize {
        self.0.borrow().len()
    }
}

pub type SharedLibrary = Rc<RefCell<MaterialLibrary<MemoryTextures>>>;

/// A material library the test keeps a handle to, so instances can be
/// added while the renderer runs.
pub struct SharedMaterials(pub SharedLibrary);

impl MaterialProvider for SharedMaterials {
    fn material_constants(&self) -> Vec<MaterialConstants> {
        self.0.borrow().material_constants()
    }

    fn material_instances_count(&self) -> u32 {
        self.0.borrow().material_instances_count()
    }

    fn descriptor_image_infos(&self, ty: MaterialTextureType) -> Vec<DescriptorImage> {
        self.0.borrow().descriptor_image_infos(ty)
    }

    fn set_fallback_texture(&mut self, texture: Texture) {
        self.0.borrow_mut().set_fallback_texture(texture)
    }

    fn pass_shaders(&mut self, device: &Device, pass: PassKind) -> GpuResult<PassShaders> {
        self.0.borrow_mut().pass_shaders(device, pass)
    }

    fn reload_all_shaders(&mut self, device: &Device) -> GpuResult<()> {
        self.0.borrow_mut().reload_all_shaders(device)
    }

    fn destroy(&mut self, device: &Device) -> GpuResult<()> {
        self.0.borrow_mut().destroy(device)
    }
}

/// Creates bare images for every texture. Paths starting with `missing`
/// don't exist.
#[derive(Default)]
pub struct MemoryTextures;

impl MemoryTextures {
    fn create(
        device: &Device,
        label: &str,
        extents: Extents2D,
        format: Format,
        sampler: Sampler,
    ) -> GpuResult<Texture> {
        let image = device.create_image(&ImageDescription {
            label: Some(label),
            extents,
            format,
            usage_flags: dgpu::ImageUsageFlags::SAMPLED | dgpu::ImageUsageFlags::TRANSFER_DST,
            samples: SampleCount::One,
            memory_domain: MemoryDomain::DeviceLocal,
        })?;
        let view = device.create_image_view(&ImageViewDescription {
            label: Some(label),
            image,
            format,
            aspect: format.aspect(),
        })?;
        Ok(Texture {
            image,
            view,
            sampler,
        })
    }
}

impl TextureProvider for MemoryTextures {
    fn load_texture_2d(
        &mut self,
        device: &Device,
        path: &Path,
        format: Format,
        sampler: Sampler,
    ) -> GpuResult<Option<Texture>> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with("missing") {
            return Ok(None);
        }
        let extents = Extents2D {
            width: 4,
            height: 4,
        };
        Self::create(device, &name, extents, format, sampler).map(Some)
    }

    fn create_texture_from_data(
        &mut self,
        device: &Device,
        data: &TextureData,
    ) -> GpuResult<Texture> {
        Self::create(device, data.name, data.extents, data.format, data.sampler)
    }

    fn destroy_texture(&mut self, device: &Device, texture: Texture) -> GpuResult<()> {
        device.destroy_image_view(texture.view)?;
        device.destroy_image(texture.image)
    }
}

/// Indexed geometry with one indirect draw.
pub struct TestModel {
    pub name: String,
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub indirect_buffer: Buffer,
    pub heap_set: Option<DescriptorSet>,
}

impl TestModel {
    pub fn new(device: &Device, name: &str) -> Self {
        let buffer = |size, usage_flags| {
            device
                .create_buffer(&BufferDescription {
                    label: Some(name),
                    size,
                    usage_flags,
                    memory_domain: MemoryDomain::DeviceLocal,
                })
                .unwrap()
        };
        Self {
            name: name.to_owned(),
            vertex_buffer: buffer(
                256,
                BufferUsageFlags::VERTEX_BUFFER | BufferUsageFlags::STORAGE_BUFFER,
            ),
            index_buffer: buffer(64, BufferUsageFlags::INDEX_BUFFER),
            indirect_buffer: buffer(20, BufferUsageFlags::INDIRECT_BUFFER),
            heap_set: None,
        }
    }
}

impl Model for TestModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_and_write_descriptor_sets(
        &mut self,
        device: &Device,
        heap_set: DescriptorSet,
    ) -> GpuResult<()> {
        let range = BufferRange {
            buffer: self.vertex_buffer,
            offset: 0,
            range: 256,
        };
        device.update_descriptor_sets(&[DescriptorWrite {
            set: heap_set,
            binding: HeapBinding::vertex_channel(0),
            first_element: 0,
            ty: DescriptorType::StorageBuffer,
            resources: DescriptorResources::Buffers(std::slice::from_ref(&range)),
        }])?;
        self.heap_set = Some(heap_set);
        Ok(())
    }

    fn bind_vertex_buffer(&self, recorder: &mut CommandRecorder) -> GpuResult<()> {
        recorder.bind_vertex_buffers(0, &[self.vertex_buffer])
    }

    fn bind_index_buffer(&self, recorder: &mut CommandRecorder) -> GpuResult<()> {
        recorder.bind_index_buffer(self.index_buffer, IndexType::Uint32)
    }

    fn render_meshes_by_material(
        &self,
        recorder: &mut CommandRecorder,
        pipeline_layout: PipelineLayout,
        heap_set_index: u32,
    ) -> GpuResult<()> {
        if let Some(heap_set) = self.heap_set {
            recorder.bind_descriptor_sets(pipeline_layout, heap_set_index, &[heap_set])?;
        }
        recorder.push_constants(
            pipeline_layout,
            MATERIAL_INDEX_PUSH_CONSTANT.stages,
            MATERIAL_INDEX_PUSH_CONSTANT.offset,
            bytemuck::bytes_of(&0u32),
        )?;
        recorder.draw_indexed_indirect(self.indirect_buffer, 0, 1, 20)
    }
}

pub fn material_sampler(device: &Device) -> Sampler {
    device
        .create_sampler(&SamplerDescription {
            label: Some("Material sampler"),
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_mode: MipmapMode::Linear,
            address_mode: AddressMode::Repeat,
            max_anisotropy: None,
            min_lod: 0.0,
            max_lod: 1.0,
        })
        .unwrap()
}

pub fn fake_spirv() -> PassShaderCode {
    PassShaderCode {
        vertex: vec![0x0723_0203, 1],
        fragment: vec![0x0723_0203, 2],
    }
}

pub fn model_layout() -> VertexLayout {
    VertexLayout::fullscreen_quad()
}

pub struct Harness {
    pub renderer: FrameOrchestrator,
    pub hal: Arc<DummyHal>,
    pub device: Device,
    pub materials: SharedLibrary,
    pub lights: SharedLights,
}

impl Harness {
    /// Adds a material instance whose textures are all missing.
    pub fn add_material(&self, name: &str) -> u32 {
        self.materials.borrow_mut().add_instance(
            &self.device,
            MaterialInstanceBuilder::new(name, "assets")
                .texture(MaterialTextureType::Diffuse, "missing_diffuse.png"),
        )
    }

    pub fn add_light(&self) {
        self.lights.0.borrow_mut().push(ceiling_light());
    }
}

pub fn ceiling_light() -> Light {
    Light {
        position: Vec4::new(0.0, 4.0, 0.0, 1.0),
        color: Vec4::ONE,
        ..Default::default()
    }
}

/// An initialized renderer over a dummy swapchain, with one material
/// instance whose textures are all missing.
pub fn initialized(image_count: usize, config: RendererConfiguration) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let (device, hal) = Device::dummy();
    let swapchain = DummySwapchain::new(hal.clone(), image_count, VIEWPORT, Format::Bgra8Srgb)
        .unwrap();

    let mut materials = MaterialLibrary::new(
        MemoryTextures,
        material_sampler(&device),
        Box::new(|_pass| Ok(fake_spirv())),
    );
    materials.add_instance(
        &device,
        MaterialInstanceBuilder::new("Floor", "assets")
            .texture(MaterialTextureType::Diffuse, "missing_floor.png"),
    );

    let materials = Rc::new(RefCell::new(materials));
    let lights = SharedLights(Rc::new(RefCell::new(vec![ceiling_light(); 2])));
    let providers = RendererProviders {
        lights: Box::new(lights.clone()),
        textures: Box::new(MemoryTextures),
        materials: Box::new(SharedMaterials(materials.clone())),
    };
    let mut renderer = FrameOrchestrator::new(device.clone(), Box::new(swapchain), providers, config);
    renderer
        .init(Box::new(FixedCamera { viewport: VIEWPORT }))
        .unwrap();
    Harness {
        renderer,
        hal,
        device,
        materials,
        lights,
    }
}

pub fn register(harness: &mut Harness, name: &str) -> deferred::ModelId {
    let model = TestModel::new(&harness.device, name);
    harness
        .renderer
        .register_model(Box::new(model), model_layout())
        .unwrap()
}
