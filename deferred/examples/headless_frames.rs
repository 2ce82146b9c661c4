//! Renders a few frames of a single model against the recording backend,
//! recreating the swapchain when presentation asks for it.
//!
//! Run with `RUST_LOG=debug` to follow the lifecycle.

use std::path::Path;

use anyhow::Context;
use deferred::material::{MaterialInstanceBuilder, MaterialLibrary, PassShaderCode};
use deferred::pipelines::VertexLayout;
use deferred::uniform_buffer::Light;
use deferred::{
    Camera, FrameOrchestrator, LightSource, Model, RendererConfiguration, RendererProviders,
    Texture, TextureData, TextureProvider,
};
use dgpu::dummy::DummySwapchain;
use dgpu::{
    AddressMode, Buffer, BufferDescription, BufferUsageFlags, CommandRecorder, DescriptorSet,
    Device, Extents2D, FilterMode, Format, GpuError, GpuResult, ImageDescription,
    ImageViewDescription, IndexType, MemoryDomain, MipmapMode, PipelineLayout, SampleCount,
    Sampler, SamplerDescription,
};
use glam::{Mat4, Vec3, Vec4};

const CONFIG: &str = r#"
max_registered_models = 4
max_storage_buffers = 40
clear_color = [0.05, 0.05, 0.08, 1.0]
"#;

struct OrbitCamera {
    viewport: Extents2D,
}

impl Camera for OrbitCamera {
    fn projection(&self) -> Mat4 {
        let aspect = self.viewport.width as f32 / self.viewport.height as f32;
        Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 500.0)
    }

    fn view(&self) -> Mat4 {
        Mat4::look_at_rh(Vec3::new(4.0, 3.0, 4.0), Vec3::ZERO, Vec3::Y)
    }

    fn viewport(&self) -> Extents2D {
        self.viewport
    }
}

struct Sun;

impl LightSource for Sun {
    fn transform_lights(&self, view: &Mat4) -> Vec<Light> {
        vec![Light {
            position: *view * Vec4::new(10.0, 20.0, 10.0, 1.0),
            color: Vec4::new(1.0, 0.95, 0.9, 1.0),
            ..Default::default()
        }]
    }

    fn num_lights(&self) -> usize {
        1
    }
}

/// Every file is "missing", so materials fall back to the dummy texture.
struct NoFiles;

impl TextureProvider for NoFiles {
    fn load_texture_2d(
        &mut self,
        _device: &Device,
        path: &Path,
        _format: Format,
        _sampler: Sampler,
    ) -> GpuResult<Option<Texture>> {
        log::info!("Skipping {}", path.display());
        Ok(None)
    }

    fn create_texture_from_data(
        &mut self,
        device: &Device,
        data: &TextureData,
    ) -> GpuResult<Texture> {
        let image = device.create_image(&ImageDescription {
            label: Some(data.name),
            extents: data.extents,
            format: data.format,
            usage_flags: data.usage_flags,
            samples: SampleCount::One,
            memory_domain: MemoryDomain::DeviceLocal,
        })?;
        let view = device.create_image_view(&ImageViewDescription {
            label: Some(data.name),
            image,
            format: data.format,
            aspect: data.format.aspect(),
        })?;
        Ok(Texture {
            image,
            view,
            sampler: data.sampler,
        })
    }

    fn destroy_texture(&mut self, device: &Device, texture: Texture) -> GpuResult<()> {
        device.destroy_image_view(texture.view)?;
        device.destroy_image(texture.image)
    }
}

struct Cube {
    vertices: Buffer,
    indices: Buffer,
}

impl Cube {
    fn new(device: &Device) -> GpuResult<Self> {
        let buffer = |label, size, usage_flags| {
            device.create_buffer(&BufferDescription {
                label: Some(label),
                size,
                usage_flags,
                memory_domain: MemoryDomain::HostVisible,
            })
        };
        Ok(Self {
            vertices: buffer("Cube vertices", 8 * 12, BufferUsageFlags::VERTEX_BUFFER)?,
            indices: buffer("Cube indices", 36 * 4, BufferUsageFlags::INDEX_BUFFER)?,
        })
    }
}

impl Model for Cube {
    fn name(&self) -> &str {
        "Cube"
    }

    fn create_and_write_descriptor_sets(
        &mut self,
        _device: &Device,
        _heap_set: DescriptorSet,
    ) -> GpuResult<()> {
        Ok(())
    }

    fn bind_vertex_buffer(&self, recorder: &mut CommandRecorder) -> GpuResult<()> {
        recorder.bind_vertex_buffers(0, &[self.vertices])
    }

    fn bind_index_buffer(&self, recorder: &mut CommandRecorder) -> GpuResult<()> {
        recorder.bind_index_buffer(self.indices, IndexType::Uint32)
    }

    fn render_meshes_by_material(
        &self,
        recorder: &mut CommandRecorder,
        _pipeline_layout: PipelineLayout,
        _heap_set_index: u32,
    ) -> GpuResult<()> {
        recorder.draw_indexed(36, 1, 0, 0, 0)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config: RendererConfiguration =
        toml::from_str(CONFIG).context("Failed to parse the renderer configuration")?;
    let viewport = Extents2D {
        width: 1280,
        height: 720,
    };

    let (device, hal) = Device::dummy();
    let swapchain = DummySwapchain::new(hal.clone(), 3, viewport, Format::Bgra8Srgb)?;
    let material_sampler = device.create_sampler(&SamplerDescription {
        label: Some("Material sampler"),
        mag_filter: FilterMode::Linear,
        min_filter: FilterMode::Linear,
        mipmap_mode: MipmapMode::Linear,
        address_mode: AddressMode::Repeat,
        max_anisotropy: Some(device.limits().max_sampler_anisotropy),
        min_lod: 0.0,
        max_lod: 1.0,
    })?;
    let mut materials = MaterialLibrary::new(
        NoFiles,
        material_sampler,
        Box::new(|pass| {
            log::debug!("Compiling {}", pass.label());
            Ok(PassShaderCode {
                vertex: vec![0x0723_0203],
                fragment: vec![0x0723_0203],
            })
        }),
    );
    materials.add_instance(
        &device,
        MaterialInstanceBuilder::new("Painted metal", "assets/metal")
            .texture(deferred::binding_model::MaterialTextureType::Diffuse, "albedo.png"),
    );

    let mut renderer = FrameOrchestrator::new(
        device.clone(),
        Box::new(swapchain),
        RendererProviders {
            lights: Box::new(Sun),
            textures: Box::new(NoFiles),
            materials: Box::new(materials),
        },
        config,
    );
    renderer.init(Box::new(OrbitCamera { viewport }))?;
    renderer.register_model(Box::new(Cube::new(&device)?), VertexLayout::fullscreen_quad())?;

    hal.fail_next_present(GpuError::SwapchainOutOfDate);
    for _ in 0..6 {
        renderer.pre_render()?;
        renderer.render()?;
        match renderer.post_render() {
            Err(e) if e.is_recoverable() => {
                log::warn!("{e}, recreating the swapchain");
                renderer.recreate_swapchain(viewport)?;
            }
            other => other?,
        }
    }
    log::info!("Presented {} frames", renderer.frame_index());

    renderer.shutdown()?;
    device.destroy_sampler(material_sampler)?;
    Ok(())
}
