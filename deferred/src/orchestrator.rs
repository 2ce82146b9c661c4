//! The frame lifecycle: initialisation, model registration, the
//! pre-render/render/post-render loop, maintenance and shutdown.

use std::fmt::{Display, Formatter};

use dgpu::{
    AddressMode, ClearValue, DescriptorImage, Device, Extents2D, Fence, FilterMode, Format,
    ImageLayout, ImageUsageFlags, MipmapMode, PipelineLayout, PipelineStageFlags, RenderPass,
    Sampler, SamplerDescription, Semaphore, SemaphoreWait, SubmitInfo, Swapchain,
};
use log::{debug, error, info};
use strum::{EnumCount, IntoEnumIterator};

use crate::attachment::FrameAttachments;
use crate::binding_model::{
    BindingCapacities, BindingRequirements, FrameGenericWrites, MaterialTextureType,
    ResourceBindingModel,
};
use crate::config::RendererConfiguration;
use crate::error::{ConstructionContext, PresentationError, RendererError, RendererResult};
use crate::frame_targets::FrameTargetSet;
use crate::fullscreen_quad::FullscreenQuad;
use crate::pipelines::{PassPipelines, PipelineInputs, VertexLayout};
use crate::providers::{
    Camera, LightSource, MaterialProvider, Model, Texture, TextureData, TextureProvider,
};
use crate::render_graph::deferred_topology;
use crate::sequencer::{CommandSequencer, SequenceInputs};
use crate::teardown::{GpuObject, ReleaseStage, TeardownList};
use crate::uniform_buffer::{FrameData, FrameMatrices, FrameUniformBuffer};

/// The capabilities the renderer consumes from the application.
pub struct RendererProviders {
    pub lights: Box<dyn LightSource>,
    pub textures: Box<dyn TextureProvider>,
    pub materials: Box<dyn MaterialProvider>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RendererState {
    Uninitialized,
    Initialized,
    /// An image was acquired; the payload is its index.
    PreRendered(u32),
    /// The frame for this image was submitted.
    Rendered(u32),
    ShuttingDown,
}

impl Display for RendererState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RendererState::Uninitialized => write!(f, "uninitialized"),
            RendererState::Initialized => write!(f, "initialized"),
            RendererState::PreRendered(image) => write!(f, "pre-rendered (image {image})"),
            RendererState::Rendered(image) => write!(f, "rendered (image {image})"),
            RendererState::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// Index of a registered model, in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub u32);

#[derive(Clone, Copy, Debug)]
struct Samplers {
    anisotropic: Sampler,
    nearest: Sampler,
}

impl Samplers {
    fn new(device: &Device) -> RendererResult<Self> {
        let anisotropic = device
            .create_sampler(&SamplerDescription {
                label: Some("Anisotropic sampler"),
                mag_filter: FilterMode::Linear,
                min_filter: FilterMode::Linear,
                mipmap_mode: MipmapMode::Linear,
                address_mode: AddressMode::Repeat,
                max_anisotropy: Some(device.limits().max_sampler_anisotropy),
                min_lod: 0.0,
                max_lod: 1.0,
            })
            .creating("anisotropic sampler")?;
        let nearest = device
            .create_sampler(&SamplerDescription {
                label: Some("Nearest sampler"),
                mag_filter: FilterMode::Nearest,
                min_filter: FilterMode::Nearest,
                mipmap_mode: MipmapMode::Nearest,
                address_mode: AddressMode::ClampToEdge,
                max_anisotropy: None,
                min_lod: 0.0,
                max_lod: 1.0,
            })
            .creating("nearest sampler")?;
        Ok(Self {
            anisotropic,
            nearest,
        })
    }
}

#[derive(Clone, Copy, Debug)]
struct SyncObjects {
    image_available: Semaphore,
    rendering_finished: Semaphore,
    in_flight: Fence,
}

impl SyncObjects {
    fn new(device: &Device) -> RendererResult<Self> {
        Ok(Self {
            image_available: device
                .create_semaphore(Some("Image available"))
                .creating("image available semaphore")?,
            rendering_finished: device
                .create_semaphore(Some("Rendering finished"))
                .creating("rendering finished semaphore")?,
            in_flight: device
                .create_fence(Some("In flight"), true)
                .creating("in-flight fence")?,
        })
    }
}

/// Everything created by `init`, plus the objects built on registration.
struct FrameResources {
    camera: Box<dyn Camera>,
    samplers: Samplers,
    bindings: ResourceBindingModel,
    dummy_texture: Texture,
    matrices: FrameMatrices,
    attachments: FrameAttachments,
    render_pass: RenderPass,
    clear_values: Vec<ClearValue>,
    frame_targets: FrameTargetSet,
    sync: SyncObjects,
    sequencer: CommandSequencer,
    uniform_buffer: FrameUniformBuffer,
    pipelines: Option<PassPipelines>,
    quad: Option<FullscreenQuad>,
    /// Vertex layout of the latest registration, used by the store pipeline.
    store_vertex_layout: Option<VertexLayout>,
    /// The frame-generic set no longer matches the uniform buffer or attachments.
    descriptors_dirty: bool,
    /// The recorded command buffers reference replaced objects.
    commands_dirty: bool,
    /// The swapchain was recreated but its frame targets were not.
    targets_stale: bool,
}

/// Frame-sized objects built together on init and on swapchain recreation.
struct FrameTargets {
    attachments: FrameAttachments,
    render_pass: RenderPass,
    clear_values: Vec<ClearValue>,
    frame_targets: FrameTargetSet,
}

impl FrameTargets {
    /// Builds the attachments, render pass and framebuffers for the current
    /// swapchain and camera viewport. Nothing is left behind on failure.
    fn build(
        device: &Device,
        swapchain: &dyn Swapchain,
        viewport: Extents2D,
        config: &RendererConfiguration,
    ) -> RendererResult<Self> {
        let attachments = FrameAttachments::new(device, viewport)?;
        let mut created = TeardownList::new();
        attachments.into_teardown(&mut created);

        let graph = deferred_topology(swapchain.surface_format(), device.depth_format());
        let render_pass = match graph.build(device) {
            Ok(render_pass) => render_pass,
            Err(e) => {
                created.rollback(device);
                return Err(e.into());
            }
        };
        created.push(ReleaseStage::RenderPass, GpuObject::RenderPass(render_pass));

        let frame_targets = match FrameTargetSet::new(
            device,
            render_pass,
            swapchain.images(),
            &attachments,
            viewport,
        ) {
            Ok(frame_targets) => frame_targets,
            Err(e) => {
                created.rollback(device);
                return Err(e);
            }
        };
        Ok(Self {
            attachments,
            render_pass,
            clear_values: graph.clear_values(config.clear_color, config.clear_depth),
            frame_targets,
        })
    }

    fn into_teardown(self, list: &mut TeardownList) {
        list.push(ReleaseStage::RenderPass, GpuObject::RenderPass(self.render_pass));
        list.extend(
            ReleaseStage::Framebuffers,
            self.frame_targets
                .into_framebuffers()
                .into_iter()
                .map(GpuObject::Framebuffer),
        );
        self.attachments.into_teardown(list);
    }
}

impl FrameResources {
    /// Repacks the uniform buffer, marking the frame-generic set dirty when
    /// the buffer or its regions moved. A failed repack may have replaced the
    /// buffer, so it marks the set dirty as well.
    fn refresh_frame_data(
        &mut self,
        device: &Device,
        lights: &dyn LightSource,
        materials: &dyn MaterialProvider,
    ) -> RendererResult<()> {
        self.matrices = FrameMatrices::new(self.camera.projection(), self.camera.view());
        let lights = lights.transform_lights(&self.matrices.view);
        let material_constants = materials.material_constants();
        let outcome = self.uniform_buffer.repack(
            device,
            &FrameData {
                matrices: self.matrices,
                lights: &lights,
                materials: &material_constants,
            },
        );
        if !matches!(outcome, Ok(repacked) if !repacked.invalidates_descriptors()) {
            self.descriptors_dirty = true;
        }
        outcome.map(|_| ())
    }

    fn write_frame_generic(
        &self,
        device: &Device,
        bindings: &ResourceBindingModel,
        materials: &dyn MaterialProvider,
    ) -> RendererResult<()> {
        let Some(uniform_ranges) = self.uniform_buffer.descriptor_ranges() else {
            return Ok(());
        };
        let attachment_image = |view, layout| DescriptorImage {
            view,
            sampler: Some(self.samplers.nearest),
            layout,
        };
        let mut material_textures: [Vec<DescriptorImage>; MaterialTextureType::COUNT] =
            Default::default();
        for ty in MaterialTextureType::iter() {
            material_textures[ty as usize] = materials.descriptor_image_infos(ty);
        }
        bindings.write_frame_generic(
            device,
            &FrameGenericWrites {
                uniform_ranges,
                depth: attachment_image(
                    self.attachments.depth.sampling_view(),
                    ImageLayout::DepthStencilReadOnly,
                ),
                material_textures,
                accumulation: attachment_image(
                    self.attachments.accumulation.view,
                    ImageLayout::ShaderReadOnly,
                ),
                g_buffer: self
                    .attachments
                    .g_buffer
                    .map(|attachment| attachment_image(attachment.view, ImageLayout::ShaderReadOnly)),
            },
        )
    }

    /// Rewrites the frame-generic set if something it references changed.
    fn flush_descriptors(
        &mut self,
        device: &Device,
        materials: &dyn MaterialProvider,
    ) -> RendererResult<()> {
        if self.descriptors_dirty {
            self.write_frame_generic(device, &self.bindings, materials)?;
            self.descriptors_dirty = false;
        }
        Ok(())
    }

    /// Builds pass pipelines against `render_pass` and `layout`, or nothing
    /// while no model has been registered.
    fn build_pipelines(
        &self,
        device: &Device,
        providers: &mut RendererProviders,
        render_pass: RenderPass,
        layout: PipelineLayout,
        store_vertex_layout: Option<&VertexLayout>,
    ) -> RendererResult<Option<PassPipelines>> {
        let Some(store_vertex_layout) = store_vertex_layout else {
            return Ok(None);
        };
        let material_count = providers.materials.material_instances_count();
        let light_count = providers.lights.num_lights() as u32;
        PassPipelines::build(
            device,
            providers.materials.as_mut(),
            &PipelineInputs {
                render_pass,
                layout,
                viewport: self.camera.viewport(),
                store_vertex_layout,
                material_count,
                light_count,
            },
        )
        .map(Some)
    }

    /// Replaces the pipelines in place. The current ones stay if the build
    /// fails.
    fn rebuild_pipelines(
        &mut self,
        device: &Device,
        providers: &mut RendererProviders,
    ) -> RendererResult<()> {
        let pipelines = self.build_pipelines(
            device,
            providers,
            self.render_pass,
            self.bindings.pipeline_layout(),
            self.store_vertex_layout.as_ref(),
        )?;
        let previous = std::mem::replace(&mut self.pipelines, pipelines);
        self.commands_dirty = true;
        if let Some(previous) = previous {
            previous.destroy(device)?;
        }
        Ok(())
    }

    /// Rebuilds the binding model for `requirements`, then rewrites every
    /// descriptor set and rebuilds the pipelines against it. The current
    /// objects are replaced only once all of the new ones exist; they are
    /// returned for release.
    fn rebind(
        &mut self,
        device: &Device,
        providers: &mut RendererProviders,
        models: &mut [Box<dyn Model>],
        capacities: &BindingCapacities,
        requirements: BindingRequirements,
        store_vertex_layout: Option<VertexLayout>,
    ) -> RendererResult<TeardownList> {
        self.refresh_frame_data(device, providers.lights.as_ref(), providers.materials.as_ref())?;
        let mut bindings = ResourceBindingModel::build(device, capacities, requirements)?;
        let pipelines = match self.populate(
            device,
            providers,
            models,
            &mut bindings,
            store_vertex_layout.as_ref(),
        ) {
            Ok(pipelines) => pipelines,
            Err(e) => {
                self.restore_heap_sets(device, models);
                let mut created = TeardownList::new();
                bindings.into_teardown(&mut created);
                created.rollback(device);
                return Err(e);
            }
        };

        let mut retired = TeardownList::new();
        std::mem::replace(&mut self.bindings, bindings).into_teardown(&mut retired);
        if let Some(previous) = std::mem::replace(&mut self.pipelines, pipelines) {
            previous.into_teardown(&mut retired);
        }
        self.store_vertex_layout = store_vertex_layout;
        self.descriptors_dirty = false;
        self.commands_dirty = true;
        debug!(
            "Rebound {} models and {} material instances",
            requirements.models, requirements.material_instances
        );
        Ok(retired)
    }

    /// Allocates and writes every set of `bindings`, then builds pipelines
    /// against its layout.
    fn populate(
        &self,
        device: &Device,
        providers: &mut RendererProviders,
        models: &mut [Box<dyn Model>],
        bindings: &mut ResourceBindingModel,
        store_vertex_layout: Option<&VertexLayout>,
    ) -> RendererResult<Option<PassPipelines>> {
        for model in models.iter_mut() {
            let heap_set = bindings.allocate_heap_set(device)?;
            model
                .create_and_write_descriptor_sets(device, heap_set)
                .creating("model descriptor sets")?;
        }
        self.write_frame_generic(device, bindings, providers.materials.as_ref())?;
        self.build_pipelines(
            device,
            providers,
            self.render_pass,
            bindings.pipeline_layout(),
            store_vertex_layout,
        )
    }

    /// Points the models back at the heap sets of the current binding model.
    fn restore_heap_sets(&self, device: &Device, models: &mut [Box<dyn Model>]) {
        for (model, heap_set) in models.iter_mut().zip(self.bindings.heap_sets()) {
            if let Err(e) = model.create_and_write_descriptor_sets(device, *heap_set) {
                error!("Failed to restore the descriptor sets of {}: {e}", model.name());
            }
        }
    }

    /// Brings descriptors, pipelines and command buffers up to date with the
    /// providers. Runs once the previous frame has completed.
    fn refresh(
        &mut self,
        device: &Device,
        providers: &mut RendererProviders,
        models: &mut [Box<dyn Model>],
        capacities: &BindingCapacities,
    ) -> RendererResult<()> {
        let current = self.bindings.requirements();
        let material_instances = providers.materials.material_instances_count();
        if material_instances != current.material_instances {
            let requirements = BindingRequirements {
                material_instances,
                ..current
            };
            requirements.check_capacity(capacities)?;
            info!(
                "Material instances changed from {} to {material_instances}",
                current.material_instances
            );
            let store_vertex_layout = self.store_vertex_layout.clone();
            let mut retired = self.rebind(
                device,
                providers,
                models,
                capacities,
                requirements,
                store_vertex_layout,
            )?;
            retired.release(device)?;
        } else if let Some(pipelines) = self.pipelines {
            let light_count = providers.lights.num_lights() as u32;
            if pipelines.light_count() != light_count {
                debug!(
                    "Light count changed from {} to {light_count}",
                    pipelines.light_count()
                );
                self.rebuild_pipelines(device, providers)?;
            }
        }

        self.refresh_frame_data(device, providers.lights.as_ref(), providers.materials.as_ref())?;
        self.flush_descriptors(device, providers.materials.as_ref())?;
        if self.commands_dirty {
            self.record(device, models)?;
        }
        Ok(())
    }

    /// Re-records every command buffer. They stay marked dirty until a
    /// recording succeeds.
    fn record(&mut self, device: &Device, models: &[Box<dyn Model>]) -> RendererResult<()> {
        self.commands_dirty = true;
        let (Some(pipelines), Some(quad)) = (&self.pipelines, &self.quad) else {
            return Ok(());
        };
        let models = models.iter().map(|model| &**model).collect::<Vec<&dyn Model>>();
        self.sequencer.record_all(
            device,
            &SequenceInputs {
                render_pass: self.render_pass,
                frame_targets: &self.frame_targets,
                clear_values: &self.clear_values,
                pipelines,
                pipeline_layout: self.bindings.pipeline_layout(),
                frame_generic_set: self.bindings.frame_generic_set(),
                models: &models,
                quad,
            },
        )?;
        self.commands_dirty = false;
        Ok(())
    }
}

/// Drives a deferred frame through its lifecycle.
///
/// ```text
/// Uninitialized -> Initialized -> PreRendered(i) -> Rendered(i) -> Initialized ...
///               -> ShuttingDown -> Uninitialized
/// ```
pub struct FrameOrchestrator {
    device: Device,
    swapchain: Box<dyn Swapchain>,
    providers: RendererProviders,
    config: RendererConfiguration,
    capacities: BindingCapacities,
    state: RendererState,
    resources: Option<FrameResources>,
    models: Vec<Box<dyn Model>>,
    frame_index: u64,
    acquired_suboptimal: bool,
}

impl FrameOrchestrator {
    pub fn new(
        device: Device,
        swapchain: Box<dyn Swapchain>,
        providers: RendererProviders,
        config: RendererConfiguration,
    ) -> Self {
        let capacities = BindingCapacities::from(&config);
        Self {
            device,
            swapchain,
            providers,
            config,
            capacities,
            state: RendererState::Uninitialized,
            resources: None,
            models: vec![],
            frame_index: 0,
            acquired_suboptimal: false,
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Number of frames presented so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn registered_models(&self) -> &[Box<dyn Model>] {
        &self.models
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &RendererConfiguration {
        &self.config
    }

    pub fn swapchain(&self) -> &dyn Swapchain {
        self.swapchain.as_ref()
    }

    pub fn render_pass(&self) -> Option<RenderPass> {
        self.resources.as_ref().map(|r| r.render_pass)
    }

    pub fn frame_targets(&self) -> Option<&FrameTargetSet> {
        self.resources.as_ref().map(|r| &r.frame_targets)
    }

    pub fn binding_model(&self) -> Option<&ResourceBindingModel> {
        self.resources.as_ref().map(|r| &r.bindings)
    }

    pub fn pipelines(&self) -> Option<&PassPipelines> {
        self.resources.as_ref().and_then(|r| r.pipelines.as_ref())
    }

    pub fn uniform_buffer(&self) -> Option<&FrameUniformBuffer> {
        self.resources.as_ref().map(|r| &r.uniform_buffer)
    }

    pub fn command_buffer(&self, image_index: usize) -> Option<dgpu::CommandBuffer> {
        self.resources
            .as_ref()
            .and_then(|r| r.sequencer.command_buffer(image_index))
    }

    pub fn init(&mut self, camera: Box<dyn Camera>) -> RendererResult<()> {
        self.expect_state("init", |state| state == RendererState::Uninitialized)?;
        self.config.validate()?;
        let device = &self.device;

        let samplers = Samplers::new(device)?;
        let bindings = ResourceBindingModel::build(
            device,
            &self.capacities,
            self.requirements(0),
        )?;

        let dummy_texture = self
            .providers
            .textures
            .create_texture_from_data(
                device,
                &TextureData {
                    name: "Dummy texture",
                    data: &[u8::MAX; 4],
                    extents: Extents2D {
                        width: 1,
                        height: 1,
                    },
                    format: Format::Rgba8Unorm,
                    usage_flags: ImageUsageFlags::SAMPLED | ImageUsageFlags::TRANSFER_DST,
                    sampler: samplers.anisotropic,
                },
            )
            .creating("dummy texture")?;
        self.providers.materials.set_fallback_texture(dummy_texture);

        let matrices = FrameMatrices::new(camera.projection(), camera.view());
        let FrameTargets {
            attachments,
            render_pass,
            clear_values,
            frame_targets,
        } = FrameTargets::build(
            device,
            self.swapchain.as_ref(),
            camera.viewport(),
            &self.config,
        )?;
        let sync = SyncObjects::new(device)?;
        let sequencer = CommandSequencer::new(device, self.swapchain.num_images())?;

        self.resources = Some(FrameResources {
            camera,
            samplers,
            bindings,
            dummy_texture,
            matrices,
            attachments,
            render_pass,
            clear_values,
            frame_targets,
            sync,
            sequencer,
            uniform_buffer: FrameUniformBuffer::new(),
            pipelines: None,
            quad: None,
            store_vertex_layout: None,
            descriptors_dirty: false,
            commands_dirty: false,
            targets_stale: false,
        });
        self.state = RendererState::Initialized;
        info!(
            "Initialized deferred renderer with {} swapchain images",
            self.swapchain.num_images()
        );
        Ok(())
    }

    /// Registers a model and rebuilds every object that depends on the
    /// model count. Fails without side effects if a capacity would be
    /// exceeded, and leaves the current objects in place if a rebuild step
    /// fails.
    pub fn register_model(
        &mut self,
        model: Box<dyn Model>,
        vertex_layout: VertexLayout,
    ) -> RendererResult<ModelId> {
        self.expect_state("register a model", |state| {
            state == RendererState::Initialized
        })?;
        let requirements = self.requirements(self.models.len() as u32 + 1);
        requirements.check_capacity(&self.capacities)?;

        let Self {
            device,
            providers,
            resources: Some(resources),
            models,
            capacities,
            ..
        } = self
        else {
            unreachable!("initialized renderers hold their frame resources");
        };
        device.wait_idle()?;
        if resources.quad.is_none() {
            resources.quad = Some(FullscreenQuad::new(device)?);
        }

        info!("Registering model {}", model.name());
        models.push(model);
        let rebound = resources.rebind(
            device,
            providers,
            models,
            capacities,
            requirements,
            Some(vertex_layout),
        );
        let mut retired = match rebound {
            Ok(retired) => retired,
            Err(e) => {
                models.pop();
                return Err(e);
            }
        };
        retired.release(device)?;
        resources.record(device, models)?;
        Ok(ModelId(models.len() as u32 - 1))
    }

    /// Waits for the previous frame, brings the frame data, descriptors,
    /// pipelines and command buffers up to date, then acquires the next
    /// swapchain image.
    pub fn pre_render(&mut self) -> RendererResult<()> {
        self.expect_state("pre-render", |state| state == RendererState::Initialized)?;
        if self.models.is_empty() {
            return Err(RendererError::InvalidState {
                operation: "pre-render",
                state: "holding no registered models".into(),
            });
        }
        let Self {
            device,
            swapchain,
            providers,
            resources: Some(resources),
            models,
            capacities,
            config,
            ..
        } = self
        else {
            unreachable!("initialized renderers hold their frame resources");
        };
        if resources.targets_stale {
            return Err(PresentationError::OutOfDate.into());
        }

        device.wait_for_fence(resources.sync.in_flight, config.fence_timeout_ns)?;
        resources.refresh(device, providers, models, capacities)?;

        let acquired = swapchain
            .acquire_next_image(resources.sync.image_available, config.fence_timeout_ns)
            .map_err(RendererError::from_swapchain)?;
        if acquired.suboptimal {
            debug!("Acquired image {} from a suboptimal swapchain", acquired.index);
        }
        self.acquired_suboptimal = acquired.suboptimal;
        self.state = RendererState::PreRendered(acquired.index);
        Ok(())
    }

    /// Submits the pre-recorded command buffer of the acquired image.
    pub fn render(&mut self) -> RendererResult<()> {
        let RendererState::PreRendered(image_index) = self.state else {
            return Err(self.invalid_state("render"));
        };
        let Some(resources) = &self.resources else {
            return Err(self.invalid_state("render"));
        };
        let Some(command_buffer) = resources.sequencer.command_buffer(image_index as usize) else {
            return Err(self.invalid_state("render"));
        };

        self.device.reset_fence(resources.sync.in_flight)?;
        self.device.submit(&SubmitInfo {
            command_buffers: &[command_buffer],
            wait_semaphores: &[SemaphoreWait {
                semaphore: resources.sync.image_available,
                stage: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            }],
            signal_semaphores: &[resources.sync.rendering_finished],
            fence: Some(resources.sync.in_flight),
        })?;
        self.state = RendererState::Rendered(image_index);
        Ok(())
    }

    /// Presents the rendered image. A suboptimal or out-of-date swapchain
    /// still completes the frame, then reports the recoverable error.
    pub fn post_render(&mut self) -> RendererResult<()> {
        let RendererState::Rendered(image_index) = self.state else {
            return Err(self.invalid_state("post-render"));
        };
        let Some(resources) = &self.resources else {
            return Err(self.invalid_state("post-render"));
        };
        let presented = self
            .swapchain
            .present(image_index, resources.sync.rendering_finished);

        self.state = RendererState::Initialized;
        self.frame_index += 1;

        match presented {
            Ok(()) if self.acquired_suboptimal => {
                Err(RendererError::from_swapchain(dgpu::GpuError::SwapchainSuboptimal))
            }
            Ok(()) => Ok(()),
            Err(e) => {
                let error = RendererError::from_swapchain(e);
                if error.is_recoverable() {
                    debug!("Presentation of image {image_index} reported: {error}");
                }
                Err(error)
            }
        }
    }

    pub fn reload_all_shaders(&mut self) -> RendererResult<()> {
        self.expect_state("reload shaders", |state| state == RendererState::Initialized)?;
        let Self {
            device,
            providers,
            resources: Some(resources),
            models,
            ..
        } = self
        else {
            unreachable!("initialized renderers hold their frame resources");
        };
        device.wait_idle()?;
        providers
            .materials
            .reload_all_shaders(device)
            .creating("shader modules")?;
        resources.rebuild_pipelines(device, providers)?;
        resources.record(device, models)?;
        info!("Reloaded all shaders");
        Ok(())
    }

    /// Recreates the swapchain and every object sized after it. The frame
    /// targets follow the camera viewport, which must fit in `extents`.
    ///
    /// The new frame targets and pipelines are built before the current ones
    /// are released. Until a recreation succeeds, `pre_render` reports an
    /// out-of-date swapchain.
    pub fn recreate_swapchain(&mut self, extents: Extents2D) -> RendererResult<()> {
        self.expect_state("recreate the swapchain", |state| {
            state == RendererState::Initialized
        })?;
        let Self {
            device,
            swapchain,
            providers,
            resources: Some(resources),
            models,
            config,
            ..
        } = self
        else {
            unreachable!("initialized renderers hold their frame resources");
        };
        device.wait_idle()?;
        resources.targets_stale = true;
        swapchain.recreate(extents).creating("swapchain")?;

        let targets = FrameTargets::build(
            device,
            swapchain.as_ref(),
            resources.camera.viewport(),
            config,
        )?;
        let pipelines = match resources.build_pipelines(
            device,
            providers,
            targets.render_pass,
            resources.bindings.pipeline_layout(),
            resources.store_vertex_layout.as_ref(),
        ) {
            Ok(pipelines) => pipelines,
            Err(e) => {
                let mut created = TeardownList::new();
                targets.into_teardown(&mut created);
                created.rollback(device);
                return Err(e);
            }
        };
        if let Err(e) = resources.sequencer.resize(device, swapchain.num_images()) {
            let mut created = TeardownList::new();
            if let Some(pipelines) = pipelines {
                pipelines.into_teardown(&mut created);
            }
            targets.into_teardown(&mut created);
            created.rollback(device);
            return Err(e);
        }

        let mut retired = TeardownList::new();
        if let Some(previous) = std::mem::replace(&mut resources.pipelines, pipelines) {
            previous.into_teardown(&mut retired);
        }
        FrameTargets {
            attachments: std::mem::replace(&mut resources.attachments, targets.attachments),
            render_pass: std::mem::replace(&mut resources.render_pass, targets.render_pass),
            clear_values: std::mem::replace(&mut resources.clear_values, targets.clear_values),
            frame_targets: std::mem::replace(&mut resources.frame_targets, targets.frame_targets),
        }
        .into_teardown(&mut retired);
        resources.targets_stale = false;
        resources.descriptors_dirty = true;
        resources.commands_dirty = true;
        self.acquired_suboptimal = false;

        retired.release(device)?;
        resources.flush_descriptors(device, providers.materials.as_ref())?;
        resources.record(device, models)?;
        info!(
            "Recreated swapchain with {} images of {}x{}",
            swapchain.num_images(),
            extents.width,
            extents.height
        );
        Ok(())
    }

    /// Waits for the device, then releases every renderer object in a fixed
    /// order.
    pub fn shutdown(&mut self) -> RendererResult<()> {
        self.expect_state("shut down", |state| {
            !matches!(
                state,
                RendererState::Uninitialized | RendererState::ShuttingDown
            )
        })?;
        self.device.wait_idle()?;
        self.state = RendererState::ShuttingDown;
        let Some(mut resources) = self.resources.take() else {
            unreachable!("initialized renderers hold their frame resources");
        };

        let mut list = TeardownList::new();
        resources.sequencer.into_teardown(&mut list);
        list.extend(
            ReleaseStage::CommandBuffersAndSync,
            [
                GpuObject::Semaphore(resources.sync.image_available),
                GpuObject::Semaphore(resources.sync.rendering_finished),
                GpuObject::Fence(resources.sync.in_flight),
            ],
        );
        if let Some(pipelines) = resources.pipelines {
            pipelines.into_teardown(&mut list);
        }
        list.push(
            ReleaseStage::RenderPass,
            GpuObject::RenderPass(resources.render_pass),
        );
        list.extend(
            ReleaseStage::Framebuffers,
            resources
                .frame_targets
                .into_framebuffers()
                .into_iter()
                .map(GpuObject::Framebuffer),
        );
        resources.bindings.into_teardown(&mut list);
        list.extend(
            ReleaseStage::Samplers,
            [
                GpuObject::Sampler(resources.samplers.anisotropic),
                GpuObject::Sampler(resources.samplers.nearest),
            ],
        );
        if let Some(buffer) = resources.uniform_buffer.take_buffer() {
            list.push(ReleaseStage::Buffers, GpuObject::Buffer(buffer));
        }
        if let Some(quad) = resources.quad {
            quad.into_teardown(&mut list);
        }
        resources.attachments.into_teardown(&mut list);

        list.release_through(&self.device, ReleaseStage::Attachments)?;
        self.providers
            .textures
            .destroy_texture(&self.device, resources.dummy_texture)
            .creating("dummy texture")?;
        list.release(&self.device)?;
        self.providers
            .materials
            .destroy(&self.device)
            .creating("material resources")?;

        self.models.clear();
        self.state = RendererState::Uninitialized;
        info!("Deferred renderer shut down");
        Ok(())
    }

    fn requirements(&self, models: u32) -> BindingRequirements {
        BindingRequirements {
            material_instances: self.providers.materials.material_instances_count(),
            models,
            vertex_channels: self.config.vertex_channels,
        }
    }

    fn invalid_state(&self, operation: &'static str) -> RendererError {
        RendererError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: impl Fn(RendererState) -> bool,
    ) -> RendererResult<()> {
        let holds_resources = self.resources.is_some();
        if allowed(self.state) && holds_resources == (self.state != RendererState::Uninitialized) {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }
}
