mod common;

use common::{initialized, register, Harness, TestModel};
use deferred::binding_model::{DescriptorSetKind, FrameGenericBinding, MaterialTextureType};
use deferred::pipelines::PassKind;
use deferred::{PresentationError, RendererConfiguration, RendererError, RendererState};
use dgpu::dummy::RecordedCommand;
use dgpu::{Extents2D, GpuError, Handle, HandleType, SpecializationConstant};

fn run_frame(harness: &mut Harness) -> Result<(), RendererError> {
    harness.renderer.pre_render()?;
    harness.renderer.render()?;
    harness.renderer.post_render()
}

fn three_material_config() -> RendererConfiguration {
    RendererConfiguration {
        max_material_instances: 3,
        ..Default::default()
    }
}

fn recorded(harness: &Harness, image_index: usize) -> Vec<RecordedCommand> {
    let command_buffer = harness.renderer.command_buffer(image_index).unwrap();
    harness.hal.recorded_commands(command_buffer)
}

#[test]
fn registration_accepts_material_instances_up_to_capacity() {
    let mut harness = initialized(2, three_material_config());
    harness.add_material("Wall");
    harness.add_material("Ceiling");
    register(&mut harness, "Sponza");

    let bindings = harness.renderer.binding_model().unwrap();
    assert_eq!(bindings.requirements().material_instances, 3);
    let diffuse = harness
        .hal
        .descriptor_writes(bindings.frame_generic_set())
        .into_iter()
        .find(|write| write.binding == MaterialTextureType::Diffuse.binding())
        .unwrap();
    assert_eq!(diffuse.images.len(), 3);
    run_frame(&mut harness).unwrap();
}

#[test]
fn registration_past_material_capacity_leaves_the_scene_alone() {
    let mut harness = initialized(2, three_material_config());
    harness.add_material("Wall");
    harness.add_material("Ceiling");
    register(&mut harness, "Sponza");
    let layout = harness
        .renderer
        .binding_model()
        .unwrap()
        .set_layout(DescriptorSetKind::FrameGeneric);
    let commands = recorded(&harness, 0);

    harness.add_material("Extra");
    let second = TestModel::new(&harness.device, "Second");
    let capacity_error = RendererError::CapacityExceeded {
        resource: "material instances",
        requested: 4,
        capacity: 3,
    };
    assert_eq!(
        harness
            .renderer
            .register_model(Box::new(second), common::model_layout())
            .unwrap_err(),
        capacity_error
    );
    assert_eq!(harness.renderer.registered_models().len(), 1);
    let bindings = harness.renderer.binding_model().unwrap();
    assert_eq!(bindings.set_layout(DescriptorSetKind::FrameGeneric), layout);
    assert_eq!(bindings.requirements().material_instances, 3);
    assert!(harness
        .hal
        .is_live(HandleType::DescriptorSetLayout, layout.id()));
    assert_eq!(recorded(&harness, 0), commands);

    // Frames refuse to run against bindings sized for fewer instances.
    assert_eq!(harness.renderer.pre_render().unwrap_err(), capacity_error);
    assert_eq!(harness.renderer.state(), RendererState::Initialized);
    assert_eq!(harness.renderer.frame_index(), 0);
}

#[test]
fn material_and_light_changes_are_bound_before_the_next_frame() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");
    run_frame(&mut harness).unwrap();
    let old_set = harness.renderer.binding_model().unwrap().frame_generic_set();
    let old_buffer = harness.renderer.uniform_buffer().unwrap().buffer();

    // One light out, one material in: the uniform buffer keeps its size
    // but the materials region moves.
    harness.lights.0.borrow_mut().pop();
    harness.add_material("Wall");
    run_frame(&mut harness).unwrap();

    let uniform_buffer = harness.renderer.uniform_buffer().unwrap();
    assert_eq!(uniform_buffer.buffer(), old_buffer);
    assert_eq!(uniform_buffer.layout().light_count, 1);
    assert_eq!(uniform_buffer.layout().material_count, 2);

    let bindings = harness.renderer.binding_model().unwrap();
    assert_eq!(bindings.requirements().material_instances, 2);
    let set = bindings.frame_generic_set();
    assert_ne!(set, old_set);
    let writes = harness.hal.descriptor_writes(set);
    let region = |binding| {
        let write = writes.iter().find(|write| write.binding == binding).unwrap();
        (write.buffers[0].offset, write.buffers[0].range)
    };
    assert_eq!(region(FrameGenericBinding::LIGHTS), (256, 64));
    assert_eq!(region(FrameGenericBinding::MATERIALS), (320, 128));

    let pipelines = harness.renderer.pipelines().unwrap();
    assert_eq!(pipelines.material_count(), 2);
    assert_eq!(pipelines.light_count(), 1);
    assert!(recorded(&harness, 1).contains(&RecordedCommand::BindDescriptorSets {
        layout: bindings.pipeline_layout(),
        first_set: DescriptorSetKind::FrameGeneric.set_index(),
        sets: vec![set],
    }));
}

#[test]
fn light_count_changes_respecialize_the_pipelines() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");
    let old_shade = harness.renderer.pipelines().unwrap().pipeline(PassKind::Shade);
    assert_eq!(harness.renderer.pipelines().unwrap().light_count(), 2);

    harness.add_light();
    run_frame(&mut harness).unwrap();

    let pipelines = *harness.renderer.pipelines().unwrap();
    let shade = pipelines.pipeline(PassKind::Shade);
    assert_eq!(pipelines.light_count(), 3);
    assert!(!harness
        .hal
        .is_live(HandleType::GraphicsPipeline, old_shade.id()));
    assert_eq!(harness.hal.live_count(HandleType::GraphicsPipeline), 3);
    let specialization = harness.hal.pipeline_info(shade).unwrap().specialization;
    assert!(specialization.contains(&SpecializationConstant { id: 1, value: 3 }));
    for image_index in 0..2 {
        assert!(recorded(&harness, image_index)
            .contains(&RecordedCommand::BindGraphicsPipeline(shade)));
    }
}

#[test]
fn failed_descriptor_write_is_retried_before_the_next_frame() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");
    run_frame(&mut harness).unwrap();

    // The new light grows the uniform buffer, then the rewrite fails.
    harness.add_light();
    harness
        .hal
        .fail_next_descriptor_update(GpuError::Allocation("descriptor update".into()));
    assert!(harness.renderer.pre_render().is_err());
    assert_eq!(harness.renderer.state(), RendererState::Initialized);

    run_frame(&mut harness).unwrap();
    let buffer = harness.renderer.uniform_buffer().unwrap().buffer().unwrap();
    let set = harness.renderer.binding_model().unwrap().frame_generic_set();
    let writes = harness.hal.descriptor_writes(set);
    for binding in [
        FrameGenericBinding::MATRICES,
        FrameGenericBinding::LIGHTS,
        FrameGenericBinding::MATERIALS,
    ] {
        let write = writes.iter().find(|write| write.binding == binding).unwrap();
        assert_eq!(write.buffers[0].buffer, buffer);
    }
    assert!(harness.hal.is_live(HandleType::Buffer, buffer.id()));
}

#[test]
fn suboptimal_acquire_completes_the_frame_then_reports() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");

    harness.hal.report_next_acquire_suboptimal();
    harness.renderer.pre_render().unwrap();
    assert_eq!(harness.renderer.state(), RendererState::PreRendered(0));
    harness.renderer.render().unwrap();
    let error = harness.renderer.post_render().unwrap_err();
    assert_eq!(
        error,
        RendererError::Presentation(PresentationError::Suboptimal)
    );
    assert!(error.is_recoverable());
    assert_eq!(harness.renderer.frame_index(), 1);
    assert_eq!(harness.renderer.state(), RendererState::Initialized);

    run_frame(&mut harness).unwrap();
    assert_eq!(harness.renderer.frame_index(), 2);
}

#[test]
fn failed_registration_keeps_the_current_objects() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");
    let bindings = harness.renderer.binding_model().unwrap();
    let (layout, pool_sets) = (bindings.pipeline_layout(), bindings.heap_sets().to_vec());
    let pipelines = *harness.renderer.pipelines().unwrap();
    let commands = recorded(&harness, 0);

    harness.hal.fail_creation_after(
        HandleType::GraphicsPipeline,
        1,
        GpuError::Allocation("pipeline".into()),
    );
    let second = TestModel::new(&harness.device, "Second");
    assert!(matches!(
        harness
            .renderer
            .register_model(Box::new(second), common::model_layout()),
        Err(RendererError::Construction { .. })
    ));

    assert_eq!(harness.renderer.registered_models().len(), 1);
    let bindings = harness.renderer.binding_model().unwrap();
    assert_eq!(bindings.pipeline_layout(), layout);
    assert_eq!(bindings.heap_sets(), pool_sets.as_slice());
    assert_eq!(*harness.renderer.pipelines().unwrap(), pipelines);
    assert_eq!(harness.hal.live_count(HandleType::PipelineLayout), 1);
    assert_eq!(harness.hal.live_count(HandleType::DescriptorPool), 1);
    assert_eq!(harness.hal.live_count(HandleType::GraphicsPipeline), 3);
    assert_eq!(recorded(&harness, 0), commands);

    run_frame(&mut harness).unwrap();
    register(&mut harness, "Second");
    run_frame(&mut harness).unwrap();
    harness.renderer.shutdown().unwrap();
    assert_eq!(harness.hal.live_count(HandleType::GraphicsPipeline), 0);
}

#[test]
fn failed_swapchain_recreation_is_reported_until_retried() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");
    run_frame(&mut harness).unwrap();
    let images = harness.hal.live_count(HandleType::Image);
    let old_framebuffers = harness.renderer.frame_targets().unwrap().framebuffers().to_vec();
    let extents = Extents2D {
        width: 640,
        height: 480,
    };

    harness.hal.fail_creation_after(
        HandleType::Framebuffer,
        1,
        GpuError::Allocation("framebuffer".into()),
    );
    assert!(matches!(
        harness.renderer.recreate_swapchain(extents),
        Err(RendererError::Construction {
            object: "framebuffer",
            ..
        })
    ));
    assert_eq!(
        harness.renderer.frame_targets().unwrap().framebuffers(),
        old_framebuffers.as_slice()
    );
    assert_eq!(harness.hal.live_count(HandleType::Framebuffer), 2);
    assert_eq!(harness.hal.live_count(HandleType::RenderPass), 1);
    assert_eq!(harness.hal.live_count(HandleType::Image), images);

    let error = harness.renderer.pre_render().unwrap_err();
    assert_eq!(
        error,
        RendererError::Presentation(PresentationError::OutOfDate)
    );
    assert!(error.is_recoverable());

    harness.renderer.recreate_swapchain(extents).unwrap();
    for framebuffer in old_framebuffers {
        assert!(!harness
            .hal
            .is_live(HandleType::Framebuffer, framebuffer.id()));
    }
    assert_eq!(harness.hal.live_count(HandleType::Framebuffer), 2);
    assert_eq!(harness.hal.live_count(HandleType::Image), images);
    run_frame(&mut harness).unwrap();
}
