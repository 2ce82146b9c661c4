mod common;

use common::{initialized, register, TestModel, VIEWPORT};
use deferred::binding_model::DescriptorSetKind;
use deferred::{PresentationError, RendererConfiguration, RendererError, RendererState};
use dgpu::dummy::{HalEvent, RecordedCommand};
use dgpu::{Extents2D, GpuError, Handle, HandleType};

fn run_frame(harness: &mut common::Harness) -> Result<(), RendererError> {
    harness.renderer.pre_render()?;
    harness.renderer.render()?;
    harness.renderer.post_render()
}

#[test]
fn init_creates_one_framebuffer_per_swapchain_image() {
    let harness = initialized(2, RendererConfiguration::default());
    let targets = harness.renderer.frame_targets().unwrap();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets.extents(), VIEWPORT);

    let swapchain_views = harness
        .renderer
        .swapchain()
        .images()
        .iter()
        .map(|image| image.view)
        .collect::<Vec<_>>();
    for (i, framebuffer) in targets.framebuffers().iter().enumerate() {
        let attachments = harness.hal.framebuffer_attachments(*framebuffer).unwrap();
        assert_eq!(attachments.len(), 6);
        assert_eq!(attachments[0], swapchain_views[i]);
    }
    assert_eq!(harness.renderer.state(), RendererState::Initialized);
    assert_eq!(harness.renderer.frame_index(), 0);
}

#[test]
fn frames_need_a_registered_model() {
    let mut harness = initialized(2, RendererConfiguration::default());
    assert!(matches!(
        harness.renderer.pre_render(),
        Err(RendererError::InvalidState { .. })
    ));
    assert!(matches!(
        harness.renderer.render(),
        Err(RendererError::InvalidState { .. })
    ));
}

#[test]
fn registration_records_three_subpasses_per_image() {
    let mut harness = initialized(2, RendererConfiguration::default());
    let id = register(&mut harness, "Sponza");
    assert_eq!(id.0, 0);

    for image_index in 0..2 {
        let command_buffer = harness.renderer.command_buffer(image_index).unwrap();
        let commands = harness.hal.recorded_commands(command_buffer);
        assert!(matches!(commands.first(), Some(RecordedCommand::Begin { .. })));
        assert_eq!(commands.last(), Some(&RecordedCommand::End));

        let subpass_switches = commands
            .iter()
            .filter(|command| **command == RecordedCommand::NextSubpass)
            .count();
        assert_eq!(subpass_switches, 2);

        let quad_draws = commands
            .iter()
            .filter(|command| {
                matches!(
                    command,
                    RecordedCommand::DrawIndexed {
                        index_count: 6,
                        instance_count: 1,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(quad_draws, 2);

        let indirect_draws = commands
            .iter()
            .filter(|command| matches!(command, RecordedCommand::DrawIndexedIndirect { .. }))
            .count();
        assert_eq!(indirect_draws, 1);

        let bindings = harness.renderer.binding_model().unwrap();
        assert!(commands.contains(&RecordedCommand::BindDescriptorSets {
            layout: bindings.pipeline_layout(),
            first_set: DescriptorSetKind::FrameGeneric.set_index(),
            sets: vec![bindings.frame_generic_set()],
        }));
    }
}

#[test]
fn frames_acquire_submit_and_present_in_order() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");
    harness.hal.clear_events();

    for _ in 0..3 {
        run_frame(&mut harness).unwrap();
    }
    assert_eq!(harness.renderer.frame_index(), 3);
    assert_eq!(harness.renderer.state(), RendererState::Initialized);

    let presented = harness
        .hal
        .events()
        .into_iter()
        .filter_map(|event| match event {
            HalEvent::Presented { image_index, .. } => Some(image_index),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(presented, vec![0, 1, 0]);

    let submissions = harness
        .hal
        .events()
        .into_iter()
        .filter(|event| matches!(event, HalEvent::Submitted { .. }))
        .count();
    assert_eq!(submissions, 3);
}

#[test]
fn out_of_date_acquire_is_recoverable_and_leaves_counters_alone() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");
    run_frame(&mut harness).unwrap();

    harness.hal.fail_next_acquire(GpuError::SwapchainOutOfDate);
    let error = harness.renderer.pre_render().unwrap_err();
    assert!(error.is_recoverable());
    assert_eq!(
        error,
        RendererError::Presentation(PresentationError::OutOfDate)
    );
    assert_eq!(harness.renderer.state(), RendererState::Initialized);
    assert_eq!(harness.renderer.frame_index(), 1);

    harness
        .renderer
        .recreate_swapchain(Extents2D {
            width: 640,
            height: 480,
        })
        .unwrap();
    run_frame(&mut harness).unwrap();
    assert_eq!(harness.renderer.frame_index(), 2);
}

#[test]
fn suboptimal_present_still_completes_the_frame() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");

    harness.hal.fail_next_present(GpuError::SwapchainSuboptimal);
    let error = run_frame(&mut harness).unwrap_err();
    assert_eq!(
        error,
        RendererError::Presentation(PresentationError::Suboptimal)
    );
    assert_eq!(harness.renderer.frame_index(), 1);
    assert_eq!(harness.renderer.state(), RendererState::Initialized);
}

#[test]
fn registration_past_capacity_fails_without_side_effects() {
    let mut harness = initialized(2, RendererConfiguration::default());
    for name in ["A", "B", "C"] {
        register(&mut harness, name);
    }
    let command_buffer = harness.renderer.command_buffer(0).unwrap();
    let recorded = harness.hal.recorded_commands(command_buffer);
    harness.hal.clear_events();

    let extra = TestModel::new(&harness.device, "D");
    let error = harness
        .renderer
        .register_model(Box::new(extra), common::model_layout())
        .unwrap_err();
    assert!(matches!(
        error,
        RendererError::CapacityExceeded {
            resource: "registered models",
            requested: 4,
            capacity: 3,
        }
    ));
    assert_eq!(harness.renderer.registered_models().len(), 3);
    assert_eq!(harness.hal.recorded_commands(command_buffer), recorded);
    // The buffers of the rejected model are the only new objects.
    assert!(harness
        .hal
        .events()
        .iter()
        .all(|event| matches!(event, HalEvent::Created { ty: HandleType::Buffer, .. })));
}

#[test]
fn model_order_survives_re_recording() {
    let mut harness = initialized(2, RendererConfiguration::default());
    let first = TestModel::new(&harness.device, "First");
    let second = TestModel::new(&harness.device, "Second");
    let (first_vertices, second_vertices) = (first.vertex_buffer, second.vertex_buffer);
    harness
        .renderer
        .register_model(Box::new(first), common::model_layout())
        .unwrap();
    harness
        .renderer
        .register_model(Box::new(second), common::model_layout())
        .unwrap();
    harness.renderer.reload_all_shaders().unwrap();

    let names = harness
        .renderer
        .registered_models()
        .iter()
        .map(|model| model.name().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, ["First", "Second"]);

    let command_buffer = harness.renderer.command_buffer(1).unwrap();
    let bound = harness
        .hal
        .recorded_commands(command_buffer)
        .into_iter()
        .filter_map(|command| match command {
            RecordedCommand::BindVertexBuffers { buffers, .. } => Some(buffers[0]),
            _ => None,
        })
        .collect::<Vec<_>>();
    // Both models, then the quad for the shading pass.
    assert_eq!(bound[..2], [first_vertices, second_vertices]);
    assert_eq!(bound.len(), 3);
}

#[test]
fn shutdown_releases_objects_in_dependency_order() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");
    run_frame(&mut harness).unwrap();
    harness.hal.clear_events();

    harness.renderer.shutdown().unwrap();
    assert_eq!(harness.renderer.state(), RendererState::Uninitialized);
    assert!(harness.renderer.registered_models().is_empty());

    let events = harness.hal.events();
    assert_eq!(events.first(), Some(&HalEvent::WaitIdle));
    let rank = |ty: HandleType| match ty {
        HandleType::CommandBuffer | HandleType::Semaphore | HandleType::Fence => 0,
        HandleType::GraphicsPipeline => 1,
        HandleType::RenderPass => 2,
        HandleType::Framebuffer => 3,
        HandleType::DescriptorPool | HandleType::DescriptorSet => 4,
        HandleType::Sampler => 5,
        HandleType::PipelineLayout => 6,
        HandleType::DescriptorSetLayout => 7,
        HandleType::Buffer => 8,
        HandleType::Image | HandleType::ImageView => 9,
        HandleType::ShaderModule => 10,
    };
    let ranks = events
        .iter()
        .filter_map(|event| match event {
            HalEvent::Destroyed { ty, .. } => Some(rank(*ty)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert!(ranks.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(ranks.first(), Some(&0));
    assert_eq!(ranks.last(), Some(&10));

    for ty in [
        HandleType::CommandBuffer,
        HandleType::Semaphore,
        HandleType::Fence,
        HandleType::GraphicsPipeline,
        HandleType::RenderPass,
        HandleType::Framebuffer,
        HandleType::DescriptorPool,
        HandleType::PipelineLayout,
        HandleType::DescriptorSetLayout,
        HandleType::ShaderModule,
    ] {
        assert_eq!(harness.hal.live_count(ty), 0, "{ty:?} left alive");
    }
    assert!(harness.renderer.shutdown().is_err());
}

#[test]
fn swapchain_recreation_rebuilds_frame_targets() {
    let mut harness = initialized(2, RendererConfiguration::default());
    register(&mut harness, "Sponza");
    let old_framebuffer = harness.renderer.frame_targets().unwrap().framebuffers()[0];

    harness
        .renderer
        .recreate_swapchain(Extents2D {
            width: 640,
            height: 480,
        })
        .unwrap();
    assert!(!harness
        .hal
        .is_live(HandleType::Framebuffer, old_framebuffer.id()));
    let targets = harness.renderer.frame_targets().unwrap();
    assert_eq!(targets.len(), 2);
    // Frame targets follow the camera viewport.
    assert_eq!(targets.extents(), VIEWPORT);
    assert_eq!(harness.hal.live_count(HandleType::Framebuffer), 2);
    run_frame(&mut harness).unwrap();
}
