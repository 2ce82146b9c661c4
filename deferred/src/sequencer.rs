use dgpu::{
    ClearValue, CommandBuffer, CommandBufferUsage, DescriptorSet, Device, PipelineLayout, Rect2D,
    RenderPass, RenderPassBeginInfo,
};
use log::debug;

use crate::binding_model::DescriptorSetKind;
use crate::error::{ConstructionContext, RendererError, RendererResult};
use crate::frame_targets::FrameTargetSet;
use crate::fullscreen_quad::FullscreenQuad;
use crate::pipelines::{PassKind, PassPipelines};
use crate::providers::Model;
use crate::teardown::{GpuObject, ReleaseStage, TeardownList};

/// Everything a frame's command buffer refers to.
#[derive(Clone, Copy)]
pub struct SequenceInputs<'a> {
    pub render_pass: RenderPass,
    pub frame_targets: &'a FrameTargetSet,
    /// One value per render pass attachment, in declaration order.
    pub clear_values: &'a [ClearValue],
    pub pipelines: &'a PassPipelines,
    pub pipeline_layout: PipelineLayout,
    pub frame_generic_set: DescriptorSet,
    /// Registered models, in registration order.
    pub models: &'a [&'a dyn Model],
    pub quad: &'a FullscreenQuad,
}

/// Pre-recorded command buffers, one per swapchain image.
#[derive(Debug, Default)]
pub struct CommandSequencer {
    command_buffers: Vec<CommandBuffer>,
}

impl CommandSequencer {
    pub fn new(device: &Device, image_count: usize) -> RendererResult<Self> {
        let command_buffers = device
            .allocate_command_buffers(image_count)
            .creating("command buffers")?;
        Ok(Self { command_buffers })
    }

    pub fn len(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.command_buffers.is_empty()
    }

    pub fn command_buffer(&self, image_index: usize) -> Option<CommandBuffer> {
        self.command_buffers.get(image_index).copied()
    }

    /// Reallocates the command buffers if the swapchain image count changed.
    /// The current buffers are kept if the allocation fails.
    pub fn resize(&mut self, device: &Device, image_count: usize) -> RendererResult<()> {
        if image_count == self.command_buffers.len() {
            return Ok(());
        }
        let command_buffers = device
            .allocate_command_buffers(image_count)
            .creating("command buffers")?;
        let previous = std::mem::replace(&mut self.command_buffers, command_buffers);
        device.free_command_buffers(&previous)?;
        debug!("Reallocated {image_count} command buffers");
        Ok(())
    }

    /// Records the whole frame into every command buffer. None of them may be
    /// pending execution.
    pub fn record_all(&self, device: &Device, inputs: &SequenceInputs) -> RendererResult<()> {
        if inputs.frame_targets.len() != self.command_buffers.len() {
            return Err(RendererError::InvalidState {
                operation: "record command buffers",
                state: format!(
                    "holding {} framebuffers for {} command buffers",
                    inputs.frame_targets.len(),
                    self.command_buffers.len()
                ),
            });
        }
        for (image_index, command_buffer) in self.command_buffers.iter().enumerate() {
            let Some(framebuffer) = inputs.frame_targets.framebuffer(image_index) else {
                unreachable!("framebuffer count checked above");
            };
            let mut recorder =
                device.begin_recording(*command_buffer, CommandBufferUsage::SIMULTANEOUS_USE)?;
            recorder.begin_render_pass(&RenderPassBeginInfo {
                render_pass: inputs.render_pass,
                framebuffer,
                render_area: Rect2D::from_extents(inputs.frame_targets.extents()),
                clear_values: inputs.clear_values,
            })?;

            recorder.bind_graphics_pipeline(inputs.pipelines.pipeline(PassKind::Store))?;
            recorder.bind_descriptor_sets(
                inputs.pipeline_layout,
                DescriptorSetKind::FrameGeneric.set_index(),
                &[inputs.frame_generic_set],
            )?;
            for model in inputs.models {
                model.bind_vertex_buffer(&mut recorder)?;
                model.bind_index_buffer(&mut recorder)?;
                model.render_meshes_by_material(
                    &mut recorder,
                    inputs.pipeline_layout,
                    DescriptorSetKind::Heap.set_index(),
                )?;
            }

            recorder.next_subpass()?;
            recorder.bind_graphics_pipeline(inputs.pipelines.pipeline(PassKind::Shade))?;
            inputs.quad.record_draw(&mut recorder)?;

            recorder.next_subpass()?;
            recorder.bind_graphics_pipeline(inputs.pipelines.pipeline(PassKind::Tonemap))?;
            inputs.quad.draw(&mut recorder)?;

            recorder.end_render_pass()?;
            recorder.finish()?;
        }
        debug!(
            "Recorded {} command buffers for {} models",
            self.command_buffers.len(),
            inputs.models.len()
        );
        Ok(())
    }

    pub fn destroy(self, device: &Device) -> RendererResult<()> {
        device.free_command_buffers(&self.command_buffers)?;
        Ok(())
    }

    pub(crate) fn into_teardown(self, list: &mut TeardownList) {
        list.extend(
            ReleaseStage::CommandBuffersAndSync,
            self.command_buffers
                .into_iter()
                .map(GpuObject::CommandBuffer),
        );
    }
}
