use crate::{
    Buffer, CommandBuffer, CommandBufferUsage, DescriptorSet, Device, GpuError, GpuResult,
    GraphicsPipeline, IndexType, PipelineLayout, RenderPassBeginInfo, ShaderStageFlags,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecorderState {
    Recording,
    InRenderPass { subpass: u32 },
}

/// Records commands into a single command buffer.
///
/// Created by [`Device::begin_recording`], closed by [`CommandRecorder::finish`].
pub struct CommandRecorder<'a> {
    device: &'a Device,
    command_buffer: CommandBuffer,
    state: RecorderState,
}

impl Device {
    /// Starts recording `command_buffer` from scratch.
    ///
    /// The caller must make sure the command buffer is not pending execution.
    pub fn begin_recording(
        &self,
        command_buffer: CommandBuffer,
        usage: CommandBufferUsage,
    ) -> GpuResult<CommandRecorder<'_>> {
        unsafe { self.hal.begin_command_buffer(command_buffer, usage)? };
        Ok(CommandRecorder {
            device: self,
            command_buffer,
            state: RecorderState::Recording,
        })
    }
}

impl<'a> CommandRecorder<'a> {
    pub fn command_buffer(&self) -> CommandBuffer {
        self.command_buffer
    }

    /// The subpass being recorded, if inside a render pass.
    pub fn current_subpass(&self) -> Option<u32> {
        match self.state {
            RecorderState::Recording => None,
            RecorderState::InRenderPass { subpass } => Some(subpass),
        }
    }

    pub fn begin_render_pass(&mut self, info: &RenderPassBeginInfo) -> GpuResult<()> {
        self.expect_state(false, "begin_render_pass")?;
        unsafe {
            self.device
                .hal
                .cmd_begin_render_pass(self.command_buffer, info)?
        };
        self.state = RecorderState::InRenderPass { subpass: 0 };
        Ok(())
    }

    pub fn next_subpass(&mut self) -> GpuResult<()> {
        self.expect_state(true, "next_subpass")?;
        unsafe { self.device.hal.cmd_next_subpass(self.command_buffer)? };
        if let RecorderState::InRenderPass { subpass } = &mut self.state {
            *subpass += 1;
        }
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> GpuResult<()> {
        self.expect_state(true, "end_render_pass")?;
        unsafe { self.device.hal.cmd_end_render_pass(self.command_buffer)? };
        self.state = RecorderState::Recording;
        Ok(())
    }

    pub fn bind_graphics_pipeline(&mut self, pipeline: GraphicsPipeline) -> GpuResult<()> {
        unsafe {
            self.device
                .hal
                .cmd_bind_graphics_pipeline(self.command_buffer, pipeline)
        }
    }

    pub fn bind_descriptor_sets(
        &mut self,
        layout: PipelineLayout,
        first_set: u32,
        sets: &[DescriptorSet],
    ) -> GpuResult<()> {
        unsafe {
            self.device
                .hal
                .cmd_bind_descriptor_sets(self.command_buffer, layout, first_set, sets)
        }
    }

    pub fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[Buffer]) -> GpuResult<()> {
        let offsets = vec![0; buffers.len()];
        unsafe {
            self.device.hal.cmd_bind_vertex_buffers(
                self.command_buffer,
                first_binding,
                buffers,
                &offsets,
            )
        }
    }

    pub fn bind_index_buffer(&mut self, buffer: Buffer, index_type: IndexType) -> GpuResult<()> {
        unsafe {
            self.device
                .hal
                .cmd_bind_index_buffer(self.command_buffer, buffer, 0, index_type)
        }
    }

    pub fn push_constants(
        &mut self,
        layout: PipelineLayout,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> GpuResult<()> {
        unsafe {
            self.device
                .hal
                .cmd_push_constants(self.command_buffer, layout, stages, offset, data)
        }
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> GpuResult<()> {
        self.expect_state(true, "draw_indexed")?;
        unsafe {
            self.device.hal.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    pub fn draw_indexed_indirect(
        &mut self,
        buffer: Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) -> GpuResult<()> {
        self.expect_state(true, "draw_indexed_indirect")?;
        unsafe {
            self.device.hal.cmd_draw_indexed_indirect(
                self.command_buffer,
                buffer,
                offset,
                draw_count,
                stride,
            )
        }
    }

    /// Ends recording. Fails if a render pass is still open.
    pub fn finish(self) -> GpuResult<()> {
        self.expect_state(false, "finish")?;
        unsafe { self.device.hal.end_command_buffer(self.command_buffer) }
    }

    fn expect_state(&self, in_render_pass: bool, operation: &str) -> GpuResult<()> {
        let actual = matches!(self.state, RecorderState::InRenderPass { .. });
        if actual != in_render_pass {
            return Err(GpuError::invalid_description(
                format!("command buffer {:?}", self.command_buffer),
                format!(
                    "{operation} called {} a render pass",
                    if actual { "inside" } else { "outside" }
                ),
            ));
        }
        Ok(())
    }
}
