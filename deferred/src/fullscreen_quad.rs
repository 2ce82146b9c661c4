use dgpu::{
    Buffer, BufferDescription, BufferUsageFlags, CommandRecorder, Device, GpuResult, IndexType,
    MemoryDomain,
};
use glam::{vec3, Vec3};
use log::trace;

use crate::error::{ConstructionContext, RendererResult};
use crate::teardown::{GpuObject, ReleaseStage, TeardownList};

pub const QUAD_VERTICES: [Vec3; 4] = [
    vec3(-1.0, 1.0, 0.0),
    vec3(-1.0, -1.0, 0.0),
    vec3(1.0, -1.0, 0.0),
    vec3(1.0, 1.0, 0.0),
];

pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Screen-covering geometry drawn by the shading and tonemapping passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FullscreenQuad {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
}

impl FullscreenQuad {
    pub fn new(device: &Device) -> RendererResult<Self> {
        let vertex_buffer = upload(
            device,
            "Fullscreen quad vertices",
            BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )
        .creating("fullscreen quad vertex buffer")?;
        let index_buffer = upload(
            device,
            "Fullscreen quad indices",
            BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&QUAD_INDICES),
        )
        .creating("fullscreen quad index buffer")?;
        Ok(Self {
            vertex_buffer,
            index_buffer,
        })
    }

    pub fn vertex_buffer(&self) -> Buffer {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> Buffer {
        self.index_buffer
    }

    pub fn bind(&self, recorder: &mut CommandRecorder) -> GpuResult<()> {
        recorder.bind_vertex_buffers(0, &[self.vertex_buffer])?;
        recorder.bind_index_buffer(self.index_buffer, IndexType::Uint32)
    }

    pub fn draw(&self, recorder: &mut CommandRecorder) -> GpuResult<()> {
        recorder.draw_indexed(QUAD_INDICES.len() as u32, 1, 0, 0, 0)
    }

    pub fn record_draw(&self, recorder: &mut CommandRecorder) -> GpuResult<()> {
        self.bind(recorder)?;
        self.draw(recorder)
    }

    pub fn destroy(self, device: &Device) -> RendererResult<()> {
        device.destroy_buffer(self.vertex_buffer)?;
        device.destroy_buffer(self.index_buffer)?;
        Ok(())
    }

    pub(crate) fn into_teardown(self, list: &mut TeardownList) {
        list.extend(
            ReleaseStage::Buffers,
            [
                GpuObject::Buffer(self.vertex_buffer),
                GpuObject::Buffer(self.index_buffer),
            ],
        );
    }
}

fn upload(
    device: &Device,
    label: &str,
    usage_flags: BufferUsageFlags,
    data: &[u8],
) -> GpuResult<Buffer> {
    let buffer = device.create_buffer(&BufferDescription {
        label: Some(label),
        size: data.len(),
        usage_flags,
        memory_domain: MemoryDomain::HostVisible,
    })?;
    device.map_buffer(buffer)?.write(0, data)?;
    trace!("Uploaded {} bytes to {label}", data.len());
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use dgpu::dummy::RecordedCommand;
    use dgpu::CommandBufferUsage;

    use super::*;

    #[test]
    fn quad_buffers_hold_the_geometry() {
        let (device, hal) = Device::dummy();
        let quad = FullscreenQuad::new(&device).unwrap();
        let indices = hal.buffer_contents(quad.index_buffer()).unwrap();
        assert_eq!(indices, bytemuck::cast_slice::<u32, u8>(&QUAD_INDICES));
        let vertices = hal.buffer_contents(quad.vertex_buffer()).unwrap();
        assert_eq!(vertices.len(), 4 * 12);
        assert!(!hal.is_mapped(quad.vertex_buffer()));
    }

    #[test]
    fn quad_binds_both_buffers_but_draws_only_in_a_render_pass() {
        let (device, hal) = Device::dummy();
        let quad = FullscreenQuad::new(&device).unwrap();
        let command_buffer = device.allocate_command_buffers(1).unwrap()[0];
        let mut recorder = device
            .begin_recording(command_buffer, CommandBufferUsage::ONE_TIME_SUBMIT)
            .unwrap();
        quad.bind(&mut recorder).unwrap();
        assert!(quad.draw(&mut recorder).is_err());
        recorder.finish().unwrap();
        assert_eq!(
            hal.recorded_commands(command_buffer)[2],
            RecordedCommand::BindIndexBuffer {
                buffer: quad.index_buffer(),
                index_type: IndexType::Uint32,
            }
        );
    }
}
