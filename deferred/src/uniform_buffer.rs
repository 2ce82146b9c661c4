use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use dgpu::{Buffer, BufferDescription, BufferRange, BufferUsageFlags, Device, MemoryDomain};
use glam::{Mat4, Vec4};
use log::{debug, trace};

use crate::error::{ConstructionContext, RendererResult};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub position: Vec4,
    pub color: Vec4,
    pub attenuation: Vec4,
    pub direction: Vec4,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    pub diffuse: Vec4,
    pub ambient: Vec4,
    pub specular: Vec4,
    /// Shininess, roughness, opacity and one unused slot.
    pub params: Vec4,
}

/// The camera block at the start of the buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameMatrices {
    pub projection: Mat4,
    pub view: Mat4,
    pub inverse_projection: Mat4,
    pub inverse_view: Mat4,
}

impl FrameMatrices {
    pub fn new(projection: Mat4, view: Mat4) -> Self {
        Self {
            projection,
            view,
            inverse_projection: projection.inverse(),
            inverse_view: view.inverse(),
        }
    }
}

/// Everything written into the buffer for one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameData<'a> {
    pub matrices: FrameMatrices,
    pub lights: &'a [Light],
    pub materials: &'a [MaterialConstants],
}

/// Region offsets derived from the live light and material counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameUniformLayout {
    pub light_count: usize,
    pub material_count: usize,
}

impl FrameUniformLayout {
    pub const LIGHT_STRIDE: usize = size_of::<Light>();
    pub const MATERIAL_STRIDE: usize = size_of::<MaterialConstants>();

    pub fn new(light_count: usize, material_count: usize) -> Self {
        Self {
            light_count,
            material_count,
        }
    }

    pub fn matrices_offset(&self) -> usize {
        0
    }

    pub fn matrices_size(&self) -> usize {
        size_of::<FrameMatrices>()
    }

    pub fn lights_offset(&self) -> usize {
        self.matrices_offset() + self.matrices_size()
    }

    pub fn lights_size(&self) -> usize {
        self.light_count * Self::LIGHT_STRIDE
    }

    pub fn materials_offset(&self) -> usize {
        self.lights_offset() + self.lights_size()
    }

    pub fn materials_size(&self) -> usize {
        self.material_count * Self::MATERIAL_STRIDE
    }

    pub fn total_size(&self) -> usize {
        self.materials_offset() + self.materials_size()
    }

    /// Bytes actually allocated: one extra element slot keeps empty
    /// regions addressable.
    pub fn allocation_size(&self) -> usize {
        self.total_size() + Self::LIGHT_STRIDE.max(Self::MATERIAL_STRIDE)
    }

    /// `(offset, range)` of the matrices, lights and materials regions.
    pub fn descriptor_ranges(&self) -> [(usize, usize); 3] {
        [
            (self.matrices_offset(), self.matrices_size()),
            (
                self.lights_offset(),
                self.light_count.max(1) * Self::LIGHT_STRIDE,
            ),
            (
                self.materials_offset(),
                self.material_count.max(1) * Self::MATERIAL_STRIDE,
            ),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepackOutcome {
    /// The buffer was recreated, so every descriptor pointing into it is stale.
    pub resized: bool,
    /// A light or material count changed, which moves the region offsets even
    /// when the total size stays the same.
    pub layout_changed: bool,
}

impl RepackOutcome {
    /// Whether descriptors written before this repack point at the wrong
    /// buffer or the wrong ranges.
    pub fn invalidates_descriptors(&self) -> bool {
        self.resized || self.layout_changed
    }
}

/// The single host-visible storage buffer shared by every frame.
#[derive(Debug, Default)]
pub struct FrameUniformBuffer {
    buffer: Option<Buffer>,
    layout: FrameUniformLayout,
}

impl FrameUniformBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> Option<Buffer> {
        self.buffer
    }

    pub fn layout(&self) -> FrameUniformLayout {
        self.layout
    }

    /// Buffer ranges of the three regions, once the buffer exists.
    pub fn descriptor_ranges(&self) -> Option<[BufferRange; 3]> {
        let buffer = self.buffer?;
        Some(
            self.layout
                .descriptor_ranges()
                .map(|(offset, range)| BufferRange {
                    buffer,
                    offset,
                    range,
                }),
        )
    }

    /// Writes the matrices, lights and materials regions in this order,
    /// recreating the buffer first if the total size changed.
    pub fn repack(&mut self, device: &Device, data: &FrameData) -> RendererResult<RepackOutcome> {
        let layout = FrameUniformLayout::new(data.lights.len(), data.materials.len());
        let resized = match self.buffer {
            Some(buffer) => buffer.size != layout.allocation_size(),
            None => true,
        };
        let layout_changed = layout != self.layout;
        if resized {
            let buffer = device
                .create_buffer(&BufferDescription {
                    label: Some("Frame uniform buffer"),
                    size: layout.allocation_size(),
                    usage_flags: BufferUsageFlags::STORAGE_BUFFER,
                    memory_domain: MemoryDomain::HostVisible,
                })
                .creating("frame uniform buffer")?;
            debug!(
                "Frame uniform buffer resized to {} bytes ({} lights, {} materials)",
                buffer.size, layout.light_count, layout.material_count
            );
            if let Some(old) = self.buffer.replace(buffer) {
                device.destroy_buffer(old)?;
            }
        }
        self.layout = layout;

        let Some(buffer) = self.buffer else {
            unreachable!("the buffer is created above");
        };
        let mut mapping = device.map_buffer(buffer)?;
        mapping.write(
            layout.matrices_offset(),
            bytemuck::bytes_of(&data.matrices),
        )?;
        mapping.write(layout.lights_offset(), bytemuck::cast_slice(data.lights))?;
        mapping.write(
            layout.materials_offset(),
            bytemuck::cast_slice(data.materials),
        )?;
        drop(mapping);
        trace!("Repacked frame uniform buffer");

        Ok(RepackOutcome {
            resized,
            layout_changed,
        })
    }

    pub fn destroy(&mut self, device: &Device) -> RendererResult<()> {
        if let Some(buffer) = self.buffer.take() {
            device.destroy_buffer(buffer)?;
        }
        Ok(())
    }

    pub(crate) fn take_buffer(&mut self) -> Option<Buffer> {
        self.buffer.take()
    }
}

#[cfg(test)]
mod tests {
    use glam::vec4;

    use super::*;

    fn lights(count: usize) -> Vec<Light> {
        (0..count)
            .map(|i| Light {
                position: vec4(i as f32, 1.0, 2.0, 1.0),
                color: vec4(1.0, 0.5, 0.25, 1.0),
                attenuation: vec4(1.0, 0.1, 0.01, 0.0),
                direction: Vec4::NEG_Y,
            })
            .collect()
    }

    fn materials(count: usize) -> Vec<MaterialConstants> {
        (0..count)
            .map(|i| MaterialConstants {
                diffuse: Vec4::splat(i as f32),
                ambient: Vec4::ONE,
                specular: Vec4::X,
                params: vec4(32.0, 0.5, 1.0, 0.0),
            })
            .collect()
    }

    #[test]
    fn element_sizes_match_the_shader_layout() {
        assert_eq!(size_of::<Light>(), 64);
        assert_eq!(size_of::<MaterialConstants>(), 64);
        assert_eq!(size_of::<FrameMatrices>(), 4 * size_of::<Mat4>());
    }

    #[test]
    fn region_offsets_follow_counts() {
        for n in [0, 1, 7, 64] {
            let layout = FrameUniformLayout::new(n, 3);
            assert_eq!(layout.lights_offset(), 4 * size_of::<Mat4>());
            assert_eq!(
                layout.materials_offset(),
                layout.lights_offset() + n * size_of::<Light>()
            );
            assert_eq!(layout.total_size(), layout.materials_offset() + 3 * 64);
        }
    }

    #[test]
    fn packed_regions_read_back_unchanged() {
        let (device, hal) = Device::dummy();
        let mut uniform_buffer = FrameUniformBuffer::new();
        let matrices = FrameMatrices::new(
            Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 100.0),
            Mat4::look_at_rh(glam::Vec3::new(0.0, 2.0, 5.0), glam::Vec3::ZERO, glam::Vec3::Y),
        );
        for n in [0, 1, 64] {
            for m in [0, 1, 64] {
                let lights = lights(n);
                let materials = materials(m);
                uniform_buffer
                    .repack(
                        &device,
                        &FrameData {
                            matrices,
                            lights: &lights,
                            materials: &materials,
                        },
                    )
                    .unwrap();
                let layout = uniform_buffer.layout();
                let contents = hal
                    .buffer_contents(uniform_buffer.buffer().unwrap())
                    .unwrap();

                assert_eq!(
                    &contents[..layout.matrices_size()],
                    bytemuck::bytes_of(&matrices)
                );
                assert_eq!(
                    &contents[layout.lights_offset()..layout.materials_offset()],
                    bytemuck::cast_slice::<Light, u8>(&lights)
                );
                assert_eq!(
                    &contents[layout.materials_offset()..layout.total_size()],
                    bytemuck::cast_slice::<MaterialConstants, u8>(&materials)
                );
                assert!(!hal.is_mapped(uniform_buffer.buffer().unwrap()));
            }
        }
    }

    #[test]
    fn buffer_is_recreated_only_when_the_size_changes() {
        let (device, _hal) = Device::dummy();
        let mut uniform_buffer = FrameUniformBuffer::new();
        let lights = lights(2);
        let data = FrameData {
            matrices: FrameMatrices::default(),
            lights: &lights,
            materials: &[],
        };
        assert!(uniform_buffer.repack(&device, &data).unwrap().resized);
        let first = uniform_buffer.buffer().unwrap();
        assert!(!uniform_buffer.repack(&device, &data).unwrap().resized);
        assert_eq!(uniform_buffer.buffer(), Some(first));

        let more_lights = super::tests::lights(3);
        let grown = FrameData {
            lights: &more_lights,
            ..data
        };
        assert!(uniform_buffer.repack(&device, &grown).unwrap().resized);
        let ranges = uniform_buffer.descriptor_ranges().unwrap();
        assert_eq!(ranges[1].offset, 256);
        assert_eq!(ranges[2].offset, 256 + 3 * 64);
        // Empty material region still gets one element
        assert_eq!(ranges[2].range, 64);
        assert!(ranges[2].offset + ranges[2].range <= ranges[2].buffer.size);
    }

    #[test]
    fn count_swap_with_the_same_size_moves_the_regions() {
        let (device, _hal) = Device::dummy();
        let mut uniform_buffer = FrameUniformBuffer::new();
        let (two_lights, one_material) = (lights(2), materials(1));
        uniform_buffer
            .repack(
                &device,
                &FrameData {
                    matrices: FrameMatrices::default(),
                    lights: &two_lights,
                    materials: &one_material,
                },
            )
            .unwrap();
        let before = uniform_buffer.descriptor_ranges().unwrap();

        let three_lights = lights(3);
        let outcome = uniform_buffer
            .repack(
                &device,
                &FrameData {
                    matrices: FrameMatrices::default(),
                    lights: &three_lights,
                    materials: &[],
                },
            )
            .unwrap();
        assert!(!outcome.resized);
        assert!(outcome.layout_changed);
        assert!(outcome.invalidates_descriptors());

        let after = uniform_buffer.descriptor_ranges().unwrap();
        assert_eq!(after[0].buffer, before[0].buffer);
        assert_eq!((before[1].range, after[1].range), (128, 192));
        assert_eq!((before[2].offset, after[2].offset), (384, 448));

        let unchanged = uniform_buffer
            .repack(
                &device,
                &FrameData {
                    matrices: FrameMatrices::default(),
                    lights: &three_lights,
                    materials: &[],
                },
            )
            .unwrap();
        assert!(!unchanged.invalidates_descriptors());
    }
}
