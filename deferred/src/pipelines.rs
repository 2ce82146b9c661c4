use dgpu::{
    CompareOp, CullMode, DepthStencilState, Device, Extents2D, Format, FrontFace, GraphicsPipeline,
    GraphicsPipelineDescription, PipelineLayout, PrimitiveTopology, RasterizationState, Rect2D,
    RenderPass, ShaderStage, SpecializationConstant, VertexAttributeDescription,
    VertexBindingDescription, VertexInputRate,
};
use log::{debug, error};
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::attachment::GBufferChannel;
use crate::error::{ConstructionContext, RendererResult};
use crate::providers::MaterialProvider;
use crate::teardown::{GpuObject, ReleaseStage, TeardownList};

/// The three passes of a frame; the discriminant is the subpass index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumCount, EnumIter)]
pub enum PassKind {
    Store,
    Shade,
    Tonemap,
}

impl PassKind {
    pub fn subpass(self) -> u32 {
        self as u32
    }

    pub fn label(self) -> &'static str {
        match self {
            PassKind::Store => "G-buffer store pipeline",
            PassKind::Shade => "Shading pipeline",
            PassKind::Tonemap => "Tonemapping pipeline",
        }
    }

    fn color_attachment_count(self) -> u32 {
        match self {
            PassKind::Store => GBufferChannel::COUNT as u32,
            PassKind::Shade | PassKind::Tonemap => 1,
        }
    }

    fn rasterization(self) -> RasterizationState {
        match self {
            PassKind::Store => RasterizationState {
                front_face: FrontFace::CounterClockwise,
                cull_mode: CullMode::Back,
            },
            PassKind::Shade | PassKind::Tonemap => RasterizationState {
                front_face: FrontFace::Clockwise,
                cull_mode: CullMode::None,
            },
        }
    }

    fn depth_stencil(self) -> Option<DepthStencilState> {
        match self {
            PassKind::Store => Some(DepthStencilState {
                depth_test_enable: true,
                depth_write_enable: true,
                depth_compare_op: CompareOp::LessOrEqual,
            }),
            PassKind::Shade | PassKind::Tonemap => None,
        }
    }
}

/// Vertex input bindings and attributes of a pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBindingDescription>,
    pub attributes: Vec<VertexAttributeDescription>,
}

impl VertexLayout {
    /// A single tightly packed `vec3` position.
    pub fn fullscreen_quad() -> Self {
        Self {
            bindings: vec![VertexBindingDescription {
                binding: 0,
                stride: Format::Rgb32Float.byte_size() as u32,
                input_rate: VertexInputRate::Vertex,
            }],
            attributes: vec![VertexAttributeDescription {
                location: 0,
                binding: 0,
                format: Format::Rgb32Float,
                offset: 0,
            }],
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineInputs<'a> {
    pub render_pass: RenderPass,
    pub layout: PipelineLayout,
    pub viewport: Extents2D,
    /// Vertex layout of the registered geometry, used by the store pass.
    pub store_vertex_layout: &'a VertexLayout,
    pub material_count: u32,
    pub light_count: u32,
}

/// One graphics pipeline per [`PassKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassPipelines {
    pipelines: [GraphicsPipeline; PassKind::COUNT],
    material_count: u32,
    light_count: u32,
}

impl PassPipelines {
    pub fn build(
        device: &Device,
        materials: &mut dyn MaterialProvider,
        inputs: &PipelineInputs,
    ) -> RendererResult<Self> {
        let quad_layout = VertexLayout::fullscreen_quad();
        let specialization = [
            SpecializationConstant {
                id: 0,
                value: inputs.material_count,
            },
            SpecializationConstant {
                id: 1,
                value: inputs.light_count,
            },
        ];

        let mut pipelines = Vec::with_capacity(PassKind::COUNT);
        for pass in PassKind::iter() {
            let vertex_layout = match pass {
                PassKind::Store => inputs.store_vertex_layout,
                PassKind::Shade | PassKind::Tonemap => &quad_layout,
            };
            let specialization: &[SpecializationConstant] = match pass {
                PassKind::Store | PassKind::Shade => &specialization,
                PassKind::Tonemap => &[],
            };
            let pipeline = materials
                .pass_shaders(device, pass)
                .and_then(|shaders| {
                    device.create_graphics_pipeline(&GraphicsPipelineDescription {
                        label: Some(pass.label()),
                        layout: inputs.layout,
                        render_pass: inputs.render_pass,
                        subpass: pass.subpass(),
                        vertex_stage: ShaderStage {
                            module: shaders.vertex,
                            entry_point: "main",
                        },
                        fragment_stage: Some(ShaderStage {
                            module: shaders.fragment,
                            entry_point: "main",
                        }),
                        vertex_bindings: &vertex_layout.bindings,
                        vertex_attributes: &vertex_layout.attributes,
                        topology: PrimitiveTopology::TriangleList,
                        rasterization: pass.rasterization(),
                        depth_stencil: pass.depth_stencil(),
                        color_attachment_count: pass.color_attachment_count(),
                        viewport: Rect2D::from_extents(inputs.viewport),
                        specialization,
                    })
                })
                .creating(pass.label());
            match pipeline {
                Ok(pipeline) => pipelines.push(pipeline),
                Err(e) => {
                    for pipeline in pipelines {
                        if let Err(destroy_error) = device.destroy_graphics_pipeline(pipeline) {
                            error!("Failed to destroy pipeline {pipeline:?}: {destroy_error}");
                        }
                    }
                    return Err(e);
                }
            }
        }
        debug!(
            "Built pass pipelines for a {}x{} viewport",
            inputs.viewport.width, inputs.viewport.height
        );
        Ok(Self {
            pipelines: [pipelines[0], pipelines[1], pipelines[2]],
            material_count: inputs.material_count,
            light_count: inputs.light_count,
        })
    }

    pub fn pipeline(&self, pass: PassKind) -> GraphicsPipeline {
        self.pipelines[pass as usize]
    }

    /// Material instance count the store and shade passes are specialized for.
    pub fn material_count(&self) -> u32 {
        self.material_count
    }

    /// Light count the store and shade passes are specialized for.
    pub fn light_count(&self) -> u32 {
        self.light_count
    }

    pub fn destroy(self, device: &Device) -> RendererResult<()> {
        for pipeline in self.pipelines {
            device.destroy_graphics_pipeline(pipeline)?;
        }
        Ok(())
    }

    pub(crate) fn into_teardown(self, list: &mut TeardownList) {
        list.extend(
            ReleaseStage::Pipelines,
            self.pipelines.map(GpuObject::GraphicsPipeline),
        );
    }
}

#[cfg(test)]
mod tests {
    use dgpu::{
        DescriptorImage, GpuError, GpuResult, HandleType, PipelineLayoutDescription,
        ShaderModuleDescription,
    };

    use super::*;
    use crate::binding_model::MaterialTextureType;
    use crate::providers::{PassShaders, Texture};
    use crate::render_graph::deferred_topology;
    use crate::uniform_buffer::MaterialConstants;

    #[derive(Default)]
    struct FixedShaders {
        shaders: Option<PassShaders>,
        fail_on: Option<PassKind>,
    }

    impl MaterialProvider for FixedShaders {
        fn material_constants(&self) -> Vec<MaterialConstants> {
            vec![]
        }

        fn material_instances_count(&self) -> u32 {
            0
        }

        fn descriptor_image_infos(&self, _ty: MaterialTextureType) -> Vec<DescriptorImage> {
            vec![]
        }

        fn set_fallback_texture(&mut self, _texture: Texture) {}

        fn pass_shaders(&mut self, device: &Device, pass: PassKind) -> GpuResult<PassShaders> {
            if self.fail_on == Some(pass) {
                return Err(GpuError::invalid_description("shader", "does not compile"));
            }
            if self.shaders.is_none() {
                let module = |label| {
                    device.create_shader_module(&ShaderModuleDescription {
                        label: Some(label),
                        source: &[0x0723_0203],
                    })
                };
                self.shaders = Some(PassShaders {
                    vertex: module("vertex")?,
                    fragment: module("fragment")?,
                });
            }
            Ok(self.shaders.unwrap())
        }

        fn reload_all_shaders(&mut self, _device: &Device) -> GpuResult<()> {
            Ok(())
        }

        fn destroy(&mut self, _device: &Device) -> GpuResult<()> {
            Ok(())
        }
    }

    fn build(device: &Device, materials: &mut FixedShaders) -> RendererResult<PassPipelines> {
        let render_pass = deferred_topology(Format::Bgra8Srgb, device.depth_format())
            .build(device)
            .unwrap();
        let layout = device
            .create_pipeline_layout(&PipelineLayoutDescription {
                label: None,
                set_layouts: &[],
                push_constant_ranges: &[],
            })
            .unwrap();
        let store_layout = VertexLayout {
            bindings: vec![VertexBindingDescription {
                binding: 0,
                stride: 32,
                input_rate: VertexInputRate::Vertex,
            }],
            attributes: vec![
                VertexAttributeDescription {
                    location: 0,
                    binding: 0,
                    format: Format::Rgb32Float,
                    offset: 0,
                },
                VertexAttributeDescription {
                    location: 1,
                    binding: 0,
                    format: Format::Rgb32Float,
                    offset: 12,
                },
            ],
        };
        PassPipelines::build(
            device,
            materials,
            &PipelineInputs {
                render_pass,
                layout,
                viewport: Extents2D {
                    width: 800,
                    height: 600,
                },
                store_vertex_layout: &store_layout,
                material_count: 4,
                light_count: 2,
            },
        )
    }

    #[test]
    fn pipelines_target_their_subpasses() {
        let (device, hal) = Device::dummy();
        let pipelines = build(&device, &mut FixedShaders::default()).unwrap();

        let store = hal.pipeline_info(pipelines.pipeline(PassKind::Store)).unwrap();
        assert_eq!(store.subpass, 0);
        assert_eq!(store.color_attachment_count, 3);
        assert_eq!(store.front_face, FrontFace::CounterClockwise);
        assert_eq!(store.cull_mode, CullMode::Back);
        assert!(store.depth_test);
        assert_eq!(store.vertex_attribute_count, 2);
        assert_eq!(store.viewport.extents.width, 800);
        assert_eq!(
            store.specialization,
            vec![
                SpecializationConstant { id: 0, value: 4 },
                SpecializationConstant { id: 1, value: 2 },
            ]
        );

        let shade = hal.pipeline_info(pipelines.pipeline(PassKind::Shade)).unwrap();
        assert_eq!(shade.subpass, 1);
        assert_eq!(shade.color_attachment_count, 1);
        assert_eq!(shade.front_face, FrontFace::Clockwise);
        assert!(!shade.depth_test);
        assert_eq!(shade.vertex_attribute_count, 1);
        assert_eq!(shade.specialization.len(), 2);

        let tonemap = hal
            .pipeline_info(pipelines.pipeline(PassKind::Tonemap))
            .unwrap();
        assert_eq!(tonemap.subpass, 2);
        assert!(tonemap.specialization.is_empty());

        pipelines.destroy(&device).unwrap();
        assert_eq!(hal.live_count(HandleType::GraphicsPipeline), 0);
    }

    #[test]
    fn partial_builds_are_rolled_back() {
        let (device, hal) = Device::dummy();
        let mut materials = FixedShaders {
            fail_on: Some(PassKind::Tonemap),
            ..Default::default()
        };
        let result = build(&device, &mut materials);
        assert!(matches!(
            result,
            Err(crate::RendererError::Construction {
                object: "Tonemapping pipeline",
                ..
            })
        ));
        assert_eq!(hal.live_count(HandleType::GraphicsPipeline), 0);
    }

    #[test]
    fn quad_layout_is_a_packed_vec3() {
        let layout = VertexLayout::fullscreen_quad();
        assert_eq!(layout.bindings[0].stride, 12);
        assert_eq!(layout.attributes[0].format, Format::Rgb32Float);
    }
}
