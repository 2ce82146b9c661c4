//! Declarative render pass construction.
//!
//! Attachments, subpasses and dependencies are declared one by one and
//! checked as a whole before the native render pass is created.

use std::collections::{HashMap, HashSet, VecDeque};

use dgpu::{
    AccessFlags, AttachmentDescription, AttachmentFlags, AttachmentLoadOp, AttachmentReference,
    AttachmentStoreOp, ClearValue, DependencyFlags, Device, Format, GpuError, ImageLayout,
    PipelineBindPoint, PipelineStageFlags, RenderPass, RenderPassDescription, SampleCount,
    SubpassDependency, SubpassDescription, SubpassTarget,
};
use log::debug;
use strum::{EnumCount, EnumIter};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(u32);

impl AttachmentId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubpassId(u32);

impl SubpassId {
    pub fn index(self) -> u32 {
        self.0
    }

    pub fn target(self) -> SubpassTarget {
        SubpassTarget::Index(self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderGraphError {
    #[error("the render graph declares no subpasses")]
    NoSubpasses,
    #[error("subpass #{0} is not declared")]
    UnknownSubpass(u32),
    #[error("subpass '{subpass}' references undeclared attachment #{attachment}")]
    UnknownAttachment { subpass: String, attachment: u32 },
    #[error("subpass '{0}' declares more than one depth reference")]
    DuplicateDepthReference(String),
    #[error("a dependency cannot go from EXTERNAL to EXTERNAL")]
    ExternalToExternal,
    #[error("the subpass dependencies contain a cycle")]
    CyclicDependencies,
    #[error("dependency from subpass #{src} to earlier subpass #{dst}")]
    BackwardDependency { src: u32, dst: u32 },
    #[error("subpass '{subpass}' reads attachment #{attachment} before any subpass writes it")]
    MissingWriter { subpass: String, attachment: u32 },
    #[error("subpass '{reader}' reads attachment #{attachment} written by '{writer}' without a dependency chain between them")]
    MissingDependency {
        writer: String,
        reader: String,
        attachment: u32,
    },
    #[error("attachment #{attachment} moves from {last_use:?} to {final_layout:?} after subpass '{subpass}' without a dependency to EXTERNAL")]
    UnbridgedTransition {
        attachment: u32,
        subpass: String,
        last_use: ImageLayout,
        final_layout: ImageLayout,
    },
    #[error("failed to create the render pass: {0}")]
    Creation(#[from] GpuError),
}

pub type RenderGraphResult<T> = Result<T, RenderGraphError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum ReferenceKind {
    Color,
    Depth,
    Input,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct SubpassReference {
    subpass: SubpassId,
    kind: ReferenceKind,
    attachment: AttachmentId,
    layout: ImageLayout,
}

#[derive(Clone, Debug)]
struct SubpassInfo {
    name: String,
    bind_point: PipelineBindPoint,
}

#[derive(Clone, Debug, Default)]
pub struct RenderGraph {
    label: Option<String>,
    attachments: Vec<AttachmentDescription>,
    subpasses: Vec<SubpassInfo>,
    references: Vec<SubpassReference>,
    dependencies: Vec<SubpassDependency>,
}

impl RenderGraph {
    pub fn new(label: &str) -> Self {
        Self {
            label: Some(label.to_owned()),
            ..Default::default()
        }
    }

    pub fn add_attachment(&mut self, description: AttachmentDescription) -> AttachmentId {
        self.attachments.push(description);
        AttachmentId(self.attachments.len() as u32 - 1)
    }

    pub fn add_subpass(&mut self, name: &str, bind_point: PipelineBindPoint) -> SubpassId {
        self.subpasses.push(SubpassInfo {
            name: name.to_owned(),
            bind_point,
        });
        SubpassId(self.subpasses.len() as u32 - 1)
    }

    pub fn add_subpass_color_ref(
        &mut self,
        subpass: SubpassId,
        attachment: AttachmentId,
        layout: ImageLayout,
    ) {
        self.add_reference(subpass, ReferenceKind::Color, attachment, layout)
    }

    pub fn add_subpass_depth_ref(
        &mut self,
        subpass: SubpassId,
        attachment: AttachmentId,
        layout: ImageLayout,
    ) {
        self.add_reference(subpass, ReferenceKind::Depth, attachment, layout)
    }

    pub fn add_subpass_input_ref(
        &mut self,
        subpass: SubpassId,
        attachment: AttachmentId,
        layout: ImageLayout,
    ) {
        self.add_reference(subpass, ReferenceKind::Input, attachment, layout)
    }

    pub fn add_subpass_dependency(&mut self, dependency: SubpassDependency) {
        self.dependencies.push(dependency);
    }

    pub fn attachments(&self) -> &[AttachmentDescription] {
        &self.attachments
    }

    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }

    pub fn dependencies(&self) -> &[SubpassDependency] {
        &self.dependencies
    }

    /// One clear value per attachment, in declaration order.
    pub fn clear_values(&self, color: [f32; 4], depth: f32) -> Vec<ClearValue> {
        self.attachments
            .iter()
            .map(|a| {
                if a.format.is_depth() {
                    ClearValue::DepthStencil { depth, stencil: 0 }
                } else {
                    ClearValue::Color(color)
                }
            })
            .collect()
    }

    pub fn validate(&self) -> RenderGraphResult<()> {
        if self.subpasses.is_empty() {
            return Err(RenderGraphError::NoSubpasses);
        }
        self.validate_references()?;
        self.validate_dependency_targets()?;
        self.ensure_acyclic()?;
        for dependency in &self.dependencies {
            if let (SubpassTarget::Index(src), SubpassTarget::Index(dst)) =
                (dependency.src_subpass, dependency.dst_subpass)
            {
                if src > dst {
                    return Err(RenderGraphError::BackwardDependency { src, dst });
                }
            }
        }
        self.validate_reads()?;
        self.validate_final_layouts()
    }

    /// Validates the graph and creates the native render pass.
    pub fn build(&self, device: &Device) -> RenderGraphResult<RenderPass> {
        self.validate()?;

        let subpasses = self
            .subpasses
            .iter()
            .enumerate()
            .map(|(i, info)| {
                let refs_of = |kind| {
                    self.references
                        .iter()
                        .filter(move |r| r.subpass.0 == i as u32 && r.kind == kind)
                        .map(|r| AttachmentReference {
                            attachment: r.attachment.0,
                            layout: r.layout,
                        })
                };
                SubpassDescription {
                    bind_point: info.bind_point,
                    input_attachments: refs_of(ReferenceKind::Input).collect(),
                    color_attachments: refs_of(ReferenceKind::Color).collect(),
                    depth_stencil_attachment: refs_of(ReferenceKind::Depth).next(),
                }
            })
            .collect::<Vec<_>>();

        let render_pass = device.create_render_pass(&RenderPassDescription {
            label: self.label.as_deref(),
            attachments: &self.attachments,
            subpasses: &subpasses,
            dependencies: &self.dependencies,
        })?;
        debug!(
            "Built render graph {:?}: {} attachments, {} subpasses, {} dependencies",
            self.label,
            self.attachments.len(),
            self.subpasses.len(),
            self.dependencies.len()
        );
        Ok(render_pass)
    }

    fn add_reference(
        &mut self,
        subpass: SubpassId,
        kind: ReferenceKind,
        attachment: AttachmentId,
        layout: ImageLayout,
    ) {
        self.references.push(SubpassReference {
            subpass,
            kind,
            attachment,
            layout,
        });
    }

    fn subpass_name(&self, subpass: SubpassId) -> String {
        self.subpasses
            .get(subpass.0 as usize)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("#{}", subpass.0))
    }

    fn validate_references(&self) -> RenderGraphResult<()> {
        let mut depth_refs = HashSet::new();
        for reference in &self.references {
            if reference.subpass.0 as usize >= self.subpasses.len() {
                return Err(RenderGraphError::UnknownSubpass(reference.subpass.0));
            }
            if reference.attachment.0 as usize >= self.attachments.len() {
                return Err(RenderGraphError::UnknownAttachment {
                    subpass: self.subpass_name(reference.subpass),
                    attachment: reference.attachment.0,
                });
            }
            if reference.kind == ReferenceKind::Depth && !depth_refs.insert(reference.subpass) {
                return Err(RenderGraphError::DuplicateDepthReference(
                    self.subpass_name(reference.subpass),
                ));
            }
        }
        Ok(())
    }

    fn validate_dependency_targets(&self) -> RenderGraphResult<()> {
        for dependency in &self.dependencies {
            if dependency.src_subpass == SubpassTarget::External
                && dependency.dst_subpass == SubpassTarget::External
            {
                return Err(RenderGraphError::ExternalToExternal);
            }
            for target in [dependency.src_subpass, dependency.dst_subpass] {
                if let SubpassTarget::Index(index) = target {
                    if index as usize >= self.subpasses.len() {
                        return Err(RenderGraphError::UnknownSubpass(index));
                    }
                }
            }
        }
        Ok(())
    }

    /// Edges between subpasses, without self-dependencies and EXTERNAL.
    fn internal_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.dependencies
            .iter()
            .filter_map(|d| match (d.src_subpass, d.dst_subpass) {
                (SubpassTarget::Index(src), SubpassTarget::Index(dst)) if src != dst => {
                    Some((src, dst))
                }
                _ => None,
            })
    }

    fn ensure_acyclic(&self) -> RenderGraphResult<()> {
        let count = self.subpasses.len();
        let mut in_degree = vec![0usize; count];
        let mut successors: HashMap<u32, Vec<u32>> = HashMap::new();
        for (src, dst) in self.internal_edges() {
            in_degree[dst as usize] += 1;
            successors.entry(src).or_default().push(dst);
        }

        let mut ready = (0..count as u32)
            .filter(|i| in_degree[*i as usize] == 0)
            .collect::<VecDeque<_>>();
        let mut visited = 0;
        while let Some(subpass) = ready.pop_front() {
            visited += 1;
            for next in successors.get(&subpass).into_iter().flatten() {
                in_degree[*next as usize] -= 1;
                if in_degree[*next as usize] == 0 {
                    ready.push_back(*next);
                }
            }
        }

        if visited == count {
            Ok(())
        } else {
            Err(RenderGraphError::CyclicDependencies)
        }
    }

    fn reaches(&self, from: u32, to: u32) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            stack.extend(
                self.internal_edges()
                    .filter(|(src, _)| *src == current)
                    .map(|(_, dst)| dst),
            );
        }
        false
    }

    fn validate_reads(&self) -> RenderGraphResult<()> {
        for read in self
            .references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Input)
        {
            let writer = self
                .references
                .iter()
                .filter(|r| {
                    r.kind != ReferenceKind::Input
                        && r.attachment == read.attachment
                        && r.subpass < read.subpass
                })
                .map(|r| r.subpass)
                .max()
                .ok_or_else(|| RenderGraphError::MissingWriter {
                    subpass: self.subpass_name(read.subpass),
                    attachment: read.attachment.0,
                })?;
            if !self.reaches(writer.0, read.subpass.0) {
                return Err(RenderGraphError::MissingDependency {
                    writer: self.subpass_name(writer),
                    reader: self.subpass_name(read.subpass),
                    attachment: read.attachment.0,
                });
            }
        }
        Ok(())
    }

    fn validate_final_layouts(&self) -> RenderGraphResult<()> {
        for (index, attachment) in self.attachments.iter().enumerate() {
            let last_use = self
                .references
                .iter()
                .filter(|r| r.attachment.0 as usize == index)
                .max_by_key(|r| (r.subpass, r.kind != ReferenceKind::Input));
            let Some(last_use) = last_use else {
                continue;
            };
            if last_use.layout == attachment.final_layout {
                continue;
            }
            let bridged = self.dependencies.iter().any(|d| {
                d.src_subpass == last_use.subpass.target()
                    && d.dst_subpass == SubpassTarget::External
            });
            if !bridged {
                return Err(RenderGraphError::UnbridgedTransition {
                    attachment: index as u32,
                    subpass: self.subpass_name(last_use.subpass),
                    last_use: last_use.layout,
                    final_layout: attachment.final_layout,
                });
            }
        }
        Ok(())
    }
}

/// Attachment slots of the deferred render pass, in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumCount, EnumIter)]
pub enum DeferredAttachment {
    Color,
    Depth,
    DiffuseAlbedo,
    SpecularAlbedo,
    Normal,
    Accumulation,
}

impl DeferredAttachment {
    pub fn id(self) -> AttachmentId {
        AttachmentId(self as u32)
    }
}

fn cleared_attachment(format: Format, final_layout: ImageLayout) -> AttachmentDescription {
    AttachmentDescription {
        flags: AttachmentFlags::empty(),
        format,
        samples: SampleCount::One,
        load_op: AttachmentLoadOp::Clear,
        store_op: AttachmentStoreOp::Store,
        stencil_load_op: AttachmentLoadOp::DontCare,
        stencil_store_op: AttachmentStoreOp::DontCare,
        initial_layout: ImageLayout::Undefined,
        final_layout,
    }
}

/// The geometry store, lighting shade and tonemap pipeline as a single
/// render pass with three subpasses.
pub fn deferred_topology(swapchain_format: Format, depth_format: Format) -> RenderGraph {
    use crate::attachment::{GBufferChannel, ACCUMULATION_FORMAT};

    let mut graph = RenderGraph::new("Deferred render pass");

    let color = graph.add_attachment(cleared_attachment(
        swapchain_format,
        ImageLayout::PresentSrc,
    ));
    let depth = graph.add_attachment(cleared_attachment(
        depth_format,
        ImageLayout::DepthStencilReadOnly,
    ));
    let diffuse = graph.add_attachment(cleared_attachment(
        GBufferChannel::DiffuseAlbedo.format(),
        ImageLayout::ShaderReadOnly,
    ));
    let specular = graph.add_attachment(cleared_attachment(
        GBufferChannel::SpecularAlbedo.format(),
        ImageLayout::ShaderReadOnly,
    ));
    let normal = graph.add_attachment(cleared_attachment(
        GBufferChannel::Normal.format(),
        ImageLayout::ShaderReadOnly,
    ));
    let accumulation = graph.add_attachment(cleared_attachment(
        ACCUMULATION_FORMAT,
        ImageLayout::ShaderReadOnly,
    ));
    let g_buffer = [diffuse, specular, normal];

    let store = graph.add_subpass("g_store", PipelineBindPoint::Graphics);
    for attachment in g_buffer {
        graph.add_subpass_color_ref(store, attachment, ImageLayout::ColorAttachment);
    }
    graph.add_subpass_depth_ref(store, depth, ImageLayout::DepthStencilAttachment);

    let shade = graph.add_subpass("g_shade", PipelineBindPoint::Graphics);
    graph.add_subpass_color_ref(shade, accumulation, ImageLayout::ColorAttachment);
    for attachment in g_buffer {
        graph.add_subpass_input_ref(shade, attachment, ImageLayout::ShaderReadOnly);
    }
    graph.add_subpass_input_ref(shade, depth, ImageLayout::DepthStencilReadOnly);

    let tonemap = graph.add_subpass("g_tonemap", PipelineBindPoint::Graphics);
    graph.add_subpass_color_ref(tonemap, color, ImageLayout::ColorAttachment);
    graph.add_subpass_input_ref(tonemap, accumulation, ImageLayout::ShaderReadOnly);

    graph.add_subpass_dependency(SubpassDependency {
        src_subpass: SubpassTarget::External,
        dst_subpass: store.target(),
        src_stage_mask: PipelineStageFlags::BOTTOM_OF_PIPE,
        dst_stage_mask: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        src_access_mask: AccessFlags::MEMORY_READ,
        dst_access_mask: AccessFlags::COLOR_ATTACHMENT_WRITE
            | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        flags: DependencyFlags::BY_REGION,
    });
    graph.add_subpass_dependency(SubpassDependency {
        src_subpass: store.target(),
        dst_subpass: shade.target(),
        src_stage_mask: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | PipelineStageFlags::LATE_FRAGMENT_TESTS,
        dst_stage_mask: PipelineStageFlags::FRAGMENT_SHADER,
        src_access_mask: AccessFlags::COLOR_ATTACHMENT_WRITE
            | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_access_mask: AccessFlags::SHADER_READ | AccessFlags::INPUT_ATTACHMENT_READ,
        flags: DependencyFlags::BY_REGION,
    });
    graph.add_subpass_dependency(SubpassDependency {
        src_subpass: shade.target(),
        dst_subpass: tonemap.target(),
        src_stage_mask: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: PipelineStageFlags::FRAGMENT_SHADER,
        src_access_mask: AccessFlags::COLOR_ATTACHMENT_WRITE,
        dst_access_mask: AccessFlags::SHADER_READ | AccessFlags::INPUT_ATTACHMENT_READ,
        flags: DependencyFlags::BY_REGION,
    });
    graph.add_subpass_dependency(SubpassDependency {
        src_subpass: tonemap.target(),
        dst_subpass: SubpassTarget::External,
        src_stage_mask: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: PipelineStageFlags::BOTTOM_OF_PIPE,
        src_access_mask: AccessFlags::COLOR_ATTACHMENT_WRITE,
        dst_access_mask: AccessFlags::MEMORY_READ,
        flags: DependencyFlags::BY_REGION,
    });

    graph
}

#[cfg(test)]
mod tests {
    use dgpu::HandleType;

    use super::*;

    fn color_attachment(graph: &mut RenderGraph, final_layout: ImageLayout) -> AttachmentId {
        graph.add_attachment(cleared_attachment(Format::Rgba8Unorm, final_layout))
    }

    fn dependency(src: SubpassTarget, dst: SubpassTarget) -> SubpassDependency {
        SubpassDependency {
            src_subpass: src,
            dst_subpass: dst,
            src_stage_mask: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: PipelineStageFlags::FRAGMENT_SHADER,
            src_access_mask: AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: AccessFlags::INPUT_ATTACHMENT_READ,
            flags: DependencyFlags::BY_REGION,
        }
    }

    #[test]
    fn deferred_topology_is_valid() {
        let graph = deferred_topology(Format::Bgra8Srgb, Format::Depth32);
        assert_eq!(graph.attachments().len(), DeferredAttachment::COUNT);
        assert_eq!(graph.subpass_count(), 3);
        assert_eq!(graph.dependencies().len(), 4);
        assert!(graph
            .dependencies()
            .iter()
            .all(|d| d.flags == DependencyFlags::BY_REGION));
        assert_eq!(
            graph.attachments()[DeferredAttachment::Color as usize].final_layout,
            ImageLayout::PresentSrc
        );
        graph.validate().unwrap();
    }

    #[test]
    fn clear_values_follow_attachment_order() {
        let graph = deferred_topology(Format::Bgra8Srgb, Format::Depth32);
        let clear_values = graph.clear_values([0.0; 4], 1.0);
        assert_eq!(clear_values.len(), 6);
        assert_eq!(clear_values[0], ClearValue::Color([0.0; 4]));
        assert_eq!(
            clear_values[1],
            ClearValue::DepthStencil {
                depth: 1.0,
                stencil: 0
            }
        );
        assert!(clear_values[2..]
            .iter()
            .all(|c| matches!(c, ClearValue::Color(_))));
    }

    #[test]
    fn build_creates_a_render_pass() {
        let (device, hal) = Device::dummy();
        let graph = deferred_topology(Format::Bgra8Srgb, device.depth_format());
        let render_pass = graph.build(&device).unwrap();
        assert!(hal.is_live(HandleType::RenderPass, dgpu::Handle::id(&render_pass)));
    }

    #[test]
    fn unknown_attachments_are_rejected() {
        let mut graph = RenderGraph::new("broken");
        let subpass = graph.add_subpass("only", PipelineBindPoint::Graphics);
        let mut other = RenderGraph::new("other");
        color_attachment(&mut other, ImageLayout::ColorAttachment);
        let foreign = color_attachment(&mut other, ImageLayout::ColorAttachment);
        graph.add_subpass_color_ref(subpass, foreign, ImageLayout::ColorAttachment);

        assert_eq!(
            graph.validate(),
            Err(RenderGraphError::UnknownAttachment {
                subpass: "only".into(),
                attachment: 1
            })
        );
    }

    #[test]
    fn empty_graphs_are_rejected() {
        let (device, hal) = Device::dummy();
        let graph = RenderGraph::new("empty");
        assert_eq!(graph.build(&device), Err(RenderGraphError::NoSubpasses));
        assert_eq!(hal.live_count(HandleType::RenderPass), 0);
    }

    #[test]
    fn external_to_external_is_rejected() {
        let mut graph = RenderGraph::new("external");
        graph.add_subpass("only", PipelineBindPoint::Graphics);
        graph.add_subpass_dependency(dependency(SubpassTarget::External, SubpassTarget::External));
        assert_eq!(graph.validate(), Err(RenderGraphError::ExternalToExternal));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut graph = RenderGraph::new("cycle");
        let a = graph.add_subpass("a", PipelineBindPoint::Graphics);
        let b = graph.add_subpass("b", PipelineBindPoint::Graphics);
        graph.add_subpass_dependency(dependency(a.target(), b.target()));
        graph.add_subpass_dependency(dependency(b.target(), a.target()));
        assert_eq!(graph.validate(), Err(RenderGraphError::CyclicDependencies));
    }

    #[test]
    fn self_dependencies_are_not_cycles() {
        let mut graph = RenderGraph::new("self");
        let a = graph.add_subpass("a", PipelineBindPoint::Graphics);
        graph.add_subpass_dependency(dependency(a.target(), a.target()));
        graph.validate().unwrap();
    }

    #[test]
    fn reads_need_a_dependency_from_the_writer() {
        let mut graph = RenderGraph::new("reads");
        let target = color_attachment(&mut graph, ImageLayout::ShaderReadOnly);
        let output = color_attachment(&mut graph, ImageLayout::ColorAttachment);
        let write = graph.add_subpass("write", PipelineBindPoint::Graphics);
        let read = graph.add_subpass("read", PipelineBindPoint::Graphics);
        graph.add_subpass_color_ref(write, target, ImageLayout::ColorAttachment);
        graph.add_subpass_input_ref(read, target, ImageLayout::ShaderReadOnly);
        graph.add_subpass_color_ref(read, output, ImageLayout::ColorAttachment);

        assert!(matches!(
            graph.validate(),
            Err(RenderGraphError::MissingDependency { .. })
        ));

        graph.add_subpass_dependency(dependency(write.target(), read.target()));
        graph.validate().unwrap();
    }

    #[test]
    fn reads_before_any_write_are_rejected() {
        let mut graph = RenderGraph::new("early read");
        let target = color_attachment(&mut graph, ImageLayout::ShaderReadOnly);
        let read = graph.add_subpass("read", PipelineBindPoint::Graphics);
        graph.add_subpass_input_ref(read, target, ImageLayout::ShaderReadOnly);
        assert!(matches!(
            graph.validate(),
            Err(RenderGraphError::MissingWriter { attachment: 0, .. })
        ));
    }

    #[test]
    fn final_layout_changes_need_an_external_dependency() {
        let mut graph = RenderGraph::new("present");
        let color = color_attachment(&mut graph, ImageLayout::PresentSrc);
        let only = graph.add_subpass("only", PipelineBindPoint::Graphics);
        graph.add_subpass_color_ref(only, color, ImageLayout::ColorAttachment);
        assert!(matches!(
            graph.validate(),
            Err(RenderGraphError::UnbridgedTransition { attachment: 0, .. })
        ));

        graph.add_subpass_dependency(dependency(only.target(), SubpassTarget::External));
        graph.validate().unwrap();
    }

    #[test]
    fn duplicate_depth_references_are_rejected() {
        let mut graph = RenderGraph::new("depth");
        let depth = graph.add_attachment(cleared_attachment(
            Format::Depth32,
            ImageLayout::DepthStencilAttachment,
        ));
        let only = graph.add_subpass("only", PipelineBindPoint::Graphics);
        graph.add_subpass_depth_ref(only, depth, ImageLayout::DepthStencilAttachment);
        graph.add_subpass_depth_ref(only, depth, ImageLayout::DepthStencilAttachment);
        assert_eq!(
            graph.validate(),
            Err(RenderGraphError::DuplicateDepthReference("only".into()))
        );
    }
}
