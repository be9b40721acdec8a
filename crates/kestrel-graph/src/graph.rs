//! Render graph. A graph is a list of [PassNode]s plus a dependency relation
//! between them; building it resolves the relation into a deterministic
//! execution order. Execution is a pure function of the built graph: every
//! node is recorded into the frame's command buffer only after all of its
//! dependencies, with no barriers between nodes, since inter-pass visibility
//! is the pass model's external dependency's job.

use kestrel::ash::vk;

use crate::error::GraphError;
use crate::recorder::Recording;
use crate::resources::{BufferKey, FramebufferKey, PassKey, PipelineKey};

///GPU work a node issues once its pipeline and bindings are in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Work {
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    Dispatch {
        group_count: [u32; 3],
    },
}

///One node of the graph. Graphics nodes carry a framebuffer and run inside
/// their render pass; compute nodes reference a pass key only as their graph
/// identity and dispatch without a pass scope.
pub struct PassNode {
    pub name: String,
    pub pass: PassKey,
    pub framebuffer: Option<FramebufferKey>,
    pub pipeline: PipelineKey,
    ///One colour per colour attachment, in declaration order.
    pub clear_colors: Vec<[f32; 4]>,
    pub vertex_buffer: Option<BufferKey>,
    pub index_buffer: Option<(BufferKey, vk::IndexType)>,
    pub work: Work,
}

impl PassNode {
    pub fn graphics(
        name: impl Into<String>,
        pass: PassKey,
        framebuffer: FramebufferKey,
        pipeline: PipelineKey,
        work: Work,
    ) -> Self {
        PassNode {
            name: name.into(),
            pass,
            framebuffer: Some(framebuffer),
            pipeline,
            clear_colors: Vec::new(),
            vertex_buffer: None,
            index_buffer: None,
            work,
        }
    }

    pub fn compute(
        name: impl Into<String>,
        pass: PassKey,
        pipeline: PipelineKey,
        group_count: [u32; 3],
    ) -> Self {
        PassNode {
            name: name.into(),
            pass,
            framebuffer: None,
            pipeline,
            clear_colors: Vec::new(),
            vertex_buffer: None,
            index_buffer: None,
            work: Work::Dispatch { group_count },
        }
    }

    pub fn with_clear_colors(mut self, colors: &[[f32; 4]]) -> Self {
        self.clear_colors = colors.to_vec();
        self
    }

    pub fn with_vertex_buffer(mut self, buffer: BufferKey) -> Self {
        self.vertex_buffer = Some(buffer);
        self
    }

    pub fn with_index_buffer(mut self, buffer: BufferKey, index_type: vk::IndexType) -> Self {
        self.index_buffer = Some((buffer, index_type));
        self
    }
}

///Collects nodes and dependency edges in timeline order, then
/// [builds](Self::build) the executable graph.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<PassNode>,
    ///Per node, the pass keys it depends on, insertion order preserved.
    dependencies: Vec<Vec<PassKey>>,
    present_after: bool,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    pub fn add_pass(&mut self, node: PassNode) -> &mut Self {
        self.nodes.push(node);
        self.dependencies.push(Vec::new());
        self
    }

    ///Declares that `pass` must execute after `dependency`. If `pass` has not
    /// been added yet the edge has nothing to attach to and is dropped with a
    /// warning; add the pass first.
    pub fn add_dependency(&mut self, pass: PassKey, dependency: PassKey) -> &mut Self {
        match self.nodes.iter().position(|n| n.pass == pass) {
            Some(index) => self.dependencies[index].push(dependency),
            None => {
                #[cfg(feature = "logging")]
                log::warn!(
                    "Dependency edge on pass {:?} dropped, the pass is not in the timeline",
                    pass
                );
            }
        }
        self
    }

    ///Requests presentation of the final attachment once the graph executed.
    pub fn present_after(&mut self) -> &mut Self {
        self.present_after = true;
        self
    }

    ///Resolves the dependency relation and derives the execution order.
    /// Kahn's algorithm, seeded and tie-broken in timeline order, so the
    /// result is deterministic for a fixed sequence of builder calls. Edges
    /// naming a dependency pass that is not in the timeline are dropped with
    /// a warning.
    pub fn build(self) -> Result<Graph, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        //dependency pass keys -> node indices
        let mut edges: Vec<Vec<usize>> = Vec::with_capacity(self.nodes.len());
        for deps in self.dependencies.iter() {
            let mut resolved = Vec::with_capacity(deps.len());
            for dep in deps {
                match self.nodes.iter().position(|n| n.pass == *dep) {
                    Some(index) => resolved.push(index),
                    None => {
                        #[cfg(feature = "logging")]
                        log::warn!(
                            "Dependency on pass {:?} dropped, the pass is not in the timeline",
                            dep
                        );
                    }
                }
            }
            edges.push(resolved);
        }

        let mut in_degree = edges.iter().map(|deps| deps.len()).collect::<Vec<_>>();
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut scheduled = vec![false; self.nodes.len()];

        while order.len() < self.nodes.len() {
            //smallest ready timeline index first
            let next = (0..self.nodes.len()).find(|&i| !scheduled[i] && in_degree[i] == 0);
            let Some(next) = next else {
                let stuck = (0..self.nodes.len())
                    .filter(|&i| !scheduled[i])
                    .map(|i| self.nodes[i].pass)
                    .collect::<Vec<_>>();
                return Err(GraphError::DependencyCycle(stuck));
            };

            scheduled[next] = true;
            order.push(next);
            for (node, deps) in edges.iter().enumerate() {
                if !scheduled[node] {
                    in_degree[node] -= deps.iter().filter(|&&d| d == next).count();
                }
            }
        }

        #[cfg(feature = "logging")]
        log::trace!(
            "Graph order: {:?}",
            order
                .iter()
                .map(|&i| self.nodes[i].name.as_str())
                .collect::<Vec<_>>()
        );

        Ok(Graph {
            nodes: self.nodes,
            order,
            present_after: self.present_after,
        })
    }
}

///Built graph with a fixed execution order.
pub struct Graph {
    nodes: Vec<PassNode>,
    ///Node indices in execution order.
    order: Vec<usize>,
    pub present_after: bool,
}

impl Graph {
    ///Pass keys in the order the nodes will be recorded.
    pub fn execution_order(&self) -> impl Iterator<Item = PassKey> + '_ {
        self.order.iter().map(|&i| self.nodes[i].pass)
    }

    pub fn nodes(&self) -> &[PassNode] {
        &self.nodes
    }

    ///Records every node into `recording`, dependencies strictly before
    /// dependents. `frame_set` is the frame's bindless descriptor set, bound
    /// for each node's pipeline layout when present.
    pub fn record(&self, recording: &mut Recording, frame_set: Option<vk::DescriptorSet>) {
        for &index in self.order.iter() {
            let node = &self.nodes[index];
            recording.debug_label(node.name.clone());

            let (layout, bind_point) = {
                let entry = recording.resources().pipeline_expect(node.pipeline);
                (entry.raw_layout, entry.bind_point)
            };
            recording.bind_pipeline(node.pipeline);
            if let Some(set) = frame_set {
                recording.bind_descriptor_sets(bind_point, layout, 0, &[set]);
            }

            match node.framebuffer {
                Some(framebuffer) => {
                    let mut run =
                        recording.begin_render_pass(node.pass, framebuffer, &node.clear_colors);
                    if let Some(buffer) = node.vertex_buffer {
                        run.bind_vertex_buffer(0, buffer, 0);
                    }
                    if let Some((buffer, index_type)) = node.index_buffer {
                        run.bind_index_buffer(buffer, 0, index_type);
                    }
                    match node.work {
                        Work::Draw {
                            vertex_count,
                            instance_count,
                        } => run.draw(vertex_count, instance_count, 0, 0),
                        Work::DrawIndexed {
                            index_count,
                            instance_count,
                        } => run.draw_indexed(index_count, instance_count, 0, 0, 0),
                        Work::Dispatch { group_count } => {
                            run.dispatch(group_count[0], group_count[1], group_count[2])
                        }
                    }
                    run.end();
                }
                None => match node.work {
                    Work::Dispatch { group_count } => {
                        recording.dispatch(group_count[0], group_count[1], group_count[2])
                    }
                    Work::Draw {
                        vertex_count,
                        instance_count,
                    } => recording.draw(vertex_count, instance_count, 0, 0),
                    Work::DrawIndexed {
                        index_count,
                        instance_count,
                    } => recording.draw_indexed(index_count, instance_count, 0, 0, 0),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{AttachmentDesc, AttachmentRef, PassDesc, SubpassDesc};
    use crate::recorder::{Command, CommandBuffer, NoopSink};
    use crate::resources::Resources;
    use kestrel::resources::ImgDesc;

    fn compute_node(res: &mut Resources, name: &str) -> PassNode {
        let pass = res.import_pass(PassDesc::new(), vk::RenderPass::null());
        let pipeline = res.import_pipeline(
            vk::Pipeline::null(),
            vk::PipelineLayout::null(),
            vk::PipelineBindPoint::COMPUTE,
        );
        PassNode::compute(name, pass, pipeline, [1, 1, 1])
    }

    fn graphics_node(res: &mut Resources, name: &str) -> PassNode {
        let img = res.import_image(
            ImgDesc::color_attachment(16, 16, vk::Format::R8G8B8A8_UNORM),
            vk::Image::null(),
            vk::ImageView::null(),
            vk::ImageLayout::UNDEFINED,
        );
        let pass = res.import_pass(
            PassDesc::new()
                .add_attachment(AttachmentDesc::color(vk::Format::R8G8B8A8_UNORM))
                .add_subpass(SubpassDesc::new().with_color(AttachmentRef::color(0))),
            vk::RenderPass::null(),
        );
        let fb = res.import_framebuffer(
            pass,
            &[img],
            vk::Extent2D {
                width: 16,
                height: 16,
            },
            vk::Framebuffer::null(),
        );
        let pipeline = res.import_pipeline(
            vk::Pipeline::null(),
            vk::PipelineLayout::null(),
            vk::PipelineBindPoint::GRAPHICS,
        );
        PassNode::graphics(
            name,
            pass,
            fb,
            pipeline,
            Work::Draw {
                vertex_count: 3,
                instance_count: 1,
            },
        )
        .with_clear_colors(&[[0.0; 4]])
    }

    #[test]
    fn empty_graph_is_rejected() {
        assert!(matches!(GraphBuilder::new().build(), Err(GraphError::Empty)));
    }

    #[test]
    fn dependencies_execute_first() {
        let mut res = Resources::new();
        let a = compute_node(&mut res, "a");
        let b = compute_node(&mut res, "b");
        let c = compute_node(&mut res, "c");
        let (ka, kb, kc) = (a.pass, b.pass, c.pass);

        //timeline order a, b, c but a depends on c
        let mut builder = GraphBuilder::new();
        builder.add_pass(a).add_pass(b).add_pass(c);
        builder.add_dependency(ka, kc);
        let graph = builder.build().unwrap();

        let order = graph.execution_order().collect::<Vec<_>>();
        assert_eq!(order, vec![kb, kc, ka]);
    }

    #[test]
    fn independent_passes_keep_timeline_order() {
        let mut res = Resources::new();
        let a = compute_node(&mut res, "a");
        let b = compute_node(&mut res, "b");
        let c = compute_node(&mut res, "c");
        let keys = [a.pass, b.pass, c.pass];

        let mut builder = GraphBuilder::new();
        builder.add_pass(a).add_pass(b).add_pass(c);
        let graph = builder.build().unwrap();

        assert_eq!(graph.execution_order().collect::<Vec<_>>(), keys);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut res = Resources::new();
        let a = compute_node(&mut res, "a");
        let b = compute_node(&mut res, "b");
        let (ka, kb) = (a.pass, b.pass);

        let mut builder = GraphBuilder::new();
        builder.add_pass(a).add_pass(b);
        builder.add_dependency(ka, kb);
        builder.add_dependency(kb, ka);

        match builder.build() {
            Err(GraphError::DependencyCycle(stuck)) => {
                assert_eq!(stuck, vec![ka, kb]);
            }
            _ => panic!("expected a cycle error"),
        }
    }

    #[test]
    fn edge_on_unknown_pass_is_dropped() {
        let mut res = Resources::new();
        let a = compute_node(&mut res, "a");
        let stray = res.import_pass(PassDesc::new(), vk::RenderPass::null());
        let ka = a.pass;

        let mut builder = GraphBuilder::new();
        builder.add_pass(a);
        //neither direction of an edge touching an unknown pass changes the order
        builder.add_dependency(stray, ka);
        builder.add_dependency(ka, stray);
        let graph = builder.build().unwrap();

        assert_eq!(graph.execution_order().collect::<Vec<_>>(), vec![ka]);
    }

    #[test]
    fn single_pass_records_one_pass_scope_and_no_barriers() {
        let mut res = Resources::new();
        let node = graphics_node(&mut res, "tri");

        let mut builder = GraphBuilder::new();
        builder.add_pass(node);
        let graph = builder.build().unwrap();

        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;
        let mut recording = buffer.record(&res, &mut sink).unwrap();
        graph.record(&mut recording, None);
        recording.finish().unwrap();

        let begins = buffer
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BeginRenderPass { .. }))
            .count();
        let ends = buffer
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::EndRenderPass { .. }))
            .count();
        let barriers = buffer
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::TransitionImageLayout { .. }))
            .count();
        assert_eq!((begins, ends, barriers), (1, 1, 0));
        assert!(buffer
            .commands()
            .iter()
            .any(|c| matches!(c, Command::Draw { vertex_count: 3, .. })));
    }

    #[test]
    fn compute_node_dispatches_without_a_pass_scope() {
        let mut res = Resources::new();
        let node = compute_node(&mut res, "post");

        let mut builder = GraphBuilder::new();
        builder.add_pass(node);
        let graph = builder.build().unwrap();

        let mut buffer = CommandBuffer::new();
        let mut sink = NoopSink;
        let mut recording = buffer.record(&res, &mut sink).unwrap();
        graph.record(&mut recording, Some(vk::DescriptorSet::null()));
        recording.finish().unwrap();

        assert!(matches!(
            buffer.commands(),
            [
                Command::DebugLabel { .. },
                Command::BindPipeline {
                    bind_point: vk::PipelineBindPoint::COMPUTE,
                    ..
                },
                Command::BindDescriptorSets { .. },
                Command::Dispatch {
                    group_count: [1, 1, 1]
                },
            ]
        ));
    }
}
