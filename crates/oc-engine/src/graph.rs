//! The audio graph: nodes, connections and frame rendering.

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SecondaryMap, SlotMap};

use crate::frame::Frame;
use crate::node::{Node, ParamKind};
use crate::param::AudioParam;

new_key_type! {
    /// Handle to a node in an [`AudioGraph`].
    pub struct NodeId;
}

/// Graph shared between the control side and the render thread.
pub type SharedGraph = Arc<Mutex<AudioGraph>>;

/// Error type for graph edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node id no longer exists
    UnknownNode,
    /// The connection would create a cycle
    Cycle,
    /// The destination has no output
    DestinationOutput,
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::UnknownNode => write!(f, "Unknown graph node"),
            GraphError::Cycle => write!(f, "Connection would create a cycle"),
            GraphError::DestinationOutput => write!(f, "Destination node cannot feed other nodes"),
        }
    }
}

impl std::error::Error for GraphError {}

/// A directed connection between two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
}

/// Render step: a node and the nodes summed into its input.
#[derive(Clone, Debug)]
struct Step {
    node: NodeId,
    inputs: Vec<NodeId>,
}

/// A graph of processing nodes rendered one frame at a time.
///
/// The audio clock is the number of rendered frames over the sample rate.
pub struct AudioGraph {
    nodes: SlotMap<NodeId, Node>,
    connections: Vec<Connection>,
    destination: NodeId,
    sample_rate: u32,
    frames_rendered: u64,
    plan: Vec<Step>,
    plan_dirty: bool,
    outputs: SecondaryMap<NodeId, (f32, f32)>,
}

impl AudioGraph {
    /// Create a graph holding only the destination node.
    pub fn new(sample_rate: u32) -> Self {
        let mut nodes = SlotMap::with_key();
        let destination = nodes.insert(Node::Destination);
        Self {
            nodes,
            connections: Vec::new(),
            destination,
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            plan: Vec::new(),
            plan_dirty: true,
            outputs: SecondaryMap::new(),
        }
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds on the audio clock.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        self.plan_dirty = true;
        self.nodes.insert(node)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn param_mut(&mut self, id: NodeId, kind: ParamKind) -> Option<&mut AudioParam> {
        self.nodes.get_mut(id)?.param_mut(kind)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Connect `from`'s output into `to`'s input. Duplicate edges are ignored.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return Err(GraphError::UnknownNode);
        }
        if from == self.destination {
            return Err(GraphError::DestinationOutput);
        }
        if from == to || self.reaches(to, from) {
            return Err(GraphError::Cycle);
        }
        let conn = Connection { from, to };
        if !self.connections.contains(&conn) {
            self.connections.push(conn);
            self.plan_dirty = true;
        }
        Ok(())
    }

    pub fn disconnect(&mut self, from: NodeId, to: NodeId) {
        let before = self.connections.len();
        self.connections.retain(|c| !(c.from == from && c.to == to));
        self.plan_dirty |= before != self.connections.len();
    }

    /// Remove every outgoing connection of `id`.
    pub fn disconnect_all(&mut self, id: NodeId) {
        let before = self.connections.len();
        self.connections.retain(|c| c.from != id);
        self.plan_dirty |= before != self.connections.len();
    }

    /// Remove a node and its connections. The destination cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        if id == self.destination {
            return None;
        }
        let node = self.nodes.remove(id)?;
        self.connections.retain(|c| c.from != id && c.to != id);
        self.outputs.remove(id);
        self.plan_dirty = true;
        Some(node)
    }

    /// Collapse finished automation on every node.
    pub fn prune_automation(&mut self, now: f64) {
        for node in self.nodes.values_mut() {
            node.prune(now);
        }
    }

    /// Render one frame and advance the audio clock.
    pub fn render_frame(&mut self) -> (f32, f32) {
        if self.plan_dirty {
            self.rebuild_plan();
        }
        let t = self.current_time();
        let sr = self.sample_rate as f64;
        for step in &self.plan {
            let mut input = (0.0, 0.0);
            for &src in &step.inputs {
                if let Some(&(l, r)) = self.outputs.get(src) {
                    input.0 += l;
                    input.1 += r;
                }
            }
            if let Some(node) = self.nodes.get_mut(step.node) {
                let out = node.process(input, t, sr);
                self.outputs.insert(step.node, out);
            }
        }
        self.frames_rendered += 1;
        self.outputs.get(self.destination).copied().unwrap_or((0.0, 0.0))
    }

    /// Render `out.len()` frames as 16-bit output.
    pub fn render(&mut self, out: &mut [Frame]) {
        for frame in out.iter_mut() {
            let (l, r) = self.render_frame();
            *frame = Frame::from_f32(l, r);
        }
    }

    /// Whether a path leads from `from` to `to`.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = SecondaryMap::<NodeId, ()>::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if seen.insert(id, ()).is_some() {
                continue;
            }
            stack.extend(self.connections.iter().filter(|c| c.from == id).map(|c| c.to));
        }
        false
    }

    /// Topological order via Kahn's algorithm, sources first.
    fn rebuild_plan(&mut self) {
        let mut in_degree: SecondaryMap<NodeId, u32> =
            self.nodes.keys().map(|id| (id, 0)).collect();
        for conn in &self.connections {
            if let Some(d) = in_degree.get_mut(conn.to) {
                *d += 1;
            }
        }

        let mut queue: Vec<NodeId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id)
            .collect();
        let mut plan = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop() {
            let inputs = self
                .connections
                .iter()
                .filter(|c| c.to == id)
                .map(|c| c.from)
                .collect();
            plan.push(Step { node: id, inputs });
            for conn in self.connections.iter().filter(|c| c.from == id) {
                if let Some(d) = in_degree.get_mut(conn.to) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push(conn.to);
                    }
                }
            }
        }

        self.plan = plan;
        self.plan_dirty = false;
    }
}
