//! Computation graph structures and the immutable view consumed by the planner.

use crate::error::{ForgeResult, StreamForgeError};
use crate::kernel::OpKind;

/// Dense tensor identifier within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub usize);

/// Dense node identifier within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub usize);

/// A single operation in the graph, already assigned to an execution provider.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    op: OpKind,
    provider_type: String,
    inputs: Vec<TensorId>,
    output: TensorId,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    /// Type tag of the execution provider this node is assigned to.
    pub fn provider_type(&self) -> &str {
        &self.provider_type
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn output(&self) -> TensorId {
        self.output
    }
}

/// Builder for [`GraphView`].
///
/// Tensors are declared first, then nodes over them. `build` validates the
/// graph (single producer per tensor, no cycles) and freezes the view.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    num_tensors: usize,
    nodes: Vec<Node>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new tensor and return its id.
    pub fn add_tensor(&mut self) -> TensorId {
        let id = TensorId(self.num_tensors);
        self.num_tensors += 1;
        id
    }

    /// Add a node computing `output` from `inputs` on the given provider.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        op: OpKind,
        provider_type: impl Into<String>,
        inputs: Vec<TensorId>,
        output: TensorId,
    ) -> ForgeResult<NodeIndex> {
        for id in inputs.iter().chain(std::iter::once(&output)) {
            if id.0 >= self.num_tensors {
                return Err(StreamForgeError::InvalidGraph(format!(
                    "tensor id {} out of range (graph has {} tensors)",
                    id.0, self.num_tensors
                )));
            }
        }
        let index = NodeIndex(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            op,
            provider_type: provider_type.into(),
            inputs,
            output,
        });
        Ok(index)
    }

    /// Validate the graph and freeze it into an immutable view.
    pub fn build(self) -> ForgeResult<GraphView> {
        GraphView::from_parts(self.num_tensors, self.nodes)
    }
}

/// Immutable graph view: topological order, per-node producer/consumer node
/// lists, and tensor producer lookup. All iteration orders are deterministic
/// (declaration order), which the planner relies on for stable schedules.
#[derive(Debug)]
pub struct GraphView {
    nodes: Vec<Node>,
    num_tensors: usize,
    topo_order: Vec<NodeIndex>,
    input_nodes: Vec<Vec<NodeIndex>>,
    output_nodes: Vec<Vec<NodeIndex>>,
    producers: Vec<Option<NodeIndex>>,
}

impl GraphView {
    fn from_parts(num_tensors: usize, nodes: Vec<Node>) -> ForgeResult<Self> {
        // Single producer per tensor.
        let mut producers: Vec<Option<NodeIndex>> = vec![None; num_tensors];
        for (i, node) in nodes.iter().enumerate() {
            let slot = &mut producers[node.output.0];
            if let Some(prev) = slot {
                return Err(StreamForgeError::InvalidGraph(format!(
                    "tensor {} produced by both node {} and node {}",
                    node.output.0, prev.0, i
                )));
            }
            *slot = Some(NodeIndex(i));
        }

        // Producer nodes per node, in input-declaration order, deduplicated.
        let mut input_nodes: Vec<Vec<NodeIndex>> = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut list: Vec<NodeIndex> = Vec::new();
            for input in &node.inputs {
                if let Some(producer) = producers[input.0] {
                    if !list.contains(&producer) {
                        list.push(producer);
                    }
                }
            }
            input_nodes.push(list);
        }

        // Consumer nodes per node, in node-declaration order, deduplicated.
        let mut output_nodes: Vec<Vec<NodeIndex>> = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for input in &node.inputs {
                if let Some(producer) = producers[input.0] {
                    let consumers = &mut output_nodes[producer.0];
                    if !consumers.contains(&NodeIndex(i)) {
                        consumers.push(NodeIndex(i));
                    }
                }
            }
        }

        // Topological order. Repeatedly scan in index order and pick ready
        // nodes, so the order is deterministic for a given declaration order.
        let mut visited = vec![false; nodes.len()];
        let mut topo_order: Vec<NodeIndex> = Vec::with_capacity(nodes.len());
        while topo_order.len() < nodes.len() {
            let before = topo_order.len();
            for i in 0..nodes.len() {
                if visited[i] {
                    continue;
                }
                if input_nodes[i].iter().all(|p| visited[p.0]) {
                    visited[i] = true;
                    topo_order.push(NodeIndex(i));
                }
            }
            if topo_order.len() == before {
                return Err(StreamForgeError::InvalidGraph(
                    "cycle detected".to_string(),
                ));
            }
        }

        Ok(GraphView {
            nodes,
            num_tensors,
            topo_order,
            input_nodes,
            output_nodes,
            producers,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_tensors(&self) -> usize {
        self.num_tensors
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.0]
    }

    /// Nodes in a deterministic topological order.
    pub fn topological_order(&self) -> &[NodeIndex] {
        &self.topo_order
    }

    /// Nodes producing this node's inputs, in input-declaration order.
    pub fn input_nodes(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.input_nodes[index.0]
    }

    /// Nodes consuming this node's output, in node-declaration order.
    pub fn output_nodes(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.output_nodes[index.0]
    }

    /// The node producing a tensor, if any (feeds have no producer).
    pub fn producer(&self, tensor: TensorId) -> Option<NodeIndex> {
        self.producers.get(tensor.0).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::OpKind;

    fn diamond() -> GraphView {
        // a = relu(t0); b = relu(a); c = relu(a); d = add(b, c)
        let mut g = GraphBuilder::new();
        let t0 = g.add_tensor();
        let ta = g.add_tensor();
        let tb = g.add_tensor();
        let tc = g.add_tensor();
        let td = g.add_tensor();
        g.add_node("a", OpKind::Relu, "cpu", vec![t0], ta).unwrap();
        g.add_node("b", OpKind::Relu, "cpu", vec![ta], tb).unwrap();
        g.add_node("c", OpKind::Relu, "cpu", vec![ta], tc).unwrap();
        g.add_node("d", OpKind::Add, "cpu", vec![tb, tc], td)
            .unwrap();
        g.build().unwrap()
    }

    #[test]
    fn test_topological_order_is_declaration_order_for_dag() {
        let g = diamond();
        let order: Vec<usize> = g.topological_order().iter().map(|n| n.0).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_edge_lists() {
        let g = diamond();
        assert_eq!(g.input_nodes(NodeIndex(0)), &[]);
        assert_eq!(g.output_nodes(NodeIndex(0)), &[NodeIndex(1), NodeIndex(2)]);
        assert_eq!(g.input_nodes(NodeIndex(3)), &[NodeIndex(1), NodeIndex(2)]);
        assert_eq!(g.output_nodes(NodeIndex(3)), &[]);
    }

    #[test]
    fn test_producer_lookup() {
        let g = diamond();
        assert_eq!(g.producer(TensorId(0)), None); // feed
        assert_eq!(g.producer(TensorId(1)), Some(NodeIndex(0)));
        assert_eq!(g.producer(TensorId(4)), Some(NodeIndex(3)));
    }

    #[test]
    fn test_duplicate_producer_rejected() {
        let mut g = GraphBuilder::new();
        let t0 = g.add_tensor();
        let t1 = g.add_tensor();
        g.add_node("a", OpKind::Relu, "cpu", vec![t0], t1).unwrap();
        g.add_node("b", OpKind::Relu, "cpu", vec![t0], t1).unwrap();
        assert!(g.build().is_err());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut g = GraphBuilder::new();
        let t0 = g.add_tensor();
        let t1 = g.add_tensor();
        g.add_node("a", OpKind::Relu, "cpu", vec![t1], t0).unwrap();
        g.add_node("b", OpKind::Relu, "cpu", vec![t0], t1).unwrap();
        assert!(g.build().is_err());
    }

    #[test]
    fn test_tensor_id_out_of_range_rejected() {
        let mut g = GraphBuilder::new();
        let t0 = g.add_tensor();
        let err = g.add_node("a", OpKind::Relu, "cpu", vec![TensorId(9)], t0);
        assert!(err.is_err());
    }
}
