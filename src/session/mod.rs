//! Session state: the graph, its providers, compiled kernels, and the
//! intra-op / inter-op thread pools.

use std::sync::Arc;

use crate::error::{ForgeResult, StreamForgeError};
use crate::graph::{GraphView, NodeIndex};
use crate::kernel::{self, OpKernel};
use crate::provider::ExecutionProvider;

/// Configuration for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Number of logic streams the plan partitions the graph into
    pub num_logic_streams: usize,

    /// Intra-op thread count (0 = library default)
    pub intra_op_threads: usize,

    /// Inter-op thread count (0 = derived from `num_logic_streams`)
    pub inter_op_threads: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            num_logic_streams: 1,
            intra_op_threads: 0,
            inter_op_threads: 0,
        }
    }
}

impl SessionOptions {
    /// Create session options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of logic streams
    pub fn with_num_logic_streams(mut self, num_logic_streams: usize) -> Self {
        self.num_logic_streams = num_logic_streams;
        self
    }

    /// Set the intra-op thread count
    pub fn with_intra_op_threads(mut self, intra_op_threads: usize) -> Self {
        self.intra_op_threads = intra_op_threads;
        self
    }

    /// Set the inter-op thread count
    pub fn with_inter_op_threads(mut self, inter_op_threads: usize) -> Self {
        self.inter_op_threads = inter_op_threads;
        self
    }

    /// The inter-op pool must be able to host every scheduled logic stream
    /// at once (streams spin on cross-stream notifications, so they cannot
    /// share a pool thread). 0 resolves to K-1.
    fn resolved_inter_op_threads(&self) -> usize {
        if self.inter_op_threads > 0 {
            self.inter_op_threads
        } else {
            self.num_logic_streams.saturating_sub(1).max(1)
        }
    }
}

/// Immutable per-model state consumed by the planner and the executor.
pub struct SessionState {
    graph: GraphView,
    providers: Vec<Arc<dyn ExecutionProvider>>,
    kernels: Vec<Box<dyn OpKernel>>,
    intra_op_pool: rayon::ThreadPool,
    inter_op_pool: rayon::ThreadPool,
    options: SessionOptions,
}

impl SessionState {
    pub fn new(
        graph: GraphView,
        providers: Vec<Arc<dyn ExecutionProvider>>,
        options: SessionOptions,
    ) -> ForgeResult<Self> {
        if options.num_logic_streams == 0 {
            return Err(StreamForgeError::InvalidConfiguration(
                "num_logic_streams must be at least 1".to_string(),
            ));
        }
        for (i, provider) in providers.iter().enumerate() {
            for other in &providers[..i] {
                if other.provider_type() == provider.provider_type() {
                    return Err(StreamForgeError::InvalidConfiguration(format!(
                        "duplicate execution provider type: {}",
                        provider.provider_type()
                    )));
                }
            }
        }

        // Every node must resolve to a provider and a kernel up front, so
        // plan construction and execution never hit a missing binding.
        let mut kernels: Vec<Box<dyn OpKernel>> = Vec::with_capacity(graph.num_nodes());
        for i in 0..graph.num_nodes() {
            let index = NodeIndex(i);
            let node = graph.node(index);
            if !providers
                .iter()
                .any(|p| p.provider_type() == node.provider_type())
            {
                return Err(StreamForgeError::ProviderNotFound(
                    node.provider_type().to_string(),
                ));
            }
            kernels.push(kernel::build_kernel(index, node)?);
        }

        let intra_op_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.intra_op_threads)
            .thread_name(|i| format!("sf-intra-{}", i))
            .build()?;
        let inter_op_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.resolved_inter_op_threads())
            .thread_name(|i| format!("sf-inter-{}", i))
            .build()?;

        Ok(SessionState {
            graph,
            providers,
            kernels,
            intra_op_pool,
            inter_op_pool,
            options,
        })
    }

    pub fn graph(&self) -> &GraphView {
        &self.graph
    }

    pub fn providers(&self) -> &[Arc<dyn ExecutionProvider>] {
        &self.providers
    }

    /// Resolve a provider instance by type tag.
    pub fn provider_for(&self, provider_type: &str) -> Option<&Arc<dyn ExecutionProvider>> {
        self.providers
            .iter()
            .find(|p| p.provider_type() == provider_type)
    }

    /// The kernel compiled for a node.
    pub fn kernel(&self, node: NodeIndex) -> Option<&dyn OpKernel> {
        self.kernels.get(node.0).map(|k| k.as_ref())
    }

    /// Thread pool kernels may use for parallelism inside one compute.
    pub fn intra_op_pool(&self) -> &rayon::ThreadPool {
        &self.intra_op_pool
    }

    /// Thread pool logic streams are scheduled onto.
    pub fn inter_op_pool(&self) -> &rayon::ThreadPool {
        &self.inter_op_pool
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::kernel::OpKind;
    use crate::provider::{CpuProvider, DummyAcceleratorProvider};

    fn single_node_graph(provider_type: &str) -> GraphView {
        let mut g = GraphBuilder::new();
        let t0 = g.add_tensor();
        let t1 = g.add_tensor();
        g.add_node("n", OpKind::Relu, provider_type, vec![t0], t1)
            .unwrap();
        g.build().unwrap()
    }

    #[test]
    fn test_session_options_builder() {
        let options = SessionOptions::new()
            .with_num_logic_streams(4)
            .with_intra_op_threads(2)
            .with_inter_op_threads(8);

        assert_eq!(options.num_logic_streams, 4);
        assert_eq!(options.intra_op_threads, 2);
        assert_eq!(options.inter_op_threads, 8);
    }

    #[test]
    fn test_inter_op_threads_derived_from_stream_count() {
        let options = SessionOptions::new().with_num_logic_streams(4);
        assert_eq!(options.resolved_inter_op_threads(), 3);

        let options = SessionOptions::new().with_num_logic_streams(1);
        assert_eq!(options.resolved_inter_op_threads(), 1);
    }

    #[test]
    fn test_session_build() {
        let session = SessionState::new(
            single_node_graph("cpu"),
            vec![Arc::new(CpuProvider::new())],
            SessionOptions::default(),
        )
        .unwrap();
        assert!(session.kernel(NodeIndex(0)).is_some());
        assert!(session.kernel(NodeIndex(1)).is_none());
        assert!(session.provider_for("cpu").is_some());
        assert!(session.provider_for("dummy").is_none());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = SessionState::new(
            single_node_graph("npu"),
            vec![Arc::new(CpuProvider::new())],
            SessionOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, StreamForgeError::ProviderNotFound(_)));
    }

    #[test]
    fn test_duplicate_provider_type_rejected() {
        let err = SessionState::new(
            single_node_graph("cpu"),
            vec![
                Arc::new(CpuProvider::new()),
                Arc::new(CpuProvider::new()),
            ],
            SessionOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, StreamForgeError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_zero_logic_streams_rejected() {
        let err = SessionState::new(
            single_node_graph("cpu"),
            vec![Arc::new(CpuProvider::new())],
            SessionOptions::new().with_num_logic_streams(0),
        )
        .err()
        .unwrap();
        assert!(matches!(err, StreamForgeError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_multi_provider_session() {
        let mut g = GraphBuilder::new();
        let t0 = g.add_tensor();
        let t1 = g.add_tensor();
        let t2 = g.add_tensor();
        g.add_node("a", OpKind::Relu, "cpu", vec![t0], t1).unwrap();
        g.add_node("b", OpKind::Relu, "dummy", vec![t1], t2)
            .unwrap();
        let session = SessionState::new(
            g.build().unwrap(),
            vec![
                Arc::new(CpuProvider::new()),
                Arc::new(DummyAcceleratorProvider::new()),
            ],
            SessionOptions::default(),
        )
        .unwrap();
        assert!(session.provider_for("dummy").is_some());
    }
}
