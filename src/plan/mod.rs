//! Parallel execution plan.
//!
//! The planner partitions a graph's nodes into concurrently executable
//! logic streams, binds each logic stream to device streams, computes the
//! minimum set of cross-stream notifications needed to preserve data
//! dependencies, and emits the per-stream command sequences. The plan is
//! immutable once built and is dispatched repeatedly by the executor.

pub mod context;
pub mod executor;
pub mod logic_stream;

pub use logic_stream::CommandKind;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ForgeResult, StreamForgeError};
use crate::graph::NodeIndex;
use crate::plan::logic_stream::{Command, LogicStream};
use crate::provider::ExecutionProvider;
use crate::session::SessionState;
use crate::stream::{registry, DeviceStream};

/// Deterministic assignment of topologically ordered nodes to logic
/// streams. Any total function over topo positions works; the plan is
/// stable as long as the policy is.
pub trait PartitionPolicy: Send + Sync {
    fn stream_for(&self, topo_position: usize, num_streams: usize) -> usize;
}

/// Baseline policy: position modulo stream count.
#[derive(Debug, Default)]
pub struct RoundRobinPartition;

impl PartitionPolicy for RoundRobinPartition {
    fn stream_for(&self, topo_position: usize, num_streams: usize) -> usize {
        topo_position % num_streams
    }
}

/// Identifies a device stream within a plan: logic stream index plus the
/// index into that stream's device-stream list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StreamRef {
    pub(crate) logic: usize,
    pub(crate) device: usize,
}

/// The immutable schedule for one session graph.
#[derive(Debug)]
pub struct ParallelExecutionPlan {
    pub(crate) logic_streams: Vec<LogicStream>,
    pub(crate) num_logic_streams: usize,
    /// Per notification id, the device stream that records it.
    pub(crate) notification_owners: Vec<StreamRef>,
    /// Total map from node index to the device stream executing it.
    pub(crate) node_to_stream: Vec<StreamRef>,
}

impl ParallelExecutionPlan {
    /// Build a plan with the baseline round-robin partition.
    pub fn new(session: &SessionState, num_logic_streams: usize) -> ForgeResult<Self> {
        Self::with_partition_policy(session, num_logic_streams, &RoundRobinPartition)
    }

    /// Build a plan with the session's configured logic-stream count.
    pub fn for_session(session: &SessionState) -> ForgeResult<Self> {
        Self::new(session, session.options().num_logic_streams)
    }

    /// Build a plan with an explicit partition policy.
    pub fn with_partition_policy(
        session: &SessionState,
        num_logic_streams: usize,
        policy: &dyn PartitionPolicy,
    ) -> ForgeResult<Self> {
        if num_logic_streams == 0 {
            return Err(StreamForgeError::Planning(
                "plan requires at least one logic stream".to_string(),
            ));
        }
        if num_logic_streams - 1 > session.inter_op_pool().current_num_threads() {
            return Err(StreamForgeError::Planning(format!(
                "inter-op pool has {} threads, cannot host {} scheduled logic streams",
                session.inter_op_pool().current_num_threads(),
                num_logic_streams - 1
            )));
        }

        // Stream handlers are registered once per provider type, on the
        // first plan construction that sees the type.
        registry::ensure_stream_handlers_registered(session.providers())?;

        let graph = session.graph();
        let k = num_logic_streams;

        // 1. Partition the nodes into logic streams.
        let mut nodes_in_stream: Vec<Vec<NodeIndex>> = vec![Vec::new(); k];
        let mut node_logic_stream: Vec<usize> = vec![0; graph.num_nodes()];
        for (position, &node_index) in graph.topological_order().iter().enumerate() {
            let stream = policy.stream_for(position, k);
            if stream >= k {
                return Err(StreamForgeError::Planning(format!(
                    "partition policy returned stream {} for {} streams",
                    stream, k
                )));
            }
            nodes_in_stream[stream].push(node_index);
            node_logic_stream[node_index.0] = stream;
        }

        // 2. For each node with a consumer in another stream, allocate a
        // notification. Ids are dense, numbered per stream then across
        // streams.
        let mut num_notifications = 0usize;
        let mut node_to_notification: HashMap<NodeIndex, usize> = HashMap::new();
        for stream_nodes in &nodes_in_stream {
            for &node_index in stream_nodes {
                let crosses = graph
                    .output_nodes(node_index)
                    .iter()
                    .any(|consumer| {
                        node_logic_stream[consumer.0] != node_logic_stream[node_index.0]
                    });
                if crosses {
                    node_to_notification.insert(node_index, num_notifications);
                    num_notifications += 1;
                }
            }
        }

        // 3. Bind device streams: one per distinct provider instance per
        // logic stream, in first-use order; fill the node -> stream map.
        let mut logic_streams: Vec<LogicStream> = (0..k).map(|_| LogicStream::new()).collect();
        let mut node_to_stream: Vec<StreamRef> =
            vec![StreamRef { logic: 0, device: 0 }; graph.num_nodes()];
        for (i, stream_nodes) in nodes_in_stream.iter().enumerate() {
            for &node_index in stream_nodes {
                let node = graph.node(node_index);
                let provider = session
                    .provider_for(node.provider_type())
                    .ok_or_else(|| {
                        StreamForgeError::ProviderNotFound(node.provider_type().to_string())
                    })?
                    .clone();
                let device = match find_device_stream(&logic_streams[i], &provider) {
                    Some(device) => device,
                    None => {
                        let create = registry::create_stream_fn(provider.provider_type())?;
                        let flush_fn = registry::flush_stream_fn(provider.provider_type())?;
                        let release_fn = registry::release_stream_fn(provider.provider_type())?;
                        logic_streams[i].device_streams.push(DeviceStream {
                            handle: create(),
                            provider: provider.clone(),
                            flush_fn,
                            release_fn,
                        });
                        logic_streams[i].device_streams.len() - 1
                    }
                };
                node_to_stream[node_index.0] = StreamRef { logic: i, device };
            }
        }

        // 4. Notification owners: the device stream of the producing node,
        // assigned in topological order.
        let mut notification_owners: Vec<StreamRef> =
            vec![StreamRef { logic: 0, device: 0 }; num_notifications];
        for &node_index in graph.topological_order() {
            if let Some(&id) = node_to_notification.get(&node_index) {
                notification_owners[id] = node_to_stream[node_index.0];
            }
        }

        // 5. Emit commands: waits for cross-stream producers (in in-edge
        // order), the kernel launch, then a notify if the node produced a
        // notification.
        let mut all_commands: Vec<Vec<Command>> = Vec::with_capacity(k);
        for (i, stream_nodes) in nodes_in_stream.iter().enumerate() {
            let mut commands: Vec<Command> = Vec::new();
            for &node_index in stream_nodes {
                let node = graph.node(node_index);
                for producer in graph.input_nodes(node_index) {
                    if node_logic_stream[producer.0] == i {
                        continue;
                    }
                    let id = *node_to_notification.get(producer).ok_or_else(|| {
                        StreamForgeError::Planning(format!(
                            "cross-stream producer {} has no notification",
                            producer.0
                        ))
                    })?;
                    let owner = notification_owners[id];
                    let owner_type =
                        device_stream_at(&logic_streams, owner).provider_type().to_string();
                    let wait_fn = registry::wait_fn(&owner_type, node.provider_type())?;
                    let cur = node_to_stream[node_index.0];
                    commands.push(Command::Wait {
                        wait_fn,
                        stream: device_stream_at(&logic_streams, cur).handle(),
                        notification: id,
                    });
                }

                commands.push(Command::Compute { node: node_index });

                if let Some(&id) = node_to_notification.get(&node_index) {
                    let cur = node_to_stream[node_index.0];
                    let notify_fn = registry::notify_fn(
                        device_stream_at(&logic_streams, cur).provider_type(),
                    )?;
                    commands.push(Command::Notify {
                        notify_fn,
                        notification: id,
                    });
                }
            }
            all_commands.push(commands);
        }
        for (logic_stream, commands) in logic_streams.iter_mut().zip(all_commands) {
            logic_stream.commands = commands;
        }

        tracing::debug!(
            num_logic_streams = k,
            notifications = num_notifications,
            "parallel execution plan constructed"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!("\n{}", render_schedule(graph, &nodes_in_stream));
        }

        Ok(ParallelExecutionPlan {
            logic_streams,
            num_logic_streams: k,
            notification_owners,
            node_to_stream,
        })
    }

    pub fn num_logic_streams(&self) -> usize {
        self.num_logic_streams
    }

    pub fn num_notifications(&self) -> usize {
        self.notification_owners.len()
    }

    /// The logic stream a node was partitioned into.
    pub fn logic_stream_of(&self, node: NodeIndex) -> Option<usize> {
        self.node_to_stream.get(node.0).map(|r| r.logic)
    }

    /// The device stream that will execute a node. Used by kernels that
    /// enqueue auxiliary work on the caller's stream.
    pub fn compute_stream_for_node(&self, node: NodeIndex) -> Option<&DeviceStream> {
        self.node_to_stream
            .get(node.0)
            .map(|r| self.device_stream(*r))
    }

    /// Command sequence of one logic stream, as inspectable kinds.
    pub fn commands(&self, stream: usize) -> Option<Vec<CommandKind>> {
        self.logic_streams
            .get(stream)
            .map(|ls| ls.commands.iter().map(Command::kind).collect())
    }

    /// Number of device streams bound to one logic stream.
    pub fn device_stream_count(&self, stream: usize) -> Option<usize> {
        self.logic_streams.get(stream).map(|ls| ls.device_streams.len())
    }

    pub(crate) fn device_stream(&self, r: StreamRef) -> &DeviceStream {
        &self.logic_streams[r.logic].device_streams[r.device]
    }
}

fn find_device_stream(
    logic_stream: &LogicStream,
    provider: &Arc<dyn ExecutionProvider>,
) -> Option<usize> {
    logic_stream
        .device_streams
        .iter()
        .position(|ds| Arc::ptr_eq(ds.provider(), provider))
}

fn device_stream_at(logic_streams: &[LogicStream], r: StreamRef) -> &DeviceStream {
    &logic_streams[r.logic].device_streams[r.device]
}

/// Columnar schedule table: one column per logic stream, one row per node
/// position. Diagnostic only.
fn render_schedule(
    graph: &crate::graph::GraphView,
    nodes_in_stream: &[Vec<NodeIndex>],
) -> String {
    const COLUMN_WIDTH: usize = 24;
    let mut out = String::new();
    for i in 0..nodes_in_stream.len() {
        let header = format!("-- logic stream {}", i);
        out.push_str(&format!("{:<width$}", header, width = COLUMN_WIDTH));
    }
    out.push('\n');
    let rows = nodes_in_stream.iter().map(Vec::len).max().unwrap_or(0);
    for row in 0..rows {
        for column in nodes_in_stream {
            match column.get(row) {
                Some(node) => {
                    out.push_str(&format!(
                        "{:<width$}",
                        graph.node(*node).name(),
                        width = COLUMN_WIDTH
                    ));
                }
                None => out.push_str(&" ".repeat(COLUMN_WIDTH)),
            }
        }
        out.push('\n');
    }
    out
}
