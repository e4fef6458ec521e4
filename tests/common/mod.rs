//! Common test fixtures for graph, session, and plan construction
//!
//! Consolidates the graph builders shared by the plan-construction and
//! parallel-execution test files.

#![allow(dead_code)] // not every test binary uses every fixture

use std::sync::Arc;

use streamforge::{
    CpuProvider, DummyAcceleratorProvider, GraphBuilder, GraphView, OpKind, SessionOptions,
    SessionState, TensorId,
};

/// Build a session over the given graph with both providers registered and
/// `num_logic_streams` configured (the inter-op pool is sized from it).
pub fn session_with(graph: GraphView, num_logic_streams: usize) -> SessionState {
    SessionState::new(
        graph,
        vec![
            Arc::new(CpuProvider::new()),
            Arc::new(DummyAcceleratorProvider::new()),
        ],
        SessionOptions::new()
            .with_num_logic_streams(num_logic_streams)
            .with_intra_op_threads(2),
    )
    .expect("session build failed")
}

/// Linear Relu chain, one node per provider type in `providers`.
/// Returns the graph plus the feed and fetch tensor ids.
pub fn relu_chain(providers: &[&str]) -> (GraphView, TensorId, TensorId) {
    let mut g = GraphBuilder::new();
    let feed = g.add_tensor();
    let mut cur = feed;
    for (i, provider) in providers.iter().enumerate() {
        let out = g.add_tensor();
        g.add_node(format!("n{}", i), OpKind::Relu, *provider, vec![cur], out)
            .expect("add_node failed");
        cur = out;
    }
    (g.build().expect("graph build failed"), feed, cur)
}

/// Diamond: a feeds b and c, d joins b and c.
/// Nodes are declared a, b, c, d so the topological order is 0..4.
pub fn diamond(provider: &str) -> (GraphView, TensorId, TensorId) {
    let mut g = GraphBuilder::new();
    let t0 = g.add_tensor();
    let ta = g.add_tensor();
    let tb = g.add_tensor();
    let tc = g.add_tensor();
    let td = g.add_tensor();
    g.add_node("a", OpKind::Relu, provider, vec![t0], ta).unwrap();
    g.add_node("b", OpKind::Relu, provider, vec![ta], tb).unwrap();
    g.add_node("c", OpKind::Relu, provider, vec![ta], tc).unwrap();
    g.add_node("d", OpKind::Add, provider, vec![tb, tc], td)
        .unwrap();
    (g.build().unwrap(), t0, td)
}

/// Six-node two-provider DAG with fan-out and joins:
///
///   m = matmul(x, w)        cpu
///   r = relu(m)             dummy
///   s = add(m, r)           cpu
///   p = mul(r, r)           dummy
///   q = add(s, p)           cpu
///   y = identity(q)         dummy
///
/// Returns the graph, the feed ids (x, w) and the fetch id (y).
pub fn mixed_dag() -> (GraphView, Vec<TensorId>, TensorId) {
    let mut g = GraphBuilder::new();
    let x = g.add_tensor();
    let w = g.add_tensor();
    let m = g.add_tensor();
    let r = g.add_tensor();
    let s = g.add_tensor();
    let p = g.add_tensor();
    let q = g.add_tensor();
    let y = g.add_tensor();
    g.add_node("matmul", OpKind::MatMul, "cpu", vec![x, w], m)
        .unwrap();
    g.add_node("relu", OpKind::Relu, "dummy", vec![m], r).unwrap();
    g.add_node("skip_add", OpKind::Add, "cpu", vec![m, r], s)
        .unwrap();
    g.add_node("square", OpKind::Mul, "dummy", vec![r, r], p)
        .unwrap();
    g.add_node("join_add", OpKind::Add, "cpu", vec![s, p], q)
        .unwrap();
    g.add_node("output", OpKind::Identity, "dummy", vec![q], y)
        .unwrap();
    (g.build().unwrap(), vec![x, w], y)
}
