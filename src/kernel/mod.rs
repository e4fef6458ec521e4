//! Op kernels and the per-command kernel context.
//!
//! Kernels are looked up by node at session build time and invoked by the
//! compute commands of a plan. Each kernel owns its node's tensor bindings;
//! the context only provides frame access and the intra-op thread pool.

use std::fmt;

use rayon::prelude::*;

use crate::error::{ForgeResult, StreamForgeError};
use crate::frame::ExecutionFrame;
use crate::graph::{Node, NodeIndex, TensorId};
use crate::tensor::Tensor;

/// Operation kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Mul,
    Relu,
    MatMul,
    Identity,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::Add => "Add",
            OpKind::Mul => "Mul",
            OpKind::Relu => "Relu",
            OpKind::MatMul => "MatMul",
            OpKind::Identity => "Identity",
        };
        write!(f, "{}", s)
    }
}

/// Per-command kernel invocation context.
///
/// Built fresh for every compute command against the current execution
/// frame; kernels must not retain it.
pub struct KernelContext<'a> {
    frame: &'a ExecutionFrame,
    intra_op_pool: &'a rayon::ThreadPool,
}

impl<'a> KernelContext<'a> {
    pub(crate) fn new(frame: &'a ExecutionFrame, intra_op_pool: &'a rayon::ThreadPool) -> Self {
        KernelContext {
            frame,
            intra_op_pool,
        }
    }

    /// Resolve an input tensor from the frame.
    pub fn input(&self, id: TensorId) -> ForgeResult<&Tensor> {
        self.frame.value(id)
    }

    /// Publish the output tensor into the frame.
    pub fn produce(&self, id: TensorId, tensor: Tensor) -> ForgeResult<()> {
        self.frame.set_value(id, tensor)
    }

    /// Thread pool for parallelism inside a single kernel.
    pub fn intra_op_pool(&self) -> &rayon::ThreadPool {
        self.intra_op_pool
    }
}

/// A compiled kernel bound to one graph node.
pub trait OpKernel: Send + Sync {
    /// The node this kernel was built for.
    fn node(&self) -> NodeIndex;

    /// Run the kernel against the current frame. A non-OK result is fatal
    /// to the inference call.
    fn compute(&self, ctx: &KernelContext<'_>) -> ForgeResult<()>;
}

/// Instantiate the kernel for a node. Arity is checked here so execution
/// never sees a malformed binding.
pub(crate) fn build_kernel(index: NodeIndex, node: &Node) -> ForgeResult<Box<dyn OpKernel>> {
    let arity = |expected: usize| -> ForgeResult<()> {
        if node.inputs().len() != expected {
            return Err(StreamForgeError::InvalidGraph(format!(
                "node {} ({}) expects {} inputs, got {}",
                index.0,
                node.op(),
                expected,
                node.inputs().len()
            )));
        }
        Ok(())
    };

    match node.op() {
        OpKind::Add | OpKind::Mul => {
            arity(2)?;
            Ok(Box::new(BinaryElementwiseKernel {
                node: index,
                op: node.op(),
                lhs: node.inputs()[0],
                rhs: node.inputs()[1],
                output: node.output(),
            }))
        }
        OpKind::Relu => {
            arity(1)?;
            Ok(Box::new(ReluKernel {
                node: index,
                input: node.inputs()[0],
                output: node.output(),
            }))
        }
        OpKind::Identity => {
            arity(1)?;
            Ok(Box::new(IdentityKernel {
                node: index,
                input: node.inputs()[0],
                output: node.output(),
            }))
        }
        OpKind::MatMul => {
            arity(2)?;
            Ok(Box::new(MatMulKernel {
                node: index,
                lhs: node.inputs()[0],
                rhs: node.inputs()[1],
                output: node.output(),
            }))
        }
    }
}

struct BinaryElementwiseKernel {
    node: NodeIndex,
    op: OpKind,
    lhs: TensorId,
    rhs: TensorId,
    output: TensorId,
}

impl OpKernel for BinaryElementwiseKernel {
    fn node(&self) -> NodeIndex {
        self.node
    }

    fn compute(&self, ctx: &KernelContext<'_>) -> ForgeResult<()> {
        let lhs = ctx.input(self.lhs)?;
        let rhs = ctx.input(self.rhs)?;
        if lhs.shape() != rhs.shape() {
            return Err(StreamForgeError::KernelFailure {
                node: self.node.0,
                reason: format!(
                    "{} operand shapes differ: {:?} vs {:?}",
                    self.op,
                    lhs.shape(),
                    rhs.shape()
                ),
            });
        }
        let data: Vec<f32> = match self.op {
            OpKind::Add => lhs
                .data()
                .iter()
                .zip(rhs.data())
                .map(|(a, b)| a + b)
                .collect(),
            OpKind::Mul => lhs
                .data()
                .iter()
                .zip(rhs.data())
                .map(|(a, b)| a * b)
                .collect(),
            _ => unreachable!("binary kernel built for non-binary op"),
        };
        let shape = lhs.shape().to_vec();
        ctx.produce(self.output, Tensor::new(data, shape)?)
    }
}

struct ReluKernel {
    node: NodeIndex,
    input: TensorId,
    output: TensorId,
}

impl OpKernel for ReluKernel {
    fn node(&self) -> NodeIndex {
        self.node
    }

    fn compute(&self, ctx: &KernelContext<'_>) -> ForgeResult<()> {
        let input = ctx.input(self.input)?;
        let data: Vec<f32> = input.data().iter().map(|v| v.max(0.0)).collect();
        let shape = input.shape().to_vec();
        ctx.produce(self.output, Tensor::new(data, shape)?)
    }
}

struct IdentityKernel {
    node: NodeIndex,
    input: TensorId,
    output: TensorId,
}

impl OpKernel for IdentityKernel {
    fn node(&self) -> NodeIndex {
        self.node
    }

    fn compute(&self, ctx: &KernelContext<'_>) -> ForgeResult<()> {
        let input = ctx.input(self.input)?.clone();
        ctx.produce(self.output, input)
    }
}

struct MatMulKernel {
    node: NodeIndex,
    lhs: TensorId,
    rhs: TensorId,
    output: TensorId,
}

impl OpKernel for MatMulKernel {
    fn node(&self) -> NodeIndex {
        self.node
    }

    fn compute(&self, ctx: &KernelContext<'_>) -> ForgeResult<()> {
        let lhs = ctx.input(self.lhs)?;
        let rhs = ctx.input(self.rhs)?;
        let (m, k) = match lhs.shape() {
            [m, k] => (*m, *k),
            other => {
                return Err(StreamForgeError::KernelFailure {
                    node: self.node.0,
                    reason: format!("MatMul lhs must be rank 2, got {:?}", other),
                })
            }
        };
        let (k2, n) = match rhs.shape() {
            [k2, n] => (*k2, *n),
            other => {
                return Err(StreamForgeError::KernelFailure {
                    node: self.node.0,
                    reason: format!("MatMul rhs must be rank 2, got {:?}", other),
                })
            }
        };
        if k != k2 {
            return Err(StreamForgeError::KernelFailure {
                node: self.node.0,
                reason: format!("MatMul inner dimensions differ: {} vs {}", k, k2),
            });
        }

        let a = lhs.data();
        let b = rhs.data();
        let mut out = vec![0.0f32; m * n];
        // Rows are independent; the accumulation order within a row is fixed,
        // so results do not depend on the pool size.
        ctx.intra_op_pool().install(|| {
            out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
                for p in 0..k {
                    let a_ip = a[i * k + p];
                    let b_row = &b[p * n..(p + 1) * n];
                    for (j, b_pj) in b_row.iter().enumerate() {
                        row[j] += a_ip * b_pj;
                    }
                }
            });
        });

        ctx.produce(self.output, Tensor::new(out, vec![m, n])?)
    }
}
