//! StreamForge - parallel stream execution for heterogeneous inference graphs
//!
//! StreamForge takes a computation graph whose nodes are already assigned
//! to execution providers (CPU, GPU-like accelerators), partitions the
//! nodes into concurrently executable logic streams, binds each logic
//! stream to per-provider device streams, inserts the cross-stream
//! notifications needed to preserve data dependencies, and dispatches the
//! resulting command schedule at inference time.

#![allow(clippy::type_complexity)] // Handler tables carry shared fn-object types

pub mod error;
pub mod frame;
pub mod graph;
pub mod kernel;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod session;
pub mod stream;
pub mod tensor;

pub use error::{ErrorKind, ForgeResult, StreamForgeError};
pub use frame::ExecutionFrame;
pub use graph::{GraphBuilder, GraphView, NodeIndex, TensorId};
pub use kernel::{KernelContext, OpKernel, OpKind};
pub use logging::init_logging;
pub use plan::{CommandKind, ParallelExecutionPlan, PartitionPolicy, RoundRobinPartition};
pub use provider::{
    CpuProvider, DummyAcceleratorProvider, ExecutionProvider, CPU_PROVIDER_TYPE,
    DUMMY_PROVIDER_TYPE,
};
pub use session::{SessionOptions, SessionState};
pub use stream::{DeviceStream, Notification};
pub use tensor::Tensor;
