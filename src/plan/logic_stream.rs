//! Logic streams and their command sequences.
//!
//! A logic stream is a scheduling lane: a FIFO list of commands dispatched
//! by one host thread and fanned out to the device streams it owns. The
//! commands capture their bindings by value (handler, stream handle,
//! notification index); per-invocation state arrives through the execution
//! context at call time.

use crate::graph::NodeIndex;
use crate::kernel::KernelContext;
use crate::plan::context::ExecutionContext;
use crate::stream::registry::{NotifyFn, WaitFn};
use crate::stream::{DeviceStream, StreamHandle};

/// One command in a logic stream's sequence.
pub(crate) enum Command {
    /// Make `stream` wait until notification `notification` is recorded.
    Wait {
        wait_fn: WaitFn,
        stream: StreamHandle,
        notification: usize,
    },
    /// Launch the kernel for `node` against the current frame.
    Compute { node: NodeIndex },
    /// Record notification `notification` on its owning device stream.
    Notify {
        notify_fn: NotifyFn,
        notification: usize,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Wait {
                stream,
                notification,
                ..
            } => f
                .debug_struct("Wait")
                .field("stream", stream)
                .field("notification", notification)
                .finish(),
            Command::Compute { node } => {
                f.debug_struct("Compute").field("node", node).finish()
            }
            Command::Notify { notification, .. } => f
                .debug_struct("Notify")
                .field("notification", notification)
                .finish(),
        }
    }
}

impl Command {
    pub(crate) fn kind(&self) -> CommandKind {
        match self {
            Command::Wait { notification, .. } => CommandKind::Wait {
                notification: *notification,
            },
            Command::Compute { node } => CommandKind::Compute { node: *node },
            Command::Notify { notification, .. } => CommandKind::Notify {
                notification: *notification,
            },
        }
    }

    pub(crate) fn run(&self, ctx: &ExecutionContext<'_>) {
        match self {
            Command::Wait {
                wait_fn,
                stream,
                notification,
            } => {
                wait_fn(*stream, ctx.notification_handle(*notification));
            }
            Command::Compute { node } => {
                let kernel = match ctx.session().kernel(*node) {
                    Some(kernel) => kernel,
                    None => {
                        tracing::error!(node = node.0, "no kernel bound for node");
                        panic!("no kernel bound for node {}", node.0);
                    }
                };
                if kernel.node() != *node {
                    tracing::error!(
                        node = node.0,
                        kernel_node = kernel.node().0,
                        "kernel bound to a different node"
                    );
                    panic!(
                        "kernel for node {} dispatched for node {}",
                        kernel.node().0,
                        node.0
                    );
                }
                let kernel_ctx =
                    KernelContext::new(ctx.frame(), ctx.session().intra_op_pool());
                // A kernel failure is fatal: peer streams may hold devices
                // in an undefined state and cannot be unwound.
                if let Err(err) = kernel.compute(&kernel_ctx) {
                    tracing::error!(node = node.0, error = %err, "kernel compute failed");
                    panic!("kernel compute failed on node {}: {}", node.0, err);
                }
            }
            Command::Notify {
                notify_fn,
                notification,
            } => {
                notify_fn(ctx.notification_handle(*notification));
            }
        }
    }
}

/// Externally observable shape of a command, for schedule inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Wait { notification: usize },
    Compute { node: NodeIndex },
    Notify { notification: usize },
}

/// An in-order command lane bound to one or more device streams.
///
/// A logic stream may host nodes of several providers, so it can own one
/// device stream per provider instance. With a single logic stream the plan
/// degenerates to the sequential executor.
#[derive(Debug)]
pub(crate) struct LogicStream {
    pub(crate) device_streams: Vec<DeviceStream>,
    pub(crate) commands: Vec<Command>,
}

impl LogicStream {
    pub(crate) fn new() -> Self {
        LogicStream {
            device_streams: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Run the command list FIFO, then flush every device stream in
    /// insertion order.
    pub(crate) fn run(&self, ctx: &ExecutionContext<'_>) {
        for command in &self.commands {
            command.run(ctx);
        }
        for device_stream in &self.device_streams {
            (device_stream.flush_fn)(device_stream.handle());
        }
    }
}

impl Drop for LogicStream {
    fn drop(&mut self) {
        // Release device streams in reverse insertion order.
        while let Some(device_stream) = self.device_streams.pop() {
            (device_stream.release_fn)(device_stream.handle());
        }
    }
}
