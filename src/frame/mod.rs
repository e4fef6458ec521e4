//! Per-inference tensor storage.
//!
//! The frame holds one write-once slot per graph tensor. Feeds are bound at
//! construction; every other slot is written by exactly one kernel, so the
//! slots need no locking. Cross-stream visibility is established by the
//! notification waits the plan inserts before any consumer runs.

use once_cell::sync::OnceCell;

use crate::error::{ForgeResult, StreamForgeError};
use crate::graph::{GraphView, TensorId};
use crate::tensor::Tensor;

/// Per-call tensor storage shared by all logic streams.
pub struct ExecutionFrame {
    values: Vec<OnceCell<Tensor>>,
    fetch_ids: Vec<TensorId>,
}

impl ExecutionFrame {
    /// Build a frame for one inference call, binding `feeds` to `feed_ids`
    /// and remembering `fetch_ids` for output extraction.
    pub fn new(
        graph: &GraphView,
        feed_ids: &[TensorId],
        feeds: Vec<Tensor>,
        fetch_ids: &[TensorId],
    ) -> ForgeResult<Self> {
        if feed_ids.len() != feeds.len() {
            return Err(StreamForgeError::FrameFailure(format!(
                "{} feed ids but {} feed values",
                feed_ids.len(),
                feeds.len()
            )));
        }
        for id in feed_ids.iter().chain(fetch_ids) {
            if id.0 >= graph.num_tensors() {
                return Err(StreamForgeError::FrameFailure(format!(
                    "tensor id {} out of range (graph has {} tensors)",
                    id.0,
                    graph.num_tensors()
                )));
            }
        }

        let values: Vec<OnceCell<Tensor>> =
            (0..graph.num_tensors()).map(|_| OnceCell::new()).collect();
        let frame = ExecutionFrame {
            values,
            fetch_ids: fetch_ids.to_vec(),
        };
        for (id, tensor) in feed_ids.iter().zip(feeds) {
            frame.set_value(*id, tensor)?;
        }
        Ok(frame)
    }

    /// Read a tensor. Errors if it has not been produced yet, which at
    /// execution time means a scheduling bug (a consumer ran without its
    /// cross-stream wait).
    pub(crate) fn value(&self, id: TensorId) -> ForgeResult<&Tensor> {
        self.values
            .get(id.0)
            .and_then(|cell| cell.get())
            .ok_or_else(|| {
                StreamForgeError::Internal(format!(
                    "tensor {} read before it was produced",
                    id.0
                ))
            })
    }

    /// Publish a tensor into its slot. Each slot accepts exactly one write.
    pub(crate) fn set_value(&self, id: TensorId, tensor: Tensor) -> ForgeResult<()> {
        let cell = self.values.get(id.0).ok_or_else(|| {
            StreamForgeError::Internal(format!("tensor id {} out of range", id.0))
        })?;
        cell.set(tensor).map_err(|_| {
            StreamForgeError::Internal(format!("tensor {} produced twice", id.0))
        })
    }

    /// Extract the fetch tensors, in fetch-declaration order.
    pub fn get_outputs(&self, fetches: &mut Vec<Tensor>) -> ForgeResult<()> {
        fetches.clear();
        for id in &self.fetch_ids {
            let tensor = self
                .values
                .get(id.0)
                .and_then(|cell| cell.get())
                .ok_or_else(|| {
                    StreamForgeError::FrameFailure(format!(
                        "output tensor {} was never produced",
                        id.0
                    ))
                })?;
            fetches.push(tensor.clone());
        }
        Ok(())
    }
}
