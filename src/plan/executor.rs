//! Plan dispatch.
//!
//! Each inference call builds a frame and an execution context, schedules
//! all but one logic stream onto the inter-op pool, runs the last stream on
//! the calling thread, and joins through single-shot spin barriers. The
//! inter-op pool is small and stream run times are long relative to the
//! join, so the barriers busy-wait with a pause hint instead of parking.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ForgeResult;
use crate::frame::ExecutionFrame;
use crate::graph::TensorId;
use crate::plan::context::ExecutionContext;
use crate::plan::ParallelExecutionPlan;
use crate::session::SessionState;
use crate::stream::DeviceStream;
use crate::tensor::Tensor;

/// Single-shot completion flag for one scheduled logic stream.
pub(crate) struct Barrier {
    set: AtomicBool,
}

impl Barrier {
    pub(crate) fn new() -> Self {
        Barrier {
            set: AtomicBool::new(false),
        }
    }

    pub(crate) fn set(&self) {
        self.set.store(true, Ordering::Release);
    }

    pub(crate) fn wait(&self) {
        while !self.set.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
    }
}

/// A worker panic must not strand peers spinning on barriers or
/// notifications that will never be set, so it takes the process down.
struct AbortOnPanic;

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("logic stream worker panicked; aborting");
            std::process::abort();
        }
    }
}

impl ParallelExecutionPlan {
    /// Run one inference call.
    ///
    /// `feeds` are bound to `feed_ids` in the frame; on success `fetches`
    /// holds the tensors for `fetch_ids`, in order.
    pub fn execute(
        &self,
        session: &SessionState,
        feed_ids: &[TensorId],
        feeds: Vec<Tensor>,
        fetch_ids: &[TensorId],
        fetches: &mut Vec<Tensor>,
    ) -> ForgeResult<()> {
        let frame = ExecutionFrame::new(session.graph(), feed_ids, feeds, fetch_ids)?;
        let notification_owners: Vec<&DeviceStream> = self
            .notification_owners
            .iter()
            .map(|owner| self.device_stream(*owner))
            .collect();
        let ctx = ExecutionContext::new(session, &frame, &notification_owners)?;

        let k = self.num_logic_streams;
        let barriers: Vec<Barrier> = (0..k - 1).map(|_| Barrier::new()).collect();

        // in_place_scope keeps this body on the calling thread; only the
        // first K-1 streams go to the pool. Scheduled streams spin on each
        // other's notifications, so each needs its own pool thread - the
        // planner verified the pool is large enough.
        session.inter_op_pool().in_place_scope(|scope| {
            for (logic_stream, barrier) in self.logic_streams[..k - 1].iter().zip(&barriers) {
                let ctx = &ctx;
                scope.spawn(move |_| {
                    let _abort_guard = AbortOnPanic;
                    logic_stream.run(ctx);
                    barrier.set();
                });
            }

            // Run the last stream on the calling thread.
            self.logic_streams[k - 1].run(&ctx);

            for barrier in &barriers {
                barrier.wait();
            }
        });

        frame.get_outputs(fetches)
    }
}
