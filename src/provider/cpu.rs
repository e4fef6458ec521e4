//! Host execution provider.
//!
//! CPU kernels run synchronously on the dispatching logic-stream thread, so
//! the device stream is a trivial submission queue and flush is a no-op.
//! Notifications are host events; waits are host spins.

use std::sync::Arc;

use crate::provider::ExecutionProvider;
use crate::stream::registry::{ProviderStreamHandles, StreamCommandRegistry};
use crate::stream::{HostEvent, NotificationHandle, StreamHandle};

pub const CPU_PROVIDER_TYPE: &str = "cpu";

/// Payload behind a CPU stream handle. Work submitted to a CPU stream runs
/// inline, so there is nothing to queue.
#[derive(Debug, Default)]
struct CpuStream;

/// Host execution provider.
#[derive(Debug, Default)]
pub struct CpuProvider;

impl CpuProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionProvider for CpuProvider {
    fn provider_type(&self) -> &str {
        CPU_PROVIDER_TYPE
    }

    fn register_stream_handlers(&self, registry: &mut StreamCommandRegistry) {
        let handles = ProviderStreamHandles {
            create_stream: Arc::new(|| StreamHandle::from_box(Box::new(CpuStream))),
            release_stream: Arc::new(|handle| {
                // SAFETY: CPU stream handles are created with a CpuStream
                // payload above and released exactly once.
                unsafe { drop(handle.into_box::<CpuStream>()) }
            }),
            flush_stream: Arc::new(|_handle| {
                // host work was submitted synchronously, nothing pending
            }),
            create_notification: Arc::new(|_stream| {
                NotificationHandle::from_box(Box::new(HostEvent::new()))
            }),
            release_notification: Arc::new(|handle| {
                // SAFETY: CPU notifications are created with a HostEvent
                // payload above and released exactly once.
                unsafe { drop(handle.into_box::<HostEvent>()) }
            }),
            notify: Arc::new(|handle| {
                // SAFETY: CPU notifications carry a HostEvent payload.
                unsafe { handle.payload::<HostEvent>() }.signal()
            }),
        };
        registry.register_provider(CPU_PROVIDER_TYPE, handles);

        // cpu consumer waiting on a cpu-produced notification: host spin.
        registry.register_wait_fn(
            CPU_PROVIDER_TYPE,
            CPU_PROVIDER_TYPE,
            Arc::new(|_stream, notification| {
                // SAFETY: CPU notifications carry a HostEvent payload.
                unsafe { notification.payload::<HostEvent>() }.wait()
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_provider_registers_handlers_and_wait_bridge() {
        let mut registry = StreamCommandRegistry::new();
        CpuProvider::new().register_stream_handlers(&mut registry);

        assert!(registry.is_registered(CPU_PROVIDER_TYPE));
        assert!(registry
            .wait_fn(CPU_PROVIDER_TYPE, CPU_PROVIDER_TYPE)
            .is_ok());
    }

    #[test]
    fn test_cpu_notification_round_trip() {
        let mut registry = StreamCommandRegistry::new();
        CpuProvider::new().register_stream_handlers(&mut registry);

        let create_stream = registry.create_stream_fn(CPU_PROVIDER_TYPE).unwrap();
        let release_stream = registry.release_stream_fn(CPU_PROVIDER_TYPE).unwrap();
        let create_notification = registry
            .create_notification_fn(CPU_PROVIDER_TYPE)
            .unwrap();
        let release_notification = registry
            .release_notification_fn(CPU_PROVIDER_TYPE)
            .unwrap();
        let notify = registry.notify_fn(CPU_PROVIDER_TYPE).unwrap();
        let wait = registry
            .wait_fn(CPU_PROVIDER_TYPE, CPU_PROVIDER_TYPE)
            .unwrap();

        let stream = create_stream();
        let notification = create_notification(stream);
        notify(notification);
        // already signaled, returns immediately
        wait(stream, notification);

        release_notification(notification);
        release_stream(stream);
    }
}
