//! Dummy accelerator provider for unit testing.
//!
//! Emulates a GPU-like device without touching real hardware: stream and
//! notification handles carry fake payloads, device-side waits are emulated
//! with host spins, and every registry call is counted so tests can assert
//! handle lifecycles and wait traffic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::provider::{ExecutionProvider, CPU_PROVIDER_TYPE};
use crate::stream::registry::{ProviderStreamHandles, StreamCommandRegistry};
use crate::stream::{HostEvent, NotificationHandle, StreamHandle};

pub const DUMMY_PROVIDER_TYPE: &str = "dummy";

static STREAMS_CREATED: AtomicUsize = AtomicUsize::new(0);
static STREAMS_RELEASED: AtomicUsize = AtomicUsize::new(0);
static STREAMS_FLUSHED: AtomicUsize = AtomicUsize::new(0);
static NOTIFICATIONS_CREATED: AtomicUsize = AtomicUsize::new(0);
static NOTIFICATIONS_RELEASED: AtomicUsize = AtomicUsize::new(0);
static WAITS_OBSERVED: AtomicUsize = AtomicUsize::new(0);

/// Payload behind a dummy stream handle.
#[derive(Debug)]
struct DummyStream {
    id: usize,
}

/// Snapshot of the dummy provider's registry traffic counters.
///
/// Counters are process-global (the registered handlers are), so tests
/// comparing them should take before/after deltas and run serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DummyCounters {
    pub streams_created: usize,
    pub streams_released: usize,
    pub streams_flushed: usize,
    pub notifications_created: usize,
    pub notifications_released: usize,
    pub waits_observed: usize,
}

/// Read the current counter values.
pub fn counters() -> DummyCounters {
    DummyCounters {
        streams_created: STREAMS_CREATED.load(Ordering::SeqCst),
        streams_released: STREAMS_RELEASED.load(Ordering::SeqCst),
        streams_flushed: STREAMS_FLUSHED.load(Ordering::SeqCst),
        notifications_created: NOTIFICATIONS_CREATED.load(Ordering::SeqCst),
        notifications_released: NOTIFICATIONS_RELEASED.load(Ordering::SeqCst),
        waits_observed: WAITS_OBSERVED.load(Ordering::SeqCst),
    }
}

/// Emulated accelerator provider.
#[derive(Debug, Default)]
pub struct DummyAcceleratorProvider;

impl DummyAcceleratorProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionProvider for DummyAcceleratorProvider {
    fn provider_type(&self) -> &str {
        DUMMY_PROVIDER_TYPE
    }

    fn register_stream_handlers(&self, registry: &mut StreamCommandRegistry) {
        let handles = ProviderStreamHandles {
            create_stream: Arc::new(|| {
                let id = STREAMS_CREATED.fetch_add(1, Ordering::SeqCst);
                StreamHandle::from_box(Box::new(DummyStream { id }))
            }),
            release_stream: Arc::new(|handle| {
                // SAFETY: dummy stream handles carry a DummyStream payload
                // and are released exactly once.
                let stream = unsafe { handle.into_box::<DummyStream>() };
                tracing::trace!(stream = stream.id, "dummy stream released");
                STREAMS_RELEASED.fetch_add(1, Ordering::SeqCst);
            }),
            flush_stream: Arc::new(|_handle| {
                STREAMS_FLUSHED.fetch_add(1, Ordering::SeqCst);
            }),
            create_notification: Arc::new(|_stream| {
                NOTIFICATIONS_CREATED.fetch_add(1, Ordering::SeqCst);
                NotificationHandle::from_box(Box::new(HostEvent::new()))
            }),
            release_notification: Arc::new(|handle| {
                // SAFETY: dummy notifications carry a HostEvent payload and
                // are released exactly once.
                unsafe { drop(handle.into_box::<HostEvent>()) };
                NOTIFICATIONS_RELEASED.fetch_add(1, Ordering::SeqCst);
            }),
            notify: Arc::new(|handle| {
                // SAFETY: dummy notifications carry a HostEvent payload.
                unsafe { handle.payload::<HostEvent>() }.signal()
            }),
        };
        registry.register_provider(DUMMY_PROVIDER_TYPE, handles);

        // Device-to-device wait. On real hardware this would enqueue an
        // event wait on the consumer stream; the emulation spins on host.
        registry.register_wait_fn(
            DUMMY_PROVIDER_TYPE,
            DUMMY_PROVIDER_TYPE,
            Arc::new(|_stream, notification| {
                WAITS_OBSERVED.fetch_add(1, Ordering::SeqCst);
                // SAFETY: dummy notifications carry a HostEvent payload.
                unsafe { notification.payload::<HostEvent>() }.wait()
            }),
        );
        // Host consumer waiting on a device-produced notification.
        registry.register_wait_fn(
            DUMMY_PROVIDER_TYPE,
            CPU_PROVIDER_TYPE,
            Arc::new(|_stream, notification| {
                WAITS_OBSERVED.fetch_add(1, Ordering::SeqCst);
                // SAFETY: dummy notifications carry a HostEvent payload.
                unsafe { notification.payload::<HostEvent>() }.wait()
            }),
        );
        // Device consumer waiting on a host-produced notification.
        registry.register_wait_fn(
            CPU_PROVIDER_TYPE,
            DUMMY_PROVIDER_TYPE,
            Arc::new(|_stream, notification| {
                WAITS_OBSERVED.fetch_add(1, Ordering::SeqCst);
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
    fn test_dummy_provider_registers_all_bridges() {
        let mut registry = StreamCommandRegistry::new();
        DummyAcceleratorProvider::new().register_stream_handlers(&mut registry);

        assert!(registry.is_registered(DUMMY_PROVIDER_TYPE));
        assert!(registry
            .wait_fn(DUMMY_PROVIDER_TYPE, DUMMY_PROVIDER_TYPE)
            .is_ok());
        assert!(registry
            .wait_fn(DUMMY_PROVIDER_TYPE, CPU_PROVIDER_TYPE)
            .is_ok());
        assert!(registry
            .wait_fn(CPU_PROVIDER_TYPE, DUMMY_PROVIDER_TYPE)
            .is_ok());
    }

    #[test]
    fn test_dummy_stream_lifecycle_counts() {
        let mut registry = StreamCommandRegistry::new();
        DummyAcceleratorProvider::new().register_stream_handlers(&mut registry);

        let before = counters();
        let create = registry.create_stream_fn(DUMMY_PROVIDER_TYPE).unwrap();
        let release = registry.release_stream_fn(DUMMY_PROVIDER_TYPE).unwrap();
        let flush = registry.flush_stream_fn(DUMMY_PROVIDER_TYPE).unwrap();

        let stream = create();
        flush(stream);
        release(stream);

        let after = counters();
        assert_eq!(after.streams_created, before.streams_created + 1);
        assert_eq!(after.streams_flushed, before.streams_flushed + 1);
        assert_eq!(after.streams_released, before.streams_released + 1);
    }
}
