//! Opaque device stream and notification primitives.
//!
//! A device stream is an asynchronous command queue owned by a logic
//! stream; a notification is a single-shot synchronization event recorded
//! on one device stream and waited on by others. Both are represented as
//! tagged opaque handles: the payload type is provider-defined and the
//! registry dispatches every operation by provider type.

pub mod registry;

use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::provider::ExecutionProvider;
use crate::stream::registry::{FlushStreamFn, ReleaseStreamFn};

// SAFETY: StreamHandle is Send+Sync because it only carries a raw pointer
// whose payload is owned by the creating provider; all access goes through
// the provider's registered handlers, which serialize appropriately.
// NOTE: handles are Copy tokens, not owners - release goes through the
// registry exactly once, driven by the owning logic stream.
unsafe impl Send for StreamHandle {}
unsafe impl Sync for StreamHandle {}

/// Opaque handle to a provider-owned device stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle(*mut c_void);

impl StreamHandle {
    /// Wrap a provider payload into an opaque handle.
    pub fn from_box<T>(payload: Box<T>) -> Self {
        StreamHandle(Box::into_raw(payload) as *mut c_void)
    }

    /// Reclaim the payload for release.
    ///
    /// # Safety
    /// `T` must be the payload type this handle was created with, and the
    /// handle must not be used afterwards.
    pub unsafe fn into_box<T>(self) -> Box<T> {
        Box::from_raw(self.0 as *mut T)
    }

    /// Borrow the payload.
    ///
    /// # Safety
    /// `T` must be the payload type this handle was created with, and the
    /// handle must not have been released.
    pub unsafe fn payload<T>(&self) -> &T {
        &*(self.0 as *const T)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

// SAFETY: same reasoning as StreamHandle - the payload is only touched
// through the owning provider's registered handlers.
unsafe impl Send for NotificationHandle {}
unsafe impl Sync for NotificationHandle {}

/// Opaque handle to a provider-owned notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationHandle(*mut c_void);

impl NotificationHandle {
    /// Wrap a provider payload into an opaque handle.
    pub fn from_box<T>(payload: Box<T>) -> Self {
        NotificationHandle(Box::into_raw(payload) as *mut c_void)
    }

    /// Reclaim the payload for release.
    ///
    /// # Safety
    /// `T` must be the payload type this handle was created with, and the
    /// handle must not be used afterwards.
    pub unsafe fn into_box<T>(self) -> Box<T> {
        Box::from_raw(self.0 as *mut T)
    }

    /// Borrow the payload.
    ///
    /// # Safety
    /// `T` must be the payload type this handle was created with, and the
    /// handle must not have been released.
    pub unsafe fn payload<T>(&self) -> &T {
        &*(self.0 as *const T)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

/// A device stream bound into a logic stream.
///
/// The flush and release handlers are resolved from the registry when the
/// stream is created, so the execution path never takes the registry lock.
pub struct DeviceStream {
    pub(crate) handle: StreamHandle,
    pub(crate) provider: Arc<dyn ExecutionProvider>,
    pub(crate) flush_fn: FlushStreamFn,
    pub(crate) release_fn: ReleaseStreamFn,
}

impl DeviceStream {
    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn provider(&self) -> &Arc<dyn ExecutionProvider> {
        &self.provider
    }

    pub fn provider_type(&self) -> &str {
        self.provider.provider_type()
    }
}

impl fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStream")
            .field("handle", &self.handle)
            .field("provider", &self.provider.provider_type())
            .finish()
    }
}

/// A per-inference notification, owned by the execution context.
pub struct Notification {
    pub(crate) handle: NotificationHandle,
    pub(crate) provider: Arc<dyn ExecutionProvider>,
}

impl Notification {
    pub fn handle(&self) -> NotificationHandle {
        self.handle
    }

    /// The provider of the device stream that records this notification.
    pub fn provider(&self) -> &Arc<dyn ExecutionProvider> {
        &self.provider
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("handle", &self.handle)
            .field("provider", &self.provider.provider_type())
            .finish()
    }
}

/// Host-side single-shot event.
///
/// Used as the notification payload by host providers and by the emulated
/// accelerator: `signal` publishes with release ordering and `wait` spins
/// with acquire ordering, so tensor writes made before `signal` are visible
/// to any thread that returns from `wait`.
#[derive(Debug, Default)]
pub struct HostEvent {
    signaled: AtomicBool,
}

impl HostEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Spin until signaled, with a CPU pause hint.
    pub fn wait(&self) {
        while !self.signaled.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
    }
}
