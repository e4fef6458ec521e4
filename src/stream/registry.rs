//! Process-wide stream command registry.
//!
//! A capability table keyed by provider type. Each execution provider
//! registers its stream handlers once per process; the planner and the
//! execution context resolve handlers from here and capture them by value,
//! so the registry holds no per-call state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::{ForgeResult, StreamForgeError};
use crate::provider::ExecutionProvider;
use crate::stream::{NotificationHandle, StreamHandle};

/// Allocates a fresh asynchronous queue on the provider's device.
pub type CreateStreamFn = Arc<dyn Fn() -> StreamHandle + Send + Sync>;
/// Releases a stream handle; called exactly once per handle.
pub type ReleaseStreamFn = Arc<dyn Fn(StreamHandle) + Send + Sync>;
/// Best-effort submission of pending work; non-blocking on completion.
pub type FlushStreamFn = Arc<dyn Fn(StreamHandle) + Send + Sync>;
/// Allocates an event associated with the given stream's device.
pub type CreateNotificationFn = Arc<dyn Fn(StreamHandle) -> NotificationHandle + Send + Sync>;
/// Releases a notification handle; called exactly once per handle.
pub type ReleaseNotificationFn = Arc<dyn Fn(NotificationHandle) + Send + Sync>;
/// Records the event on its owning device stream.
pub type NotifyFn = Arc<dyn Fn(NotificationHandle) + Send + Sync>;
/// Makes the given device stream wait until the notification is recorded.
pub type WaitFn = Arc<dyn Fn(StreamHandle, NotificationHandle) + Send + Sync>;

/// The handler entry one provider contributes for its own streams.
#[derive(Clone)]
pub struct ProviderStreamHandles {
    pub create_stream: CreateStreamFn,
    pub release_stream: ReleaseStreamFn,
    pub flush_stream: FlushStreamFn,
    pub create_notification: CreateNotificationFn,
    pub release_notification: ReleaseNotificationFn,
    pub notify: NotifyFn,
}

/// Capability table: provider type -> stream handlers, plus wait bridges
/// keyed by (producer type, consumer type). Different pairs may use
/// different mechanisms (host spin, device event wait, inter-device
/// semaphore), which is why the wait side is bridged separately.
#[derive(Default)]
pub struct StreamCommandRegistry {
    entries: HashMap<String, ProviderStreamHandles>,
    wait_fns: HashMap<(String, String), WaitFn>,
}

impl StreamCommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider's handlers. Idempotent: the first registration
    /// for a type wins and later ones are ignored. Returns whether the
    /// entry was inserted.
    pub fn register_provider(
        &mut self,
        provider_type: &str,
        handles: ProviderStreamHandles,
    ) -> bool {
        if self.entries.contains_key(provider_type) {
            return false;
        }
        self.entries.insert(provider_type.to_string(), handles);
        true
    }

    /// Register a wait bridge from notifications produced on
    /// `producer_type` streams to consumers on `consumer_type` devices.
    /// Idempotent like `register_provider`.
    pub fn register_wait_fn(
        &mut self,
        producer_type: &str,
        consumer_type: &str,
        wait_fn: WaitFn,
    ) -> bool {
        let key = (producer_type.to_string(), consumer_type.to_string());
        if self.wait_fns.contains_key(&key) {
            return false;
        }
        self.wait_fns.insert(key, wait_fn);
        true
    }

    pub fn is_registered(&self, provider_type: &str) -> bool {
        self.entries.contains_key(provider_type)
    }

    fn entry(&self, provider_type: &str) -> ForgeResult<&ProviderStreamHandles> {
        self.entries.get(provider_type).ok_or_else(|| {
            StreamForgeError::MissingStreamCapability(provider_type.to_string())
        })
    }

    pub fn create_stream_fn(&self, provider_type: &str) -> ForgeResult<CreateStreamFn> {
        Ok(self.entry(provider_type)?.create_stream.clone())
    }

    pub fn release_stream_fn(&self, provider_type: &str) -> ForgeResult<ReleaseStreamFn> {
        Ok(self.entry(provider_type)?.release_stream.clone())
    }

    pub fn flush_stream_fn(&self, provider_type: &str) -> ForgeResult<FlushStreamFn> {
        Ok(self.entry(provider_type)?.flush_stream.clone())
    }

    pub fn create_notification_fn(
        &self,
        provider_type: &str,
    ) -> ForgeResult<CreateNotificationFn> {
        Ok(self.entry(provider_type)?.create_notification.clone())
    }

    pub fn release_notification_fn(
        &self,
        provider_type: &str,
    ) -> ForgeResult<ReleaseNotificationFn> {
        Ok(self.entry(provider_type)?.release_notification.clone())
    }

    pub fn notify_fn(&self, provider_type: &str) -> ForgeResult<NotifyFn> {
        Ok(self.entry(provider_type)?.notify.clone())
    }

    /// Resolve the wait specialization bridging a notification produced on
    /// a `producer_type` stream to a consumer of `consumer_type`.
    pub fn wait_fn(&self, producer_type: &str, consumer_type: &str) -> ForgeResult<WaitFn> {
        self.wait_fns
            .get(&(producer_type.to_string(), consumer_type.to_string()))
            .cloned()
            .ok_or_else(|| StreamForgeError::MissingWaitBridge {
                producer: producer_type.to_string(),
                consumer: consumer_type.to_string(),
            })
    }
}

static REGISTRY: Lazy<RwLock<StreamCommandRegistry>> =
    Lazy::new(|| RwLock::new(StreamCommandRegistry::new()));

/// Register stream handlers for every provider of a session that has none
/// yet. The write lock serializes concurrent first-time registration; the
/// per-type idempotence makes repeat calls no-ops. Invoked on every plan
/// construction.
pub(crate) fn ensure_stream_handlers_registered(
    providers: &[Arc<dyn ExecutionProvider>],
) -> ForgeResult<()> {
    let mut registry = REGISTRY.write()?;
    for provider in providers {
        if !registry.is_registered(provider.provider_type()) {
            tracing::debug!(
                provider = provider.provider_type(),
                "registering stream handlers"
            );
            provider.register_stream_handlers(&mut registry);
        }
    }
    Ok(())
}

pub(crate) fn create_stream_fn(provider_type: &str) -> ForgeResult<CreateStreamFn> {
    REGISTRY.read()?.create_stream_fn(provider_type)
}

pub(crate) fn release_stream_fn(provider_type: &str) -> ForgeResult<ReleaseStreamFn> {
    REGISTRY.read()?.release_stream_fn(provider_type)
}

pub(crate) fn flush_stream_fn(provider_type: &str) -> ForgeResult<FlushStreamFn> {
    REGISTRY.read()?.flush_stream_fn(provider_type)
}

pub(crate) fn create_notification_fn(provider_type: &str) -> ForgeResult<CreateNotificationFn> {
    REGISTRY.read()?.create_notification_fn(provider_type)
}

pub(crate) fn release_notification_fn(provider_type: &str) -> ForgeResult<ReleaseNotificationFn> {
    REGISTRY.read()?.release_notification_fn(provider_type)
}

pub(crate) fn notify_fn(provider_type: &str) -> ForgeResult<NotifyFn> {
    REGISTRY.read()?.notify_fn(provider_type)
}

pub(crate) fn wait_fn(producer_type: &str, consumer_type: &str) -> ForgeResult<WaitFn> {
    REGISTRY.read()?.wait_fn(producer_type, consumer_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::HostEvent;

    fn noop_handles() -> ProviderStreamHandles {
        ProviderStreamHandles {
            create_stream: Arc::new(|| StreamHandle::from_box(Box::new(()))),
            release_stream: Arc::new(|handle| {
                // SAFETY: created with a unit payload above
                unsafe { drop(handle.into_box::<()>()) }
            }),
            flush_stream: Arc::new(|_| {}),
            create_notification: Arc::new(|_| {
                NotificationHandle::from_box(Box::new(HostEvent::new()))
            }),
            release_notification: Arc::new(|handle| {
                // SAFETY: created with a HostEvent payload above
                unsafe { drop(handle.into_box::<HostEvent>()) }
            }),
            notify: Arc::new(|handle| {
                // SAFETY: created with a HostEvent payload above
                unsafe { handle.payload::<HostEvent>() }.signal()
            }),
        }
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut registry = StreamCommandRegistry::new();
        assert!(registry.register_provider("test-a", noop_handles()));
        assert!(!registry.register_provider("test-a", noop_handles()));
        assert!(registry.is_registered("test-a"));
    }

    #[test]
    fn test_missing_entry_errors() {
        let registry = StreamCommandRegistry::new();
        let err = registry.create_stream_fn("ghost").err().unwrap();
        assert!(matches!(
            err,
            StreamForgeError::MissingStreamCapability(_)
        ));
    }

    #[test]
    fn test_wait_bridge_lookup() {
        let mut registry = StreamCommandRegistry::new();
        assert!(registry.register_wait_fn("test-a", "test-b", Arc::new(|_, _| {})));
        assert!(!registry.register_wait_fn("test-a", "test-b", Arc::new(|_, _| {})));
        assert!(registry.wait_fn("test-a", "test-b").is_ok());

        let err = registry.wait_fn("test-b", "test-a").err().unwrap();
        assert!(matches!(err, StreamForgeError::MissingWaitBridge { .. }));
    }

    #[test]
    fn test_stream_lifecycle_through_entry() {
        let mut registry = StreamCommandRegistry::new();
        registry.register_provider("test-c", noop_handles());
        let create = registry.create_stream_fn("test-c").unwrap();
        let release = registry.release_stream_fn("test-c").unwrap();
        let handle = create();
        assert!(!handle.is_null());
        release(handle);
    }
}
