//! Per-inference execution context.
//!
//! The context instantiates the notification array when an inference call
//! starts and releases it on teardown. Device streams are owned by the
//! plan's logic streams and outlive the context, so notifications hold
//! their provider back-reference only.

use crate::error::ForgeResult;
use crate::frame::ExecutionFrame;
use crate::session::SessionState;
use crate::stream::registry::{self, ReleaseNotificationFn};
use crate::stream::{DeviceStream, Notification, NotificationHandle};

/// Per-call scratch shared (read-only) by every logic stream.
pub(crate) struct ExecutionContext<'a> {
    session: &'a SessionState,
    frame: &'a ExecutionFrame,
    notifications: Vec<Notification>,
    release_fns: Vec<ReleaseNotificationFn>,
}

impl<'a> ExecutionContext<'a> {
    /// Instantiate one notification per owner, on the owner's device.
    pub(crate) fn new(
        session: &'a SessionState,
        frame: &'a ExecutionFrame,
        notification_owners: &[&DeviceStream],
    ) -> ForgeResult<Self> {
        let mut notifications = Vec::with_capacity(notification_owners.len());
        let mut release_fns = Vec::with_capacity(notification_owners.len());
        for owner in notification_owners {
            let create = registry::create_notification_fn(owner.provider_type())?;
            let release = registry::release_notification_fn(owner.provider_type())?;
            notifications.push(Notification {
                handle: create(owner.handle()),
                provider: owner.provider().clone(),
            });
            release_fns.push(release);
        }
        Ok(ExecutionContext {
            session,
            frame,
            notifications,
            release_fns,
        })
    }

    pub(crate) fn session(&self) -> &SessionState {
        self.session
    }

    pub(crate) fn frame(&self) -> &ExecutionFrame {
        self.frame
    }

    pub(crate) fn notification_handle(&self, index: usize) -> NotificationHandle {
        self.notifications[index].handle()
    }
}

impl Drop for ExecutionContext<'_> {
    fn drop(&mut self) {
        for (release, notification) in self.release_fns.iter().zip(&self.notifications) {
            release(notification.handle());
        }
    }
}
