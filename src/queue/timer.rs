use flume::Sender;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::sleep;

use super::notification::NotificationId;

/// Cancellable expiry deadline owned by one queued notification
///
/// When the deadline passes the id is sent to the queue's expiry channel.
/// Dropping the timer cancels it, so each timer is cancelled exactly once by
/// whichever removal path takes the record out of the queue. A deadline that
/// fired just before cancellation leaves a stale id in the channel, which
/// `expire_now` treats as a no-op.
#[derive(Debug)]
pub struct ExpiryTimer {
    handle: AbortHandle,
}

impl ExpiryTimer {
    /// Must be called from within a Tokio runtime
    pub fn start(id: NotificationId, ttl: Duration, expirations: Sender<NotificationId>) -> Self {
        let task = tokio::spawn(async move {
            sleep(ttl).await;
            let _ = expirations.send(id);
        });
        Self {
            handle: task.abort_handle(),
        }
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
