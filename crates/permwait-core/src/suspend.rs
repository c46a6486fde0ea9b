//! Suspension adapter: one permission request as one `async` call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::coordinator::ResultCoordinator;
use crate::error::{Error, Result};
use crate::host::ScreenRef;
use crate::permission::PermissionSet;

/// Write-once resumption handle shared by several callbacks.
///
/// The first [`resume`](Self::resume) wakes the waiting receiver; every later
/// call is a logged no-op.
pub struct Continuation<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Continuation<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Continuation<T> {
    /// Create a continuation and the receiver it resumes.
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Resume with `value`. Returns `false` if already resumed or if the
    /// receiver is gone.
    pub fn resume(&self, value: T) -> bool {
        let Some(tx) = self.lock().take() else {
            warn!("Continuation already resumed, ignoring");
            return false;
        };
        tx.send(value).is_ok()
    }

    pub fn is_resumed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<oneshot::Sender<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Request `permissions` on `screen` and wait for the decision.
///
/// Resolves to `Ok(true)` when the set is already granted or the dialog's
/// first result is a grant, and to [`Error::PermissionRequestFailed`]
/// otherwise; it never yields `Ok(false)`. An empty set is trivially granted.
///
/// If the screen is gone or tears down before the request reaches it, the
/// request is dropped and the returned future never completes. Callers that
/// cannot tolerate this should wrap the call in a timeout.
pub async fn request_permissions_for_result<I, S>(
    screen: &ScreenRef,
    permissions: I,
) -> Result<bool>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let permissions: PermissionSet = permissions.into_iter().collect();
    if permissions.is_empty() {
        debug!(handle = %screen.handle(), "Empty permission set is trivially granted");
        return Ok(true);
    }

    let (continuation, resumed) = Continuation::<Result<bool>>::channel();
    let on_granted = continuation.clone();
    let coordinator = ResultCoordinator::new(screen.clone())
        .on_success(move || {
            on_granted.resume(Ok(true));
        })
        .on_fail(move || {
            continuation.resume(Err(Error::PermissionRequestFailed));
        });

    coordinator.request_permissions(permissions)?;

    match resumed.await {
        Ok(result) => result,
        Err(_) => {
            warn!(handle = %screen.handle(), "Permission request abandoned, continuation will not resume");
            std::future::pending().await
        }
    }
}
