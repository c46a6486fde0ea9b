//! Result coordinator: binds one screen to its permission delegate and fans
//! the delegate's outcome out to registered observers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::delegate::{AttachmentDelegate, PermissionsListener};
use crate::error::Result;
use crate::host::{DELEGATE_TAG, HandleId, Host, ScreenRef};
use crate::permission::{Outcome, PermissionSet};

/// Observer with both a success and a failure path.
pub trait ResultListener: Send {
    fn on_success(&mut self);
    fn on_failed(&mut self);
}

type Callback = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct Observers {
    success: Vec<Callback>,
    failure: Vec<Callback>,
    listeners: Vec<Box<dyn ResultListener>>,
}

impl Observers {
    fn dispatch(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Granted => {
                for callback in &mut self.success {
                    callback();
                }
                for listener in &mut self.listeners {
                    listener.on_success();
                }
            }
            Outcome::Denied => {
                for callback in &mut self.failure {
                    callback();
                }
                for listener in &mut self.listeners {
                    listener.on_failed();
                }
            }
        }
    }

    /// Put `self` back in front of anything registered while it was out.
    fn restore_into(self, slot: &mut Self) {
        let added = std::mem::replace(slot, self);
        slot.success.extend(added.success);
        slot.failure.extend(added.failure);
        slot.listeners.extend(added.listeners);
    }
}

/// Fluent front end for one permission request against one screen.
///
/// Observers are never cleared; a coordinator is meant to be used for a
/// single request.
pub struct ResultCoordinator {
    screen: ScreenRef,
    observers: Arc<Mutex<Observers>>,
}

impl ResultCoordinator {
    pub fn new(screen: ScreenRef) -> Self {
        Self {
            screen,
            observers: Arc::default(),
        }
    }

    /// Coordinator for a sub-screen; requests go through its owning screen.
    pub fn for_sub_screen(host: Arc<dyn Host>, sub_screen: HandleId) -> Result<Self> {
        Ok(Self::new(ScreenRef::for_sub_screen(host, sub_screen)?))
    }

    #[must_use]
    pub fn on_success(self, callback: impl FnMut() + Send + 'static) -> Self {
        lock(&self.observers).success.push(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_fail(self, callback: impl FnMut() + Send + 'static) -> Self {
        lock(&self.observers).failure.push(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_result(self, listener: impl ResultListener + 'static) -> Self {
        lock(&self.observers).listeners.push(Box::new(listener));
        self
    }

    pub const fn screen(&self) -> &ScreenRef {
        &self.screen
    }

    /// Issue a permission request against the bound screen.
    ///
    /// A screen that is gone or finishing drops the request silently: no
    /// observer fires and `Ok(())` is returned. The only error is a
    /// precondition violation raised by a reused delegate.
    pub fn request_permissions<I, S>(&self, permissions: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let permissions: PermissionSet = permissions.into_iter().collect();
        let handle = self.screen.handle();
        let host = self.screen.host();

        if !host.is_active(handle) {
            debug!(%handle, "Screen is gone or finishing, dropping permission request");
            return Ok(());
        }

        if let Some(delegate) = host.find_by_tag(handle, DELEGATE_TAG) {
            debug!(%handle, permissions = %permissions, "Reusing attached permission delegate");
            delegate.configure(permissions);
            delegate.set_listener(self.listener());
            return delegate.activate();
        }

        let delegate = Arc::new(AttachmentDelegate::new(permissions, host.sdk_level()));
        delegate.set_listener(self.listener());

        if host.is_ui_thread() {
            attach_allowing_state_loss(host.as_ref(), handle, delegate);
        } else {
            let ui_host = Arc::clone(host);
            let posted = host.post(Box::new(move || {
                attach_allowing_state_loss(ui_host.as_ref(), handle, delegate);
            }));
            if !posted {
                warn!(%handle, "UI thread unavailable, permission request dropped");
            }
        }
        Ok(())
    }

    fn listener(&self) -> PermissionsListener {
        let observers = Arc::clone(&self.observers);
        Arc::new(move |outcome, permissions| {
            debug!(outcome = ?outcome, permissions = %permissions, "Dispatching permission outcome");
            // Observers run outside the lock so they may register more.
            let mut taken = std::mem::take(&mut *lock(&observers));
            taken.dispatch(outcome);
            taken.restore_into(&mut lock(&observers));
        })
    }
}

/// Attach `delegate`, tolerating a screen torn down in the meantime.
fn attach_allowing_state_loss(
    host: &dyn Host,
    handle: HandleId,
    delegate: Arc<AttachmentDelegate>,
) {
    if let Err(e) = host.attach(handle, DELEGATE_TAG, delegate) {
        debug!(%handle, error = %e, "Permission delegate attach dropped");
    }
}

fn lock(observers: &Mutex<Observers>) -> MutexGuard<'_, Observers> {
    observers.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::local_host::LocalHost;
    use crate::permission::GrantResult;
    use crate::testing::RecordingPlatform;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log_entry(log: &Log, entry: &str) -> impl FnMut() + Send + 'static {
        let log = Arc::clone(log);
        let entry = entry.to_string();
        move || log.lock().unwrap().push(entry.clone())
    }

    struct LoggingListener(Log);

    impl ResultListener for LoggingListener {
        fn on_success(&mut self) {
            self.0.lock().unwrap().push("listener:success".into());
        }

        fn on_failed(&mut self) {
            self.0.lock().unwrap().push("listener:failed".into());
        }
    }

    fn setup(platform: RecordingPlatform) -> (Arc<RecordingPlatform>, LocalHost, ScreenRef) {
        let platform = Arc::new(platform);
        let host = LocalHost::new(platform.clone()).unwrap();
        let handle = host.open_screen();
        let screen = ScreenRef::new(Arc::new(host.clone()), handle);
        (platform, host, screen)
    }

    #[tokio::test]
    async fn granted_fires_success_observers_in_order() {
        let (_platform, host, screen) =
            setup(RecordingPlatform::new(34).with_granted(["CAMERA"]));
        let log: Log = Arc::default();

        let coordinator = ResultCoordinator::new(screen)
            .on_success(log_entry(&log, "success:1"))
            .on_fail(log_entry(&log, "fail:1"))
            .on_result(LoggingListener(Arc::clone(&log)))
            .on_success(log_entry(&log, "success:2"))
            .on_fail(log_entry(&log, "fail:2"))
            .on_success(log_entry(&log, "success:3"));

        coordinator.request_permissions(["CAMERA"]).unwrap();
        assert!(host.flush().await);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["success:1", "success:2", "success:3", "listener:success"]
        );
    }

    #[tokio::test]
    async fn denied_fires_failure_observers_only() {
        let (platform, host, screen) = setup(RecordingPlatform::new(34));
        let log: Log = Arc::default();

        let coordinator = ResultCoordinator::new(screen)
            .on_success(log_entry(&log, "success"))
            .on_fail(log_entry(&log, "fail:1"))
            .on_result(LoggingListener(Arc::clone(&log)))
            .on_fail(log_entry(&log, "fail:2"));

        coordinator
            .request_permissions(["CAMERA", "LOCATION"])
            .unwrap();
        let prompt = platform.next_prompt().await;
        host.respond(&prompt, vec![GrantResult::Denied, GrantResult::Denied]);
        assert!(host.flush().await);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["fail:1", "fail:2", "listener:failed"]
        );
    }

    #[tokio::test]
    async fn request_on_finishing_screen_is_dropped() {
        let (platform, host, screen) = setup(RecordingPlatform::new(34));
        let log: Log = Arc::default();
        host.finish(screen.handle());

        ResultCoordinator::new(screen.clone())
            .on_success(log_entry(&log, "success"))
            .on_fail(log_entry(&log, "fail"))
            .request_permissions(["CAMERA"])
            .unwrap();
        assert!(host.flush().await);

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(platform.prompt_count(), 0);
        assert_eq!(host.component_count(screen.handle()), 0);
    }

    #[tokio::test]
    async fn reissued_request_reuses_delegate() {
        let (platform, host, screen) = setup(RecordingPlatform::new(34));
        let handle = screen.handle();
        let log: Log = Arc::default();

        let first = ResultCoordinator::new(screen.clone())
            .on_success(log_entry(&log, "first:success"))
            .on_fail(log_entry(&log, "first:fail"));
        first.request_permissions(["CAMERA"]).unwrap();
        let prompt = platform.next_prompt().await;
        assert_eq!(prompt.permissions.as_slice(), ["CAMERA"]);
        let delegate = host.find_by_tag(handle, DELEGATE_TAG).unwrap();

        let second = ResultCoordinator::new(screen)
            .on_success(log_entry(&log, "second:success"))
            .on_fail(log_entry(&log, "second:fail"));
        second.request_permissions(["LOCATION"]).unwrap();
        let prompt = platform.next_prompt().await;
        assert_eq!(prompt.permissions.as_slice(), ["LOCATION"]);

        assert_eq!(host.component_count(handle), 1);
        assert!(Arc::ptr_eq(
            &host.find_by_tag(handle, DELEGATE_TAG).unwrap(),
            &delegate
        ));
        assert_eq!(delegate.permissions().as_slice(), ["LOCATION"]);

        host.respond(&prompt, vec![GrantResult::Granted]);
        assert!(host.flush().await);
        assert_eq!(*log.lock().unwrap(), vec!["second:success"]);
        assert_eq!(host.component_count(handle), 0);
    }

    #[tokio::test]
    async fn reused_coordinator_fires_old_observers_again() {
        let (_platform, host, screen) =
            setup(RecordingPlatform::new(34).with_granted(["CAMERA"]));
        let log: Log = Arc::default();

        let coordinator =
            ResultCoordinator::new(screen).on_success(log_entry(&log, "success"));
        coordinator.request_permissions(["CAMERA"]).unwrap();
        assert!(host.flush().await);
        coordinator.request_permissions(["CAMERA"]).unwrap();
        assert!(host.flush().await);

        assert_eq!(*log.lock().unwrap(), vec!["success", "success"]);
    }

    #[tokio::test]
    async fn sub_screen_requests_use_owner() {
        let (platform, host, screen) = setup(RecordingPlatform::new(34));
        let child = host.open_sub_screen(screen.handle()).unwrap();

        let coordinator =
            ResultCoordinator::for_sub_screen(Arc::new(host.clone()), child).unwrap();
        assert_eq!(coordinator.screen().handle(), screen.handle());

        coordinator.request_permissions(["CAMERA"]).unwrap();
        let prompt = platform.next_prompt().await;
        assert_eq!(prompt.handle, screen.handle());
    }

    #[tokio::test]
    async fn request_from_ui_thread_attaches_in_place() {
        let (platform, host, screen) = setup(RecordingPlatform::new(34));
        let handle = screen.handle();
        let log: Log = Arc::default();
        let coordinator = ResultCoordinator::new(screen)
            .on_success(log_entry(&log, "success"))
            .on_fail(log_entry(&log, "fail"));

        let (tx, rx) = tokio::sync::oneshot::channel();
        let ui_host = host.clone();
        assert!(host.post(Box::new(move || {
            assert!(ui_host.is_ui_thread());
            coordinator.request_permissions(["CAMERA"]).unwrap();
            // Attached before returning, not queued behind this task.
            let attached = ui_host.find_by_tag(handle, DELEGATE_TAG).is_some();
            tx.send(attached).unwrap();
        })));

        assert!(rx.await.unwrap());
        let prompt = platform.next_prompt().await;
        assert_eq!(prompt.handle, handle);
        assert_eq!(prompt.permissions.as_slice(), ["CAMERA"]);

        host.respond(&prompt, vec![GrantResult::Granted]);
        assert!(host.flush().await);
        assert_eq!(*log.lock().unwrap(), vec!["success"]);
        assert_eq!(host.component_count(handle), 0);
    }

    #[test]
    fn detached_sub_screen_is_an_error() {
        let (_platform, host, screen) = setup(RecordingPlatform::new(34));
        let child = host.open_sub_screen(screen.handle()).unwrap();
        host.destroy(screen.handle());

        let err = ResultCoordinator::for_sub_screen(Arc::new(host), child)
            .err()
            .unwrap();
        assert!(matches!(err, crate::Error::NotAttached(h) if h == child));
    }
}
