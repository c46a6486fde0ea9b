//! In-process reference host.
//!
//! Runs a dedicated UI thread draining a task queue, tracks screens and their
//! lifecycle, keeps a per-screen component registry keyed by tag, and routes
//! platform results back to the components of the prompting screen. The CLI
//! uses it as its host, and the tests use it to drive the full round trip.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::delegate::AttachmentDelegate;
use crate::error::Result;
use crate::host::{AttachError, HandleId, Host, HostContext, Platform, PromptRequest, UiTask};
use crate::permission::{GrantResult, PermissionSet};

/// Lifecycle state of a screen that still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    /// Teardown has started; no new work is accepted.
    Finishing,
}

struct Screen {
    state: LifecycleState,
    parent: Option<HandleId>,
    components: HashMap<String, Arc<AttachmentDelegate>>,
}

struct Inner {
    platform: Arc<dyn Platform>,
    screens: Mutex<HashMap<HandleId, Screen>>,
    next_handle: AtomicU64,
    ui_tx: mpsc::UnboundedSender<UiTask>,
    ui_thread: ThreadId,
}

/// Reference [`Host`] backed by a single UI thread.
#[derive(Clone)]
pub struct LocalHost {
    inner: Arc<Inner>,
}

impl LocalHost {
    /// Start the UI thread and return a host with no screens.
    pub fn new(platform: Arc<dyn Platform>) -> Result<Self> {
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiTask>();
        let thread = std::thread::Builder::new()
            .name("permwait-ui".into())
            .spawn(move || {
                while let Some(task) = ui_rx.blocking_recv() {
                    task();
                }
                debug!("UI thread stopped");
            })?;

        Ok(Self {
            inner: Arc::new(Inner {
                platform,
                screens: Mutex::new(HashMap::new()),
                next_handle: AtomicU64::new(1),
                ui_tx,
                ui_thread: thread.thread().id(),
            }),
        })
    }

    /// Open a new top-level screen.
    pub fn open_screen(&self) -> HandleId {
        self.insert_screen(None)
    }

    /// Open a sub-screen nested in `parent`.
    pub fn open_sub_screen(&self, parent: HandleId) -> std::result::Result<HandleId, AttachError> {
        if !self.screens().contains_key(&parent) {
            return Err(AttachError::HandleGone(parent));
        }
        Ok(self.insert_screen(Some(parent)))
    }

    fn insert_screen(&self, parent: Option<HandleId>) -> HandleId {
        let handle = HandleId::new(self.inner.next_handle.fetch_add(1, Ordering::Relaxed));
        self.screens().insert(
            handle,
            Screen {
                state: LifecycleState::Active,
                parent,
                components: HashMap::new(),
            },
        );
        debug!(%handle, parent = ?parent, "Screen opened");
        handle
    }

    pub fn state(&self, handle: HandleId) -> Option<LifecycleState> {
        self.screens().get(&handle).map(|s| s.state)
    }

    /// Begin teardown: the screen stays registered but rejects new work.
    pub fn finish(&self, handle: HandleId) {
        if let Some(screen) = self.screens().get_mut(&handle) {
            screen.state = LifecycleState::Finishing;
            debug!(%handle, "Screen finishing");
        }
    }

    /// Destroy a screen and its sub-screens, detaching every component.
    pub fn destroy(&self, handle: HandleId) {
        let detached: Vec<Arc<AttachmentDelegate>> = {
            let mut screens = self.screens();
            let mut doomed = vec![handle];
            let mut i = 0;
            while i < doomed.len() {
                let current = doomed[i];
                doomed.extend(
                    screens
                        .iter()
                        .filter(|(_, s)| s.parent == Some(current))
                        .map(|(id, _)| *id),
                );
                i += 1;
            }
            doomed
                .iter()
                .filter_map(|id| screens.remove(id))
                .flat_map(|s| s.components.into_values())
                .collect()
        };

        for component in &detached {
            component.on_detached();
        }
        info!(%handle, detached = detached.len(), "Screen destroyed");
    }

    /// Number of components registered on `handle`.
    pub fn component_count(&self, handle: HandleId) -> usize {
        self.screens()
            .get(&handle)
            .map_or(0, |s| s.components.len())
    }

    /// Route a platform result to every component of `handle` on the UI
    /// thread.
    pub fn deliver_result(
        &self,
        handle: HandleId,
        request_code: i32,
        permissions: Vec<String>,
        grant_results: Vec<GrantResult>,
    ) -> bool {
        let host = self.clone();
        self.post(Box::new(move || {
            let components: Vec<Arc<AttachmentDelegate>> = host
                .screens()
                .get(&handle)
                .map(|s| s.components.values().cloned().collect())
                .unwrap_or_default();
            if components.is_empty() {
                warn!(%handle, request_code, "No component to receive permission result");
            }
            for component in components {
                component.on_request_permissions_result(request_code, &permissions, &grant_results);
            }
        }))
    }

    /// Answer `prompt` with one result per requested permission.
    pub fn respond(&self, prompt: &PromptRequest, grant_results: Vec<GrantResult>) -> bool {
        self.deliver_result(
            prompt.handle,
            prompt.request_code,
            prompt.permissions.as_slice().to_vec(),
            grant_results,
        )
    }

    /// Wait until every task posted so far has run on the UI thread.
    pub async fn flush(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        let posted = self.post(Box::new(move || {
            let _ = tx.send(());
        }));
        posted && rx.await.is_ok()
    }

    fn screens(&self) -> MutexGuard<'_, HashMap<HandleId, Screen>> {
        self.inner
            .screens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Host for LocalHost {
    fn sdk_level(&self) -> u32 {
        self.inner.platform.sdk_level()
    }

    fn is_active(&self, handle: HandleId) -> bool {
        self.state(handle) == Some(LifecycleState::Active)
    }

    fn owner_of(&self, handle: HandleId) -> Option<HandleId> {
        let screens = self.screens();
        let mut current = handle;
        loop {
            match screens.get(&current)?.parent {
                Some(parent) => current = parent,
                None => return Some(current),
            }
        }
    }

    fn find_by_tag(&self, handle: HandleId, tag: &str) -> Option<Arc<AttachmentDelegate>> {
        self.screens().get(&handle)?.components.get(tag).cloned()
    }

    fn attach(
        &self,
        handle: HandleId,
        tag: &str,
        delegate: Arc<AttachmentDelegate>,
    ) -> std::result::Result<(), AttachError> {
        {
            let mut screens = self.screens();
            let screen = screens
                .get_mut(&handle)
                .ok_or(AttachError::HandleGone(handle))?;
            if screen.state == LifecycleState::Finishing {
                return Err(AttachError::HandleFinishing(handle));
            }
            if screen.components.contains_key(tag) {
                return Err(AttachError::TagOccupied {
                    handle,
                    tag: tag.to_string(),
                });
            }
            delegate.bind(HostContext::new(Arc::new(self.clone()), handle));
            screen
                .components
                .insert(tag.to_string(), Arc::clone(&delegate));
        }

        if let Err(e) = delegate.on_attached() {
            error!(%handle, tag, error = %e, "Component failed to start after attach");
        }
        Ok(())
    }

    fn detach(&self, handle: HandleId, delegate: &AttachmentDelegate) {
        let removed = {
            let mut screens = self.screens();
            screens.get_mut(&handle).and_then(|screen| {
                let tag = screen
                    .components
                    .iter()
                    .find(|(_, c)| std::ptr::eq(Arc::as_ptr(c), delegate))
                    .map(|(tag, _)| tag.clone())?;
                screen.components.remove(&tag).map(|_| tag)
            })
        };
        if let Some(tag) = removed {
            debug!(%handle, tag, "Component detached");
        }
        delegate.on_detached();
    }

    fn check_self_permission(&self, _handle: HandleId, permission: &str) -> bool {
        self.inner.platform.check_self_permission(permission)
    }

    fn request_permissions(&self, handle: HandleId, permissions: &PermissionSet, request_code: i32) {
        self.inner.platform.prompt(PromptRequest {
            handle,
            permissions: permissions.clone(),
            request_code,
        });
    }

    fn is_ui_thread(&self) -> bool {
        std::thread::current().id() == self.inner.ui_thread
    }

    fn post(&self, task: UiTask) -> bool {
        if self.inner.ui_tx.send(task).is_err() {
            warn!("{}", AttachError::UiThreadStopped);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::host::DELEGATE_TAG;
    use crate::testing::RecordingPlatform;

    fn host() -> LocalHost {
        LocalHost::new(Arc::new(RecordingPlatform::new(34))).unwrap()
    }

    #[tokio::test]
    async fn posted_tasks_run_on_ui_thread() {
        let host = host();
        let (tx, rx) = oneshot::channel();
        let probe = host.clone();
        assert!(host.post(Box::new(move || {
            tx.send(probe.is_ui_thread()).unwrap();
        })));

        assert!(rx.await.unwrap());
        assert!(!host.is_ui_thread());
    }

    #[test]
    fn lifecycle_transitions() {
        let host = host();
        let handle = host.open_screen();
        assert!(host.is_active(handle));

        host.finish(handle);
        assert_eq!(host.state(handle), Some(LifecycleState::Finishing));
        assert!(!host.is_active(handle));

        host.destroy(handle);
        assert_eq!(host.state(handle), None);
        assert!(!host.is_active(handle));
    }

    #[test]
    fn sub_screens_resolve_to_owner() {
        let host = host();
        let root = host.open_screen();
        let child = host.open_sub_screen(root).unwrap();
        let grandchild = host.open_sub_screen(child).unwrap();

        assert_eq!(host.owner_of(root), Some(root));
        assert_eq!(host.owner_of(grandchild), Some(root));

        host.destroy(root);
        assert_eq!(host.owner_of(grandchild), None);
        assert_eq!(
            host.open_sub_screen(root).unwrap_err(),
            AttachError::HandleGone(root)
        );
    }

    #[test]
    fn attach_enforces_one_component_per_tag() {
        let host = host();
        let handle = host.open_screen();
        let first = Arc::new(AttachmentDelegate::new(
            ["CAMERA"].into_iter().collect(),
            34,
        ));
        let second = Arc::new(AttachmentDelegate::new(
            ["LOCATION"].into_iter().collect(),
            34,
        ));

        host.attach(handle, DELEGATE_TAG, Arc::clone(&first))
            .unwrap();
        let err = host
            .attach(handle, DELEGATE_TAG, Arc::clone(&second))
            .unwrap_err();

        assert!(matches!(err, AttachError::TagOccupied { .. }));
        assert_eq!(host.component_count(handle), 1);
        assert!(Arc::ptr_eq(
            &host.find_by_tag(handle, DELEGATE_TAG).unwrap(),
            &first
        ));
        assert!(!second.is_attached());
    }

    #[test]
    fn attach_to_torn_down_screen_is_rejected() {
        let host = host();
        let finishing = host.open_screen();
        host.finish(finishing);
        let destroyed = host.open_screen();
        host.destroy(destroyed);

        let delegate = Arc::new(AttachmentDelegate::new(
            ["CAMERA"].into_iter().collect(),
            34,
        ));
        assert_eq!(
            host.attach(finishing, DELEGATE_TAG, Arc::clone(&delegate))
                .unwrap_err(),
            AttachError::HandleFinishing(finishing)
        );
        assert_eq!(
            host.attach(destroyed, DELEGATE_TAG, delegate).unwrap_err(),
            AttachError::HandleGone(destroyed)
        );
    }

    #[test]
    fn destroy_detaches_components() {
        let host = host();
        let handle = host.open_screen();
        let delegate = Arc::new(AttachmentDelegate::new(
            ["CAMERA"].into_iter().collect(),
            34,
        ));
        host.attach(handle, DELEGATE_TAG, Arc::clone(&delegate))
            .unwrap();
        assert!(delegate.is_attached());

        host.destroy(handle);
        assert!(!delegate.is_attached());
    }

    #[test]
    fn delegate_found_by_tag_is_already_bound() {
        for _ in 0..100 {
            let host = host();
            let handle = host.open_screen();
            let delegate = Arc::new(AttachmentDelegate::new(
                ["CAMERA"].into_iter().collect(),
                34,
            ));

            let attacher = {
                let host = host.clone();
                let delegate = Arc::clone(&delegate);
                std::thread::spawn(move || host.attach(handle, DELEGATE_TAG, delegate))
            };
            let found = loop {
                if let Some(found) = host.find_by_tag(handle, DELEGATE_TAG) {
                    break found;
                }
                std::thread::yield_now();
            };

            assert!(found.is_attached());
            found.activate().unwrap();
            attacher.join().unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn result_for_unknown_screen_is_dropped() {
        let host = host();
        assert!(host.deliver_result(HandleId::new(99), 115, vec![], vec![]));
        assert!(host.flush().await);
    }
}
