//! Boundary between the library and the host UI framework.
//!
//! The host owns screens and their lifecycle, runs a single UI thread, and
//! keeps a per-screen registry of attached components keyed by tag. The
//! platform owns the grant store and the permission dialog. Both are traits so
//! the core never depends on a concrete UI toolkit.

use std::fmt;
use std::sync::Arc;

use crate::delegate::AttachmentDelegate;
use crate::error::{Error, Result};
use crate::permission::PermissionSet;

/// Tag under which the permission delegate is registered on a screen.
///
/// The key is scoped to one screen's registry, never process-wide.
pub const DELEGATE_TAG: &str = "permwait.permission-delegate";

/// Non-owning identifier of a screen or sub-screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "screen-{}", self.0)
    }
}

/// Unit of work scheduled onto the host's UI thread.
pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// A permission dialog the platform should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    /// Screen that issued the prompt; results are routed back to it.
    pub handle: HandleId,
    pub permissions: PermissionSet,
    pub request_code: i32,
}

/// Why the host refused to attach a component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    #[error("Screen {0} no longer exists")]
    HandleGone(HandleId),

    #[error("Screen {0} is finishing")]
    HandleFinishing(HandleId),

    #[error("Tag {tag} is already attached to {handle}")]
    TagOccupied { handle: HandleId, tag: String },

    #[error("UI thread is not running")]
    UiThreadStopped,
}

/// OS-level permission store and dialog.
pub trait Platform: Send + Sync {
    /// SDK level of the running platform.
    fn sdk_level(&self) -> u32;

    /// Whether `permission` is currently granted to the application.
    fn check_self_permission(&self, permission: &str) -> bool;

    /// Show the permission dialog. The decision arrives later through the
    /// host's result callback, never as a return value.
    fn prompt(&self, request: PromptRequest);
}

/// Host UI framework: screen lifecycle, tag registry and UI thread.
pub trait Host: Send + Sync {
    fn sdk_level(&self) -> u32;

    /// `false` when the screen is unknown, finishing, or destroyed.
    fn is_active(&self, handle: HandleId) -> bool;

    /// Top-level screen owning `handle` (itself for a top-level screen).
    fn owner_of(&self, handle: HandleId) -> Option<HandleId>;

    fn find_by_tag(&self, handle: HandleId, tag: &str) -> Option<Arc<AttachmentDelegate>>;

    /// Attach `delegate` under `tag` and start it.
    ///
    /// Best-effort: the screen may have been torn down since the attach was
    /// scheduled, in which case the attach is dropped and an error returned.
    fn attach(
        &self,
        handle: HandleId,
        tag: &str,
        delegate: Arc<AttachmentDelegate>,
    ) -> std::result::Result<(), AttachError>;

    /// Remove `delegate` from the screen's registry. Tolerates a delegate
    /// that is no longer registered.
    fn detach(&self, handle: HandleId, delegate: &AttachmentDelegate);

    fn check_self_permission(&self, handle: HandleId, permission: &str) -> bool;

    fn request_permissions(&self, handle: HandleId, permissions: &PermissionSet, request_code: i32);

    fn is_ui_thread(&self) -> bool;

    /// Schedule `task` on the UI thread. Returns `false` if it was dropped.
    fn post(&self, task: UiTask) -> bool;
}

/// Binding between an attached delegate and its screen.
#[derive(Clone)]
pub struct HostContext {
    host: Arc<dyn Host>,
    handle: HandleId,
}

impl HostContext {
    pub fn new(host: Arc<dyn Host>, handle: HandleId) -> Self {
        Self { host, handle }
    }

    pub const fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn is_active(&self) -> bool {
        self.host.is_active(self.handle)
    }

    pub fn check_self_permission(&self, permission: &str) -> bool {
        self.host.check_self_permission(self.handle, permission)
    }

    pub fn request_permissions(&self, permissions: &PermissionSet, request_code: i32) {
        self.host
            .request_permissions(self.handle, permissions, request_code);
    }

    pub fn detach(&self, delegate: &AttachmentDelegate) {
        self.host.detach(self.handle, delegate);
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// A screen a permission request can be issued against.
///
/// Holds the host and an identifier only; it never keeps the screen alive.
#[derive(Clone)]
pub struct ScreenRef {
    host: Arc<dyn Host>,
    handle: HandleId,
}

impl ScreenRef {
    pub fn new(host: Arc<dyn Host>, handle: HandleId) -> Self {
        Self { host, handle }
    }

    /// Resolve a sub-screen to the top-level screen that owns it.
    pub fn for_sub_screen(host: Arc<dyn Host>, sub_screen: HandleId) -> Result<Self> {
        let owner = host
            .owner_of(sub_screen)
            .ok_or(Error::NotAttached(sub_screen))?;
        Ok(Self::new(host, owner))
    }

    pub const fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn is_alive(&self) -> bool {
        self.host.is_active(self.handle)
    }

    /// Request `permissions` and wait for the user's decision.
    ///
    /// See [`crate::suspend::request_permissions_for_result`].
    pub async fn request_permissions_for_result<I, S>(&self, permissions: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        crate::suspend::request_permissions_for_result(self, permissions).await
    }
}

impl fmt::Debug for ScreenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenRef")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
