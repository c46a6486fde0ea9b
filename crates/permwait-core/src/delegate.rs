//! Hidden, screen-attached delegate performing one permission round trip.
//!
//! The delegate is registered on a screen under [`crate::host::DELEGATE_TAG`].
//! It holds the pending permission set, checks the current grant state,
//! shows the platform dialog when needed, and receives the result callback
//! routed by the host. Whatever the outcome, it detaches itself afterwards.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::host::HostContext;
use crate::permission::{
    GrantResult, Outcome, PERMISSION_REQUEST_CODE, PermissionSet, RUNTIME_PERMISSIONS_SDK_LEVEL,
};

/// Receives the single outcome of a delegate round trip.
pub type PermissionsListener = Arc<dyn Fn(Outcome, &PermissionSet) + Send + Sync>;

#[derive(Default)]
struct DelegateState {
    permissions: PermissionSet,
    listener: Option<PermissionsListener>,
    context: Option<HostContext>,
}

/// Screen-attached component that talks to the platform permission system.
pub struct AttachmentDelegate {
    sdk_level: u32,
    state: Mutex<DelegateState>,
}

impl AttachmentDelegate {
    /// Create a detached delegate for `permissions` on a platform at
    /// `sdk_level`.
    pub fn new(permissions: PermissionSet, sdk_level: u32) -> Self {
        Self {
            sdk_level,
            state: Mutex::new(DelegateState {
                permissions,
                ..DelegateState::default()
            }),
        }
    }

    /// Replace the permission set evaluated on the next activation.
    pub fn configure(&self, permissions: PermissionSet) {
        self.lock().permissions = permissions;
    }

    pub fn set_listener(&self, listener: PermissionsListener) -> &Self {
        self.lock().listener = Some(listener);
        self
    }

    pub fn permissions(&self) -> PermissionSet {
        self.lock().permissions.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.lock().context.is_some()
    }

    /// Bind the delegate to its screen. Hosts call this while inserting the
    /// delegate into the registry, so any lookup by tag sees a bound delegate.
    pub fn bind(&self, context: HostContext) {
        debug!(handle = %context.handle(), "Permission delegate attached");
        self.lock().context = Some(context);
    }

    /// Called by the host once the delegate is bound and registered.
    pub fn on_attached(&self) -> Result<()> {
        self.activate()
    }

    /// Called by the host when the delegate leaves the screen's registry.
    pub fn on_detached(&self) {
        if let Some(context) = self.lock().context.take() {
            debug!(handle = %context.handle(), "Permission delegate detached");
        }
    }

    /// Evaluate the pending permission set.
    ///
    /// Reports `Granted` and detaches when everything is already granted,
    /// otherwise shows the platform dialog and waits for
    /// [`Self::on_request_permissions_result`]. An empty set detaches without
    /// reporting anything.
    pub fn activate(&self) -> Result<()> {
        let (permissions, context) = {
            let state = self.lock();
            (state.permissions.clone(), state.context.clone())
        };

        if permissions.is_empty() {
            debug!("Empty permission set, detaching delegate");
            self.remove_self(context.as_ref());
            return Ok(());
        }

        if let Some(ctx) = &context
            && !ctx.is_active()
        {
            debug!(handle = %ctx.handle(), "Screen is tearing down, skipping permission check");
            return Ok(());
        }

        if self.has_permissions(context.as_ref(), &permissions)? {
            debug!(permissions = %permissions, "Permissions already granted");
            self.report(Outcome::Granted, &permissions);
            self.remove_self(context.as_ref());
        } else if let Some(ctx) = context {
            info!(
                handle = %ctx.handle(),
                permissions = %permissions,
                "Prompting for permissions"
            );
            ctx.request_permissions(&permissions, PERMISSION_REQUEST_CODE);
        }
        Ok(())
    }

    /// Result callback routed by the host after the platform dialog closes.
    ///
    /// The first grant entry decides the outcome; an empty result array is a
    /// denial. Results carrying a foreign request code belong to someone else and are
    /// ignored without detaching.
    pub fn on_request_permissions_result(
        &self,
        request_code: i32,
        permissions: &[String],
        grant_results: &[GrantResult],
    ) {
        if request_code != PERMISSION_REQUEST_CODE {
            debug!(request_code, "Ignoring result for foreign request code");
            return;
        }

        let (pending, context) = {
            let state = self.lock();
            (state.permissions.clone(), state.context.clone())
        };

        let outcome = Outcome::from(matches!(grant_results.first(), Some(GrantResult::Granted)));
        info!(
            permissions = ?permissions,
            outcome = ?outcome,
            "Permission request resolved"
        );

        self.report(outcome, &pending);
        self.remove_self(context.as_ref());
    }

    fn has_permissions(
        &self,
        context: Option<&HostContext>,
        permissions: &PermissionSet,
    ) -> Result<bool> {
        if self.sdk_level < RUNTIME_PERMISSIONS_SDK_LEVEL {
            return Ok(true);
        }
        let ctx = context.ok_or(Error::MissingHostContext)?;
        Ok(permissions.iter().all(|p| ctx.check_self_permission(p)))
    }

    fn report(&self, outcome: Outcome, permissions: &PermissionSet) {
        let listener = self.lock().listener.clone();
        if let Some(listener) = listener {
            listener(outcome, permissions);
        }
    }

    fn remove_self(&self, context: Option<&HostContext>) {
        if let Some(ctx) = context {
            ctx.detach(self);
        }
    }

    fn lock(&self) -> MutexGuard<'_, DelegateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AttachmentDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("AttachmentDelegate")
            .field("sdk_level", &self.sdk_level)
            .field("permissions", &state.permissions)
            .field("attached", &state.context.is_some())
            .finish_non_exhaustive()
    }
}
