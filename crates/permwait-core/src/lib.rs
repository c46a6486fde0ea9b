//! `permwait` Core Library
//!
//! Turns a callback-driven runtime permission flow into a single `async` call:
//! - Attachment delegate that performs one round trip against the platform
//! - Result coordinator fanning the outcome out to registered observers
//! - Suspension adapter resuming the caller exactly once
//! - Host boundary traits and an in-process reference host
//! - Configuration resolution and common error types

pub mod config;
pub mod coordinator;
pub mod delegate;
pub mod error;
pub mod host;
pub mod local_host;
pub mod permission;
pub mod suspend;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod tracing_init;

pub use config::Config;
pub use coordinator::{ResultCoordinator, ResultListener};
pub use delegate::AttachmentDelegate;
pub use error::{Error, Result};
pub use host::{AttachError, HandleId, Host, HostContext, Platform, PromptRequest, ScreenRef};
pub use local_host::LocalHost;
pub use permission::{GrantResult, Outcome, PermissionSet};
pub use suspend::{Continuation, request_permissions_for_result};
