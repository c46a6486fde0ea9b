//! One permission request against a freshly opened terminal screen.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use permwait_core::{Error, LocalHost, Outcome, PermissionSet, ScreenRef};

use crate::dialog::{self, AnswerPolicy, TerminalPlatform};

/// Inputs for a single session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub permissions: Vec<String>,
    pub sdk_level: u32,
    pub pre_granted: Vec<String>,
    pub answer: AnswerPolicy,
}

/// What happened during the session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub permissions: PermissionSet,
    pub outcome: Outcome,
    /// Number of dialogs the platform showed.
    pub prompts: usize,
}

/// Request the configured permissions and answer dialogs until the request
/// resolves.
pub async fn run(options: SessionOptions) -> Result<SessionReport> {
    let (platform, mut prompt_rx) =
        TerminalPlatform::new(options.sdk_level, options.pre_granted.clone());
    let platform = Arc::new(platform);
    let host = LocalHost::new(platform.clone())?;
    let handle = host.open_screen();
    let screen = ScreenRef::new(Arc::new(host.clone()), handle);
    info!(%handle, permissions = ?options.permissions, "Requesting permissions");

    let permissions = options.permissions.clone();
    let mut request =
        tokio::spawn(async move { screen.request_permissions_for_result(permissions).await });

    let mut prompts = 0;
    let result = loop {
        tokio::select! {
            joined = &mut request => break joined?,
            Some(prompt) = prompt_rx.recv() => {
                prompts += 1;
                debug!(permissions = %prompt.permissions, "Answering permission dialog");
                let grants = dialog::answer(&prompt, options.answer).await?;
                for (permission, grant) in prompt.permissions.iter().zip(&grants) {
                    platform.record(permission, *grant);
                }
                host.respond(&prompt, grants);
            }
        }
    };
    host.destroy(handle);

    let outcome = match result {
        Ok(_) => Outcome::Granted,
        Err(Error::PermissionRequestFailed) => Outcome::Denied,
        Err(e) => return Err(e.into()),
    };
    info!(outcome = ?outcome, prompts, "Permission request finished");

    Ok(SessionReport {
        permissions: options.permissions.into_iter().collect(),
        outcome,
        prompts,
    })
}
