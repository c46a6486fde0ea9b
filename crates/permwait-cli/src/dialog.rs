//! Terminal stand-in for the platform permission dialog.
//!
//! [`TerminalPlatform`] never blocks the host's UI thread: prompts are
//! forwarded over a channel and answered by the session loop, which then
//! feeds the decision back through the host's result callback.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use dialoguer::Confirm;
use serde::Serialize;
use tokio::sync::mpsc;

use permwait_core::{GrantResult, PermissionSet, Platform, PromptRequest};

/// How prompts are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnswerPolicy {
    /// Ask on the terminal, one confirmation per permission.
    Ask,
    /// Grant everything without asking.
    Allow,
    /// Deny everything without asking.
    Deny,
}

/// Platform whose grant store lives in memory and whose dialog is the
/// terminal.
pub struct TerminalPlatform {
    sdk_level: u32,
    granted: Mutex<HashSet<String>>,
    prompt_tx: mpsc::UnboundedSender<PromptRequest>,
}

impl TerminalPlatform {
    pub fn new<I>(sdk_level: u32, pre_granted: I) -> (Self, mpsc::UnboundedReceiver<PromptRequest>)
    where
        I: IntoIterator<Item = String>,
    {
        let (prompt_tx, prompt_rx) = mpsc::unbounded_channel();
        let platform = Self {
            sdk_level,
            granted: Mutex::new(pre_granted.into_iter().collect()),
            prompt_tx,
        };
        (platform, prompt_rx)
    }

    /// Remember the user's answer for later grant checks.
    pub fn record(&self, permission: &str, result: GrantResult) {
        let mut granted = self.granted();
        match result {
            GrantResult::Granted => granted.insert(permission.to_string()),
            GrantResult::Denied => granted.remove(permission),
        };
    }

    fn granted(&self) -> MutexGuard<'_, HashSet<String>> {
        self.granted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Platform for TerminalPlatform {
    fn sdk_level(&self) -> u32 {
        self.sdk_level
    }

    fn check_self_permission(&self, permission: &str) -> bool {
        self.granted().contains(permission)
    }

    fn prompt(&self, request: PromptRequest) {
        if self.prompt_tx.send(request).is_err() {
            tracing::warn!("Prompt receiver closed, dialog dropped");
        }
    }
}

/// Produce one grant result per permission of `prompt`.
pub async fn answer(prompt: &PromptRequest, policy: AnswerPolicy) -> Result<Vec<GrantResult>> {
    let count = prompt.permissions.len();
    match policy {
        AnswerPolicy::Allow => Ok(vec![GrantResult::Granted; count]),
        AnswerPolicy::Deny => Ok(vec![GrantResult::Denied; count]),
        AnswerPolicy::Ask => {
            let permissions = prompt.permissions.clone();
            tokio::task::spawn_blocking(move || ask_each(&permissions)).await?
        }
    }
}

fn ask_each(permissions: &PermissionSet) -> Result<Vec<GrantResult>> {
    permissions
        .iter()
        .map(|permission| {
            let allow = Confirm::new()
                .with_prompt(format!("Allow access to {permission}?"))
                .default(false)
                .interact()?;
            Ok(GrantResult::from(allow))
        })
        .collect()
}
