//! Test helpers: a [`Platform`] that records prompts instead of showing them.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::host::{Platform, PromptRequest};

/// Platform double with an in-memory grant store and a prompt log.
#[derive(Debug)]
pub struct RecordingPlatform {
    sdk_level: u32,
    granted: Mutex<HashSet<String>>,
    prompts: Mutex<Vec<PromptRequest>>,
    prompt_tx: mpsc::UnboundedSender<PromptRequest>,
    prompt_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PromptRequest>>,
}

impl RecordingPlatform {
    pub fn new(sdk_level: u32) -> Self {
        let (prompt_tx, prompt_rx) = mpsc::unbounded_channel();
        Self {
            sdk_level,
            granted: Mutex::new(HashSet::new()),
            prompts: Mutex::new(Vec::new()),
            prompt_tx,
            prompt_rx: tokio::sync::Mutex::new(prompt_rx),
        }
    }

    /// Mark `permissions` as already granted.
    #[must_use]
    pub fn with_granted<I, S>(self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.granted).extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn grant(&self, permission: &str) {
        lock(&self.granted).insert(permission.to_string());
    }

    /// Every prompt shown so far, oldest first.
    pub fn prompts(&self) -> Vec<PromptRequest> {
        lock(&self.prompts).clone()
    }

    pub fn prompt_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Wait for the next prompt not yet consumed by this method.
    ///
    /// Panics if no prompt arrives within five seconds.
    #[allow(clippy::expect_used)]
    pub async fn next_prompt(&self) -> PromptRequest {
        let mut rx = self.prompt_rx.lock().await;
        tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a permission prompt")
            .expect("prompt channel closed")
    }
}

impl Platform for RecordingPlatform {
    fn sdk_level(&self) -> u32 {
        self.sdk_level
    }

    fn check_self_permission(&self, permission: &str) -> bool {
        lock(&self.granted).contains(permission)
    }

    fn prompt(&self, request: PromptRequest) {
        lock(&self.prompts).push(request.clone());
        let _ = self.prompt_tx.send(request);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
