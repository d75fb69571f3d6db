//! Operator-facing prompts

use crate::registration::WorkerInfo;
use async_trait::async_trait;

/// Operator's answer to an update prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Hand off to the new version now
    Accept,
    /// Keep the current version; the new one stays waiting
    Dismiss,
}

/// Dismissible "update available" prompt.
///
/// The client races [`UpdatePrompt::ask`] against the grace period; an
/// implementation that never answers is treated as acceptance once the
/// grace period elapses.
#[async_trait]
pub trait UpdatePrompt: Send + Sync {
    async fn ask(&self, waiting: &WorkerInfo) -> UpdateDecision;
}

/// Operator's answer to the native install prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallChoice {
    Accepted,
    Dismissed,
}

/// Handle to the platform's native "install app" prompt
#[async_trait]
pub trait InstallPrompt: Send + Sync {
    /// Show the prompt and wait for the operator's choice
    async fn prompt(&self) -> InstallChoice;
}
