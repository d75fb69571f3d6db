//! Active/waiting instance register
//!
//! A registration holds at most one active and at most one waiting worker,
//! and never a waiting worker without an active one. The three states are
//! the only representable ones.

use crate::error::{SwcacheError, SwcacheResult};

/// What happened to a freshly installed worker
#[derive(Debug, PartialEq, Eq)]
pub enum InstallOutcome<W> {
    /// No active worker existed; the new one became active immediately
    Activated,
    /// An active worker exists; the new one waits. A previous waiting
    /// worker, if any, is displaced and becomes redundant.
    Waiting { displaced: Option<W> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceRegister<W> {
    Empty,
    Active(W),
    ActiveWaiting {
        active: W,
        waiting: W,
    },
}

impl<W> Default for InstanceRegister<W> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<W> InstanceRegister<W> {
    pub fn active(&self) -> Option<&W> {
        match self {
            Self::Empty => None,
            Self::Active(active) | Self::ActiveWaiting { active, .. } => Some(active),
        }
    }

    pub fn waiting(&self) -> Option<&W> {
        match self {
            Self::ActiveWaiting { waiting, .. } => Some(waiting),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Record a worker that finished installing
    pub fn installed(&mut self, worker: W) -> InstallOutcome<W> {
        match std::mem::take(self) {
            Self::Empty => {
                *self = Self::Active(worker);
                InstallOutcome::Activated
            }
            Self::Active(active) => {
                *self = Self::ActiveWaiting {
                    active,
                    waiting: worker,
                };
                InstallOutcome::Waiting { displaced: None }
            }
            Self::ActiveWaiting { active, waiting } => {
                *self = Self::ActiveWaiting {
                    active,
                    waiting: worker,
                };
                InstallOutcome::Waiting {
                    displaced: Some(waiting),
                }
            }
        }
    }

    /// Promote the waiting worker; returns the retired active worker
    pub fn promote(&mut self) -> SwcacheResult<W> {
        match std::mem::take(self) {
            Self::ActiveWaiting { active, waiting } => {
                *self = Self::Active(waiting);
                Ok(active)
            }
            other => {
                *self = other;
                Err(SwcacheError::NoWaitingWorker)
            }
        }
    }

    /// Empty the register, returning every worker it held
    pub fn clear(&mut self) -> Vec<W> {
        match std::mem::take(self) {
            Self::Empty => vec![],
            Self::Active(active) => vec![active],
            Self::ActiveWaiting { active, waiting } => vec![active, waiting],
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Empty => "none",
            Self::Active(_) => "active",
            Self::ActiveWaiting { .. } => "active+waiting",
        }
    }
}
