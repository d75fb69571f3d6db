//! Controller <-> client message protocol
//!
//! JSON objects tagged on `type`. Unknown tags are rejected at parse time;
//! receivers log the rejection and drop the message.

use crate::error::{SwcacheError, SwcacheResult};
use serde::{Deserialize, Serialize};

/// Messages broadcast by the controller to every connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControllerMessage {
    CacheStarted,
    CacheProgress {
        /// Percent in [0, 100]
        progress: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    CacheComplete,
    Activated,
}

/// Messages posted by a client to a specific worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(alias = "SKIP_WAITING")]
    SkipWaiting,
}

/// Upper bound of `cache-progress`
pub const MAX_PROGRESS: u8 = 100;

impl ControllerMessage {
    pub fn parse(raw: &str) -> SwcacheResult<Self> {
        let msg: Self = parse_tagged(raw)?;
        msg.check()?;
        Ok(msg)
    }

    pub fn to_json(&self) -> SwcacheResult<String> {
        self.check()?;
        Ok(serde_json::to_string(self)?)
    }

    fn check(&self) -> SwcacheResult<()> {
        match self {
            Self::CacheProgress { progress, .. } if *progress > MAX_PROGRESS => Err(
                SwcacheError::Protocol(format!("cache-progress out of range: {}", progress)),
            ),
            _ => Ok(()),
        }
    }
}

impl ClientMessage {
    pub fn parse(raw: &str) -> SwcacheResult<Self> {
        parse_tagged(raw)
    }

    pub fn to_json(&self) -> SwcacheResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn parse_tagged<T: for<'de> Deserialize<'de>>(raw: &str) -> SwcacheResult<T> {
    serde_json::from_str(raw).map_err(|e| SwcacheError::Protocol(format!("{}: {}", e, raw)))
}
