//! Configuration schema for swcache
//!
//! Configuration is stored at `~/.config/swcache/config.toml`

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Origin whose assets are cached
    pub origin: OriginConfig,

    /// Cache store naming and essential assets
    pub cache: CacheConfig,

    /// Requests and hosts that are never intercepted
    pub bypass: BypassConfig,

    /// Lifecycle client timing
    pub lifecycle: LifecycleConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Origin settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin URL (scheme, host and port)
    pub url: String,

    /// Path of the controller script, probed on loopback hosts
    pub script_path: String,

    /// Per-request network timeout in seconds (0 = none)
    pub timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            script_path: "/service-worker.js".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Cache store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store name prefix for the main application
    pub app_prefix: String,

    /// Store name prefix for the administrative variant
    pub admin_prefix: String,

    /// Version tag of the main store
    pub version: String,

    /// Version tag of the admin store
    pub admin_version: String,

    /// Path namespace served by the admin flavor
    pub admin_namespace: String,

    /// Essential assets primed on install of the main flavor
    pub main_assets: Vec<String>,

    /// Essential assets primed on install of the admin flavor
    pub admin_assets: Vec<String>,

    /// Document served to navigations when offline
    pub offline_document: String,

    /// Delay between synthetic progress steps after essential assets
    pub ramp_step_ms: u64,

    /// Percent added per synthetic progress step
    pub ramp_step_percent: u8,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            app_prefix: "quiz-app".to_string(),
            admin_prefix: "quiz-admin".to_string(),
            version: "1.0.1".to_string(),
            admin_version: "1.0.1".to_string(),
            admin_namespace: "/admin".to_string(),
            main_assets: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/static/js/bundle.js".to_string(),
                "/static/css/main.css".to_string(),
                "/manifest.json".to_string(),
            ],
            admin_assets: vec![
                "/admin".to_string(),
                "/admin/dashboard".to_string(),
                "/admin/login".to_string(),
                "/index.html".to_string(),
                "/static/js/bundle.js".to_string(),
                "/static/css/main.css".to_string(),
                "/manifest-admin.json".to_string(),
            ],
            offline_document: "/index.html".to_string(),
            ramp_step_ms: 50,
            ramp_step_percent: 10,
        }
    }
}

/// Bypass rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BypassConfig {
    /// Hostname suffixes on which caching is disabled entirely
    pub hostname_suffixes: Vec<String>,

    /// Path namespaces of remote APIs
    pub api_prefixes: Vec<String>,

    /// Path namespaces of administrative and code-push routes
    pub control_prefixes: Vec<String>,
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            hostname_suffixes: vec!["emergent.sh".to_string()],
            api_prefixes: vec!["/api".to_string()],
            control_prefixes: vec![
                "/admin".to_string(),
                "/push".to_string(),
                "/gitpush".to_string(),
            ],
        }
    }
}

/// Lifecycle client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Seconds between update checks
    pub poll_interval_secs: u64,

    /// Seconds an update prompt waits before forcing the handoff
    pub update_grace_secs: u64,

    /// Milliseconds between install progress ticks
    pub install_tick_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            update_grace_secs: 15,
            install_tick_ms: 100,
        }
    }
}
