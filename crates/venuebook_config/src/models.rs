// --- File: crates/venuebook_config/src/models.rs ---

use serde::{Deserialize, Serialize};

// --- Remote API ---
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String, // e.g. VENUEBOOK_API__BASE_URL
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Bounded retry policy for the live event channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Consecutive failed attempts before the channel gives up.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            factor: 2.0,
        }
    }
}

// --- Live Event Channel ---
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LiveConfig {
    /// Base URL of the event server. Falls back to `api.base_url` when unset.
    pub url: Option<String>,
    pub namespace: String,
    pub path: String,
    pub reconnect: ReconnectConfig,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            url: None,
            namespace: "/ws".to_string(),
            path: "/socket.io/".to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// How long the venue list is considered fresh.
    pub venue_stale_secs: u64,
    /// Refetch budget when an invalidation lands while a fetch is in flight.
    pub max_refetch: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            venue_stale_secs: 300,
            max_refetch: 3,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub max_items: usize,
    pub retention_days: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_items: 50,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: ".venuebook".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    /// IANA timezone name used when rendering instants for people.
    pub timezone: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Directory for the daily rolling log file. Console only when unset.
    pub dir: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

// Unattended sign-in for the agent. Password is usually "secret_from_env".
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CredentialsConfig {
    pub email: String,
    pub password: String,
}

// --- Unified App Configuration ---
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
}

impl AppConfig {
    /// The event server base URL, defaulting to the REST base URL.
    pub fn live_url(&self) -> &str {
        self.live.url.as_deref().unwrap_or(&self.api.base_url)
    }
}
