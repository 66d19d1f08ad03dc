//! Centralized configuration: the relay document schema, its defaults, and
//! the static constants the pipeline runs with.

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// **Environment variables:** read once by the binary at startup.
pub mod env {
    /// Bot token for the Telegram Bot API. Required, must be non-empty.
    pub const BOT_TOKEN: &str = "BOT_TOKEN";
    /// Path of the JSON configuration document.
    pub const CONFIG_FILE: &str = "CONFIG_FILE";
    /// Port the health endpoint listens on.
    pub const PORT: &str = "PORT";
    /// Log filter passed to the logger (e.g. `"info"`, `"telegram_relay_bot=debug"`).
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    /// Refuse to start when the configuration document fails validation.
    pub const STRICT_CONFIG: &str = "STRICT_CONFIG";
}

/// **Defaults:** values used when neither the document nor the environment sets them.
pub mod defaults {
    /// Default configuration document path.
    pub const CONFIG_FILE: &str = "config.json";
    /// Default health endpoint port.
    pub const PORT: u16 = 5000;
    /// Default log filter.
    pub const LOG_LEVEL: &str = "info";
    /// Default delay between forwarded queue items (seconds).
    pub const FORWARD_DELAY: f64 = 1.0;
    /// Default number of send attempts per target.
    pub const MAX_RETRIES: u32 = 3;
    /// Service name reported by the health endpoint.
    pub const SERVICE_NAME: &str = "telegram_relay_bot";
}

/// **Pipeline limits:** timing and sizing constants of the relay loop.
pub mod limits {
    /// Dedup set soft cap; exceeding it triggers a bulk eviction.
    pub const DEDUP_CAPACITY: usize = 1000;
    /// Number of oldest entries evicted once the cap is exceeded.
    pub const DEDUP_EVICTION: usize = 500;
    /// Longest pause the worker takes between two items (seconds).
    pub const MAX_FORWARD_DELAY_SECS: f64 = 3600.0;
    /// Wait before trying to re-establish a dropped transport session (seconds).
    pub const RECONNECT_DELAY_SECS: u64 = 30;
    /// Wait after a failed reconnect attempt before the next one (seconds).
    pub const RECONNECT_FAILURE_DELAY_SECS: u64 = 60;
    /// Messages read from each source group when verifying access at startup.
    pub const ACCESS_CHECK_LIMIT: usize = 1;
    /// Messages read from each source group by the startup reception probe.
    pub const RECEPTION_PROBE_LIMIT: usize = 3;
    /// Characters of message text included in log lines.
    pub const LOG_PREVIEW_CHARS: usize = 100;
    /// Consecutive polling failures after which the session counts as dropped.
    pub const POLLING_FAILURE_THRESHOLD: u32 = 5;
    /// A polling failure this long after the previous one starts a new streak (seconds).
    pub const POLLING_FAILURE_WINDOW_SECS: u64 = 300;
}

/// Forum topic a target group's messages are posted into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicBinding {
    pub topic_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,
}

/// Keyword rules that replace the global filter for a single source group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupFilter {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub group_specific: IndexMap<String, GroupFilter>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            case_sensitive: false,
            keywords: Vec::new(),
            group_specific: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds to wait after each queue item before taking the next one.
    #[serde(default = "default_forward_delay")]
    pub forward_delay: f64,
    /// Send attempts per target before the target is abandoned for an item.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub enable_media_forwarding: bool,
    #[serde(default = "default_true")]
    pub enable_text_processing: bool,
    /// When false every text message passes the keyword stage untouched.
    #[serde(default = "default_true")]
    pub enable_keyword_filtering: bool,
    /// Chat allowed to issue admin commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_chat_id: Option<i64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            forward_delay: defaults::FORWARD_DELAY,
            max_retries: defaults::MAX_RETRIES,
            enable_media_forwarding: true,
            enable_text_processing: true,
            enable_keyword_filtering: true,
            admin_chat_id: None,
        }
    }
}

/// The relay configuration document.
///
/// Group ids used as map keys are stored as strings, matching the JSON
/// document layout. Replacement maps keep their insertion order, which is
/// also their match priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub source_groups: Vec<i64>,
    #[serde(default)]
    pub target_groups: Vec<i64>,
    #[serde(default)]
    pub target_topics: IndexMap<String, TopicBinding>,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub text_replacements: IndexMap<String, String>,
    #[serde(default)]
    pub group_specific_replacements: IndexMap<String, IndexMap<String, String>>,
    #[serde(default)]
    pub settings: Settings,
}

impl RelayConfig {
    pub fn is_source_group(&self, group_id: i64) -> bool {
        self.source_groups.contains(&group_id)
    }

    pub fn topic_for(&self, target_group_id: i64) -> Option<&TopicBinding> {
        self.target_topics.get(&target_group_id.to_string())
    }

    pub fn group_filter(&self, source_group_id: i64) -> Option<&GroupFilter> {
        self.filters.group_specific.get(&source_group_id.to_string())
    }

    pub fn group_replacements(&self, source_group_id: i64) -> Option<&IndexMap<String, String>> {
        self.group_specific_replacements
            .get(&source_group_id.to_string())
            .filter(|rules| !rules.is_empty())
    }

    /// Checks the document's invariants and returns one message per violation.
    ///
    /// Validation is advisory: the caller decides whether a non-empty result
    /// prevents startup.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.source_groups.is_empty() {
            errors.push("No source groups configured".to_string());
        }
        if self.target_groups.is_empty() {
            errors.push("No target groups configured".to_string());
        }
        if self.filters.enabled
            && self.filters.keywords.is_empty()
            && self.filters.group_specific.is_empty()
        {
            errors.push("Keyword filtering is enabled but no keywords configured".to_string());
        }
        if self.settings.forward_delay < 0.0 || !self.settings.forward_delay.is_finite() {
            errors.push("Forward delay cannot be negative".to_string());
        } else if self.settings.forward_delay > limits::MAX_FORWARD_DELAY_SECS {
            errors.push(format!(
                "Forward delay cannot exceed {} seconds",
                limits::MAX_FORWARD_DELAY_SECS
            ));
        }
        if self.settings.max_retries < 1 {
            errors.push("Max retries must be at least 1".to_string());
        }

        errors
    }
}

fn default_true() -> bool {
    true
}

fn default_forward_delay() -> f64 {
    defaults::FORWARD_DELAY
}

fn default_max_retries() -> u32 {
    defaults::MAX_RETRIES
}

/// Process-level settings taken from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeEnv {
    pub bot_token: String,
    pub config_file: String,
    pub port: u16,
    pub log_level: String,
    pub strict_config: bool,
}

impl RuntimeEnv {
    pub fn from_env() -> anyhow::Result<Self> {
        let bot_token = std::env::var(env::BOT_TOKEN).unwrap_or_default();
        if bot_token.trim().is_empty() {
            anyhow::bail!("{} must be set to a non-empty bot token", env::BOT_TOKEN);
        }

        let port = match std::env::var(env::PORT) {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("{} is not a valid port: {}", env::PORT, raw))?,
            Err(_) => defaults::PORT,
        };

        let strict_config = match std::env::var(env::STRICT_CONFIG) {
            Ok(raw) => !matches!(raw.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"),
            Err(_) => true,
        };

        Ok(Self {
            bot_token: bot_token.trim().to_string(),
            config_file: std::env::var(env::CONFIG_FILE)
                .unwrap_or_else(|_| defaults::CONFIG_FILE.to_string()),
            port,
            log_level: std::env::var(env::LOG_LEVEL).unwrap_or_else(|_| defaults::LOG_LEVEL.to_string()),
            strict_config,
        })
    }
}
