//! Loading, persisting and mutating the relay configuration document.

use crate::config::{RelayConfig, TopicBinding};
use parking_lot::{RwLock, RwLockReadGuard};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to write config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shared, versioned holder of the configuration document.
///
/// Readers take short read locks on the hot path. Every mutation bumps
/// [`ConfigStore::version`] and writes the document back to disk before
/// returning; components with derived caches compare the version they built
/// against the current one and rebuild on mismatch.
pub struct ConfigStore {
    path: Option<PathBuf>,
    config: RwLock<RelayConfig>,
    version: AtomicU64,
}

impl ConfigStore {
    /// Loads the document at `path`, falling back to the default document
    /// when the file is missing or malformed.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<RelayConfig>(&raw) {
                Ok(config) => {
                    log::info!("Configuration loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    log::error!("Invalid JSON in config file {}: {}", path.display(), e);
                    RelayConfig::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!(
                    "Config file {} not found, using default configuration",
                    path.display()
                );
                RelayConfig::default()
            }
            Err(e) => {
                log::error!("Error loading config {}: {}", path.display(), e);
                RelayConfig::default()
            }
        };

        Self {
            path: Some(path),
            config: RwLock::new(config),
            version: AtomicU64::new(0),
        }
    }

    /// Store without a backing file; mutations are kept in memory only.
    pub fn in_memory(config: RelayConfig) -> Self {
        Self {
            path: None,
            config: RwLock::new(config),
            version: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, RelayConfig> {
        self.config.read()
    }

    pub fn snapshot(&self) -> RelayConfig {
        self.config.read().clone()
    }

    /// Monotonic counter bumped by every effective mutation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn validate(&self) -> Vec<String> {
        self.config.read().validate()
    }

    /// Writes the current document to the backing file as pretty JSON.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&*self.config.read())?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        log::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Replaces the whole document, e.g. after an external edit.
    pub fn replace(&self, config: RelayConfig) -> Result<(), ConfigError> {
        self.mutate(|current| {
            *current = config;
            true
        })
        .map(|_| ())
    }

    pub fn add_source_group(&self, group_id: i64) -> Result<bool, ConfigError> {
        self.mutate(|config| {
            if config.source_groups.contains(&group_id) {
                return false;
            }
            config.source_groups.push(group_id);
            true
        })
    }

    pub fn add_target_group(&self, group_id: i64) -> Result<bool, ConfigError> {
        self.mutate(|config| {
            if config.target_groups.contains(&group_id) {
                return false;
            }
            config.target_groups.push(group_id);
            true
        })
    }

    pub fn set_target_topic(
        &self,
        group_id: i64,
        binding: Option<TopicBinding>,
    ) -> Result<bool, ConfigError> {
        self.mutate(|config| {
            let key = group_id.to_string();
            match binding {
                Some(binding) => config.target_topics.insert(key, binding.clone()) != Some(binding),
                None => config.target_topics.shift_remove(&key).is_some(),
            }
        })
    }

    pub fn add_keyword(&self, keyword: &str) -> Result<bool, ConfigError> {
        self.mutate(|config| {
            if config.filters.keywords.iter().any(|k| k == keyword) {
                return false;
            }
            config.filters.keywords.push(keyword.to_string());
            true
        })
    }

    pub fn remove_keyword(&self, keyword: &str) -> Result<bool, ConfigError> {
        self.mutate(|config| {
            let before = config.filters.keywords.len();
            config.filters.keywords.retain(|k| k != keyword);
            config.filters.keywords.len() != before
        })
    }

    pub fn add_replacement(&self, old_text: &str, new_text: &str) -> Result<bool, ConfigError> {
        self.mutate(|config| {
            let previous = config
                .text_replacements
                .insert(old_text.to_string(), new_text.to_string());
            previous.as_deref() != Some(new_text)
        })
    }

    pub fn remove_replacement(&self, old_text: &str) -> Result<bool, ConfigError> {
        self.mutate(|config| config.text_replacements.shift_remove(old_text).is_some())
    }

    /// Applies `change` under the write lock. When it reports a change the
    /// version is bumped and the document persisted.
    fn mutate<F>(&self, change: F) -> Result<bool, ConfigError>
    where
        F: FnOnce(&mut RelayConfig) -> bool,
    {
        let changed = {
            let mut config = self.config.write();
            let changed = change(&mut config);
            if changed {
                self.version.fetch_add(1, Ordering::AcqRel);
            }
            changed
        };

        if changed {
            self.save()?;
        }
        Ok(changed)
    }
}
