//! Keyword filtering of inbound message text.

use crate::config::RelayConfig;
use crate::config_store::{ConfigError, ConfigStore};
use crate::utils::clean_text;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Which rule set produced a filter decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterScope {
    /// The source group's own keyword list (a full override of the global one).
    GroupSpecific,
    /// The global keyword list.
    Global,
    /// Global filtering is switched off.
    Disabled,
    /// Global filtering is on but has no keywords.
    NoKeywords,
}

/// Outcome of a filter check with the reason behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub passed: bool,
    pub scope: FilterScope,
    pub matched_keyword: Option<String>,
    pub reason: &'static str,
}

impl FilterReport {
    fn new(passed: bool, scope: FilterScope, reason: &'static str) -> Self {
        Self {
            passed,
            scope,
            matched_keyword: None,
            reason,
        }
    }
}

enum KeywordMatcher {
    /// Multi-word keywords match as a plain substring.
    Phrase {
        keyword: String,
        needle: String,
        case_sensitive: bool,
    },
    /// Single words must stand between non-word characters or the text edges.
    Word { keyword: String, pattern: Regex },
}

impl KeywordMatcher {
    fn compile(keyword: &str, case_sensitive: bool) -> Option<Self> {
        if keyword.trim().is_empty() {
            log::debug!("Skipping empty keyword");
            return None;
        }

        if keyword.contains(' ') {
            let needle = if case_sensitive {
                keyword.to_string()
            } else {
                keyword.to_lowercase()
            };
            return Some(KeywordMatcher::Phrase {
                keyword: keyword.to_string(),
                needle,
                case_sensitive,
            });
        }

        let flags = if case_sensitive { "" } else { "(?i)" };
        let pattern = format!(r"{}(?:^|\W){}(?:\W|$)", flags, regex::escape(keyword));
        match Regex::new(&pattern) {
            Ok(pattern) => Some(KeywordMatcher::Word {
                keyword: keyword.to_string(),
                pattern,
            }),
            Err(e) => {
                log::warn!("Invalid pattern for keyword '{}': {}", keyword, e);
                None
            }
        }
    }

    fn keyword(&self) -> &str {
        match self {
            KeywordMatcher::Phrase { keyword, .. } | KeywordMatcher::Word { keyword, .. } => keyword,
        }
    }

    fn matches(&self, text: &str, lowered: &str) -> bool {
        match self {
            KeywordMatcher::Phrase {
                needle,
                case_sensitive: true,
                ..
            } => text.contains(needle.as_str()),
            KeywordMatcher::Phrase { needle, .. } => lowered.contains(needle.as_str()),
            KeywordMatcher::Word { pattern, .. } => pattern.is_match(text),
        }
    }
}

struct CompiledKeywords {
    global: Vec<KeywordMatcher>,
    groups: HashMap<String, Vec<KeywordMatcher>>,
}

impl CompiledKeywords {
    fn build(config: &RelayConfig) -> Self {
        let case_sensitive = config.filters.case_sensitive;
        let compile_all = |keywords: &[String]| -> Vec<KeywordMatcher> {
            keywords
                .iter()
                .filter_map(|k| KeywordMatcher::compile(k, case_sensitive))
                .collect()
        };

        let global = compile_all(&config.filters.keywords);
        let groups = config
            .filters
            .group_specific
            .iter()
            .map(|(group, rules)| (group.clone(), compile_all(&rules.keywords)))
            .collect();

        log::debug!(
            "Compiled {} global keyword patterns (case_sensitive={})",
            global.len(),
            case_sensitive
        );
        Self { global, groups }
    }
}

/// Decides whether a message's text is forwarded, based on the global or
/// per-source-group keyword lists of the shared configuration.
pub struct KeywordFilter {
    store: Arc<ConfigStore>,
    cache: Mutex<Option<(u64, Arc<CompiledKeywords>)>>,
}

impl KeywordFilter {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(None),
        }
    }

    /// Returns `true` when `text` from `source_group_id` should be forwarded.
    pub fn passes(&self, text: &str, source_group_id: i64) -> bool {
        self.explain(text, source_group_id).passed
    }

    /// Runs the filter and reports which rule decided and why.
    pub fn explain(&self, text: &str, source_group_id: i64) -> FilterReport {
        let config = self.store.read();
        let compiled = self.compiled(&config);

        if let Some(group) = config.group_filter(source_group_id).filter(|g| g.enabled) {
            if group.keywords.is_empty() {
                log::debug!(
                    "Group {} has an empty keyword list - blocking all messages",
                    source_group_id
                );
                return FilterReport::new(false, FilterScope::GroupSpecific, "empty group keyword list");
            }
            let matchers = compiled
                .groups
                .get(&source_group_id.to_string())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let report = first_match(matchers, &clean_text(text), FilterScope::GroupSpecific);
            log::debug!(
                "Group-specific filter result for {}: {}",
                source_group_id,
                if report.passed { "PASS" } else { "BLOCK" }
            );
            return report;
        }

        if !config.filters.enabled {
            return FilterReport::new(true, FilterScope::Disabled, "filtering disabled");
        }
        if config.filters.keywords.is_empty() {
            return FilterReport::new(true, FilterScope::NoKeywords, "no keywords configured");
        }

        let clean = clean_text(text);
        if clean.is_empty() {
            log::debug!("Empty message text from group {} - blocking", source_group_id);
            return FilterReport::new(false, FilterScope::Global, "no text to filter");
        }
        first_match(&compiled.global, &clean, FilterScope::Global)
    }

    pub fn add_keyword(&self, keyword: &str) -> Result<bool, ConfigError> {
        let added = self.store.add_keyword(keyword)?;
        if added {
            log::info!("Added keyword filter: {}", keyword);
        } else {
            log::warn!("Keyword already exists: {}", keyword);
        }
        Ok(added)
    }

    pub fn remove_keyword(&self, keyword: &str) -> Result<bool, ConfigError> {
        let removed = self.store.remove_keyword(keyword)?;
        if removed {
            log::info!("Removed keyword filter: {}", keyword);
        } else {
            log::warn!("Keyword filter not found: {}", keyword);
        }
        Ok(removed)
    }

    pub fn active_keywords(&self) -> Vec<String> {
        self.store.read().filters.keywords.clone()
    }

    /// Compiled matchers for the current store version, rebuilt on change.
    fn compiled(&self, config: &RelayConfig) -> Arc<CompiledKeywords> {
        let version = self.store.version();
        let mut cache = self.cache.lock();
        match cache.as_ref() {
            Some((built, compiled)) if *built == version => compiled.clone(),
            _ => {
                let compiled = Arc::new(CompiledKeywords::build(config));
                *cache = Some((version, compiled.clone()));
                compiled
            }
        }
    }
}

fn first_match(matchers: &[KeywordMatcher], text: &str, scope: FilterScope) -> FilterReport {
    if text.is_empty() {
        return FilterReport::new(false, scope, "no text to filter");
    }
    let lowered = text.to_lowercase();
    match matchers.iter().find(|m| m.matches(text, &lowered)) {
        Some(matcher) => {
            log::debug!("Message PASSED filter with keyword: {}", matcher.keyword());
            FilterReport {
                passed: true,
                scope,
                matched_keyword: Some(matcher.keyword().to_string()),
                reason: "keyword matched",
            }
        }
        None => FilterReport::new(false, scope, "no matching keywords"),
    }
}
