//! First-match text substitution over emoji-cleaned message text.
//!
//! Replacement rules are meant for a handful of mutually exclusive templates
//! (e.g. reformatting one kind of alert), so at most one rule is applied per
//! message. Matching runs against the cleaned text; when a rule fires, the
//! cleaned text is what gets returned, and decorative symbols elsewhere in
//! the message are dropped with it.

use crate::config::RelayConfig;
use crate::config_store::{ConfigError, ConfigStore};
use crate::utils::clean_text;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementScope {
    GroupSpecific,
    Global,
}

/// What a replacement pass did to a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementReport {
    pub original: String,
    pub result: String,
    pub scope: Option<ReplacementScope>,
    /// `(old, new)` of the rule that fired, as written in the configuration.
    pub matched_rule: Option<(String, String)>,
}

impl ReplacementReport {
    pub fn changed(&self) -> bool {
        self.matched_rule.is_some()
    }

    fn unchanged(text: &str) -> Self {
        Self {
            original: text.to_string(),
            result: text.to_string(),
            scope: None,
            matched_rule: None,
        }
    }
}

struct Rule {
    old: String,
    clean_old: String,
    new: String,
}

struct CompiledRules {
    global: Vec<Rule>,
    groups: HashMap<String, Vec<Rule>>,
}

impl CompiledRules {
    fn build(config: &RelayConfig) -> Self {
        Self {
            global: clean_rules(&config.text_replacements),
            groups: config
                .group_specific_replacements
                .iter()
                .filter(|(_, rules)| !rules.is_empty())
                .map(|(group, rules)| (group.clone(), clean_rules(rules)))
                .collect(),
        }
    }
}

fn clean_rules(rules: &IndexMap<String, String>) -> Vec<Rule> {
    rules
        .iter()
        .filter_map(|(old, new)| {
            let clean_old = clean_text(old);
            if clean_old.is_empty() {
                log::warn!("Replacement pattern '{}' is empty once cleaned - skipping", old);
                return None;
            }
            Some(Rule {
                old: old.clone(),
                clean_old,
                new: new.clone(),
            })
        })
        .collect()
}

pub struct TextReplacer {
    store: Arc<ConfigStore>,
    cache: Mutex<Option<(u64, Arc<CompiledRules>)>>,
}

impl TextReplacer {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(None),
        }
    }

    /// Applies the first matching replacement rule to `text`.
    ///
    /// Rules configured for `source_group_id` take precedence over the global
    /// rules; when a group has its own rules the global ones are not consulted.
    pub fn apply(&self, text: &str, source_group_id: Option<i64>) -> String {
        self.preview(text, source_group_id).result
    }

    /// Same as [`TextReplacer::apply`], reporting which rule fired.
    pub fn preview(&self, text: &str, source_group_id: Option<i64>) -> ReplacementReport {
        if text.is_empty() {
            return ReplacementReport::unchanged(text);
        }

        let compiled = self.compiled();
        // Keyed on the configured rules, so a group whose patterns all clean
        // to nothing still shadows the global rules.
        let group_rules = source_group_id.and_then(|id| compiled.groups.get(&id.to_string()));

        let (scope, outcome) = match group_rules {
            Some(rules) => (ReplacementScope::GroupSpecific, replace_first_occurrence(text, rules)),
            None => (ReplacementScope::Global, replace_in_first_line(text, &compiled.global)),
        };

        match outcome {
            Some((result, rule)) => {
                log::info!("{:?} replacement applied: '{}' -> '{}'", scope, rule.old, rule.new);
                ReplacementReport {
                    original: text.to_string(),
                    result,
                    scope: Some(scope),
                    matched_rule: Some((rule.old.clone(), rule.new.clone())),
                }
            }
            None => ReplacementReport::unchanged(text),
        }
    }

    pub fn add_replacement(&self, old_text: &str, new_text: &str) -> Result<bool, ConfigError> {
        let added = self.store.add_replacement(old_text, new_text)?;
        if added {
            log::info!("Added text replacement: '{}' -> '{}'", old_text, new_text);
        }
        Ok(added)
    }

    pub fn remove_replacement(&self, old_text: &str) -> Result<bool, ConfigError> {
        let removed = self.store.remove_replacement(old_text)?;
        if removed {
            log::info!("Removed text replacement: '{}'", old_text);
        } else {
            log::warn!("Text replacement not found: '{}'", old_text);
        }
        Ok(removed)
    }

    pub fn active_replacements(&self) -> IndexMap<String, String> {
        self.store.read().text_replacements.clone()
    }

    fn compiled(&self) -> Arc<CompiledRules> {
        let config = self.store.read();
        let version = self.store.version();
        let mut cache = self.cache.lock();
        match cache.as_ref() {
            Some((built, compiled)) if *built == version => compiled.clone(),
            _ => {
                let compiled = Arc::new(CompiledRules::build(&config));
                *cache = Some((version, compiled.clone()));
                compiled
            }
        }
    }
}

/// Group-specific pass: the first rule contained anywhere in the cleaned text
/// replaces its first occurrence.
fn replace_first_occurrence<'r>(text: &str, rules: &'r [Rule]) -> Option<(String, &'r Rule)> {
    let clean = clean_text(text);
    rules
        .iter()
        .find(|rule| clean.contains(&rule.clean_old))
        .map(|rule| (clean.replacen(&rule.clean_old, &rule.new, 1), rule))
}

/// Global pass: rules are tried in priority order, each scanning lines top to
/// bottom; only the first line containing the first matching rule changes.
fn replace_in_first_line<'r>(text: &str, rules: &'r [Rule]) -> Option<(String, &'r Rule)> {
    let clean = clean_text(text);
    let mut lines: Vec<String> = clean.split('\n').map(str::to_string).collect();

    for rule in rules {
        if let Some(line) = lines.iter_mut().find(|line| line.contains(&rule.clean_old)) {
            *line = line.replace(&rule.clean_old, &rule.new);
            return Some((lines.join("\n"), rule));
        }
    }
    None
}
