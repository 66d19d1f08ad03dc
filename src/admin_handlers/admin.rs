use crate::admin_handlers::AdminCommand;
use crate::config_store::ConfigStore;
use crate::message_processor::MessageProcessor;
use crate::status::RelayStatus;
use anyhow::{bail, Context};
use teloxide::utils::command::BotCommands;

/// Group id used for the test commands; matches no group-specific rule set.
const NO_GROUP: i64 = 0;

/// Shared state an admin command can read or change.
pub struct AdminContext<'a> {
    pub store: &'a ConfigStore,
    pub status: &'a RelayStatus,
    pub processor: &'a MessageProcessor,
}

/// Executes `cmd` and returns the plain-text reply for the admin chat.
pub fn handle_admin_command(cmd: AdminCommand, ctx: &AdminContext<'_>) -> anyhow::Result<String> {
    let reply = match cmd {
        AdminCommand::Help => AdminCommand::descriptions().to_string(),
        AdminCommand::Status => format_status(ctx),
        AdminCommand::Keywords => {
            let keywords = ctx.processor.filter().active_keywords();
            if keywords.is_empty() {
                "No keywords configured.".to_string()
            } else {
                format!("Keywords ({}):\n{}", keywords.len(), keywords.join("\n"))
            }
        }
        AdminCommand::AddKeyword { keyword } => {
            let keyword = non_empty(&keyword, "keyword")?;
            if ctx.processor.filter().add_keyword(keyword)? {
                format!("Added keyword: {}", keyword)
            } else {
                format!("Keyword already exists: {}", keyword)
            }
        }
        AdminCommand::RemoveKeyword { keyword } => {
            let keyword = non_empty(&keyword, "keyword")?;
            if ctx.processor.filter().remove_keyword(keyword)? {
                format!("Removed keyword: {}", keyword)
            } else {
                format!("Keyword not found: {}", keyword)
            }
        }
        AdminCommand::Replacements => {
            let rules = ctx.processor.replacer().active_replacements();
            if rules.is_empty() {
                "No text replacements configured.".to_string()
            } else {
                let lines: Vec<String> = rules
                    .iter()
                    .map(|(old, new)| format!("'{}' -> '{}'", old, new))
                    .collect();
                format!("Replacements ({}):\n{}", rules.len(), lines.join("\n"))
            }
        }
        AdminCommand::AddReplacement { old_text, new_text } => {
            let old_text = non_empty(&old_text, "text to replace")?;
            let new_text = new_text.trim();
            ctx.processor.replacer().add_replacement(old_text, new_text)?;
            format!("Replacement set: '{}' -> '{}'", old_text, new_text)
        }
        AdminCommand::RemoveReplacement { old_text } => {
            let old_text = non_empty(&old_text, "text to replace")?;
            if ctx.processor.replacer().remove_replacement(old_text)? {
                format!("Removed replacement for '{}'", old_text)
            } else {
                format!("No replacement for '{}'", old_text)
            }
        }
        AdminCommand::AddSource { group_id } => {
            let group_id = parse_group_id(&group_id)?;
            if ctx.store.add_source_group(group_id)? {
                format!("Added source group {} (listening starts after reconnect)", group_id)
            } else {
                format!("Group {} is already a source", group_id)
            }
        }
        AdminCommand::AddTarget { group_id } => {
            let group_id = parse_group_id(&group_id)?;
            if ctx.store.add_target_group(group_id)? {
                format!("Added target group {}", group_id)
            } else {
                format!("Group {} is already a target", group_id)
            }
        }
        AdminCommand::TestFilter { text } => {
            let report = ctx.processor.filter().explain(non_empty(&text, "text")?, NO_GROUP);
            let verdict = if report.passed { "PASS" } else { "BLOCK" };
            match report.matched_keyword {
                Some(keyword) => format!("{} ({:?}): matched '{}'", verdict, report.scope, keyword),
                None => format!("{} ({:?}): {}", verdict, report.scope, report.reason),
            }
        }
        AdminCommand::TestReplace { text } => {
            let report = ctx.processor.replacer().preview(non_empty(&text, "text")?, None);
            match &report.matched_rule {
                Some((old, new)) => format!("'{}' -> '{}':\n{}", old, new, report.result),
                None => "No replacement rule matched.".to_string(),
            }
        }
    };
    Ok(reply)
}

fn format_status(ctx: &AdminContext<'_>) -> String {
    let snapshot = ctx.status.snapshot();
    let config = ctx.store.read();
    format!(
        "State: {}\nUptime: {}s\nSource groups: {}\nTarget groups: {}\n\
         Received: {}\nDuplicates: {}\nProcessed: {}\nFiltered: {}\nReplaced: {}\n\
         Media forwarded: {}\nSent: {}\nFailed: {}\nQueued: {}",
        snapshot.state,
        snapshot.uptime_secs,
        config.source_groups.len(),
        config.target_groups.len(),
        snapshot.messages_received,
        snapshot.duplicates_skipped,
        snapshot.messages_processed,
        snapshot.messages_filtered,
        snapshot.text_replaced,
        snapshot.media_forwarded,
        snapshot.sends_succeeded,
        snapshot.sends_failed,
        snapshot.queue_depth,
    )
}

fn non_empty<'a>(value: &'a str, what: &str) -> anyhow::Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        bail!("Missing {}", what);
    }
    Ok(value)
}

fn parse_group_id(value: &str) -> anyhow::Result<i64> {
    let value = non_empty(value, "group id")?;
    value
        .parse()
        .with_context(|| format!("'{}' is not a valid group id", value))
}
