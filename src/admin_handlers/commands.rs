use teloxide::utils::command::{BotCommands, ParseError};

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Relay admin commands:")]
pub enum AdminCommand {
    #[command(description = "show help.")]
    Help,
    #[command(description = "show relay status and counters.")]
    Status,
    #[command(description = "list global filter keywords.")]
    Keywords,
    #[command(description = "add a global filter keyword.")]
    AddKeyword { keyword: String },
    #[command(description = "remove a global filter keyword.")]
    RemoveKeyword { keyword: String },
    #[command(description = "list global text replacements.")]
    Replacements,
    #[command(
        description = "add a global text replacement: old|new.",
        parse_with = parse_replacement
    )]
    AddReplacement { old_text: String, new_text: String },
    #[command(description = "remove a global text replacement.")]
    RemoveReplacement { old_text: String },
    #[command(description = "add a source group id (applies on next reconnect).")]
    AddSource { group_id: String },
    #[command(description = "add a target group id.")]
    AddTarget { group_id: String },
    #[command(description = "check text against the global keyword filter.")]
    TestFilter { text: String },
    #[command(description = "preview global text replacement on text.")]
    TestReplace { text: String },
}

/// Splits `old|new` on the first `|`. Both halves are trimmed; the
/// replacement may be empty.
fn parse_replacement(input: String) -> Result<(String, String), ParseError> {
    match input.split_once('|') {
        Some((old_text, new_text)) => Ok((old_text.trim().to_string(), new_text.trim().to_string())),
        None => Err(ParseError::IncorrectFormat(
            "expected /addreplacement old text|new text".into(),
        )),
    }
}
