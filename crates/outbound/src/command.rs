//! Command parsing for the chat-bot channel.

/// Who to call: a VIP looked up by name + last four, or a raw phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    NameLast4 { name: String, last4: String },
    Phone(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Call { target: CallTarget, theme: String },
    Confirm { code: String },
    Cancel { code: String },
    /// Parse failure with a reply the user can act on.
    Invalid { reply: String },
}

pub const HELP_TEXT: &str = "Commands:\n\
    /call <name> <last4> | <theme> — call a VIP by name and last four digits\n\
    /call <phone> | <theme> — call a number directly\n\
    YES <code> — confirm a pending call\n\
    /cancel <code> — drop a pending call";

/// Parse one incoming chat message.
pub fn parse_command(text: &str) -> Command {
    let trimmed = text.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower == "/help" || lower == "/start" || lower == "help" {
        return Command::Help;
    }

    if let Some(rest) = lower
        .strip_prefix("yes ")
        .or_else(|| lower.strip_prefix("yes,"))
    {
        let code: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
        if code.len() == 6 {
            return Command::Confirm { code };
        }
        return Command::Invalid {
            reply: "That doesn't look like a confirmation code. Reply YES <6-digit code>.".into(),
        };
    }

    if let Some(rest) = strip_command(trimmed, "/cancel") {
        let code: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
        if code.len() == 6 {
            return Command::Cancel { code };
        }
        return Command::Invalid {
            reply: "Usage: /cancel <6-digit code>".into(),
        };
    }

    if let Some(rest) = strip_command(trimmed, "/call") {
        return parse_call(rest);
    }

    Command::Invalid {
        reply: format!("I didn't understand that.\n\n{HELP_TEXT}"),
    }
}

fn strip_command<'a>(text: &'a str, command: &str) -> Option<&'a str> {
    let lower = text.to_ascii_lowercase();
    if lower == command {
        return Some("");
    }
    lower
        .starts_with(&format!("{command} "))
        .then(|| text[command.len()..].trim())
}

fn parse_call(rest: &str) -> Command {
    let Some((target_part, theme_part)) = rest.split_once('|') else {
        return Command::Invalid {
            reply: "Missing theme. Usage: /call <name> <last4> | <theme>".into(),
        };
    };

    let theme = theme_part.trim();
    if theme.is_empty() {
        return Command::Invalid {
            reply: "The theme can't be empty. What is the call about?".into(),
        };
    }

    let tokens: Vec<&str> = target_part.split_whitespace().collect();
    if tokens.is_empty() {
        return Command::Invalid {
            reply: "Who should I call? Usage: /call <name> <last4> | <theme>".into(),
        };
    }

    // Name + last4 form: the final token is exactly four digits and what
    // precedes it reads as a name, not more phone digits.
    if tokens.len() >= 2 {
        let last = tokens[tokens.len() - 1];
        let name = tokens[..tokens.len() - 1].join(" ");
        if last.len() == 4
            && last.chars().all(|c| c.is_ascii_digit())
            && name.chars().any(|c| c.is_alphabetic())
        {
            return Command::Call {
                target: CallTarget::NameLast4 {
                    name,
                    last4: last.to_string(),
                },
                theme: theme.to_string(),
            };
        }
    }

    // Otherwise the whole target is a phone number.
    Command::Call {
        target: CallTarget::Phone(target_part.trim().to_string()),
        theme: theme.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_aliases() {
        assert_eq!(parse_command("/help"), Command::Help);
        assert_eq!(parse_command("/start"), Command::Help);
        assert_eq!(parse_command("help"), Command::Help);
        assert_eq!(parse_command("HELP"), Command::Help);
    }

    #[test]
    fn call_by_name_and_last4() {
        match parse_command("/call jeff 5680 | invoice follow-up") {
            Command::Call { target, theme } => {
                assert_eq!(
                    target,
                    CallTarget::NameLast4 {
                        name: "jeff".into(),
                        last4: "5680".into()
                    }
                );
                assert_eq!(theme, "invoice follow-up");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn call_by_phone() {
        match parse_command("/call +1 555 123 5680 | quick question") {
            Command::Call { target, .. } => {
                assert_eq!(target, CallTarget::Phone("+1 555 123 5680".into()));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn call_requires_theme() {
        assert!(matches!(
            parse_command("/call jeff 5680 |   "),
            Command::Invalid { .. }
        ));
        assert!(matches!(
            parse_command("/call jeff 5680"),
            Command::Invalid { .. }
        ));
    }

    #[test]
    fn confirm_extracts_code() {
        assert_eq!(
            parse_command("YES 123456"),
            Command::Confirm {
                code: "123456".into()
            }
        );
        assert_eq!(
            parse_command("yes 654321"),
            Command::Confirm {
                code: "654321".into()
            }
        );
        assert!(matches!(parse_command("yes 12"), Command::Invalid { .. }));
    }

    #[test]
    fn cancel_extracts_code() {
        assert_eq!(
            parse_command("/cancel 123456"),
            Command::Cancel {
                code: "123456".into()
            }
        );
    }

    #[test]
    fn unknown_gets_help() {
        match parse_command("make me a sandwich") {
            Command::Invalid { reply } => assert!(reply.contains("/call")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn multi_word_name() {
        match parse_command("/call mary jo 1234 | lunch plans") {
            Command::Call { target, .. } => {
                assert_eq!(
                    target,
                    CallTarget::NameLast4 {
                        name: "mary jo".into(),
                        last4: "1234".into()
                    }
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
