//! Commands sent to the command address, one per subject line.

/// A parsed command subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `lists` or `list`: enumerate the mailing lists.
    Lists,
    /// `help`: the command summary.
    Help,
    /// `subscribe <list>`.
    Subscribe(String),
    /// `unsubscribe [list]`; without a list, from every list.
    Unsubscribe(Option<String>),
    /// Anything else, including a command with missing or extra arguments.
    Unknown,
}

impl Command {
    /// Parses a subject line. The command word is case-insensitive; list
    /// arguments are kept as written.
    #[must_use]
    pub fn parse(subject: &str) -> Self {
        let mut words = subject.split_whitespace();
        let Some(word) = words.next() else {
            return Self::Unknown;
        };
        let args: Vec<&str> = words.collect();

        match (word.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("lists" | "list", []) => Self::Lists,
            ("help", []) => Self::Help,
            ("subscribe", [list]) => Self::Subscribe((*list).to_string()),
            ("unsubscribe", []) => Self::Unsubscribe(None),
            ("unsubscribe", [list]) => Self::Unsubscribe(Some((*list).to_string())),
            _ => Self::Unknown,
        }
    }
}

/// The reply to `help`.
#[must_use]
pub fn help(command_address: &str) -> String {
    format!(
        "Available commands:\n\n\
         \x20   help\n\
         \x20     Information about valid commands\n\n\
         \x20   lists\n\
         \x20     Retrieve a list of available mailing lists\n\n\
         \x20   subscribe <list-address>\n\
         \x20     Subscribe to <list-address>\n\n\
         \x20   unsubscribe <list-address>\n\
         \x20     Unsubscribe from <list-address>\n\n\
         \x20   unsubscribe\n\
         \x20     Unsubscribe from all lists\n\n\
         To send a command, email {command_address} with the command as the subject."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("lists"), Command::Lists);
        assert_eq!(Command::parse("  LIST "), Command::Lists);
        assert_eq!(Command::parse("Help"), Command::Help);
        assert_eq!(
            Command::parse("subscribe Dev@example.com"),
            Command::Subscribe("Dev@example.com".to_string())
        );
        assert_eq!(
            Command::parse("unsubscribe\tdev"),
            Command::Unsubscribe(Some("dev".to_string()))
        );
        assert_eq!(Command::parse("unsubscribe"), Command::Unsubscribe(None));
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(Command::parse(""), Command::Unknown);
        assert_eq!(Command::parse("Re: hello"), Command::Unknown);
        assert_eq!(Command::parse("subscribe"), Command::Unknown);
        assert_eq!(Command::parse("subscribe a b"), Command::Unknown);
        assert_eq!(Command::parse("lists please"), Command::Unknown);
    }

    #[test]
    fn test_help_names_command_address() {
        let text = help("lists@example.com");
        assert!(text.starts_with("Available commands:"));
        assert!(text.contains("    subscribe <list-address>\n"));
        assert!(text.ends_with("email lists@example.com with the command as the subject."));
    }
}
