//! The commands the bot answers.

/// A recognized command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `!hello`: reply with a greeting.
    Hello,
    /// `!myclasses`: list the sender's classes.
    MyClasses,
    /// `!myname`: look up the sender's full name.
    MyName,
}

impl Command {
    /// Every command, in matching priority order.
    pub const ALL: [Command; 3] = [Command::Hello, Command::MyClasses, Command::MyName];

    /// The body prefix that triggers this command.
    pub fn prefix(self) -> &'static str {
        match self {
            Command::Hello => "!hello",
            Command::MyClasses => "!myclasses",
            Command::MyName => "!myname",
        }
    }

    /// Match a message body against the known prefixes.
    pub fn parse(body: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| body.starts_with(c.prefix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse("!hello"), Some(Command::Hello));
        assert_eq!(Command::parse("!hello there"), Some(Command::Hello));
        assert_eq!(Command::parse("!myclasses"), Some(Command::MyClasses));
        assert_eq!(Command::parse("!myname please"), Some(Command::MyName));
    }

    #[test]
    fn test_parse_unmatched() {
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse(" !hello"), None);
        assert_eq!(Command::parse("!HELLO"), None);
        assert_eq!(Command::parse("!my"), None);
        assert_eq!(Command::parse(""), None);
    }
}
