use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "start the bot and get a welcome message")]
    Start,
    #[command(description = "show this help message")]
    Help,
    #[command(description = "echo back your message")]
    Echo(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_mentioned_commands() {
        assert_eq!(Command::parse("/start", "relay_bot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/help@relay_bot", "relay_bot").unwrap(), Command::Help);
        assert_eq!(
            Command::parse("/echo hello there", "relay_bot").unwrap(),
            Command::Echo("hello there".to_string())
        );
    }

    #[test]
    fn unknown_command_fails_to_parse() {
        assert!(Command::parse("/frobnicate", "relay_bot").is_err());
    }
}
