use super::CliCommand;

pub struct CommandParser;

impl CommandParser {
    pub fn get_available_commands() -> &'static [&'static str] {
        &[
            "help", "version", "status", "uptime", "clear", "stop", "reset",
        ]
    }

    pub fn autocomplete(partial: &str) -> Vec<&'static str> {
        Self::get_available_commands()
            .iter()
            .filter(|&&cmd| cmd.starts_with(partial))
            .copied()
            .collect()
    }

    pub fn parse_command(input: &str) -> CliCommand {
        let trimmed = input.trim();
        let mut parts = trimmed.split_whitespace();
        let Some(cmd) = parts.next() else {
            return CliCommand::Empty;
        };

        let command = match cmd {
            "help" | "?" => CliCommand::Help,
            "version" => CliCommand::Version,
            "status" => CliCommand::Status,
            "uptime" => CliCommand::Uptime,
            "clear" => CliCommand::Clear,
            "stop" => CliCommand::Stop,
            "reset" => CliCommand::Reset,
            _ => return CliCommand::Unknown(cmd.to_string()),
        };

        // None of the commands take arguments
        match parts.next() {
            Some(_) => CliCommand::Unknown(format!("{}: takes no arguments", cmd)),
            None => command,
        }
    }
}
