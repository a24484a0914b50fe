pub mod commands;
pub mod editor;
pub mod parser;
#[cfg(target_os = "espidf")]
pub mod terminal;

pub use commands::CommandHandler;
pub use editor::LineEditor;
pub use parser::CommandParser;
#[cfg(target_os = "espidf")]
pub use terminal::Terminal;

// CLI-related types and constants
pub const CLI_BUFFER_SIZE: usize = 128;
pub const MAX_HISTORY_SIZE: usize = 10;
pub const PROMPT: &str = "pulse> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Help,
    Version,
    Status,
    Uptime,
    Clear,
    /// Stop all sensor channels, leave the console running
    Stop,
    /// Stop all sensor channels, then restart the chip
    Reset,
    Empty,
    Unknown(String),
}

#[derive(Debug)]
pub enum CliError {
    UartError,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CliError::UartError => write!(f, "UART error"),
        }
    }
}

impl std::error::Error for CliError {}
