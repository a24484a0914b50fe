use super::{CliError, LineEditor, PROMPT};
use esp_idf_hal::uart::{UartRxDriver, UartTxDriver};

pub struct Terminal<'d> {
    pub uart_tx: UartTxDriver<'d>,
    pub uart_rx: UartRxDriver<'d>,
    editor: LineEditor,
}

impl<'d> Terminal<'d> {
    pub fn new(uart_tx: UartTxDriver<'d>, uart_rx: UartRxDriver<'d>) -> Self {
        Self {
            uart_tx,
            uart_rx,
            editor: LineEditor::new(),
        }
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), CliError> {
        self.uart_tx
            .write(s.as_bytes())
            .map_err(|_| CliError::UartError)?;
        Ok(())
    }

    pub fn write_line(&mut self, s: &str) -> Result<(), CliError> {
        self.write_str(s)?;
        self.write_str("\r\n")
    }

    pub fn print_prompt(&mut self) -> Result<(), CliError> {
        self.write_str(PROMPT)
    }

    pub fn read_char(&mut self) -> Result<Option<u8>, CliError> {
        let mut buf = [0u8; 1];
        match self.uart_rx.read(&mut buf, 0) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(_) => Err(CliError::UartError),
        }
    }

    /// Feed one byte to the editor and echo whatever it produced
    pub fn handle_char(&mut self, ch: u8) -> Result<Option<String>, CliError> {
        let line = self.editor.handle_char(ch);
        let echo = self.editor.take_output();
        if !echo.is_empty() {
            self.write_str(&echo)?;
        }
        Ok(line)
    }

    pub fn clear_screen(&mut self) -> Result<(), CliError> {
        // ANSI escape sequence to clear screen and move cursor to top
        self.write_str("\x1b[2J\x1b[H")
    }

    pub fn show_help(&mut self) -> Result<(), CliError> {
        self.write_line("Available commands:")?;
        self.write_line("  help        - Show this help")?;
        self.write_line("  version     - Show firmware version")?;
        self.write_line("  status      - Show sensor channels, counts and publish health")?;
        self.write_line("  uptime      - Show system uptime")?;
        self.write_line("  clear       - Clear terminal")?;
        self.write_line("  stop        - Stop all sensor channels and release their pins")?;
        self.write_line("  reset       - Stop sensor channels, then restart")?;
        self.write_line("")?;
        self.write_line("Use TAB to autocomplete commands")?;
        self.write_line("Use UP/DOWN arrows to navigate command history")?;
        self.write_line("Use LEFT/RIGHT arrows to move cursor and edit")?;
        Ok(())
    }
}
