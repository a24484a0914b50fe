use super::{parser::CommandParser, CLI_BUFFER_SIZE, MAX_HISTORY_SIZE, PROMPT};

/// Line editing for the serial console, independent of the UART.
///
/// Every keystroke may produce terminal output (echo, cursor moves, redraws);
/// it is collected in an output buffer that the caller drains and writes to
/// the wire.
pub struct LineEditor {
    line_buffer: String,
    cursor_pos: usize,
    command_history: Vec<String>,
    history_index: Option<usize>,
    escape_state: EscapeState,
    output: String,
}

#[derive(Clone, Copy, PartialEq)]
enum EscapeState {
    Normal,
    Escape,
    Csi,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            line_buffer: String::new(),
            cursor_pos: 0,
            command_history: Vec::new(),
            history_index: None,
            escape_state: EscapeState::Normal,
            output: String::new(),
        }
    }

    pub fn line(&self) -> &str {
        &self.line_buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor_pos
    }

    pub fn history(&self) -> &[String] {
        &self.command_history
    }

    /// Terminal output produced since the last call
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Feed one byte; returns the finished line when Enter is pressed.
    pub fn handle_char(&mut self, ch: u8) -> Option<String> {
        match self.escape_state {
            EscapeState::Normal => match ch {
                b'\r' | b'\n' => Some(self.submit()),
                b'\x1b' => {
                    self.escape_state = EscapeState::Escape;
                    None
                }
                b'\x08' | b'\x7f' => {
                    if self.cursor_pos > 0 {
                        self.delete_char_before_cursor();
                    }
                    None
                }
                b'\t' => {
                    self.handle_tab_completion();
                    None
                }
                0x20..=0x7E => {
                    if self.line_buffer.len() < CLI_BUFFER_SIZE - 1 {
                        self.insert_char_at_cursor(ch as char);
                    }
                    None
                }
                _ => None,
            },
            EscapeState::Escape => {
                self.escape_state = if ch == b'[' {
                    EscapeState::Csi
                } else {
                    EscapeState::Normal
                };
                None
            }
            EscapeState::Csi => {
                match ch {
                    b'A' => self.handle_history_up(),
                    b'B' => self.handle_history_down(),
                    b'C' => self.handle_cursor_right(),
                    b'D' => self.handle_cursor_left(),
                    _ => {}
                }
                self.escape_state = EscapeState::Normal;
                None
            }
        }
    }

    fn submit(&mut self) -> String {
        self.output.push_str("\r\n");
        let command = std::mem::take(&mut self.line_buffer);

        // Skip blanks and immediate repeats
        if !command.trim().is_empty() && self.command_history.last() != Some(&command) {
            if self.command_history.len() >= MAX_HISTORY_SIZE {
                self.command_history.remove(0);
            }
            self.command_history.push(command.clone());
        }

        self.cursor_pos = 0;
        self.history_index = None;
        command
    }

    fn handle_tab_completion(&mut self) {
        let current_line = self.line_buffer.clone();
        let words: Vec<&str> = current_line.split_whitespace().collect();

        // Only the command word completes
        if !(words.is_empty() || (!current_line.ends_with(' ') && words.len() == 1)) {
            return;
        }

        let partial = words.first().copied().unwrap_or("");
        let matches = CommandParser::autocomplete(partial);

        match matches.as_slice() {
            [] => {}
            [completion] => {
                let mut completed = completion.to_string();
                completed.push(' ');
                self.replace_current_line(&completed);
            }
            _ => {
                self.output.push_str("\r\n");
                self.output.push_str(&matches.join("  "));
                self.output.push_str("\r\n");
                self.output.push_str(PROMPT);
                self.output.push_str(&current_line);
                // Cursor is now at the end of the redrawn line
                self.cursor_pos = self.line_buffer.len();
            }
        }
    }

    fn handle_history_up(&mut self) {
        if self.command_history.is_empty() {
            return;
        }

        let new_index = match self.history_index {
            None => self.command_history.len() - 1,
            Some(0) => return,
            Some(current) => current - 1,
        };

        self.history_index = Some(new_index);
        let entry = self.command_history[new_index].clone();
        self.replace_current_line(&entry);
    }

    fn handle_history_down(&mut self) {
        let Some(current) = self.history_index else {
            return;
        };

        if current + 1 < self.command_history.len() {
            self.history_index = Some(current + 1);
            let entry = self.command_history[current + 1].clone();
            self.replace_current_line(&entry);
        } else {
            self.history_index = None;
            self.replace_current_line("");
        }
    }

    fn replace_current_line(&mut self, new_line: &str) {
        // Move to end, then erase everything
        for _ in self.cursor_pos..self.line_buffer.len() {
            self.output.push_str("\x1b[C");
        }
        for _ in 0..self.line_buffer.len() {
            self.output.push_str("\x08 \x08");
        }

        self.line_buffer.clear();
        self.line_buffer.push_str(new_line);
        self.line_buffer.truncate(CLI_BUFFER_SIZE - 1);
        self.cursor_pos = self.line_buffer.len();
        self.output.push_str(&self.line_buffer);
    }

    fn handle_cursor_right(&mut self) {
        if self.cursor_pos < self.line_buffer.len() {
            self.cursor_pos += 1;
            self.output.push_str("\x1b[C");
        }
    }

    fn handle_cursor_left(&mut self) {
        if self.cursor_pos > 0 {
            self.cursor_pos -= 1;
            self.output.push_str("\x1b[D");
        }
    }

    fn insert_char_at_cursor(&mut self, ch: char) {
        self.line_buffer.insert(self.cursor_pos, ch);
        self.cursor_pos += 1;

        // Redraw the tail and step back over it
        let tail = &self.line_buffer[self.cursor_pos - 1..];
        self.output.push_str(tail);
        for _ in 1..tail.len() {
            self.output.push_str("\x1b[D");
        }
    }

    fn delete_char_before_cursor(&mut self) {
        self.line_buffer.remove(self.cursor_pos - 1);
        self.cursor_pos -= 1;

        let tail = &self.line_buffer[self.cursor_pos..];
        self.output.push('\x08');
        self.output.push_str(tail);
        self.output.push(' ');
        for _ in 0..=tail.len() {
            self.output.push_str("\x1b[D");
        }
    }
}
