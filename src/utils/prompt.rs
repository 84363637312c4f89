//! Interactive prompts for the auth subcommands.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::fmt;
use std::io::{self, BufRead, IsTerminal, Write};

#[derive(Debug, Clone)]
pub struct PromptError {
    message: String,
}

impl PromptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PromptError {}

impl From<io::Error> for PromptError {
    fn from(err: io::Error) -> Self {
        PromptError::new(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretAction {
    Insert(char),
    Paste(String),
    Backspace,
    ClearAll,
    Submit,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretOutcome {
    Continue,
    Submit(String),
    Cancelled,
}

pub fn map_key_event(key: &KeyEvent) -> Option<SecretAction> {
    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => Some(SecretAction::Submit),
        KeyCode::Esc => Some(SecretAction::Cancel),
        KeyCode::Backspace => Some(SecretAction::Backspace),
        KeyCode::Char('c') if control => Some(SecretAction::Cancel),
        KeyCode::Char('u') if control => Some(SecretAction::ClearAll),
        KeyCode::Char(c) if !control => Some(SecretAction::Insert(c)),
        _ => None,
    }
}

pub fn apply_secret_action(buffer: &mut String, action: SecretAction) -> SecretOutcome {
    match action {
        SecretAction::Insert(c) => {
            if !c.is_control() {
                buffer.push(c);
            }
            SecretOutcome::Continue
        }
        SecretAction::Paste(text) => {
            buffer.extend(text.chars().filter(|c| !c.is_control()));
            SecretOutcome::Continue
        }
        SecretAction::Backspace => {
            buffer.pop();
            SecretOutcome::Continue
        }
        SecretAction::ClearAll => {
            buffer.clear();
            SecretOutcome::Continue
        }
        SecretAction::Submit => SecretOutcome::Submit(std::mem::take(buffer)),
        SecretAction::Cancel => SecretOutcome::Cancelled,
    }
}

/// Print `prompt` and read one trimmed line from stdin.
pub fn prompt_line(prompt: &str) -> Result<String, PromptError> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err(PromptError::new("No input"));
    }
    Ok(line.trim().to_string())
}

/// Read a password without echoing it. Falls back to a plain line read when
/// stdin is not a terminal, so credentials can be piped in.
pub fn prompt_secret(prompt: &str) -> Result<String, PromptError> {
    if !io::stdin().is_terminal() {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        return Ok(line.trim_end_matches(['\r', '\n']).to_string());
    }

    print!("{prompt}");
    io::stdout().flush()?;
    enable_raw_mode()?;

    let result = (|| -> Result<String, PromptError> {
        let mut buffer = String::new();
        loop {
            let action = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => map_key_event(&key),
                Event::Paste(text) => Some(SecretAction::Paste(text)),
                _ => None,
            };
            let Some(action) = action else {
                continue;
            };
            match apply_secret_action(&mut buffer, action) {
                SecretOutcome::Continue => {}
                SecretOutcome::Submit(value) => break Ok(value),
                SecretOutcome::Cancelled => break Err(PromptError::new("Cancelled by user")),
            }
        }
    })();

    let restored = disable_raw_mode();
    println!();
    let value = result?;
    restored?;
    Ok(value)
}
