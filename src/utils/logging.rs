use crate::core::message::{Message, Role};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Plain-text transcript of the conversation, appended as turns complete.
pub struct TranscriptLog {
    file_path: Option<String>,
    is_active: bool,
    user_display_name: String,
}

impl TranscriptLog {
    pub fn new(log_file: Option<String>, user_display_name: impl Into<String>) -> Self {
        let is_active = log_file.is_some();
        TranscriptLog {
            file_path: log_file,
            is_active,
            user_display_name: user_display_name.into(),
        }
    }

    pub fn set_log_file(&mut self, path: String) -> Result<String, Box<dyn std::error::Error>> {
        self.test_file_access(&path)?;

        self.file_path = Some(path.clone());
        self.is_active = true;

        Ok(format!("Logging enabled to: {path}"))
    }

    pub fn toggle(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        match &self.file_path {
            Some(path) => {
                if self.is_active {
                    self.append_line("## Logging paused")?;
                    self.is_active = false;
                    Ok(format!("Logging paused (file: {path})"))
                } else {
                    self.is_active = true;
                    Ok(format!("Logging resumed to: {path}"))
                }
            }
            None => Err("No log file specified. Use /log <filename> to enable logging first.".into()),
        }
    }

    pub fn log_message(&self, message: &Message) -> Result<(), Box<dyn std::error::Error>> {
        if !self.is_active {
            return Ok(());
        }
        match self.render(message) {
            Some(text) => self.append_line(&text),
            None => Ok(()),
        }
    }

    fn render(&self, message: &Message) -> Option<String> {
        match message.role {
            Role::User => {
                let mut text = format!("{}: {}", self.user_display_name, message.content);
                if let Some(attachment) = &message.attachment {
                    text.push_str(&format!("\n[attached: {}]", attachment.filename));
                }
                Some(text)
            }
            Role::Assistant if !message.content.is_empty() => Some(message.content.clone()),
            Role::Assistant => None,
        }
    }

    fn append_line(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.file_path.as_ref() else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);

        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Replace the file contents with `messages`, e.g. after opening another
    /// conversation.
    pub fn rewrite(&self, messages: &[Message]) -> Result<(), Box<dyn std::error::Error>> {
        if !self.is_active {
            return Ok(());
        }
        let Some(file_path) = self.file_path.as_ref() else {
            return Ok(());
        };

        let target_path = Path::new(file_path);
        let parent = target_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(parent)?;

        for message in messages {
            if let Some(text) = self.render(message) {
                for line in text.lines() {
                    writeln!(temp_file, "{line}")?;
                }
                writeln!(temp_file)?;
            }
        }

        temp_file.flush()?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(file_path)?;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn status_string(&self) -> String {
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!(
                "active ({})",
                Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            ),
            (Some(path), false) => format!(
                "paused ({})",
                Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            ),
        }
    }

    fn test_file_access(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn transcript_appends_user_and_assistant_turns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat.log");
        let log = TranscriptLog::new(Some(path.display().to_string()), "Ana");

        log.log_message(&Message::new(1, Role::User, "Oi")).unwrap();
        log.log_message(&Message::new(2, Role::Assistant, "")).unwrap();
        log.log_message(&Message::new(3, Role::Assistant, "Olá!\nTudo bem?"))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "Ana: Oi\n\nOlá!\nTudo bem?\n\n");
    }

    #[test]
    fn toggle_requires_a_file_and_marks_pauses() {
        let mut log = TranscriptLog::new(None, "Ana");
        assert!(log.toggle().is_err());
        assert_eq!(log.status_string(), "disabled");

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.log");
        log.set_log_file(path.display().to_string()).unwrap();
        assert!(log.is_active());
        log.toggle().unwrap();
        assert!(!log.is_active());
        assert_eq!(log.status_string(), "paused (t.log)");

        log.log_message(&Message::new(1, Role::User, "not written")).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "## Logging paused\n\n");
    }

    #[test]
    fn rewrite_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat.log");
        std::fs::write(&path, "old\n").unwrap();
        let log = TranscriptLog::new(Some(path.display().to_string()), "Ana");

        log.rewrite(&[
            Message::new(1, Role::User, "primeira"),
            Message::new(2, Role::Assistant, "resposta"),
        ])
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "Ana: primeira\n\nresposta\n\n");
    }
}
