use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::error::MessageLogError;

/// A user message exchanged between clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub timestamp: OffsetDateTime,
    pub source_client_number: i32,
    pub source_username: String,
    pub message: String,
}

impl ChatMessage {
    pub fn new(source_client_number: i32, source_username: &str, message: &str) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            source_client_number,
            source_username: source_username.to_string(),
            message: message.to_string(),
        }
    }

    /// Tab separated log line; newlines inside the message are flattened
    pub fn to_line(&self) -> Result<String, MessageLogError> {
        Ok(format!(
            "{}\t{}\t{}\t{}",
            self.timestamp.format(&Rfc3339)?,
            self.source_client_number,
            self.source_username.replace(['\t', '\n'], " "),
            self.message.replace(['\t', '\n', '\r'], " ")
        ))
    }

    pub fn from_line(line: &str) -> Result<Self, MessageLogError> {
        let fields: Vec<&str> = line.splitn(4, '\t').collect();
        if fields.len() != 4 {
            return Err(MessageLogError::BadLine(line.to_string()));
        }
        let timestamp = OffsetDateTime::parse(fields[0], &Rfc3339)
            .map_err(|_| MessageLogError::BadLine(line.to_string()))?;
        let source_client_number = fields[1]
            .parse()
            .map_err(|_| MessageLogError::BadLine(line.to_string()))?;
        Ok(Self {
            timestamp,
            source_client_number,
            source_username: fields[2].to_string(),
            message: fields[3].to_string(),
        })
    }

    /// `[hh:mm:ss] user: message`
    pub fn display(&self) -> String {
        format!(
            "[{:02}:{:02}:{:02}] {}: {}",
            self.timestamp.hour(),
            self.timestamp.minute(),
            self.timestamp.second(),
            self.source_username,
            self.message
        )
    }
}

/// Append-only file of the session's user messages
#[derive(Debug)]
pub struct MessageLog {
    path: PathBuf,
    file: File,
}

impl MessageLog {
    /// Open (creating if needed) the log for appending
    pub fn open(path: &Path) -> Result<Self, MessageLogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Read back every well-formed message. Malformed lines are skipped.
    pub fn load_history(&self) -> Result<Vec<ChatMessage>, MessageLogError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut messages = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match ChatMessage::from_line(&line) {
                Ok(msg) => messages.push(msg),
                Err(e) => spdlog::warn!("Skipping message log entry: {e}"),
            }
        }
        Ok(messages)
    }

    pub fn append(&mut self, message: &ChatMessage) -> Result<(), MessageLogError> {
        writeln!(self.file, "{}", message.to_line()?)?;
        self.file.flush()?;
        Ok(())
    }
}
