//! Per-session conversation memory.
//!
//! Each chat session owns its own [`ConversationMemory`]; nothing is
//! shared between sessions. Memory holds a bounded window of the most
//! recent exchanges, renders a transcript block for prompt assembly,
//! and can be saved to / loaded from a JSON file named after the
//! session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Source labels attached to assistant answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

#[derive(Debug)]
pub enum MemoryError {
    /// No conversation directory is configured; sessions cannot be
    /// saved or loaded.
    PersistenceUnavailable,
    Storage(String),
    /// The session file exists but does not parse.
    Corrupt(String),
}

impl Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryError::PersistenceUnavailable => {
                write!(f, "conversation persistence is not configured")
            }
            MemoryError::Storage(e) => write!(f, "conversation storage error: {}", e),
            MemoryError::Corrupt(e) => write!(f, "conversation file is corrupt: {}", e),
        }
    }
}

impl std::error::Error for MemoryError {}

/// Outcome of loading a named session.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionState {
    Found,
    NotFound,
}

#[derive(Serialize, Deserialize)]
struct SessionFile {
    messages: Vec<Message>,
    summary: String,
    saved_at: DateTime<Utc>,
}

/// Bounded history of one conversation.
pub struct ConversationMemory {
    messages: Vec<Message>,
    max_history: usize,
    persist_dir: Option<PathBuf>,
}

/// Topics recognized when summarizing user questions.
const TOPIC_KEYWORDS: &[&str] = &[
    "project",
    "work",
    "study",
    "skill",
    "experience",
    "technology",
];

impl ConversationMemory {
    pub fn new(max_history: usize, persist_dir: Option<PathBuf>) -> Self {
        Self {
            messages: Vec::new(),
            max_history,
            persist_dir,
        }
    }

    /// Append a message, evicting the oldest once the window exceeds
    /// `max_history` exchanges (two messages each).
    pub fn add_message(&mut self, role: Role, content: &str, sources: Option<Vec<String>>) {
        self.messages.push(Message {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            sources,
        });

        let cap = self.max_history * 2;
        if self.messages.len() > cap {
            let excess = self.messages.len() - cap;
            self.messages.drain(..excess);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render the last `last_n` exchanges as a transcript block for
    /// prompt assembly. Empty memory renders as an empty string.
    pub fn get_context_string(&self, last_n: usize) -> String {
        if self.messages.is_empty() {
            return String::new();
        }

        let take = (last_n * 2).min(self.messages.len());
        let start = self.messages.len() - take;

        let mut out = String::from("Previous conversation:\n");
        for message in &self.messages[start..] {
            let speaker = match message.role {
                Role::User => "You",
                Role::Assistant => "Assistant",
            };
            out.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        out
    }

    /// One-line description of what the conversation has covered.
    pub fn summarize(&self) -> String {
        if self.messages.is_empty() {
            return "No conversation yet.".to_string();
        }

        let questions: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .collect();

        let mut topics: Vec<&str> = Vec::new();
        for message in &questions {
            let lower = message.content.to_lowercase();
            for keyword in TOPIC_KEYWORDS {
                if lower.contains(keyword) && !topics.contains(keyword) {
                    topics.push(keyword);
                }
            }
        }

        let about = if topics.is_empty() {
            "various topics".to_string()
        } else {
            topics.join(", ")
        };
        format!(
            "Conversation with {} questions about: {}",
            questions.len(),
            about
        )
    }

    /// Persist the session to `<dir>/<session_id>.json`.
    pub fn save(&self, session_id: &str) -> Result<(), MemoryError> {
        let dir = self
            .persist_dir
            .as_ref()
            .ok_or(MemoryError::PersistenceUnavailable)?;
        std::fs::create_dir_all(dir).map_err(|e| MemoryError::Storage(e.to_string()))?;

        let file = SessionFile {
            messages: self.messages.clone(),
            summary: self.summarize(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        std::fs::write(dir.join(format!("{}.json", session_id)), json)
            .map_err(|e| MemoryError::Storage(e.to_string()))
    }

    /// Replace the in-memory history with a saved session. A missing
    /// session file is not an error; the memory is left untouched and
    /// `NotFound` is returned.
    pub fn load(&mut self, session_id: &str) -> Result<SessionState, MemoryError> {
        let dir = self
            .persist_dir
            .as_ref()
            .ok_or(MemoryError::PersistenceUnavailable)?;

        let path = dir.join(format!("{}.json", session_id));
        if !path.exists() {
            return Ok(SessionState::NotFound);
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| MemoryError::Storage(e.to_string()))?;
        let file: SessionFile =
            serde_json::from_str(&content).map_err(|e| MemoryError::Corrupt(e.to_string()))?;

        self.messages = file.messages;
        let cap = self.max_history * 2;
        if self.messages.len() > cap {
            let excess = self.messages.len() - cap;
            self.messages.drain(..excess);
        }
        Ok(SessionState::Found)
    }

    /// Forget the in-memory history. Saved session files are kept.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
