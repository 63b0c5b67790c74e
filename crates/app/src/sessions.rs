//! Chat session: message history and pending attachments.

use crate::state::{with_thinking_stages, ThinkingStage};
use chrono::{DateTime, Utc};
use providers::AssistBackend;
use serde::{Deserialize, Serialize};
use shared::agent_api::{AssistReply, StructuredReply};
use shared::files::FileRecord;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageBody {
    Text(String),
    Structured(StructuredReply),
}

/// A chat message within a session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub body: MessageBody,
    /// Paths of the files attached when the message was sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub is_error: bool,
    pub timestamp: String,
}

impl ChatMessage {
    fn new(role: Role, body: MessageBody) -> Self {
        Self {
            role,
            body,
            files: None,
            is_error: false,
            timestamp: Utc::now().format("%H:%M").to_string(),
        }
    }

    pub fn user(content: impl Into<String>, files: Option<Vec<String>>) -> Self {
        Self {
            files,
            ..Self::new(Role::User, MessageBody::Text(content.into()))
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, MessageBody::Text(content.into()))
    }

    pub fn model_reply(reply: AssistReply) -> Self {
        let body = match reply {
            AssistReply::Text(text) => MessageBody::Text(text),
            AssistReply::Structured(reply) => MessageBody::Structured(reply),
        };
        Self::new(Role::Model, body)
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            is_error: true,
            ..Self::new(Role::Model, MessageBody::Text(format!("Error: {}", message)))
        }
    }
}

/// How a send attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send: blank input and no attachments
    Skipped,
    Replied,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SendOptions {
    pub context_chars_per_file: usize,
    pub show_thinking_stages: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            context_chars_per_file: 2000,
            show_thinking_stages: true,
        }
    }
}

/// Text shown after a batch of files is added.
pub fn upload_summary(count: usize) -> String {
    format!(
        "✅ Successfully uploaded {} file{}",
        count,
        if count > 1 { "s" } else { "" }
    )
}

pub struct ChatSession {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pending_files: Vec<FileRecord>,
    pub created_at: DateTime<Utc>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            pending_files: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn pending_files(&self) -> &[FileRecord] {
        &self.pending_files
    }

    /// Append a batch of ingested files. Returns how many were added.
    pub fn add_files(&mut self, records: Vec<FileRecord>) -> usize {
        let count = records.len();
        self.pending_files.extend(records);
        tracing::debug!(session = %self.id, added = count, pending = self.pending_files.len(), "attachments updated");
        count
    }

    /// Post the upload summary for a non-empty batch.
    pub fn announce_upload(&mut self, count: usize) {
        if count > 0 {
            self.messages.push(ChatMessage::system(upload_summary(count)));
        }
    }

    pub fn remove_file(&mut self, index: usize) -> Option<FileRecord> {
        (index < self.pending_files.len()).then(|| self.pending_files.remove(index))
    }

    pub fn clear_files(&mut self) {
        self.pending_files.clear();
    }

    pub fn can_send(&self, input: &str) -> bool {
        !input.trim().is_empty() || !self.pending_files.is_empty()
    }

    /// Pending files as backend context: a `// File:` header per file followed
    /// by at most `max_chars` characters of its content.
    pub fn repo_context(&self, max_chars: usize) -> String {
        self.pending_files
            .iter()
            .map(|f| {
                let excerpt: String = f.content.chars().take(max_chars).collect();
                format!("// File: {}\n{}", f.path, excerpt)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Send `input` with the pending files. Attachments are cleared only when
    /// the backend replies.
    pub async fn send(
        &mut self,
        input: &str,
        backend: &dyn AssistBackend,
        options: &SendOptions,
        on_stage: &mut (dyn FnMut(&ThinkingStage) + Send),
    ) -> SendOutcome {
        if !self.can_send(input) {
            return SendOutcome::Skipped;
        }

        let files = (!self.pending_files.is_empty())
            .then(|| self.pending_files.iter().map(|f| f.path.clone()).collect());
        self.messages.push(ChatMessage::user(input, files));

        let repo_context = self.repo_context(options.context_chars_per_file);
        let result = with_thinking_stages(
            options.show_thinking_stages,
            on_stage,
            backend.assist(input, &repo_context),
        )
        .await;

        match result {
            Ok(reply) => {
                self.messages.push(ChatMessage::model_reply(reply));
                self.pending_files.clear();
                SendOutcome::Replied
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "request failed");
                self.messages.push(ChatMessage::error(e));
                SendOutcome::Failed
            }
        }
    }
}
