//! LLM chat collaborator
//!
//! Talks to an OpenAI-compatible endpoint (`/v1/chat/completions`) for the
//! operator chat and the automatic analysis task. The backend sits behind
//! the `ChatBackend` trait so tests can substitute a scripted double.
//!
//! Conversation history is repaired before every request: the wire protocol
//! requires strict user/assistant alternation starting with a user turn, and
//! the history is capped at the most recent exchanges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod prompts;
pub use prompts::{analysis_prompt, chat_system_prompt};

/// Maximum history entries sent with a request, newest kept.
pub const HISTORY_CAP: usize = 25;
/// Token budget for a single completion.
pub const MAX_COMPLETION_TOKENS: u32 = 150;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const AVAILABILITY_TIMEOUT_SECS: u64 = 3;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned status {0}")]
    ServerError(reqwest::StatusCode),
    #[error("Response contained no completion choices")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Rebuild a history into a protocol-legal sequence.
///
/// System messages are dropped (the caller supplies the system prompt
/// separately). Consecutive same-role turns get a placeholder inserted
/// between them, a leading assistant turn gets a placeholder user turn in
/// front, and the result is truncated to the newest `HISTORY_CAP` entries
/// while still starting on a user turn.
pub fn repair_history(history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut repaired: Vec<ChatMessage> = Vec::with_capacity(history.len());
    for msg in history {
        match msg.role {
            Role::System => continue,
            Role::User => {
                if repaired.last().is_some_and(|m| m.role == Role::User) {
                    repaired.push(ChatMessage::assistant("(no response)"));
                }
                repaired.push(msg.clone());
            }
            Role::Assistant => {
                if repaired.last().map_or(true, |m| m.role == Role::Assistant) {
                    repaired.push(ChatMessage::user("(continued)"));
                }
                repaired.push(msg.clone());
            }
        }
    }

    if repaired.len() > HISTORY_CAP {
        let mut start = repaired.len() - HISTORY_CAP;
        // Keep alternation intact: the window must open on a user turn.
        if repaired[start].role == Role::Assistant {
            start += 1;
        }
        repaired.drain(..start);
    }
    repaired
}

/// Chat completion backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a repaired history plus the new user message; returns the
    /// assistant's reply text.
    async fn send_prompt(
        &self,
        history: &[ChatMessage],
        user_text: &str,
        system_text: Option<&str>,
    ) -> Result<String, ChatError>;

    /// Cheap reachability probe for the endpoint.
    async fn check_availability(&self) -> bool;

    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// OpenAI-compatible HTTP backend
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[derive(Clone)]
pub struct HttpChatBackend {
    http: reqwest::Client,
    probe: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpChatBackend {
    pub fn new(base_url: &str, model: &str) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let probe = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(AVAILABILITY_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            probe,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send_prompt(
        &self,
        history: &[ChatMessage],
        user_text: &str,
        system_text: Option<&str>,
    ) -> Result<String, ChatError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = system_text {
            messages.push(ChatMessage::system(system));
        }
        messages.extend(repair_history(history));
        messages.push(ChatMessage::user(user_text));

        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: 0.7,
        };

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ChatError::ServerError(resp.status()));
        }

        let body: CompletionResponse = resp.json().await?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .ok_or(ChatError::EmptyResponse)?
            .message
            .content;
        tracing::debug!(chars = reply.len(), "Chat completion received");
        Ok(reply)
    }

    async fn check_availability(&self) -> bool {
        match self
            .probe
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, url = %self.base_url, "LLM endpoint unavailable");
                false
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "openai-http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(msgs: &[ChatMessage]) -> Vec<Role> {
        msgs.iter().map(|m| m.role).collect()
    }

    fn alternates_from_user(msgs: &[ChatMessage]) -> bool {
        msgs.iter().enumerate().all(|(i, m)| {
            if i % 2 == 0 {
                m.role == Role::User
            } else {
                m.role == Role::Assistant
            }
        })
    }

    #[test]
    fn http_backend_builds_and_normalizes_base_url() {
        let backend = HttpChatBackend::new("http://localhost:11434/", "llama3").unwrap();
        assert_eq!(backend.base_url(), "http://localhost:11434");
    }

    #[test]
    fn repair_passes_legal_history_through() {
        let history = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("status?"),
        ];
        assert_eq!(repair_history(&history), history);
    }

    #[test]
    fn repair_inserts_placeholders_for_doubled_turns() {
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage::user("second"),
            ChatMessage::assistant("a"),
            ChatMessage::assistant("b"),
        ];
        let repaired = repair_history(&history);
        assert_eq!(
            roles(&repaired),
            vec![
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant
            ]
        );
        assert_eq!(repaired[1].content, "(no response)");
        assert_eq!(repaired[4].content, "(continued)");
    }

    #[test]
    fn repair_prepends_user_before_leading_assistant() {
        let history = vec![ChatMessage::assistant("unsolicited")];
        let repaired = repair_history(&history);
        assert_eq!(roles(&repaired), vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn repair_drops_system_messages() {
        let history = vec![
            ChatMessage::system("you are helpful"),
            ChatMessage::user("hi"),
        ];
        let repaired = repair_history(&history);
        assert_eq!(roles(&repaired), vec![Role::User]);
    }

    #[test]
    fn repair_caps_history_keeping_newest_and_alternation() {
        let mut history = Vec::new();
        for i in 0..40 {
            history.push(ChatMessage::user(format!("q{i}")));
            history.push(ChatMessage::assistant(format!("a{i}")));
        }
        let repaired = repair_history(&history);
        assert!(repaired.len() <= HISTORY_CAP);
        assert!(alternates_from_user(&repaired));
        assert_eq!(repaired.last().unwrap().content, "a39");
    }
}
