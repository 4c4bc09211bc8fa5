//! LLM request/response types.
//!
//! Provider-agnostic shapes for a single chat completion. Providers
//! translate these into their own wire formats; the generator only ever
//! sees [`CompletionRequest`] and [`CompletionResponse`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role of a message in an LLM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Request to an LLM provider for a single chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Content of a completion response.
///
/// Backends disagree on the envelope: some return the text directly, some
/// return a list of content blocks. Both shapes deserialize here;
/// [`CompletionResponse::text`] flattens either into a plain string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One block of a block-structured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Response from an LLM provider for a chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub model: String,
    pub content: ResponseContent,
}

impl CompletionResponse {
    /// Extract the response text, flattening block-structured content.
    pub fn text(&self) -> String {
        match &self.content {
            ResponseContent::Text(text) => text.clone(),
            ResponseContent::Blocks(blocks) => blocks
                .iter()
                .map(|block| {
                    block
                        .text
                        .as_deref()
                        .or(block.content.as_deref())
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>()
                .join("")
                .trim()
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            let s = role.to_string();
            let parsed: MessageRole = s.parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_response_text_plain() {
        let response = CompletionResponse {
            model: "test".to_string(),
            content: ResponseContent::Text("hello".to_string()),
        };
        assert_eq!(response.text(), "hello");
    }

    #[test]
    fn test_response_text_blocks() {
        let response = CompletionResponse {
            model: "test".to_string(),
            content: ResponseContent::Blocks(vec![
                ContentBlock {
                    text: Some("one ".to_string()),
                    content: None,
                },
                ContentBlock {
                    text: None,
                    content: Some("two".to_string()),
                },
                ContentBlock {
                    text: None,
                    content: None,
                },
            ]),
        };
        assert_eq!(response.text(), "one two");
    }

    #[test]
    fn test_response_content_untagged_deserialization() {
        let plain: CompletionResponse =
            serde_json::from_str(r#"{"model":"m","content":"raw text"}"#).unwrap();
        assert_eq!(plain.text(), "raw text");

        let blocks: CompletionResponse =
            serde_json::from_str(r#"{"model":"m","content":[{"text":"a"},{"content":"b"}]}"#)
                .unwrap();
        assert_eq!(blocks.text(), "ab");
    }
}
