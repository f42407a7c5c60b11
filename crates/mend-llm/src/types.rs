//! Wire types for the semantic service

use serde::{Deserialize, Serialize};

/// One role-tagged message in a service conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Messages API request format
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ServiceRequest {
    pub model: String,
    pub max_tokens: usize,
    pub messages: Vec<ChatMessage>,
}

/// Messages API response format
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServiceResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Option<Usage>,
}

/// Content block in a service response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub content_type: String,
    pub text: String,
}
