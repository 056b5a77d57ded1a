//! Message/tool-call types (spec.md §3 `Message`, `ToolCall`).

use serde::Deserialize;
use serde::Serialize;

/// One entry in a session's transcript.
///
/// Tagged the same way `codex_protocol::models::ResponseItem` tags its
/// variants, but shaped to the spec's leaner message model rather than a
/// full Responses-API payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: Content,
    },
    User {
        content: Content,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Content>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        tool_name: String,
        content: Content,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    Reasoning {
        content: Content,
    },
}

impl Message {
    /// Concat of text parts; images render as `[image]`. Used by
    /// `SessionStore::list`'s `last_user_message` field.
    pub fn render_text(&self) -> String {
        let content = match self {
            Message::System { content }
            | Message::User { content }
            | Message::Reasoning { content } => Some(content),
            Message::Assistant { content, .. } => content.as_ref(),
            Message::Tool { content, .. } => Some(content),
        };
        match content {
            Some(c) => c.render_text(),
            None => String::new(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Message::User { .. })
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn as_tool_output(&self) -> Option<(&str, bool)> {
        match self {
            Message::Tool {
                tool_call_id,
                is_error,
                ..
            } => Some((tool_call_id.as_str(), *is_error)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    pub fn render_text(&self) -> String {
        match self {
            Content::Text(t) => t.clone(),
            Content::Parts(parts) => parts
                .iter()
                .map(ContentPart::render_text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: String },
    Other { value: serde_json::Value },
}

impl ContentPart {
    fn render_text(&self) -> String {
        match self {
            ContentPart::Text { text } => text.clone(),
            ContentPart::ImageUrl { .. } => "[image]".to_string(),
            ContentPart::Other { .. } => String::new(),
        }
    }
}

/// `{id, function:{name, arguments: JSON-string}}` per spec.md §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, kept as a string: the scheduler never
    /// interprets this, per spec.md §9 "Event payloads".
    pub arguments: String,
}
