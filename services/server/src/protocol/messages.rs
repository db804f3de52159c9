//! Defines the JSON message bodies carried inside frames.

use companion_core::response::StructuredReply;
use serde::{Deserialize, Serialize};

/// The `conversation_id` field as clients send it: a uid string, a number, or
/// nothing at all.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(untagged)]
pub enum ConversationId {
    #[default]
    Absent,
    Number(i64),
    Text(String),
}

impl ConversationId {
    /// The identity carried by the request, or `None` for the "issue me one"
    /// sentinel (`0`, `"0"`, `""`, `null` or absent).
    pub fn identity(&self) -> Option<String> {
        match self {
            ConversationId::Absent | ConversationId::Number(0) => None,
            ConversationId::Number(n) => Some(n.to_string()),
            ConversationId::Text(text) => {
                let text = text.trim();
                (!text.is_empty() && text != "0").then(|| text.to_string())
            }
        }
    }
}

/// A request sent from the client to the server.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientRequest {
    /// The chat text. Only the identity bootstrap may leave it empty.
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default, deserialize_with = "deserialize_conversation_id")]
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub character_name: Option<String>,
}

/// Maps an explicit `null` to [`ConversationId::Absent`].
fn deserialize_conversation_id<'de, D>(deserializer: D) -> Result<ConversationId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<ConversationId>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl ClientRequest {
    /// Parses a frame payload. An empty payload is a request with every
    /// field absent.
    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        if payload.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(payload)
    }

    /// The chat text, if it contains anything besides whitespace.
    pub fn chat_input(&self) -> Option<&str> {
        self.input.as_deref().filter(|input| !input.trim().is_empty())
    }

    /// The requested character, if one was named.
    pub fn character(&self) -> Option<&str> {
        self.character_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// A response sent from the server to the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServerResponse {
    /// Answers the identity bootstrap with a freshly issued session id.
    Identity { uid: String },
    /// Answers a chat turn.
    Reply(StructuredReply),
}

impl ServerResponse {
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
