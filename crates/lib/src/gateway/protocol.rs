//! Gateway HTTP request and response bodies.

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageId};

/// Warning attached to a 202 inbound response when the classifier was unavailable.
pub const WARNING_AI_UNAVAILABLE: &str = "ai_unavailable";

/// POST /inbound. Postmark-style field names are accepted as aliases.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundBody {
    #[serde(default, alias = "From")]
    pub from: String,
    #[serde(default, alias = "Subject")]
    pub subject: String,
    #[serde(default, alias = "TextBody")]
    pub text: String,
}

/// POST /reply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyBody {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub body: String,
}

/// POST /compose.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposeBody {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// GET /messages query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboundAck {
    pub ok: bool,
    pub id: MessageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuedAck {
    pub ok: bool,
    pub queued: bool,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageList {
    pub ok: bool,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub ok: bool,
    pub message: Message,
}

/// `{ok:false, error}` envelope for every non-2xx response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}
