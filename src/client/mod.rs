//! Client-facing slice of the agent protocol.
//!
//! Client vocabulary stays here; backend vocabulary stays in
//! [`protocol`](crate::protocol). The only bridge is
//! [`prompt_to_user_content`].

pub mod emitter;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::protocol::UserContent;

pub use emitter::{ChannelEmitter, NdjsonEmitter, UpdateEmitter};

/// Embedded resource contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    /// Resource URI.
    pub uri: String,
    /// Text contents, when the resource is textual.
    #[serde(default)]
    pub text: Option<String>,
    /// MIME type, when known.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// One block of a client prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64 image.
    #[serde(rename_all = "camelCase")]
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type.
        mime_type: String,
    },
    /// Reference to a resource the backend can open itself.
    ResourceLink {
        /// Resource URI.
        uri: String,
        /// Display name.
        name: String,
    },
    /// Resource contents inlined by the client.
    Resource {
        /// The resource.
        resource: EmbeddedResource,
    },
}

/// Translate a client prompt into backend user content.
///
/// A prompt made of exactly one text block becomes plain text; anything
/// else becomes a content-block list in prompt order.
#[must_use]
pub fn prompt_to_user_content(prompt: &[PromptBlock]) -> UserContent {
    if let [PromptBlock::Text { text }] = prompt {
        return UserContent::Text(text.clone());
    }

    let blocks = prompt.iter().filter_map(prompt_block_to_backend).collect();
    UserContent::Blocks(blocks)
}

fn prompt_block_to_backend(block: &PromptBlock) -> Option<Value> {
    match block {
        PromptBlock::Text { text } => Some(json!({ "type": "text", "text": text })),
        PromptBlock::Image { data, mime_type } => Some(json!({
            "type": "image",
            "source": { "type": "base64", "media_type": mime_type, "data": data }
        })),
        PromptBlock::ResourceLink { uri, name } => {
            Some(json!({ "type": "text", "text": format!("[@{name}]({uri})") }))
        }
        PromptBlock::Resource { resource } => resource.text.as_ref().map(|text| {
            json!({
                "type": "text",
                "text": format!("<context ref=\"{}\">\n{text}\n</context>", resource.uri)
            })
        }),
    }
}
