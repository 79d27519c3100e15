//! Wire types for the Anthropic messages schema as accepted by Bedrock's
//! `InvokeModel` and `InvokeModelWithResponseStream`.

use serde::{Deserialize, Serialize};

/// The JSON body sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvokeModelBody {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub messages: Vec<InputMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputMessage {
    pub role: String,
    pub content: Vec<InputContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContentBlock {
    Image(RequestImageBlock),
    Text(RequestTextBlock),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestImageBlock {
    pub source: ImageSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Base64(Base64ImageSource),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Base64ImageSource {
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestTextBlock {
    pub text: String,
}

/// The JSON body returned by the model. Only `content` is required; the rest
/// is read when present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvokeModelResponse {
    pub content: Vec<ResponseContentBlock>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseContentBlock {
    #[serde(rename = "type", default)]
    pub type_field: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// One chunk of `InvokeModelWithResponseStream` output.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageStreamEvent {
    MessageStart(MessageStartEvent),
    ContentBlockStart(ContentBlockStartEvent),
    ContentBlockDelta(ContentBlockDeltaEvent),
    ContentBlockStop(ContentBlockStopEvent),
    MessageDelta(MessageDeltaEvent),
    MessageStop,
    Ping,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MessageStartEvent {
    pub message: StreamMessage,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StreamMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ContentBlockStartEvent {
    pub index: usize,
    pub content_block: ResponseContentBlock,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ContentBlockDeltaEvent {
    pub index: usize,
    pub delta: ContentBlockDelta,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockDelta {
    TextDelta(TextDelta),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TextDelta {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ContentBlockStopEvent {
    pub index: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MessageDeltaEvent {
    #[serde(default)]
    pub delta: Option<MessageDelta>,
    #[serde(default)]
    pub usage: Option<MessageDeltaUsage>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MessageDelta {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct MessageDeltaUsage {
    #[serde(default)]
    pub output_tokens: u32,
}
