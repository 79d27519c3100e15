use crate::{
    api::{
        Base64ImageSource, ContentBlockDelta, ContentBlockDeltaEvent, ImageSource as ApiImageSource,
        InputContentBlock, InputMessage, InvokeModelBody, InvokeModelResponse, MessageDeltaEvent,
        MessageStartEvent, MessageStreamEvent, RequestImageBlock, RequestTextBlock, Usage,
    },
    image::{self, ImageSource},
    opentelemetry::{trace_invoke, InvokeSpan},
    runtime::{ChunkStream, InvokeModelRequest, ModelRuntime},
    RuntimeError, VisionError, VisionResult,
};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use std::{
    path::Path,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tracing::{debug, warn};
use tracing_futures::Instrument;

const PROVIDER: &str = "bedrock-anthropic";

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-haiku-20240307-v1:0";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f64 = 0.5;
pub const DEFAULT_STOP_SEQUENCE: &str = "\n\nHuman:";

#[derive(Clone, Debug, Default)]
pub struct ClaudeVisionOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub anthropic_version: Option<String>,
    pub stop_sequences: Option<Vec<String>>,
}

/// Invokes a Claude 3 model with one image and one prompt.
pub struct ClaudeVisionModel {
    model_id: String,
    runtime: Arc<dyn ModelRuntime>,
    max_tokens: u32,
    temperature: f64,
    anthropic_version: String,
    stop_sequences: Vec<String>,
}

/// The model's reply to one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionResponse {
    pub text: String,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// The runtime refused to invoke the model for lack of permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub model_id: String,
    pub message: String,
}

impl AccessDenied {
    /// The human-readable warning reported in place of a completion.
    #[must_use]
    pub fn warning(&self) -> String {
        let mut warning = format!(
            "Access denied: the caller does not have permission to invoke model {}.",
            self.model_id
        );
        if !self.message.is_empty() {
            warning.push(' ');
            warning.push_str(&self.message);
        }
        warning
    }
}

/// Outcome of a non-streaming invocation. Access denial is reported here
/// rather than as an error; every other failure is a [`VisionError`].
#[derive(Debug, Clone, PartialEq)]
pub enum Completion<T> {
    Done(T),
    Denied(AccessDenied),
}

impl<T> Completion<T> {
    /// The completed value, or `None` when access was denied.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::Denied(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completion<U> {
        match self {
            Self::Done(value) => Completion::Done(f(value)),
            Self::Denied(denied) => Completion::Denied(denied),
        }
    }
}

/// Text deltas of a streaming invocation.
pub struct TextStream(Pin<Box<dyn Stream<Item = VisionResult<String>> + Send>>);

impl TextStream {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = VisionResult<String>> + Send + 'static,
    {
        Self(Box::pin(stream))
    }
}

impl Stream for TextStream {
    type Item = VisionResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.as_mut().poll_next(cx)
    }
}

impl ClaudeVisionModel {
    #[must_use]
    pub fn new(
        model_id: impl Into<String>,
        runtime: Arc<dyn ModelRuntime>,
        mut options: ClaudeVisionOptions,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            runtime,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            anthropic_version: options
                .anthropic_version
                .take()
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_VERSION.to_string()),
            stop_sequences: options
                .stop_sequences
                .take()
                .unwrap_or_else(|| vec![DEFAULT_STOP_SEQUENCE.to_string()]),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Load the image at `image_path`, send it with `prompt` and return the
    /// completion text. `Ok(None)` means access was denied and a warning has
    /// been logged.
    pub async fn run_multi_modal_prompt(
        &self,
        prompt: &str,
        image_path: impl AsRef<Path>,
    ) -> VisionResult<Option<String>> {
        match self.describe(prompt, image_path).await? {
            Completion::Done(text) => Ok(Some(text)),
            Completion::Denied(_) => Ok(None),
        }
    }

    /// Like [`Self::run_multi_modal_prompt`], but keeps the denial details.
    pub async fn describe(
        &self,
        prompt: &str,
        image_path: impl AsRef<Path>,
    ) -> VisionResult<Completion<String>> {
        let image = image::load_image(image_path)?;
        let completion = self.invoke(prompt, image).await?;
        Ok(completion.map(|response| response.text))
    }

    /// Send an already loaded image with `prompt`.
    pub async fn invoke(
        &self,
        prompt: &str,
        image: ImageSource,
    ) -> VisionResult<Completion<VisionResponse>> {
        let span = InvokeSpan::new(
            &self.model_id,
            "invoke",
            self.max_tokens,
            Some(self.temperature),
        );

        trace_invoke(
            span,
            async move {
                let request = self.build_request(prompt, image)?;

                match self.runtime.invoke_model(request).await {
                    Ok(body) => parse_response(&body).map(Completion::Done),
                    Err(RuntimeError::AccessDenied(message)) => Ok(self.denied(message)),
                    Err(RuntimeError::Other(error)) => Err(VisionError::Runtime(error)),
                }
            },
            |span, completion| match completion {
                Completion::Done(response) => {
                    if let Some(usage) = response.usage {
                        span.on_usage(usage);
                    }
                }
                Completion::Denied(denied) => span.on_access_denied(&denied.message),
            },
        )
        .await
    }

    /// Load the image at `image_path`, send it with `prompt` and stream the
    /// completion text as it is generated.
    pub async fn stream_multi_modal_prompt(
        &self,
        prompt: &str,
        image_path: impl AsRef<Path>,
    ) -> VisionResult<Completion<TextStream>> {
        let image = image::load_image(image_path)?;
        self.stream(prompt, image).await
    }

    pub async fn stream(
        &self,
        prompt: &str,
        image: ImageSource,
    ) -> VisionResult<Completion<TextStream>> {
        let mut span = InvokeSpan::new(
            &self.model_id,
            "stream",
            self.max_tokens,
            Some(self.temperature),
        );

        // Inner `Err` carries the access-denied message.
        let started: VisionResult<Result<ChunkStream, String>> = span
            .instrument_future(async move {
                let request = self.build_request(prompt, image)?;
                match self.runtime.invoke_model_with_response_stream(request).await {
                    Ok(chunks) => Ok(Ok(chunks)),
                    Err(RuntimeError::AccessDenied(message)) => Ok(Err(message)),
                    Err(RuntimeError::Other(error)) => Err(VisionError::Runtime(error)),
                }
            })
            .await;

        let mut chunks = match started {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(message)) => {
                span.on_access_denied(&message);
                return Ok(self.denied(message));
            }
            Err(error) => {
                span.on_error(&error);
                return Err(error);
            }
        };

        let span_handle = span.span();
        let stream = try_stream! {
            let mut span_state = span;

            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        let error = match error {
                            RuntimeError::AccessDenied(message) => VisionError::Runtime(message.into()),
                            RuntimeError::Other(error) => VisionError::Runtime(error),
                        };
                        span_state.on_error(&error);
                        Err(error)?
                    }
                };

                let event = match parse_stream_event(&chunk) {
                    Ok(event) => event,
                    Err(error) => {
                        span_state.on_error(&error);
                        Err(error)?
                    }
                };

                match event {
                    MessageStreamEvent::MessageStart(MessageStartEvent { message }) => {
                        if let Some(usage) = message.usage {
                            span_state.on_usage(usage);
                        }
                    }
                    MessageStreamEvent::MessageDelta(MessageDeltaEvent { usage: Some(usage), .. }) => {
                        span_state.on_usage(Usage {
                            input_tokens: 0,
                            output_tokens: usage.output_tokens,
                        });
                    }
                    MessageStreamEvent::ContentBlockDelta(ContentBlockDeltaEvent {
                        delta: ContentBlockDelta::TextDelta(delta),
                        ..
                    }) => {
                        span_state.on_first_token();
                        yield delta.text;
                    }
                    _ => {}
                }
            }
        }
        .instrument(span_handle);

        Ok(Completion::Done(TextStream::from_stream(stream)))
    }

    fn denied<T>(&self, message: String) -> Completion<T> {
        let denied = AccessDenied {
            model_id: self.model_id.clone(),
            message,
        };
        warn!(model_id = %self.model_id, "{}", denied.warning());
        Completion::Denied(denied)
    }

    fn build_request(&self, prompt: &str, image: ImageSource) -> VisionResult<InvokeModelRequest> {
        let body = self.build_body(prompt, image);
        debug!(
            model_id = %self.model_id,
            max_tokens = body.max_tokens,
            "built invoke model body"
        );
        let body = serde_json::to_vec(&body).map_err(|error| {
            VisionError::Invariant(PROVIDER, format!("Failed to serialize request: {error}"))
        })?;
        Ok(InvokeModelRequest::json(self.model_id.clone(), body))
    }

    /// One user message holding the image block followed by the prompt.
    pub fn build_body(&self, prompt: &str, image: ImageSource) -> InvokeModelBody {
        InvokeModelBody {
            anthropic_version: self.anthropic_version.clone(),
            max_tokens: self.max_tokens,
            messages: vec![InputMessage {
                role: "user".to_string(),
                content: vec![
                    InputContentBlock::Image(RequestImageBlock {
                        source: ApiImageSource::Base64(Base64ImageSource {
                            media_type: image.media_type,
                            data: image.data,
                        }),
                    }),
                    InputContentBlock::Text(RequestTextBlock {
                        text: prompt.to_string(),
                    }),
                ],
            }],
            temperature: Some(self.temperature),
            stop_sequences: if self.stop_sequences.is_empty() {
                None
            } else {
                Some(self.stop_sequences.clone())
            },
        }
    }
}

/// Decode a response body and take the text of its first content block.
pub fn parse_response(body: &[u8]) -> VisionResult<VisionResponse> {
    let body = std::str::from_utf8(body)
        .map_err(|error| VisionError::Decode(format!("Response body is not UTF-8: {error}")))?;
    let response: InvokeModelResponse = serde_json::from_str(body)
        .map_err(|error| VisionError::Decode(format!("Failed to parse response: {error}")))?;

    let first = response.content.into_iter().next().ok_or_else(|| {
        VisionError::Invariant(PROVIDER, "Response has no content blocks".to_string())
    })?;
    let text = first.text.ok_or_else(|| {
        VisionError::Invariant(
            PROVIDER,
            "First content block has no text field".to_string(),
        )
    })?;

    Ok(VisionResponse {
        text,
        stop_reason: response.stop_reason,
        usage: response.usage,
    })
}

fn parse_stream_event(chunk: &[u8]) -> VisionResult<MessageStreamEvent> {
    serde_json::from_slice(chunk)
        .map_err(|error| VisionError::Decode(format!("Failed to parse stream chunk: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRuntime;
    use serde_json::{json, Value};

    fn model() -> ClaudeVisionModel {
        ClaudeVisionModel::new(
            DEFAULT_MODEL_ID,
            Arc::new(MockRuntime::new()),
            ClaudeVisionOptions::default(),
        )
    }

    fn image() -> ImageSource {
        ImageSource {
            media_type: "image/png".to_string(),
            data: "aGVsbG8=".to_string(),
        }
    }

    #[test]
    fn body_has_one_message_with_image_then_text() {
        let body = serde_json::to_value(model().build_body("What is this?", image())).unwrap();

        assert_eq!(
            body,
            json!({
                "anthropic_version": "bedrock-2023-05-31",
                "max_tokens": 1000,
                "temperature": 0.5,
                "stop_sequences": ["\n\nHuman:"],
                "messages": [{
                    "role": "user",
                    "content": [
                        {
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": "image/png",
                                "data": "aGVsbG8="
                            }
                        },
                        { "type": "text", "text": "What is this?" }
                    ]
                }]
            })
        );
    }

    #[test]
    fn options_override_defaults() {
        let model = ClaudeVisionModel::new(
            "anthropic.claude-3-sonnet-20240229-v1:0",
            Arc::new(MockRuntime::new()),
            ClaudeVisionOptions {
                max_tokens: Some(256),
                temperature: Some(0.0),
                anthropic_version: None,
                stop_sequences: Some(vec![]),
            },
        );
        let body = serde_json::to_value(model.build_body("hi", image())).unwrap();

        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["anthropic_version"], DEFAULT_ANTHROPIC_VERSION);
        assert_eq!(body.get("stop_sequences"), None::<&Value>);
    }

    #[test]
    fn parse_response_reads_first_text_and_usage() {
        let body = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-haiku-20240307",
            "content": [
                { "type": "text", "text": "A cat on a sofa." },
                { "type": "text", "text": "ignored" }
            ],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 1510, "output_tokens": 9 }
        })
        .to_string();

        let response = parse_response(body.as_bytes()).unwrap();

        assert_eq!(response.text, "A cat on a sofa.");
        assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(
            response.usage,
            Some(Usage {
                input_tokens: 1510,
                output_tokens: 9
            })
        );
    }

    #[test]
    fn parse_response_rejects_empty_content() {
        let error = parse_response(br#"{"content":[]}"#).unwrap_err();
        assert!(matches!(error, VisionError::Invariant(PROVIDER, _)));
    }

    #[test]
    fn parse_response_rejects_block_without_text() {
        let error = parse_response(br#"{"content":[{"type":"image"}]}"#).unwrap_err();
        assert!(matches!(error, VisionError::Invariant(PROVIDER, _)));
    }

    #[test]
    fn parse_response_rejects_non_utf8() {
        let error = parse_response(&[0xFF, 0xFE, 0x00]).unwrap_err();
        assert!(matches!(error, VisionError::Decode(_)));
    }

    #[test]
    fn parses_bedrock_stream_events() {
        let delta = parse_stream_event(
            br#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap();
        assert!(matches!(
            delta,
            MessageStreamEvent::ContentBlockDelta(ContentBlockDeltaEvent {
                delta: ContentBlockDelta::TextDelta(_),
                ..
            })
        ));

        let stop = parse_stream_event(
            br#"{"type":"message_stop","amazon-bedrock-invocationMetrics":{"inputTokenCount":12}}"#,
        )
        .unwrap();
        assert_eq!(stop, MessageStreamEvent::MessageStop);

        let unknown = parse_stream_event(br#"{"type":"something_new","x":1}"#).unwrap();
        assert_eq!(unknown, MessageStreamEvent::Unknown);
    }

    #[test]
    fn warning_names_the_model() {
        let denied = AccessDenied {
            model_id: DEFAULT_MODEL_ID.to_string(),
            message: String::new(),
        };
        assert_eq!(
            denied.warning(),
            "Access denied: the caller does not have permission to invoke model \
             anthropic.claude-3-haiku-20240307-v1:0."
        );
    }
}
