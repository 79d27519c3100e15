use crate::errors::{RuntimeError, RuntimeResult};
use async_stream::try_stream;
use aws_sdk_bedrockruntime::{
    error::SdkError,
    operation::{
        invoke_model::InvokeModelError,
        invoke_model_with_response_stream::InvokeModelWithResponseStreamError,
    },
    primitives::Blob,
    types::{error::ResponseStreamError, ResponseStream},
    Client,
};
use futures::stream::BoxStream;
use tracing::debug;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Stream of raw chunk payloads from a streaming invocation.
pub type ChunkStream = BoxStream<'static, RuntimeResult<Vec<u8>>>;

/// A single model invocation as Bedrock sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeModelRequest {
    pub model_id: String,
    pub content_type: String,
    pub accept: String,
    pub body: Vec<u8>,
}

impl InvokeModelRequest {
    /// A request whose body and expected response are both JSON.
    #[must_use]
    pub fn json(model_id: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            model_id: model_id.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            accept: JSON_CONTENT_TYPE.to_string(),
            body,
        }
    }
}

/// Performs the network exchange with the model-invocation service.
///
/// Credentials, region, retries and transport live behind this trait.
#[async_trait::async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Submit the request and return the raw response body.
    async fn invoke_model(&self, request: InvokeModelRequest) -> RuntimeResult<Vec<u8>>;

    /// Submit the request and return the response as a stream of chunk
    /// payloads.
    async fn invoke_model_with_response_stream(
        &self,
        request: InvokeModelRequest,
    ) -> RuntimeResult<ChunkStream>;
}

/// [`ModelRuntime`] backed by the AWS SDK's Bedrock Runtime client.
#[derive(Clone, Debug)]
pub struct BedrockRuntime {
    client: Client,
}

impl BedrockRuntime {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from an already loaded AWS configuration.
    #[must_use]
    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(sdk_config))
    }
}

#[async_trait::async_trait]
impl ModelRuntime for BedrockRuntime {
    async fn invoke_model(&self, request: InvokeModelRequest) -> RuntimeResult<Vec<u8>> {
        debug!(model_id = %request.model_id, bytes = request.body.len(), "InvokeModel");

        let output = self
            .client
            .invoke_model()
            .model_id(request.model_id)
            .content_type(request.content_type)
            .accept(request.accept)
            .body(Blob::new(request.body))
            .send()
            .await
            .map_err(map_invoke_model_error)?;

        Ok(output.body.into_inner())
    }

    async fn invoke_model_with_response_stream(
        &self,
        request: InvokeModelRequest,
    ) -> RuntimeResult<ChunkStream> {
        debug!(
            model_id = %request.model_id,
            bytes = request.body.len(),
            "InvokeModelWithResponseStream"
        );

        let mut output = self
            .client
            .invoke_model_with_response_stream()
            .model_id(request.model_id)
            .content_type(request.content_type)
            .accept(request.accept)
            .body(Blob::new(request.body))
            .send()
            .await
            .map_err(map_invoke_model_with_response_stream_error)?;

        let stream = try_stream! {
            while let Some(event) = output.body.recv().await.map_err(map_response_stream_error)? {
                if let ResponseStream::Chunk(part) = event {
                    if let Some(bytes) = part.bytes {
                        yield bytes.into_inner();
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn map_invoke_model_error<R>(error: SdkError<InvokeModelError, R>) -> RuntimeError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if let Some(InvokeModelError::AccessDeniedException(denied)) = error.as_service_error() {
        return RuntimeError::AccessDenied(denied.message().unwrap_or_default().to_string());
    }
    RuntimeError::other(error)
}

fn map_invoke_model_with_response_stream_error<R>(
    error: SdkError<InvokeModelWithResponseStreamError, R>,
) -> RuntimeError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if let Some(InvokeModelWithResponseStreamError::AccessDeniedException(denied)) =
        error.as_service_error()
    {
        return RuntimeError::AccessDenied(denied.message().unwrap_or_default().to_string());
    }
    RuntimeError::other(error)
}

fn map_response_stream_error<R>(error: SdkError<ResponseStreamError, R>) -> RuntimeError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    RuntimeError::other(error)
}
