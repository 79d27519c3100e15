use std::{collections::VecDeque, sync::Mutex};

use futures::stream;

use crate::{
    errors::{RuntimeError, RuntimeResult},
    runtime::{ChunkStream, InvokeModelRequest, ModelRuntime},
};

/// Result for a mocked `invoke_model` call.
pub enum MockInvokeResult {
    Body(Vec<u8>),
    Error(RuntimeError),
}

impl MockInvokeResult {
    /// Construct a result that yields the provided raw body.
    pub fn body(body: impl Into<Vec<u8>>) -> Self {
        Self::Body(body.into())
    }

    /// Construct a result that yields `value` serialized as JSON.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::Body(value.to_string().into_bytes())
    }

    /// Construct a result that fails with the provided error.
    pub fn error(error: RuntimeError) -> Self {
        Self::Error(error)
    }

    /// Construct a result that fails as if the caller lacked permission.
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::Error(RuntimeError::AccessDenied(message.into()))
    }
}

impl From<RuntimeResult<Vec<u8>>> for MockInvokeResult {
    fn from(result: RuntimeResult<Vec<u8>>) -> Self {
        match result {
            Ok(body) => Self::Body(body),
            Err(error) => Self::Error(error),
        }
    }
}

/// Result for a mocked `invoke_model_with_response_stream` call.
pub enum MockStreamResult {
    /// Chunk results yielded in order. An `Err` item fails the stream midway.
    Chunks(Vec<RuntimeResult<Vec<u8>>>),
    Error(RuntimeError),
}

impl MockStreamResult {
    /// Construct a result that yields each value serialized as one JSON chunk.
    pub fn events(events: &[serde_json::Value]) -> Self {
        Self::Chunks(
            events
                .iter()
                .map(|event| Ok(event.to_string().into_bytes()))
                .collect(),
        )
    }

    /// Construct a result that fails before any chunk is produced.
    pub fn error(error: RuntimeError) -> Self {
        Self::Error(error)
    }
}

#[derive(Default)]
struct MockRuntimeState {
    mocked_invoke_results: VecDeque<MockInvokeResult>,
    mocked_stream_results: VecDeque<MockStreamResult>,
    tracked_invoke_requests: Vec<InvokeModelRequest>,
    tracked_stream_requests: Vec<InvokeModelRequest>,
}

/// A mock runtime that tracks requests and yields predefined results.
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<MockRuntimeState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a mocked `invoke_model` result.
    pub fn enqueue_invoke<R>(&self, result: R) -> &Self
    where
        R: Into<MockInvokeResult>,
    {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.mocked_invoke_results.push_back(result.into());
        drop(state);
        self
    }

    /// Enqueue a mocked `invoke_model_with_response_stream` result.
    pub fn enqueue_stream(&self, result: MockStreamResult) -> &Self {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.mocked_stream_results.push_back(result);
        drop(state);
        self
    }

    /// Retrieve the `invoke_model` requests received so far.
    pub fn tracked_invoke_requests(&self) -> Vec<InvokeModelRequest> {
        let state = self.state.lock().expect("mock state poisoned");
        state.tracked_invoke_requests.clone()
    }

    /// Retrieve the streaming requests received so far.
    pub fn tracked_stream_requests(&self) -> Vec<InvokeModelRequest> {
        let state = self.state.lock().expect("mock state poisoned");
        state.tracked_stream_requests.clone()
    }
}

#[async_trait::async_trait]
impl ModelRuntime for MockRuntime {
    async fn invoke_model(&self, request: InvokeModelRequest) -> RuntimeResult<Vec<u8>> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.tracked_invoke_requests.push(request);

        let result = state
            .mocked_invoke_results
            .pop_front()
            .ok_or_else(|| RuntimeError::other("no mocked invoke results available"))?;

        match result {
            MockInvokeResult::Body(body) => Ok(body),
            MockInvokeResult::Error(error) => Err(error),
        }
    }

    async fn invoke_model_with_response_stream(
        &self,
        request: InvokeModelRequest,
    ) -> RuntimeResult<ChunkStream> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.tracked_stream_requests.push(request);

        let result = state
            .mocked_stream_results
            .pop_front()
            .ok_or_else(|| RuntimeError::other("no mocked stream results available"))?;

        match result {
            MockStreamResult::Chunks(chunks) => Ok(Box::pin(stream::iter(chunks))),
            MockStreamResult::Error(error) => Err(error),
        }
    }
}
