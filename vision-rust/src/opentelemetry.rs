use crate::{api::Usage, VisionResult};
use opentelemetry::trace::Status;
use std::time::Instant;
use tracing::{info_span, Span};
use tracing_futures::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

const PROVIDER_NAME: &str = "aws.bedrock";

/// Span wrapping one model invocation, carrying GenAI semantic attributes.
pub struct InvokeSpan {
    span: Span,
    usage: Option<Usage>,
    start_time: Instant,
    time_to_first_token: Option<f64>,
    max_tokens: u32,
    temperature: Option<f64>,
    ended: bool,
}

impl InvokeSpan {
    pub fn new(model_id: &str, method: &str, max_tokens: u32, temperature: Option<f64>) -> Self {
        let span = if method == "stream" {
            info_span!("claude_vision.stream")
        } else {
            info_span!("claude_vision.invoke")
        };
        span.set_attribute("gen_ai.operation.name", "chat");
        span.set_attribute("gen_ai.provider.name", PROVIDER_NAME);
        span.set_attribute("gen_ai.request.model", model_id.to_string());
        span.set_attribute("claude_vision.method", method.to_string());

        Self {
            span,
            usage: None,
            start_time: Instant::now(),
            time_to_first_token: None,
            max_tokens,
            temperature,
            ended: false,
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub async fn instrument_future<F>(&self, future: F) -> F::Output
    where
        F: std::future::Future,
    {
        future.instrument(self.span()).await
    }

    pub fn on_usage(&mut self, usage: Usage) {
        let total = self.usage.get_or_insert_with(Usage::default);
        total.input_tokens += usage.input_tokens;
        total.output_tokens += usage.output_tokens;
    }

    pub fn on_first_token(&mut self) {
        if self.time_to_first_token.is_none() {
            self.time_to_first_token = Some(self.start_time.elapsed().as_secs_f64());
        }
    }

    pub fn on_access_denied(&mut self, message: &str) {
        self.span
            .set_attribute("claude_vision.access_denied", message.to_string());
        self.span.set_status(Status::error("access denied"));
    }

    pub fn on_error(&mut self, error: &(dyn std::error::Error + 'static)) {
        self.span
            .set_attribute("exception.message", error.to_string());
        self.span.set_status(Status::error(error.to_string()));
    }

    pub fn on_end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        if let Some(usage) = &self.usage {
            self.span
                .set_attribute("gen_ai.usage.input_tokens", i64::from(usage.input_tokens));
            self.span
                .set_attribute("gen_ai.usage.output_tokens", i64::from(usage.output_tokens));
        }

        if let Some(time_to_first_token) = self.time_to_first_token {
            self.span
                .set_attribute("gen_ai.server.time_to_first_token", time_to_first_token);
        }

        self.span
            .set_attribute("gen_ai.request.max_tokens", i64::from(self.max_tokens));
        if let Some(temperature) = self.temperature {
            self.span
                .set_attribute("gen_ai.request.temperature", temperature);
        }
    }
}

impl Drop for InvokeSpan {
    fn drop(&mut self) {
        self.on_end();
    }
}

/// Await `future` inside the span, then let `on_ok` record what the
/// successful value carries. Errors set the span status.
pub async fn trace_invoke<T, Fut, R>(
    mut span: InvokeSpan,
    future: Fut,
    on_ok: R,
) -> VisionResult<T>
where
    Fut: std::future::Future<Output = VisionResult<T>>,
    R: FnOnce(&mut InvokeSpan, &T),
{
    let result = span.instrument_future(future).await;

    match &result {
        Ok(value) => on_ok(&mut span, value),
        Err(error) => span.on_error(error),
    }

    span.on_end();
    result
}
