// src/provider/openai_compat.rs — Generic OpenAI-compatible provider
//
// Speaks the `/chat/completions` dialect used by Groq, OpenAI, Together,
// OpenRouter and local servers. Images travel as `image_url` content parts.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use std::time::Duration;

use super::{
    ChatChunk, ChatRequest, ChatResponse, ChunkStream, Message, ModelProvider, StopReason,
    TokenUsage,
};
use crate::infra::errors::ActionLensError;

/// Provider for any OpenAI-compatible API endpoint.
pub struct OpenAICompatProvider {
    id_str: String,
    name_str: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        api_key: String,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            id_str: id.into(),
            name_str: name.into(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        for m in &request.messages {
            messages.push(message_json(m));
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "top_p": 1,
        });
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }

    fn request_builder(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header(
                "User-Agent",
                format!("actionlens/{}", env!("CARGO_PKG_VERSION")),
            )
            .json(body)
    }

    fn transport_error(&self, e: reqwest::Error) -> ActionLensError {
        ActionLensError::Provider {
            provider: self.id_str.clone(),
            message: e.to_string(),
            retriable: e.is_timeout() || e.is_connect() || e.is_request(),
        }
    }
}

/// Serialize one message, switching to multi-part content when an image is attached.
fn message_json(m: &Message) -> serde_json::Value {
    match &m.image {
        Some(image) => serde_json::json!({
            "role": m.role.as_str(),
            "content": [
                {"type": "text", "text": m.content},
                {"type": "image_url", "image_url": {"url": image.data_url()}},
            ],
        }),
        None => serde_json::json!({
            "role": m.role.as_str(),
            "content": m.content,
        }),
    }
}

/// Timeouts, throttling and server-side failures are worth retrying; every
/// other status (bad model id, rejected payload, policy refusal) is final.
pub fn status_is_transient(status: u16) -> bool {
    matches!(status, 408 | 425 | 429) || (500..=599).contains(&status)
}

/// Turn a non-success HTTP response into a classified error.
fn status_error(
    provider: &str,
    status: reqwest::StatusCode,
    retry_after_secs: Option<u64>,
    body: String,
) -> ActionLensError {
    if status.as_u16() == 429 {
        return ActionLensError::RateLimited {
            provider: provider.to_string(),
            retry_after_ms: retry_after_secs.unwrap_or(0) * 1000,
        };
    }
    ActionLensError::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {status}: {body}"),
        retriable: status_is_transient(status.as_u16()),
    }
}

fn parse_usage(value: &serde_json::Value) -> Option<TokenUsage> {
    if !value.is_object() {
        return None;
    }
    Some(TokenUsage {
        input_tokens: value["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: value["completion_tokens"].as_u64().unwrap_or(0) as u32,
    })
}

/// Outcome of decoding one SSE `data:` payload.
#[derive(Debug)]
enum SseStep {
    Chunk(ChatChunk),
    Skip,
    Done,
}

fn parse_sse_data(provider: &str, data: &str) -> Result<SseStep, ActionLensError> {
    if data == "[DONE]" {
        return Ok(SseStep::Done);
    }
    let parsed: serde_json::Value =
        serde_json::from_str(data).map_err(|e| ActionLensError::Provider {
            provider: provider.to_string(),
            message: format!("Failed to parse SSE data: {}", e),
            retriable: false,
        })?;

    let delta = parsed["choices"][0]["delta"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    // Groq reports usage under `x_groq`, others at the top level.
    let usage = parse_usage(&parsed["usage"]).or_else(|| parse_usage(&parsed["x_groq"]["usage"]));

    if delta.is_empty() && usage.is_none() {
        return Ok(SseStep::Skip);
    }
    Ok(SseStep::Chunk(ChatChunk { delta, usage }))
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    fn id(&self) -> &str {
        &self.id_str
    }

    fn name(&self) -> &str {
        &self.name_str
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ActionLensError> {
        let body = self.request_body(&request, false);

        let response = self
            .request_builder(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(&self.id_str, status, retry_after, error_body));
        }

        let resp: serde_json::Value =
            response.json().await.map_err(|e| ActionLensError::Provider {
                provider: self.id_str.clone(),
                message: format!("Failed to parse response: {e}"),
                retriable: false,
            })?;

        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let stop_reason =
            StopReason::from_finish_reason(resp["choices"][0]["finish_reason"].as_str());

        if content.is_empty() && matches!(stop_reason, StopReason::ContentFilter) {
            return Err(ActionLensError::Provider {
                provider: self.id_str.clone(),
                message: "response blocked by content filter".into(),
                retriable: false,
            });
        }

        Ok(ChatResponse {
            content,
            usage: parse_usage(&resp["usage"]).unwrap_or_default(),
            stop_reason,
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream, ActionLensError> {
        let body = self.request_body(&request, true);
        let provider_id = self.id_str.clone();

        let mut es = self
            .request_builder(&body)
            .eventsource()
            .map_err(|e| ActionLensError::Provider {
                provider: provider_id.clone(),
                message: format!("Failed to open event stream: {e}"),
                retriable: false,
            })?;

        // Surface connection-level failures before handing out the stream so
        // the retry wrapper can see them.
        let mut first_data = None;
        match es.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(msg))) => first_data = Some(msg.data),
            Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                let error_body = response.text().await.unwrap_or_default();
                es.close();
                return Err(status_error(&provider_id, status, retry_after, error_body));
            }
            Some(Err(reqwest_eventsource::Error::Transport(e))) => {
                es.close();
                return Err(self.transport_error(e));
            }
            Some(Err(e)) => {
                es.close();
                return Err(ActionLensError::Provider {
                    provider: provider_id,
                    message: format!("SSE stream error: {e}"),
                    retriable: false,
                });
            }
            None => {
                return Err(ActionLensError::Provider {
                    provider: provider_id,
                    message: "event stream closed before opening".into(),
                    retriable: true,
                });
            }
        }

        let stream = async_stream::stream! {
            if let Some(data) = first_data {
                match parse_sse_data(&provider_id, &data) {
                    Ok(SseStep::Chunk(chunk)) => yield Ok(chunk),
                    Ok(SseStep::Skip) => {}
                    Ok(SseStep::Done) => {
                        es.close();
                        return;
                    }
                    Err(e) => {
                        yield Err(e);
                        es.close();
                        return;
                    }
                }
            }
            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {},
                    Ok(Event::Message(msg)) => match parse_sse_data(&provider_id, &msg.data) {
                        Ok(SseStep::Chunk(chunk)) => yield Ok(chunk),
                        Ok(SseStep::Skip) => {}
                        Ok(SseStep::Done) => break,
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    },
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        yield Err(ActionLensError::Provider {
                            provider: provider_id.clone(),
                            message: format!("SSE stream error: {}", e),
                            retriable: true,
                        });
                        break;
                    }
                }
            }
            es.close();
        };

        Ok(Box::pin(stream))
    }
}
