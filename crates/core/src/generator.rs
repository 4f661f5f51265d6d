use crate::conversation::history::Message;
use crate::llm::LlmClient;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::{StreamExt, future};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

const DONE_MARKER: &str = "[DONE]";

/// Response text, one piece at a time, in generation order.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Everything the model sees for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub history: Vec<Message>,
    pub prompt_text: String,
    /// Raw base64 payloads, data-URI prefixes already stripped.
    pub images: Vec<String>,
    pub summary: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Opens the response stream. Errors before the first chunk come back
    /// here; errors mid-stream come back as stream items.
    async fn stream(&self, request: GenerationRequest) -> Result<ChunkStream>;
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Streaming chat completions against an OpenAI-compatible endpoint.
pub struct ChatGenerator {
    client: LlmClient,
    model: String,
}

impl ChatGenerator {
    pub fn new(client: LlmClient, model: String) -> Self {
        Self { client, model }
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(json!({
            "role": "system",
            "content": request.system_instruction,
        }));
        for message in &request.history {
            messages.push(json!({
                "role": message.role,
                "content": message.content,
            }));
        }

        let mut content = vec![json!({
            "type": "text",
            "text": format!(
                "Transcript: {}\nMemory Context: {}",
                request.prompt_text, request.summary
            ),
        })];
        for image in &request.images {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/jpeg;base64,{image}") },
            }));
        }
        messages.push(json!({ "role": "user", "content": content }));

        json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        })
    }
}

/// Pulls the text delta out of one SSE data line. Keep-alive and
/// metadata chunks yield `None`.
fn parse_chunk(data: &str) -> Result<Option<String>> {
    let value: Value =
        serde_json::from_str(data).with_context(|| format!("SSE parsing error, data: {data}"))?;
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("an error occurred during streaming");
        return Err(anyhow!("SSE API error: {message}"));
    }

    let chunk: StreamChunk = serde_json::from_value(value).context("SSE data schema error")?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

#[async_trait]
impl Generator for ChatGenerator {
    async fn stream(&self, request: GenerationRequest) -> Result<ChunkStream> {
        debug!(
            model = %self.model,
            history = request.history.len(),
            images = request.images.len(),
            "opening generation stream"
        );
        let body = self.request_body(&request);

        let response = self
            .client
            .post("chat/completions")
            .json(&body)
            .send()
            .await
            .context("generation request failed")?
            .error_for_status()
            .context("generation returned an error status")?;

        let chunks = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                future::ready(!matches!(event, Ok(sse) if sse.data == DONE_MARKER))
            })
            .filter_map(|event| {
                future::ready(match event {
                    Ok(sse) => {
                        trace!(data = %sse.data, "generation SSE");
                        parse_chunk(&sse.data).transpose()
                    }
                    Err(e) => Some(Err(anyhow!("SSE stream error: {e}"))),
                })
            })
            .boxed();

        Ok(chunks)
    }
}
