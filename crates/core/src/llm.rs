use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;

/// Groq's OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: String,
}

/// Handle to an OpenAI-compatible API, shared by every collaborator.
///
/// Cloning is cheap; all clones share one connection pool.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: SecretString) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
            }),
        }
    }

    /// An authenticated POST to `path` under the base URL.
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.inner
            .http
            .post(format!("{}/{}", self.inner.base_url, path))
            .bearer_auth(self.inner.api_key.expose_secret())
    }

    /// Runs a non-streaming chat completion and returns the first choice's text.
    pub async fn complete(
        &self,
        model: &str,
        messages: serde_json::Value,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        let resp = self
            .post("chat/completions")
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat completion returned an error status")?
            .json::<LlmResponse>()
            .await
            .context("chat completion response was not valid JSON")?;

        let answer = &resp
            .choices
            .first()
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?
            .message
            .content;
        Ok(answer.clone())
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}
