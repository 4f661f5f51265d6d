//! Background memory compaction.
//!
//! The summary is advisory context for the next generation. Updates run
//! detached from the turn that triggered them; a failed update leaves the
//! previous summary in place.

use crate::llm::LlmClient;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use serde_json::json;
use std::sync::Mutex;
use tracing::{debug, error};

/// What the summarizer learns about a finished turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    pub prompt_text: String,
    pub has_images: bool,
    pub image_count: usize,
    pub captured_at: DateTime<Utc>,
}

impl MemorySnapshot {
    pub fn new(prompt_text: &str, image_count: usize) -> Self {
        Self {
            prompt_text: prompt_text.to_string(),
            has_images: image_count > 0,
            image_count,
            captured_at: Utc::now(),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Current summary; empty when nothing has been compacted yet.
    fn summary(&self) -> String;

    async fn update(&self, snapshot: MemorySnapshot) -> Result<()>;
}

/// Used when no memory model is configured.
pub struct NoopSummarizer;

#[async_trait]
impl Summarizer for NoopSummarizer {
    fn summary(&self) -> String {
        String::new()
    }

    async fn update(&self, _snapshot: MemorySnapshot) -> Result<()> {
        Ok(())
    }
}

/// Folds each turn into a running summary with a small chat model.
///
/// One instance per session; the summary never crosses sessions.
pub struct ChatSummarizer {
    client: LlmClient,
    model: String,
    summary: Mutex<String>,
    /// Held for a whole update so each one starts from the last result.
    updating: tokio::sync::Mutex<()>,
}

impl ChatSummarizer {
    pub fn new(client: LlmClient, model: String) -> Self {
        Self {
            client,
            model,
            summary: Mutex::new(String::new()),
            updating: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    fn summary(&self) -> String {
        match self.summary.lock() {
            Ok(summary) => summary.clone(),
            Err(e) => {
                error!("Summary lock poisoned: {}", e);
                String::new()
            }
        }
    }

    async fn update(&self, snapshot: MemorySnapshot) -> Result<()> {
        let _running = self.updating.lock().await;
        let previous = self.summary();
        let turn = serde_json::to_string(&snapshot)?;
        let prompt = format!(
            "Previous summary:\n{previous}\n\nLatest turn:\n{turn}\n\n\
Update the summary of what the user has explained so far and which points are still open. \
Reply with the updated summary only, in at most five sentences."
        );
        let messages = json!([
            {
                "role": "system",
                "content": "You maintain a compact memory of an ongoing project evaluation."
            },
            { "role": "user", "content": prompt }
        ]);

        let updated = self.client.complete(&self.model, messages, Some(300)).await?;
        debug!(chars = updated.len(), "memory summary updated");

        match self.summary.lock() {
            Ok(mut summary) => *summary = updated.trim().to_string(),
            Err(e) => error!("Summary lock poisoned: {}", e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::env;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn snapshot_records_image_presence() {
        let snapshot = MemorySnapshot::new("my login page", 2);
        assert!(snapshot.has_images);
        assert_eq!(snapshot.image_count, 2);

        let snapshot = MemorySnapshot::new("no pictures", 0);
        assert!(!snapshot.has_images);
    }

    #[tokio::test]
    async fn noop_summarizer_stays_empty() {
        let summarizer = NoopSummarizer;
        summarizer
            .update(MemorySnapshot::new("anything", 0))
            .await
            .unwrap();
        assert_eq!(summarizer.summary(), "");
    }

    #[tokio::test]
    async fn failed_update_keeps_the_previous_summary() {
        // Nothing listens on port 9; the request fails fast.
        let client = LlmClient::new(
            "http://127.0.0.1:9/v1",
            SecretString::from("unused".to_string()),
        );
        let summarizer = ChatSummarizer::new(client, "memory-model".to_string());
        if let Ok(mut summary) = summarizer.summary.lock() {
            *summary = "user covered auth".to_string();
        }

        let result = summarizer.update(MemorySnapshot::new("more", 0)).await;
        assert!(result.is_err());
        assert_eq!(summarizer.summary(), "user covered auth");
    }

    /// Serves chat completions for two turns. "turn-A" answers slowly; "turn-B"
    /// reports whether its request carried A's result.
    async fn serve_completions(listener: tokio::net::TcpListener) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                let text = loop {
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    request.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&request).to_string();
                    if n == 0 || text.contains("turn-A") || text.contains("turn-B") {
                        break text;
                    }
                };

                let content = if text.contains("turn-B") {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    if text.contains("covered A") {
                        "covered A and B"
                    } else {
                        "covered B"
                    }
                } else {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    "covered A"
                };
                let body = json!({ "choices": [{ "message": { "content": content } }] }).to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    }

    #[tokio::test]
    async fn overlapping_updates_run_one_after_another() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_completions(listener));

        let client = LlmClient::new(
            &format!("http://{addr}/v1"),
            SecretString::from("unused".to_string()),
        );
        let summarizer = Arc::new(ChatSummarizer::new(client, "memory-model".to_string()));

        let first = tokio::spawn({
            let summarizer = summarizer.clone();
            async move { summarizer.update(MemorySnapshot::new("turn-A", 0)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = tokio::spawn({
            let summarizer = summarizer.clone();
            async move { summarizer.update(MemorySnapshot::new("turn-B", 0)).await }
        });

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(summarizer.summary(), "covered A and B");
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_update_produces_a_summary() {
        dotenvy::dotenv_override().ok();
        let api_key = env::var("GROQ_API_KEY").expect("GROQ_API_KEY not set");
        let model = env::var("MEMORY_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".to_string());
        let client = LlmClient::new(crate::llm::DEFAULT_BASE_URL, SecretString::from(api_key));
        let summarizer = ChatSummarizer::new(client, model);

        summarizer
            .update(MemorySnapshot::new(
                "My app lets clinics book appointments online.",
                0,
            ))
            .await
            .expect("update should succeed");
        assert!(!summarizer.summary().is_empty());
    }
}
