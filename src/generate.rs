//! Generation backend abstraction.
//!
//! The orchestrator selects between two [`Generator`]s with the same
//! signature: a standard model and a reasoning model whose output may
//! carry a `<think>…</think>` deliberation block. [`OllamaGenerator`]
//! calls `/api/generate` (non-streaming) with a bounded timeout and the
//! same retry policy as the embedding client, so a stalled backend
//! surfaces as a generation error instead of blocking forever.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::OllamaConfig;

/// Prompt text → completion text.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Generation backend using a local Ollama instance.
pub struct OllamaGenerator {
    url: String,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OllamaGenerator {
    /// A generator for the given model name, with the shared connection
    /// settings from config.
    pub fn new(config: &OllamaConfig, model: &str) -> Self {
        Self {
            url: config.url.clone(),
            model: model.to_string(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/api/generate", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_generate_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!("Ollama generate error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Ollama generate error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("generation failed after retries")))
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("invalid Ollama response: missing response field"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_response_extracts_text() {
        let json = serde_json::json!({ "response": "The capital is Paris.", "done": true });
        assert_eq!(
            parse_generate_response(&json).unwrap(),
            "The capital is Paris."
        );
    }

    #[test]
    fn generate_response_rejects_missing_field() {
        let json = serde_json::json!({ "error": "model not loaded" });
        assert!(parse_generate_response(&json).is_err());
    }
}
