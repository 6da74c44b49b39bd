// src/llm/anthropic.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{CompletionClient, LlmError};
use crate::config::Config;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(config: &Config, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.model_timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: config.anthropic_base_url.clone(),
            api_key,
            model: config.model.clone(),
        })
    }

    pub fn from_env(config: &Config) -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        Self::new(config, api_key).ok()
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: max_tokens.max(1),
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let mut attempt = 0u32;

        loop {
            debug!(model = %self.model, attempt, "sending completion request");
            let response = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&request)
                .send()
                .await?;

            match response.status().as_u16() {
                200 => {
                    let body: MessageResponse = response.json().await?;
                    let text = body
                        .content
                        .into_iter()
                        .map(|block| block.text)
                        .collect::<Vec<_>>()
                        .join("");
                    if text.is_empty() {
                        return Err(LlmError::Malformed("empty completion".to_string()));
                    }
                    return Ok(text);
                }
                429 => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(LlmError::RateLimited { attempts: attempt });
                    }
                    let wait = Duration::from_secs(2u64.pow(attempt));
                    warn!(?wait, "model API rate limited, backing off");
                    sleep(wait).await;
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(LlmError::Api { status, body });
                }
            }
        }
    }
}
