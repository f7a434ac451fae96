//! OpenAI-compatible chat completions provider (Groq, OpenAI, vLLM, ...)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};

use super::llm::{Generation, LlmProvider};

/// Client for a `/chat/completions` endpoint
pub struct OpenAiCompatibleLlm {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    system_prompt: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Choice {
    index: Option<u32>,
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAiCompatibleLlm {
    /// Create a new client
    pub fn new(config: &GeneratorConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::MissingCredential {
                var: config.api_key_env.clone(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
        })
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

fn into_generation(response: ChatResponse) -> Generation {
    let mut generation = Generation::default();
    for choice in response.choices {
        generation
            .replies
            .push(choice.message.content.unwrap_or_default());
        generation.meta.push(serde_json::json!({
            "model": response.model,
            "index": choice.index,
            "finish_reason": choice.finish_reason,
            "usage": response.usage,
        }));
    }
    generation
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleLlm {
    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(prompt);

        tracing::info!("Generating answer with model: {}", self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::llm(format!("Generation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(Error::llm(format!(
                "Generation failed: HTTP {} - {}",
                status, message
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::llm(format!("Failed to parse generation response: {}", e)))?;

        Ok(into_generation(chat))
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm(system_prompt: Option<&str>) -> OpenAiCompatibleLlm {
        let config = GeneratorConfig {
            system_prompt: system_prompt.map(str::to_string),
            ..Default::default()
        };
        OpenAiCompatibleLlm::new(&config, "test-key").unwrap()
    }

    #[test]
    fn test_request_carries_token_budget() {
        let llm = llm(None);
        let json = serde_json::to_value(llm.build_request("What is RAG?")).unwrap();
        assert_eq!(json["model"], "llama3-8b-8192");
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "What is RAG?");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_system_prompt_goes_first() {
        let llm = llm(Some("Be brief."));
        let json = serde_json::to_value(llm.build_request("Q")).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Q");
    }

    #[test]
    fn test_response_to_generation() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "llama3-8b-8192",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Ada Lovelace"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3}
        }"#;
        let generation = into_generation(serde_json::from_str(body).unwrap());
        assert_eq!(generation.replies, vec!["Ada Lovelace".to_string()]);
        assert_eq!(generation.meta[0]["finish_reason"], "stop");
        assert_eq!(generation.meta[0]["usage"]["completion_tokens"], 3);
    }
}
