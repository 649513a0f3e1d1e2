//! Azure OpenAI Chat Completions
//!
//! source: https://learn.microsoft.com/en-us/azure/ai-services/openai/reference#chat-completions

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{CompletionProvider, Prompt};
use crate::config::AzureOpenAiConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, deployment_url, send_with_retry, RetryPolicy};

const PROVIDER: &str = "azure-openai-chat";

/// Azure OpenAI 채팅 배포 클라이언트
#[derive(Debug)]
pub struct AzureOpenAiChat {
    client: reqwest::Client,
    url: Url,
    api_key: String,
    retry: RetryPolicy,
}

impl AzureOpenAiChat {
    pub fn new(config: &AzureOpenAiConfig) -> Result<Self> {
        let url = deployment_url(
            &config.endpoint,
            &config.chat_deployment,
            "chat/completions",
            &config.api_version,
        )
        .with_context(|| format!("Invalid AZURE_OPENAI_ENDPOINT: {}", config.endpoint))?;

        Ok(Self {
            client: build_client(PROVIDER)?,
            url,
            api_key: config.api_key.clone(),
            retry: RetryPolicy::default(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Prompt> for ChatRequest<'a> {
    fn from(prompt: &'a Prompt) -> Self {
        Self {
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_response(body: &str) -> ProviderResult<String> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::decode(PROVIDER, e))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ProviderError::empty(PROVIDER))
}

#[async_trait]
impl CompletionProvider for AzureOpenAiChat {
    async fn complete(&self, prompt: &Prompt) -> ProviderResult<String> {
        let request = ChatRequest::from(prompt);
        tracing::debug!(
            "Chat request: system {} chars, user {} chars",
            prompt.system.chars().count(),
            prompt.user.chars().count()
        );

        let body = send_with_retry(PROVIDER, &self.retry, None, || {
            self.client
                .post(self.url.clone())
                .header("api-key", &self.api_key)
                .json(&request)
        })
        .await?;

        parse_response(&body)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let prompt = Prompt {
            system: "sys".to_string(),
            user: "질문".to_string(),
            temperature: 0.5,
            max_tokens: 400,
        };
        let json = serde_json::to_value(ChatRequest::from(&prompt)).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "sys");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "질문");
        assert_eq!(json["max_tokens"], 400);
        assert_eq!(json["temperature"], 0.5);
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "- 할 일"}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "- 할 일");
    }

    #[test]
    fn test_parse_response_empty() {
        assert!(matches!(
            parse_response(r#"{"choices": []}"#),
            Err(ProviderError::EmptyResponse { .. })
        ));
        assert!(matches!(
            parse_response(r#"{"choices": [{"message": {"content": null}}]}"#),
            Err(ProviderError::EmptyResponse { .. })
        ));
    }

    #[test]
    fn test_url() {
        let config = AzureOpenAiConfig {
            endpoint: "https://kite.openai.azure.com".to_string(),
            api_key: "key".to_string(),
            api_version: "2024-02-01".to_string(),
            chat_deployment: "gpt-4o".to_string(),
            embedding_deployment: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
        };
        let chat = AzureOpenAiChat::new(&config).unwrap();
        assert!(chat
            .url
            .as_str()
            .ends_with("/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"));
    }
}
