//! Google Gemini generateContent
//!
//! source: https://ai.google.dev/api/generate-content

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{CompletionProvider, Prompt};
use crate::config::GeminiConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, send_with_retry, RateLimiter, RetryPolicy};

const PROVIDER: &str = "gemini-chat";

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 무료 티어 기준 (15 RPM)
const RATE_LIMIT_RPM: u32 = 15;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MIN_DELAY: Duration = Duration::from_millis(500);

/// Gemini 채팅 클라이언트
#[derive(Debug)]
pub struct GeminiChat {
    api_key: String,
    url: String,
    client: reqwest::Client,
    rate_limiter: Mutex<RateLimiter>,
    retry: RetryPolicy,
}

impl GeminiChat {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        Ok(Self {
            api_key: config.api_key.clone(),
            url: format!("{}/{}:generateContent", GEMINI_API_BASE, config.chat_model),
            client: build_client(PROVIDER)?,
            rate_limiter: Mutex::new(RateLimiter::new(
                RATE_LIMIT_RPM,
                RATE_LIMIT_WINDOW,
                MIN_DELAY,
            )),
            retry: RetryPolicy::default(),
        })
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

impl<'a> From<&'a Prompt> for GenerateRequest<'a> {
    fn from(prompt: &'a Prompt) -> Self {
        Self {
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: &prompt.system,
                }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [Part { text: &prompt.user }],
            }],
            generation_config: GenerationConfig {
                temperature: prompt.temperature,
                max_output_tokens: prompt.max_tokens,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

fn parse_response(body: &str) -> ProviderResult<String> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::decode(PROVIDER, e))?;

    // 첫 후보의 text 파트를 이어붙임
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::empty(PROVIDER));
    }
    Ok(text)
}

#[async_trait]
impl CompletionProvider for GeminiChat {
    async fn complete(&self, prompt: &Prompt) -> ProviderResult<String> {
        let request = GenerateRequest::from(prompt);

        let body = send_with_retry(PROVIDER, &self.retry, Some(&self.rate_limiter), || {
            self.client
                .post(&self.url)
                .header("x-goog-api-key", &self.api_key)
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

    fn prompt() -> Prompt {
        Prompt {
            system: "요약합니다".to_string(),
            user: "질문: 레디스".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    #[test]
    fn test_request_shape() {
        let prompt = prompt();
        let json = serde_json::to_value(GenerateRequest::from(&prompt)).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "요약합니다");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "질문: 레디스");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1000);
    }

    #[test]
    fn test_parse_response_joins_parts() {
        let body = r#"{"candidates": [{"content": {"role": "model",
            "parts": [{"text": "- 첫째\n"}, {"text": "- 둘째"}]}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "- 첫째\n- 둘째");
    }

    #[test]
    fn test_parse_response_blocked() {
        // 안전 필터로 차단되면 content 없이 finishReason만 옴
        let body = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        assert!(matches!(
            parse_response(body),
            Err(ProviderError::EmptyResponse { .. })
        ));
    }

    #[test]
    fn test_url_uses_model() {
        let chat = GeminiChat::new(&GeminiConfig {
            api_key: "k".to_string(),
            chat_model: "gemini-2.0-flash".to_string(),
            embedding_dimension: 768,
        })
        .unwrap();
        assert!(chat.url.ends_with("/gemini-2.0-flash:generateContent"));
    }
}
