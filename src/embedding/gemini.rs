//! Google Gemini 임베딩
//!
//! source: https://ai.google.dev/gemini-api/docs/embeddings
//!
//! 검색 쿼리는 `RETRIEVAL_QUERY`, 문서 배치는 `RETRIEVAL_DOCUMENT` 태스크로 요청합니다.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::EmbeddingProvider;
use crate::config::GeminiConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, send_with_retry, RateLimiter, RetryPolicy};

const PROVIDER: &str = "gemini-embedding-001";

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001 - MRL 지원)
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// 지원 차원
pub const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이 (1000ms = 60 RPM 준수)
const MIN_DELAY: Duration = Duration::from_millis(1000);

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Mutex<RateLimiter>,
    retry: RetryPolicy,
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// 차원은 768, 1536, 3072 중 하나여야 합니다.
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&config.embedding_dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                config.embedding_dimension
            );
        }

        Ok(Self {
            api_key: config.api_key.clone(),
            client: build_client(PROVIDER)?,
            dimension: config.embedding_dimension,
            rate_limiter: Mutex::new(RateLimiter::new(
                RATE_LIMIT_RPM,
                RATE_LIMIT_WINDOW,
                MIN_DELAY,
            )),
            retry: RetryPolicy::default(),
        })
    }

    async fn embed_with_task(&self, text: &str, task_type: &'static str) -> ProviderResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: "models/gemini-embedding-001",
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
            task_type,
            output_dimensionality: Some(self.dimension),
        };

        // API 키는 URL이 아닌 헤더로 전송
        let body = send_with_retry(PROVIDER, &self.retry, Some(&self.rate_limiter), || {
            self.client
                .post(GEMINI_EMBED_URL)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
        })
        .await
        .map_err(describe_error)?;

        parse_response(&body, self.dimension)
    }
}

/// 응답 파싱 + MRL 차원 확인 (outputDimensionality가 무시되면 실패)
fn parse_response(body: &str, dimension: usize) -> ProviderResult<Vec<f32>> {
    let response: EmbedResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::decode(PROVIDER, e))?;
    let values = response.embedding.values;

    if values.len() != dimension {
        return Err(ProviderError::decode(
            PROVIDER,
            format!("expected {} dimensions, got {}", dimension, values.len()),
        ));
    }

    Ok(values)
}

/// Gemini 에러 본문이 JSON이면 메시지만 추출
fn describe_error(err: ProviderError) -> ProviderError {
    match err {
        ProviderError::Status {
            provider,
            status,
            body,
        } => {
            let body = serde_json::from_str::<GeminiError>(&body)
                .map(|e| format!("{}: {}", e.error.status, e.error.message))
                .unwrap_or(body);
            ProviderError::Status {
                provider,
                status,
                body,
            }
        }
        other => other,
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'static str,
    content: EmbedContent<'a>,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> {
        self.embed_with_task(text, "RETRIEVAL_QUERY").await
    }

    async fn embed_batch(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        // Gemini는 배치 API가 없으므로 순차 처리 (Rate limiter가 조절)
        let mut results = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding batch {}/{}", i + 1, texts.len());
            results.push(self.embed_with_task(text, "RETRIEVAL_DOCUMENT").await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dimension: usize) -> GeminiConfig {
        GeminiConfig {
            api_key: "fake_key".to_string(),
            chat_model: "gemini-2.0-flash".to_string(),
            embedding_dimension: dimension,
        }
    }

    #[test]
    fn test_invalid_dimension() {
        let err = GeminiEmbedding::new(&config(999)).err();
        assert!(err
            .map(|e| e.to_string().contains("Invalid dimension"))
            .unwrap_or(false));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in SUPPORTED_DIMENSIONS {
            assert!(GeminiEmbedding::new(&config(dim)).is_ok());
        }
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbedRequest {
            model: "models/gemini-embedding-001",
            content: EmbedContent {
                parts: vec![EmbedPart { text: "레디스" }],
            },
            task_type: "RETRIEVAL_QUERY",
            output_dimensionality: Some(768),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["outputDimensionality"], 768);
        assert_eq!(json["content"]["parts"][0]["text"], "레디스");
    }

    #[test]
    fn test_describe_error_extracts_message() {
        let err = describe_error(ProviderError::Status {
            provider: PROVIDER.to_string(),
            status: 400,
            body: r#"{"error": {"message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#
                .to_string(),
        });
        assert!(err.to_string().contains("INVALID_ARGUMENT: API key not valid"));
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"embedding": {"values": [0.1, -0.2, 0.3]}}"#;
        assert_eq!(parse_response(body, 3).unwrap(), vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_parse_response_dimension_mismatch() {
        let body = r#"{"embedding": {"values": [0.1, -0.2, 0.3]}}"#;
        assert!(matches!(
            parse_response(body, 768),
            Err(ProviderError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = GeminiEmbedding::new(&config(768)).unwrap();
        let v = embedder.embed("").await.unwrap();
        assert_eq!(v.len(), 768);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
