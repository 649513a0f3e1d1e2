//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트를 고정 길이 벡터로 변환하는 프로바이더입니다.
//! 실패는 `ProviderError`로 돌려주며, 오케스트레이터가 0 벡터로 폴백합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config)?;
//! let embedding = embedder.embed("Redis Stream 테이블 설계").await?;
//! ```

mod azure;
mod gemini;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{Config, LlmProvider};
use crate::error::ProviderResult;

pub use azure::AzureOpenAiEmbedding;
pub use gemini::GeminiEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 검색 쿼리 임베딩
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>>;

    /// 문서 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수 (폴백 0 벡터 길이)
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.llm_provider {
        LlmProvider::Azure => {
            let azure = config
                .azure_openai
                .as_ref()
                .context("Azure OpenAI is selected but not configured")?;
            Arc::new(AzureOpenAiEmbedding::new(azure)?)
        }
        LlmProvider::Gemini => {
            let gemini = config
                .gemini
                .as_ref()
                .context("Gemini is selected but not configured")?;
            Arc::new(GeminiEmbedding::new(gemini)?)
        }
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}
