//! Completion 모듈 - LLM 텍스트 생성
//!
//! 시스템 지시문 + 사용자 프롬프트를 받아 생성된 텍스트를 반환합니다.
//! 실패는 `ProviderError`로 돌려주며, 오케스트레이터가 안내 문구로 폴백합니다.

mod azure;
mod gemini;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{Config, LlmProvider};
use crate::error::ProviderResult;

pub use azure::AzureOpenAiChat;
pub use gemini::GeminiChat;

/// 생성 요청 한 건
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// 텍스트 생성 프로바이더
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 프롬프트로 텍스트 생성
    async fn complete(&self, prompt: &Prompt) -> ProviderResult<String>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 설정에 맞는 생성 프로바이더 생성
pub fn create_completion(config: &Config) -> Result<Arc<dyn CompletionProvider>> {
    let provider: Arc<dyn CompletionProvider> = match config.llm_provider {
        LlmProvider::Azure => {
            let azure = config
                .azure_openai
                .as_ref()
                .context("Azure OpenAI is selected but not configured")?;
            Arc::new(AzureOpenAiChat::new(azure)?)
        }
        LlmProvider::Gemini => {
            let gemini = config
                .gemini
                .as_ref()
                .context("Gemini is selected but not configured")?;
            Arc::new(GeminiChat::new(gemini)?)
        }
    };

    tracing::info!("Using {} for completion", provider.name());
    Ok(provider)
}
