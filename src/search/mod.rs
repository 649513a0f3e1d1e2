//! Search 모듈 - 하이브리드 검색 프로바이더
//!
//! - Azure: Azure AI Search REST API (키워드 + 벡터 하이브리드)
//! - Local: SQLite FTS5 (키워드) + 저장된 임베딩 코사인 유사도를 RRF로 통합
//!
//! 두 구현 모두 점수 내림차순으로 정렬된 `ScoredDocument` 목록을 반환합니다.
//! 점수 단위는 프로바이더마다 다르므로 필터 임계값은 설정값으로 다룹니다.

mod azure;
mod local;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, SearchBackend};
use crate::error::ProviderResult;

pub use azure::AzureSearchClient;
pub use local::{
    cosine_similarity, normalize_rrf, rrf_merge, LocalHybridIndex, LocalIndexStats, RRF_K,
};

// ============================================================================
// Types
// ============================================================================

/// 저장된 문서 (메일, 메신저, 위키, 티켓, 캘린더 등)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    /// 출처 태그 (메일/슬랙/컨플루언스/지라/캘린더 ...)
    pub source: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

/// 검색 결과 문서 (검색 엔진 관련도 점수 포함)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    #[serde(flatten)]
    pub document: Document,
    pub score: f32,
}

impl ScoredDocument {
    pub fn new(document: Document, score: f32) -> Self {
        Self { document, score }
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }
}

// ============================================================================
// SearchProvider Trait
// ============================================================================

/// 하이브리드 검색 프로바이더
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// 키워드(`text`) + 벡터(`vector`) 검색, 점수 내림차순 최대 `limit`개
    async fn hybrid_search(
        &self,
        text: &str,
        vector: &[f32],
        limit: usize,
    ) -> ProviderResult<Vec<ScoredDocument>>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 설정에 맞는 검색 프로바이더 생성
pub fn create_search_provider(config: &Config) -> Result<Arc<dyn SearchProvider>> {
    match config.search_backend {
        SearchBackend::Azure => {
            let azure = config
                .azure_search
                .as_ref()
                .context("Azure AI Search is selected but not configured")?;
            let client = AzureSearchClient::new(azure)?;
            tracing::info!("Using Azure AI Search (index: {})", azure.index_name);
            Ok(Arc::new(client))
        }
        SearchBackend::Local => {
            let index = LocalHybridIndex::open(&config.index_path())
                .context("Failed to open local hybrid index")?;
            tracing::info!("Using local hybrid index at {:?}", config.index_path());
            Ok(Arc::new(index))
        }
    }
}
