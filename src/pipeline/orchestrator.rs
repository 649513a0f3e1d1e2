//! 검색 오케스트레이터
//!
//! `전처리 → 임베딩 → 하이브리드 검색 → 필터 → 컨텍스트 → 요약 → 액션 아이템`
//!
//! 외부 프로바이더 실패는 호출자에게 에러로 올리지 않고 폴백 값으로 바꿉니다.
//! - 임베딩 실패: 프로바이더 차원의 0 벡터 (키워드 위주 검색으로 계속)
//! - 검색 실패: 문서 0건
//! - 생성 실패: 고정 안내 문구 / 단일 항목 목록
//!
//! 필터 후 문서가 없으면 생성 프로바이더는 호출하지 않습니다.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::context::ContextBudget;
use super::filter::RelevanceFilter;
use super::prompts::PromptTemplates;
use super::response::{AnalysisResponse, AnalyzeRequest};
use crate::completion::{create_completion, CompletionProvider, Prompt};
use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::query::{QueryNormalizer, TermDictionary};
use crate::search::{create_search_provider, ScoredDocument, SearchProvider};

// ============================================================================
// Configuration
// ============================================================================

/// 필터 후 문서가 없을 때 후보 문서를 보여줄지 여부
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayPolicy {
    /// 문서 목록을 비움
    #[default]
    HideFiltered,
    /// "결과 없음" 요약과 함께 필터 전 후보를 반환
    ShowUnfiltered,
}

/// 파이프라인 파라미터 (`[pipeline]` 테이블)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 최소 관련도 점수 (검색 프로바이더 단위)
    pub min_score: f32,
    /// 검색 결과 상한
    pub search_top: usize,
    pub summary_context: ContextBudget,
    pub action_context: ContextBudget,
    pub display_policy: DisplayPolicy,
    pub summary_temperature: f32,
    pub summary_max_tokens: u32,
    pub action_temperature: f32,
    pub action_max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // RRF 점수 상한이 약 2/61 이므로 낮게 둠
            min_score: 0.03,
            search_top: 5,
            summary_context: ContextBudget::summary(),
            action_context: ContextBudget::action_items(),
            display_policy: DisplayPolicy::HideFiltered,
            summary_temperature: 0.7,
            summary_max_tokens: 1000,
            action_temperature: 0.5,
            action_max_tokens: 400,
        }
    }
}

// ============================================================================
// Trace
// ============================================================================

/// 파이프라인 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Normalized,
    Embedded,
    Searched,
    Filtered,
    NoResult,
    ContextAssembled,
    Summarized,
    ActionsExtracted,
    Responded,
}

/// 요청 한 건의 진행 기록 (진단용)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisTrace {
    pub stages: Vec<Stage>,
    pub normalized_query: String,
    pub embedding_degraded: bool,
    pub search_degraded: bool,
    pub candidate_count: usize,
    pub max_score: Option<f32>,
    pub summary_degraded: bool,
    pub actions_degraded: bool,
}

impl AnalysisTrace {
    fn enter(&mut self, stage: Stage) {
        tracing::debug!("Pipeline stage: {:?}", stage);
        self.stages.push(stage);
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// 검색 + 생성 파이프라인
///
/// 프로바이더는 `Arc`로 공유되므로 복제해서 동시 요청에 사용할 수 있습니다.
#[derive(Clone)]
pub struct Orchestrator {
    normalizer: QueryNormalizer,
    embedder: Arc<dyn EmbeddingProvider>,
    search: Arc<dyn SearchProvider>,
    completion: Arc<dyn CompletionProvider>,
    config: PipelineConfig,
    prompts: Arc<PromptTemplates>,
}

impl Orchestrator {
    pub fn new(
        normalizer: QueryNormalizer,
        embedder: Arc<dyn EmbeddingProvider>,
        search: Arc<dyn SearchProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            normalizer,
            embedder,
            search,
            completion,
            config: PipelineConfig::default(),
            prompts: Arc::new(PromptTemplates::default()),
        }
    }

    /// 설정으로부터 프로바이더까지 모두 구성
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut dictionary = TermDictionary::builtin();
        dictionary.extend(
            config
                .extra_terms
                .iter()
                .map(|(k, e)| (k.clone(), e.clone())),
        );

        Ok(Self::new(
            QueryNormalizer::new(Arc::new(dictionary)),
            create_embedder(config)?,
            create_search_provider(config)?,
            create_completion(config)?,
        )
        .with_config(config.pipeline.clone())
        .with_prompts(config.prompts.clone()))
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    /// 요청 처리
    pub async fn analyze(&self, request: &AnalyzeRequest) -> AnalysisResponse {
        self.analyze_with_trace(&request.query).await.0
    }

    /// 요청 처리 + 단계별 진단 기록
    pub async fn analyze_with_trace(&self, query: &str) -> (AnalysisResponse, AnalysisTrace) {
        let mut trace = AnalysisTrace::default();
        trace.enter(Stage::Received);

        if query.trim().is_empty() {
            tracing::warn!("Rejected empty query");
            trace.enter(Stage::Responded);
            return (AnalysisResponse::invalid_query(), trace);
        }

        // 1. 전처리
        let normalized = self.normalizer.preprocess(query);
        tracing::info!("Normalized query: {:?}", normalized);
        trace.normalized_query = normalized.clone();
        trace.enter(Stage::Normalized);

        // 2. 임베딩
        let (vector, degraded) = self.embed_or_zero(&normalized).await;
        trace.embedding_degraded = degraded;
        trace.enter(Stage::Embedded);

        // 3. 검색
        let (candidates, degraded) = self
            .search_or_empty(&normalized, &vector, self.config.search_top)
            .await;
        trace.search_degraded = degraded;
        trace.candidate_count = candidates.len();
        trace.enter(Stage::Searched);

        // 4. 필터
        let outcome = RelevanceFilter::new(self.config.min_score).apply(candidates);
        trace.max_score = outcome.max_score;
        trace.enter(Stage::Filtered);

        if outcome.kept.is_empty() {
            trace.enter(Stage::NoResult);
            let documents = match self.config.display_policy {
                DisplayPolicy::HideFiltered => Vec::new(),
                DisplayPolicy::ShowUnfiltered => outcome.dropped,
            };
            let response =
                AnalysisResponse::no_result(query, self.prompts.no_result(query), documents);
            trace.enter(Stage::Responded);
            return (response, trace);
        }

        let documents = outcome.kept;
        trace.enter(Stage::ContextAssembled);

        // 5. 요약
        let summary = match self.summarize(query, &documents).await {
            Some(summary) => summary,
            None => {
                trace.summary_degraded = true;
                self.prompts.summary_fallback.clone()
            }
        };
        trace.enter(Stage::Summarized);

        // 6. 액션 아이템
        let action_items = match self.extract_actions(query, &documents).await {
            Some(items) => items,
            None => {
                trace.actions_degraded = true;
                vec![self.prompts.action_fallback.clone()]
            }
        };
        trace.enter(Stage::ActionsExtracted);

        let response = AnalysisResponse::found(query, summary, documents, action_items);
        trace.enter(Stage::Responded);
        (response, trace)
    }

    /// 다중 쿼리 검색
    ///
    /// `expand_query`의 모든 변형으로 검색한 뒤 id별 최고 점수로 병합합니다.
    /// 필터와 생성은 수행하지 않습니다.
    pub async fn retrieve_variants(&self, query: &str) -> Vec<ScoredDocument> {
        let limit = self.config.search_top;
        let mut best: HashMap<String, ScoredDocument> = HashMap::new();

        for variant in self.normalizer.expand_query(query) {
            if variant.trim().is_empty() {
                continue;
            }

            let (vector, _) = self.embed_or_zero(&variant).await;
            let (results, _) = self.search_or_empty(&variant, &vector, limit).await;
            tracing::debug!("Variant {:?}: {} results", variant, results.len());

            for doc in results {
                match best.get_mut(doc.id()) {
                    Some(existing) if existing.score >= doc.score => {}
                    Some(existing) => *existing = doc,
                    None => {
                        best.insert(doc.id().to_string(), doc);
                    }
                }
            }
        }

        let mut merged: Vec<ScoredDocument> = best.into_values().collect();
        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id().cmp(b.id()))
        });
        merged.truncate(limit);
        merged
    }

    // ------------------------------------------------------------------------
    // Degrading provider calls
    // ------------------------------------------------------------------------

    async fn embed_or_zero(&self, text: &str) -> (Vec<f32>, bool) {
        match self.embedder.embed(text).await {
            Ok(vector) => (vector, false),
            Err(e) => {
                tracing::warn!(
                    "Embedding via {} failed, falling back to zero vector: {}",
                    self.embedder.name(),
                    e
                );
                (vec![0.0; self.embedder.dimension()], true)
            }
        }
    }

    async fn search_or_empty(
        &self,
        text: &str,
        vector: &[f32],
        limit: usize,
    ) -> (Vec<ScoredDocument>, bool) {
        match self.search.hybrid_search(text, vector, limit).await {
            Ok(documents) => {
                tracing::info!("{} returned {} candidates", self.search.name(), documents.len());
                (documents, false)
            }
            Err(e) => {
                tracing::warn!(
                    "Search via {} failed, treating as no documents: {}",
                    self.search.name(),
                    e
                );
                (Vec::new(), true)
            }
        }
    }

    async fn summarize(&self, query: &str, documents: &[ScoredDocument]) -> Option<String> {
        let context = self.config.summary_context.render(documents);
        let prompt = Prompt {
            system: self.prompts.summary_system.clone(),
            user: self.prompts.summary_user(query, &context),
            temperature: self.config.summary_temperature,
            max_tokens: self.config.summary_max_tokens,
        };

        match self.completion.complete(&prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("Summary generation failed: {}", e);
                None
            }
        }
    }

    async fn extract_actions(
        &self,
        query: &str,
        documents: &[ScoredDocument],
    ) -> Option<Vec<String>> {
        let context = self.config.action_context.render(documents);
        let prompt = Prompt {
            system: self.prompts.action_system.clone(),
            user: self.prompts.action_user(query, &context),
            temperature: self.config.action_temperature,
            max_tokens: self.config.action_max_tokens,
        };

        match self.completion.complete(&prompt).await {
            Ok(text) => Some(parse_action_items(&text)),
            Err(e) => {
                tracing::warn!("Action item generation failed: {}", e);
                None
            }
        }
    }
}

/// `- `로 시작하는 줄만 항목으로 추출
pub fn parse_action_items(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('-'))
        .map(|line| line.trim_matches(|c: char| c == '-' || c == ' ').trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
