//! Pipeline 모듈 - 검색 결과 필터링 및 답변 생성
//!
//! - `filter`: 최소 점수 임계값
//! - `context`: 상위 N개 문서를 프롬프트 컨텍스트로 렌더링
//! - `prompts`: 요약/액션 아이템 프롬프트와 폴백 문구
//! - `orchestrator`: 전체 흐름과 단계별 폴백 정책

mod context;
mod filter;
mod orchestrator;
mod prompts;
mod response;

pub use context::ContextBudget;
pub use filter::{FilterOutcome, RelevanceFilter};
pub use orchestrator::{
    parse_action_items, AnalysisTrace, DisplayPolicy, Orchestrator, PipelineConfig, Stage,
};
pub use prompts::{fill, PromptTemplates};
pub use response::{
    AnalysisResponse, AnalyzeRequest, DIFFICULTY_FOUND, ESTIMATED_TIME_FOUND, NOT_AVAILABLE,
    QUERY_REQUIRED,
};
