//! kite-rag - 업무 맥락 분석 RAG
//!
//! 한영 혼용 질문을 전처리해 하이브리드(키워드 + 벡터) 검색을 수행하고,
//! 관련도 임계값을 통과한 문서로 요약과 액션 아이템을 생성합니다.
//!
//! 검색 백엔드는 Azure AI Search 또는 로컬 SQLite FTS5 + 코사인 유사도(RRF),
//! 생성/임베딩은 Azure OpenAI 또는 Gemini를 사용합니다.

pub mod cli;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod http;
pub mod ingest;
pub mod pipeline;
pub mod query;
pub mod search;

// Re-exports
pub use completion::{CompletionProvider, Prompt};
pub use config::{Config, LlmProvider, SearchBackend};
pub use embedding::EmbeddingProvider;
pub use error::{ConfigError, ProviderError, ProviderResult};
pub use ingest::{IngestReport, Ingestor};
pub use pipeline::{
    AnalysisResponse, AnalyzeRequest, DisplayPolicy, Orchestrator, PipelineConfig,
    PromptTemplates, RelevanceFilter,
};
pub use query::{QueryNormalizer, TermDictionary};
pub use search::{Document, LocalHybridIndex, ScoredDocument, SearchProvider};
