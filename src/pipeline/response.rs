//! 요청/응답 타입

use serde::{Deserialize, Serialize};

use crate::search::ScoredDocument;

/// 문서가 있을 때의 예상 소요 시간
pub const ESTIMATED_TIME_FOUND: &str = "2-3 days";
/// 문서가 있을 때의 난이도
pub const DIFFICULTY_FOUND: &str = "medium";
/// 문서가 없을 때
pub const NOT_AVAILABLE: &str = "N/A";
/// 빈 쿼리 에러 메시지
pub const QUERY_REQUIRED: &str = "query parameter required";

/// 분석 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub query: String,
}

impl AnalyzeRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

/// 분석 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub query: String,
    pub summary: String,
    pub documents: Vec<ScoredDocument>,
    pub action_items: Vec<String>,
    pub estimated_time: String,
    pub difficulty: String,
    /// 입력 에러일 때만 설정
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResponse {
    /// 관련 문서가 있을 때
    pub fn found(
        query: impl Into<String>,
        summary: String,
        documents: Vec<ScoredDocument>,
        action_items: Vec<String>,
    ) -> Self {
        Self {
            query: query.into(),
            summary,
            documents,
            action_items,
            estimated_time: ESTIMATED_TIME_FOUND.to_string(),
            difficulty: DIFFICULTY_FOUND.to_string(),
            error: None,
        }
    }

    /// 관련 문서가 없을 때 (생성 호출 없음)
    ///
    /// `documents`는 표시 정책에 따라 비어 있거나 필터 전 후보입니다.
    pub fn no_result(
        query: impl Into<String>,
        summary: String,
        documents: Vec<ScoredDocument>,
    ) -> Self {
        Self {
            query: query.into(),
            summary,
            documents,
            action_items: Vec::new(),
            estimated_time: NOT_AVAILABLE.to_string(),
            difficulty: NOT_AVAILABLE.to_string(),
            error: None,
        }
    }

    /// 빈 쿼리 (파이프라인 진입 전 거부)
    pub fn invalid_query() -> Self {
        Self {
            query: String::new(),
            summary: String::new(),
            documents: Vec::new(),
            action_items: Vec::new(),
            estimated_time: String::new(),
            difficulty: String::new(),
            error: Some(QUERY_REQUIRED.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
