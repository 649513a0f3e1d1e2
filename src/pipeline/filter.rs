//! 관련도 필터 - 최소 점수 임계값 적용

use crate::search::ScoredDocument;

/// 필터 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    /// 임계값 이상 문서 (입력 순서 유지)
    pub kept: Vec<ScoredDocument>,
    /// 임계값 미만으로 제외된 문서
    pub dropped: Vec<ScoredDocument>,
    /// 입력 전체에서 관측된 최고 점수 (입력이 비었으면 None)
    pub max_score: Option<f32>,
}

impl FilterOutcome {
    /// 후보는 있었지만 전부 제외됨
    pub fn all_dropped(&self) -> bool {
        self.kept.is_empty() && !self.dropped.is_empty()
    }
}

/// 최소 점수 필터
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceFilter {
    min_score: f32,
}

impl RelevanceFilter {
    pub fn new(min_score: f32) -> Self {
        Self { min_score }
    }

    pub fn min_score(&self) -> f32 {
        self.min_score
    }

    /// `score >= min_score`인 문서만 남김
    ///
    /// 순서는 검색 프로바이더가 준 그대로 유지합니다.
    pub fn apply(&self, candidates: Vec<ScoredDocument>) -> FilterOutcome {
        let max_score = candidates
            .iter()
            .map(|d| d.score)
            .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |m| m.max(s))));

        let (kept, dropped): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|d| d.score >= self.min_score);

        let outcome = FilterOutcome {
            kept,
            dropped,
            max_score,
        };

        if outcome.all_dropped() {
            // 임계값 튜닝용
            tracing::warn!(
                "All {} candidates below min_score {} (max observed score: {:.4})",
                outcome.dropped.len(),
                self.min_score,
                outcome.max_score.unwrap_or_default()
            );
        } else {
            tracing::info!(
                "Relevance filter: kept {}, dropped {} (min_score {})",
                outcome.kept.len(),
                outcome.dropped.len(),
                self.min_score
            );
        }

        outcome
    }
}
