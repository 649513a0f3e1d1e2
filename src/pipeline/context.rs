//! 컨텍스트 조립 - 상위 N개 문서를 프롬프트용 텍스트로 렌더링

use serde::{Deserialize, Serialize};

use crate::search::ScoredDocument;

/// 컨텍스트 크기 제한
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// 사용할 상위 문서 수
    pub max_docs: usize,
    /// 문서당 본문 최대 글자 수
    pub max_chars: usize,
    /// 제목/작성일 포함 여부 (요약용)
    pub include_title_and_date: bool,
}

impl ContextBudget {
    /// 요약용: 상위 3개, 500자, 제목/작성일 포함
    pub const fn summary() -> Self {
        Self {
            max_docs: 3,
            max_chars: 500,
            include_title_and_date: true,
        }
    }

    /// 액션 아이템용: 상위 2개, 300자
    pub const fn action_items() -> Self {
        Self {
            max_docs: 2,
            max_chars: 300,
            include_title_and_date: false,
        }
    }

    /// 문서 목록을 컨텍스트 블록으로 렌더링
    pub fn render(&self, documents: &[ScoredDocument]) -> String {
        let blocks = documents
            .iter()
            .take(self.max_docs)
            .map(|d| self.render_one(d));

        let separator = if self.include_title_and_date {
            "\n\n"
        } else {
            "\n"
        };
        blocks.collect::<Vec<_>>().join(separator)
    }

    fn render_one(&self, scored: &ScoredDocument) -> String {
        let doc = &scored.document;
        let content = truncate_chars(doc.content.trim(), self.max_chars);

        if self.include_title_and_date {
            format!(
                "[{}] {}\n작성일: {}\n내용: {}",
                doc.source, doc.title, doc.date, content
            )
        } else {
            format!("[{}] {}", doc.source, content)
        }
    }
}

/// 글자(char) 단위로 자르기 (UTF-8 경계 안전)
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
