//! 프롬프트 템플릿
//!
//! 모든 문구는 설정 파일의 `[prompts]` 테이블로 덮어쓸 수 있습니다.
//! 자리표시자: `{query}`, `{context}`

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const SUMMARY_SYSTEM: &str = "당신은 업무 맥락을 분석하는 AI 도우미입니다.
주어진 문서들을 바탕으로 사용자의 질문에 답변해주세요.

답변 형식:
## 업무 맥락 분석 결과

### 핵심 요약
(한 문장으로 업무의 본질 설명)

### 배경 및 목적
(왜 이 업무가 생겼는지)

### 주요 이해관계자
(관련된 사람들과 역할)

### 일정 및 우선순위
(마감일, 우선순위)

### 핵심 내용
(기술적 요구사항이나 중요 사항)

주어진 문서가 질문과 관련이 없다고 판단되면 다른 내용을 만들지 말고
\"관련 문서 없음\"이라고만 답변해주세요.

간결하고 구조화된 형태로 작성해주세요.";

const SUMMARY_USER: &str = "사용자 질문: {query}

관련 문서:
{context}

위 문서들을 바탕으로 사용자의 질문에 답변해주세요.";

const ACTION_SYSTEM: &str = "액션 아이템을 명확하고 실행 가능하게 작성합니다.";

const ACTION_USER: &str = "다음 업무 상황에서 해야 할 구체적인 액션 아이템을 4-5개 추출해주세요.

질문: {query}

관련 정보:
{context}

각 항목은 한 줄로 작성하고, \"- \"로 시작해주세요.";

const NO_RESULT: &str = "## 관련 문서를 찾을 수 없습니다

'{query}'에 대한 관련 문서가 없습니다.

다음과 같이 검색해보세요:
- 구체적인 키워드 사용 (예: \"Redis Stream\", \"PostgreSQL 파티셔닝\", \"API 설계\")
- 프로젝트명이나 담당자 이름 포함
- 다른 표현으로 질문하기";

const SUMMARY_FALLBACK: &str = "AI 응답 생성 중 오류가 발생했습니다.";

const ACTION_FALLBACK: &str = "액션 아이템 생성에 실패했습니다.";

/// 프롬프트 및 폴백 문구 모음
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub summary_system: String,
    pub summary_user: String,
    pub action_system: String,
    pub action_user: String,
    /// 필터 후 문서가 없을 때의 요약 (`{query}` 포함)
    pub no_result: String,
    /// 요약 생성 실패 시
    pub summary_fallback: String,
    /// 액션 아이템 생성 실패 시 (단일 항목)
    pub action_fallback: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            summary_system: SUMMARY_SYSTEM.to_string(),
            summary_user: SUMMARY_USER.to_string(),
            action_system: ACTION_SYSTEM.to_string(),
            action_user: ACTION_USER.to_string(),
            no_result: NO_RESULT.to_string(),
            summary_fallback: SUMMARY_FALLBACK.to_string(),
            action_fallback: ACTION_FALLBACK.to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn summary_user(&self, query: &str, context: &str) -> String {
        fill(&self.summary_user, &[("query", query), ("context", context)])
    }

    pub fn action_user(&self, query: &str, context: &str) -> String {
        fill(&self.action_user, &[("query", query), ("context", context)])
    }

    pub fn no_result(&self, query: &str) -> String {
        fill(&self.no_result, &[("query", query)])
    }
}

/// `{name}` 자리표시자를 한 번에 치환
///
/// 치환된 값 안의 `{...}`는 다시 해석하지 않습니다. 모르는 이름은 그대로 둡니다.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let values: HashMap<&str, &str> = values.iter().copied().collect();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('}') {
            Some(end) => match values.get(&after[..end]) {
                Some(value) => {
                    out.push_str(value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}
