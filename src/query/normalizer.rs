//! 검색 쿼리 전처리
//!
//! 구두점 제거, 공백 정리, 한글 기술 용어의 영어 표기 추가를 수행합니다.
//!
//! ```rust,ignore
//! let normalizer = QueryNormalizer::default();
//! let q = normalizer.preprocess("레디스 스트림 테이블 설계가 뭐야?");
//! assert_eq!(q, "레디스 스트림 테이블 설계가 뭐야 Redis Stream Table Design");
//! ```

use std::sync::Arc;

use super::dictionary::TermDictionary;

/// 제거 대상 구두점 (공백으로 치환)
const PUNCTUATION: &[char] = &[',', '.', '?', '!', ';', ':'];

/// 쿼리 전처리기
///
/// 사전은 `Arc`로 공유되며 `add_term` 호출 시에만 복사됩니다 (copy-on-write).
#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    dictionary: Arc<TermDictionary>,
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(TermDictionary::builtin()))
    }
}

impl QueryNormalizer {
    pub fn new(dictionary: Arc<TermDictionary>) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &TermDictionary {
        &self.dictionary
    }

    /// 구두점을 공백으로 바꾸고, 연속 공백을 하나로, 앞뒤 공백 제거
    pub fn clean_query(&self, query: &str) -> String {
        query
            .split(|c: char| c.is_whitespace() || PUNCTUATION.contains(&c))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 정제 + 사전에 있는 한글 용어의 영어 표기를 뒤에 덧붙임
    ///
    /// 영어 표기도 같은 규칙으로 정제한 뒤 덧붙이고, 이미 같은 토큰열이 있으면
    /// 건너뛰므로 `preprocess(preprocess(q)) == preprocess(q)` 입니다.
    pub fn preprocess(&self, query: &str) -> String {
        let cleaned = self.clean_query(query);
        let mut result = cleaned.clone();

        for (_, english) in self.dictionary.matches(&cleaned) {
            let english = self.clean_query(english);
            if english.is_empty() || contains_phrase(&result, &english) {
                continue;
            }
            if !result.is_empty() {
                result.push(' ');
            }
            result.push_str(&english);
        }

        result
    }

    /// 다중 쿼리 검색용 변형 목록 (원본 → 전처리 → 영어 용어만)
    pub fn expand_query<'a>(&'a self, query: &'a str) -> QueryExpansion<'a> {
        QueryExpansion {
            normalizer: self,
            query,
        }
    }

    /// 커스텀 용어 추가
    pub fn add_term(&mut self, korean: &str, english: &str) {
        Arc::make_mut(&mut self.dictionary).insert(korean, english);
    }

    /// 사용자 표시용 변환 힌트
    pub fn get_suggestions(&self, query: &str) -> Vec<String> {
        let lowered = query.to_lowercase();
        self.dictionary
            .matches(&lowered)
            .map(|(korean, english)| format!("[TIP] '{}' → '{}'로 검색됩니다", korean, english))
            .collect()
    }

    /// 원본 쿼리에서 매칭된 영어 표기 (사전 순서)
    fn english_terms<'a>(&'a self, query: &'a str) -> Vec<&'a str> {
        self.dictionary
            .matches(query)
            .map(|(_, english)| english)
            .collect()
    }
}

/// `haystack`의 공백 토큰열에 `phrase` 토큰열이 연속으로 포함되는지 (대소문자 무시)
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let tokens: Vec<String> = haystack
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    let needle: Vec<String> = phrase.split_whitespace().map(str::to_lowercase).collect();

    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }

    tokens.windows(needle.len()).any(|w| w == needle.as_slice())
}

// ============================================================================
// Query Expansion
// ============================================================================

/// 쿼리 변형 시퀀스
///
/// 유한하고 지연 계산되며, `iter()`를 다시 호출하면 처음부터 다시 순회합니다.
#[derive(Debug, Clone, Copy)]
pub struct QueryExpansion<'a> {
    normalizer: &'a QueryNormalizer,
    query: &'a str,
}

impl<'a> QueryExpansion<'a> {
    pub fn iter(&self) -> QueryVariants<'a> {
        QueryVariants {
            normalizer: self.normalizer,
            query: self.query,
            stage: Stage::Original,
        }
    }
}

impl<'a> IntoIterator for QueryExpansion<'a> {
    type Item = String;
    type IntoIter = QueryVariants<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &QueryExpansion<'a> {
    type Item = String;
    type IntoIter = QueryVariants<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Original,
    Preprocessed,
    EnglishOnly,
    Done,
}

/// `QueryExpansion`의 이터레이터
#[derive(Debug, Clone)]
pub struct QueryVariants<'a> {
    normalizer: &'a QueryNormalizer,
    query: &'a str,
    stage: Stage,
}

impl Iterator for QueryVariants<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            match self.stage {
                Stage::Original => {
                    self.stage = Stage::Preprocessed;
                    return Some(self.query.to_string());
                }
                Stage::Preprocessed => {
                    self.stage = Stage::EnglishOnly;
                    let processed = self.normalizer.preprocess(self.query);
                    if processed != self.query {
                        return Some(processed);
                    }
                }
                Stage::EnglishOnly => {
                    self.stage = Stage::Done;
                    let terms = self.normalizer.english_terms(self.query);
                    if !terms.is_empty() {
                        return Some(terms.join(" "));
                    }
                }
                Stage::Done => return None,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
