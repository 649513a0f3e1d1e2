//! 한영 용어 사전
//!
//! 한글 기술 용어 → 영어 표기 매핑입니다. 영어 위주로 색인된 문서를
//! 한글 질문으로 찾을 수 있도록 검색 쿼리에 영어 용어를 덧붙이는 데 사용합니다.
//!
//! - 순방향 맵은 삽입 순서를 유지합니다 (전처리 결과의 용어 순서 = 사전 순서)
//! - 역방향 맵(영어 소문자 → 한글)은 항상 순방향 맵에서 재생성 가능합니다

use std::collections::HashMap;

/// 기본 용어 사전
const BUILTIN_TERMS: &[(&str, &str)] = &[
    // 기술 용어
    ("레디스", "Redis"),
    ("스트림", "Stream"),
    ("포스트그레", "PostgreSQL"),
    ("디비", "DB"),
    ("데이터베이스", "Database"),
    ("테이블", "Table"),
    ("인덱스", "Index"),
    ("쿼리", "Query"),
    ("파티션", "Partition"),
    ("파티셔닝", "Partitioning"),
    // 프로젝트/서비스
    ("씨허브", "CHUB"),
    ("카프카", "Kafka"),
    ("엘라스틱서치", "Elasticsearch"),
    ("몽고디비", "MongoDB"),
    ("도커", "Docker"),
    ("쿠버네티스", "Kubernetes"),
    // 역할/직무
    ("디비에이", "DBA"),
    ("백엔드", "Backend"),
    ("프론트엔드", "Frontend"),
    ("풀스택", "Fullstack"),
    // 일반 용어
    ("설계", "Design"),
    ("개발", "Development"),
    ("구현", "Implementation"),
    ("배포", "Deployment"),
    ("테스트", "Test"),
    ("문서", "Document"),
    ("이알디", "ERD"),
    ("에이피아이", "API"),
];

/// 한영 용어 사전
#[derive(Debug, Clone, Default)]
pub struct TermDictionary {
    /// (한글, 영어) - 삽입 순서 유지
    entries: Vec<(String, String)>,
    /// 한글 → entries 인덱스
    index: HashMap<String, usize>,
    /// 영어(소문자) → 한글
    reverse: HashMap<String, String>,
}

impl TermDictionary {
    /// 빈 사전
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 용어가 채워진 사전
    pub fn builtin() -> Self {
        BUILTIN_TERMS.iter().copied().collect()
    }

    /// 용어 추가 (이미 있으면 영어 표기만 교체, 순서는 유지)
    ///
    /// 빈 한글 키는 모든 쿼리에 매칭되므로 무시합니다.
    pub fn insert(&mut self, korean: impl Into<String>, english: impl Into<String>) {
        let korean = korean.into().trim().to_string();
        let english = english.into().trim().to_string();

        if korean.is_empty() || english.is_empty() {
            tracing::warn!("Ignoring empty term mapping: {:?} -> {:?}", korean, english);
            return;
        }

        match self.index.get(&korean) {
            Some(&pos) => {
                self.entries[pos].1 = english;
                // 교체된 영어의 역방향 항목이 다른 키를 가리켜야 할 수 있으므로 재생성
                self.rebuild_reverse();
            }
            None => {
                self.index.insert(korean.clone(), self.entries.len());
                self.reverse.insert(english.to_lowercase(), korean.clone());
                self.entries.push((korean, english));
            }
        }
    }

    /// 한글 → 영어
    pub fn get(&self, korean: &str) -> Option<&str> {
        self.index
            .get(korean)
            .map(|&pos| self.entries[pos].1.as_str())
    }

    /// 영어(대소문자 무시) → 한글
    pub fn korean_for(&self, english: &str) -> Option<&str> {
        self.reverse
            .get(&english.to_lowercase())
            .map(String::as_str)
    }

    /// 사전 순서대로 (한글, 영어) 순회
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, e)| (k.as_str(), e.as_str()))
    }

    /// `text`에 부분 문자열로 포함된 한글 용어들 (사전 순서, 항목당 1회)
    pub fn matches<'a>(&'a self, text: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.iter().filter(move |(korean, _)| text.contains(korean))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn rebuild_reverse(&mut self) {
        self.reverse = self
            .entries
            .iter()
            .map(|(k, e)| (e.to_lowercase(), k.clone()))
            .collect();
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TermDictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Self::new();
        dict.extend(iter);
        dict
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for TermDictionary {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (korean, english) in iter {
            self.insert(korean, english);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_terms() {
        let dict = TermDictionary::builtin();
        assert_eq!(dict.len(), BUILTIN_TERMS.len());
        assert_eq!(dict.get("레디스"), Some("Redis"));
        assert_eq!(dict.get("에이피아이"), Some("API"));
        assert_eq!(dict.get("없는용어"), None);
    }

    #[test]
    fn test_iteration_order_is_insertion_order() {
        let dict: TermDictionary = [("나", "B"), ("가", "A"), ("다", "C")]
            .into_iter()
            .collect();
        let keys: Vec<&str> = dict.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["나", "가", "다"]);
    }

    #[test]
    fn test_reverse_lookup_case_insensitive() {
        let dict = TermDictionary::builtin();
        assert_eq!(dict.korean_for("redis"), Some("레디스"));
        assert_eq!(dict.korean_for("POSTGRESQL"), Some("포스트그레"));
        assert_eq!(dict.korean_for("nothing"), None);
    }

    #[test]
    fn test_insert_overwrites_in_place() {
        let mut dict = TermDictionary::builtin();
        dict.insert("레디스", "Redis Cluster");

        assert_eq!(dict.len(), BUILTIN_TERMS.len());
        assert_eq!(dict.get("레디스"), Some("Redis Cluster"));
        assert_eq!(dict.iter().next(), Some(("레디스", "Redis Cluster")));
        assert_eq!(dict.korean_for("redis cluster"), Some("레디스"));
        assert_eq!(dict.korean_for("redis"), None);
    }

    #[test]
    fn test_insert_new_term() {
        let mut dict = TermDictionary::builtin();
        dict.insert("그라파나", "Grafana");

        assert_eq!(dict.get("그라파나"), Some("Grafana"));
        assert_eq!(dict.korean_for("grafana"), Some("그라파나"));
        assert_eq!(dict.iter().last(), Some(("그라파나", "Grafana")));
    }

    #[test]
    fn test_reverse_matches_regenerated() {
        let mut dict = TermDictionary::builtin();
        dict.insert("디비", "Database");
        dict.insert("레디스", "Cache");

        let mut regenerated = dict.clone();
        regenerated.rebuild_reverse();
        assert_eq!(dict.reverse, regenerated.reverse);
    }

    #[test]
    fn test_empty_key_ignored() {
        let mut dict = TermDictionary::new();
        dict.insert("  ", "Nothing");
        dict.insert("용어", "");
        assert!(dict.is_empty());
    }

    #[test]
    fn test_matches_substring() {
        let dict = TermDictionary::builtin();
        let found: Vec<&str> = dict.matches("몽고디비 설정").map(|(_, e)| e).collect();
        // "디비"도 "몽고디비"의 부분 문자열
        assert_eq!(found, vec!["DB", "MongoDB"]);
    }
}
