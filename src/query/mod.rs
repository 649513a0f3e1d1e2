//! Query 모듈 - 한영 혼합 쿼리 전처리
//!
//! - Dictionary: 한글 기술 용어 → 영어 표기 매핑
//! - Normalizer: 구두점/공백 정리 + 영어 용어 추가 + 쿼리 확장

mod dictionary;
mod normalizer;

pub use dictionary::TermDictionary;
pub use normalizer::{QueryExpansion, QueryNormalizer, QueryVariants};
