//! 에러 타입 - 외부 프로바이더 경계 및 설정 에러
//!
//! 프로바이더 어댑터는 `ProviderError`를 반환하고, 오케스트레이터가
//! 이를 패턴 매칭하여 폴백(0 벡터, 빈 결과, 안내 문구)을 적용합니다.
//! 설정 에러(`ConfigError`)만 시작 시점에 치명적입니다.

use std::path::PathBuf;

/// 프로바이더 호출 결과
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// 외부 프로바이더(임베딩, 검색, 생성) 호출 실패
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// 요청 전송 실패 (연결, 타임아웃 등)
    #[error("request to {provider} failed: {message}")]
    Transport { provider: String, message: String },

    /// 비정상 HTTP 상태
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    /// 재시도 후에도 429
    #[error("{provider} rate limit exceeded after {attempts} attempts")]
    RateLimited { provider: String, attempts: u32 },

    /// 응답 파싱 실패
    #[error("failed to decode {provider} response: {message}")]
    Decode { provider: String, message: String },

    /// 응답에 필요한 내용이 없음
    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: String },

    /// 로컬 인덱스 저장소 에러
    #[error("storage error: {0}")]
    Storage(String),
}

impl ProviderError {
    pub fn decode(provider: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    pub fn empty(provider: &str) -> Self {
        Self::EmptyResponse {
            provider: provider.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ProviderError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// 설정 로드 실패 (시작 시 치명적)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {name} is not set")]
    MissingVar { name: String },

    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },

    #[error("failed to read config file at {path:?}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file at {path:?}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}
