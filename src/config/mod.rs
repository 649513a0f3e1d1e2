//! 설정 로드
//!
//! 우선순위: 기본값 < 설정 파일(TOML) < 환경 변수 < CLI 플래그
//!
//! 설정 파일 위치: `--config <path>`, 없으면 `<data_dir>/config.toml` (있을 때만)
//!
//! ```toml
//! [pipeline]
//! min_score = 0.03
//! search_top = 5
//! display_policy = "hide_filtered"
//!
//! [prompts]
//! summary_fallback = "AI 응답 생성 중 오류가 발생했습니다."
//!
//! [terms]
//! "레디스" = "Redis"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::pipeline::{PipelineConfig, PromptTemplates};

const DATA_DIR_NAME: &str = ".kite-rag";
const CONFIG_FILE_NAME: &str = "config.toml";
const INDEX_FILE_NAME: &str = "index.db";

const DEFAULT_AZURE_OPENAI_API_VERSION: &str = "2024-02-01";
const DEFAULT_AZURE_SEARCH_API_VERSION: &str = "2023-11-01";
const DEFAULT_AZURE_SEARCH_INDEX: &str = "kite-documents";
const DEFAULT_VECTOR_FIELD: &str = "content_vector";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_AZURE_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_GEMINI_EMBEDDING_DIMENSION: usize = 768;

/// 기본 데이터 디렉토리 (`~/.local/share/.kite-rag` 등)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

/// 기본 설정 파일 경로 (데이터 디렉토리의 `config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    Some(default_data_dir().join(CONFIG_FILE_NAME))
}

// ============================================================================
// Types
// ============================================================================

/// 검색 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Azure,
    Local,
}

/// 임베딩 + 생성 프로바이더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Azure,
    Gemini,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AzureOpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
    pub embedding_dimension: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AzureSearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub index_name: String,
    pub api_version: String,
    pub vector_field: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub chat_model: String,
    pub embedding_dimension: usize,
}

/// 전체 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub search_backend: SearchBackend,
    pub llm_provider: LlmProvider,
    pub data_dir: PathBuf,
    /// 실제로 읽은 설정 파일
    pub config_file: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    pub prompts: PromptTemplates,
    /// 기본 사전에 추가할 한영 용어
    pub extra_terms: BTreeMap<String, String>,
    pub azure_openai: Option<AzureOpenAiConfig>,
    pub azure_search: Option<AzureSearchConfig>,
    pub gemini: Option<GeminiConfig>,
}

/// 설정 파일 내용
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    pipeline: PipelineConfig,
    prompts: PromptTemplates,
    terms: BTreeMap<String, String>,
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// 설정 로드 (선택된 프로바이더의 자격 증명이 없으면 에러)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, env_var, true)
    }

    /// 설정 로드 (자격 증명 누락 허용, `status` 명령용)
    pub fn load_lenient(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, env_var, false)
    }

    /// 환경 변수 조회 함수를 주입해 설정 로드
    pub fn load_with<F>(
        path: Option<&Path>,
        lookup: F,
        require_credentials: bool,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let (file, config_file) = match path {
            Some(path) => (read_file(path)?, Some(path.to_path_buf())),
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => (read_file(&path)?, Some(path)),
                None => (FileConfig::default(), None),
            },
        };

        let search_backend = match lookup("KITE_SEARCH_BACKEND") {
            Some(value) => parse_search_backend(&value)?,
            None => SearchBackend::Local,
        };

        let llm_provider = match lookup("KITE_LLM_PROVIDER") {
            Some(value) => parse_llm_provider(&value)?,
            None if lookup("AZURE_OPENAI_ENDPOINT").is_some() => LlmProvider::Azure,
            None => LlmProvider::Gemini,
        };

        let data_dir = lookup("KITE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let mut pipeline = file.pipeline;
        if let Some(value) = lookup("KITE_MIN_SCORE") {
            pipeline.min_score = parse_value("KITE_MIN_SCORE", &value)?;
        }
        if let Some(value) = lookup("KITE_SEARCH_TOP") {
            pipeline.search_top = parse_value("KITE_SEARCH_TOP", &value)?;
        }
        validate_pipeline(&pipeline)?;

        let azure_openai = optional(
            azure_openai_from(&lookup),
            require_credentials && llm_provider == LlmProvider::Azure,
        )?;
        let azure_search = optional(
            azure_search_from(&lookup),
            require_credentials && search_backend == SearchBackend::Azure,
        )?;
        let gemini = optional(
            gemini_from(&lookup),
            require_credentials && llm_provider == LlmProvider::Gemini,
        )?;

        Ok(Self {
            search_backend,
            llm_provider,
            data_dir,
            config_file,
            pipeline,
            prompts: file.prompts,
            extra_terms: file.terms,
            azure_openai,
            azure_search,
            gemini,
        })
    }

    /// 로컬 인덱스 경로
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE_NAME)
    }

    /// CLI 플래그 적용
    pub fn apply_overrides(
        &mut self,
        min_score: Option<f32>,
        search_top: Option<usize>,
        show_filtered: bool,
    ) -> Result<(), ConfigError> {
        if let Some(min_score) = min_score {
            self.pipeline.min_score = min_score;
        }
        if let Some(top) = search_top {
            self.pipeline.search_top = top;
        }
        if show_filtered {
            self.pipeline.display_policy = crate::pipeline::DisplayPolicy::ShowUnfiltered;
        }
        validate_pipeline(&self.pipeline)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let file: FileConfig = toml::from_str(&content).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!("Loaded config file {:?}", path);
    Ok(file)
}

/// 필수가 아니면 누락/오류를 None으로
fn optional<T>(result: Result<T, ConfigError>, required: bool) -> Result<Option<T>, ConfigError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if required => Err(e),
        Err(e) => {
            tracing::debug!("Optional provider not configured: {}", e);
            Ok(None)
        }
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, ConfigError> {
    lookup(name).ok_or_else(|| ConfigError::MissingVar {
        name: name.to_string(),
    })
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_search_backend(value: &str) -> Result<SearchBackend, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "azure" => Ok(SearchBackend::Azure),
        "local" => Ok(SearchBackend::Local),
        _ => Err(ConfigError::InvalidValue {
            name: "KITE_SEARCH_BACKEND".to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_llm_provider(value: &str) -> Result<LlmProvider, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "azure" => Ok(LlmProvider::Azure),
        "gemini" => Ok(LlmProvider::Gemini),
        _ => Err(ConfigError::InvalidValue {
            name: "KITE_LLM_PROVIDER".to_string(),
            value: value.to_string(),
        }),
    }
}

fn validate_endpoint(name: &str, value: String) -> Result<String, ConfigError> {
    match url::Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(value),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value,
        }),
    }
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if !pipeline.min_score.is_finite() || pipeline.min_score < 0.0 {
        return Err(ConfigError::InvalidValue {
            name: "min_score".to_string(),
            value: pipeline.min_score.to_string(),
        });
    }
    if pipeline.search_top == 0 {
        return Err(ConfigError::InvalidValue {
            name: "search_top".to_string(),
            value: "0".to_string(),
        });
    }
    Ok(())
}

fn azure_openai_from(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<AzureOpenAiConfig, ConfigError> {
    let endpoint = validate_endpoint(
        "AZURE_OPENAI_ENDPOINT",
        require(lookup, "AZURE_OPENAI_ENDPOINT")?,
    )?;

    let embedding_dimension = match lookup("KITE_EMBEDDING_DIMENSION") {
        Some(value) => parse_value("KITE_EMBEDDING_DIMENSION", &value)?,
        None => DEFAULT_AZURE_EMBEDDING_DIMENSION,
    };

    Ok(AzureOpenAiConfig {
        endpoint,
        api_key: require(lookup, "AZURE_OPENAI_API_KEY")?,
        api_version: lookup("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|| DEFAULT_AZURE_OPENAI_API_VERSION.to_string()),
        chat_deployment: require(lookup, "AZURE_OPENAI_DEPLOYMENT_NAME")?,
        embedding_deployment: require(lookup, "AZURE_OPENAI_EMBEDDING_DEPLOYMENT")?,
        embedding_dimension,
    })
}

fn azure_search_from(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<AzureSearchConfig, ConfigError> {
    let endpoint = validate_endpoint(
        "AZURE_SEARCH_ENDPOINT",
        require(lookup, "AZURE_SEARCH_ENDPOINT")?,
    )?;

    Ok(AzureSearchConfig {
        endpoint,
        api_key: require(lookup, "AZURE_SEARCH_KEY")?,
        index_name: lookup("AZURE_SEARCH_INDEX")
            .unwrap_or_else(|| DEFAULT_AZURE_SEARCH_INDEX.to_string()),
        api_version: DEFAULT_AZURE_SEARCH_API_VERSION.to_string(),
        vector_field: DEFAULT_VECTOR_FIELD.to_string(),
    })
}

fn gemini_from(lookup: &impl Fn(&str) -> Option<String>) -> Result<GeminiConfig, ConfigError> {
    let api_key = lookup("GEMINI_API_KEY")
        .or_else(|| lookup("GOOGLE_AI_API_KEY"))
        .ok_or_else(|| ConfigError::MissingVar {
            name: "GEMINI_API_KEY".to_string(),
        })?;

    let embedding_dimension = match lookup("KITE_EMBEDDING_DIMENSION") {
        Some(value) => parse_value("KITE_EMBEDDING_DIMENSION", &value)?,
        None => DEFAULT_GEMINI_EMBEDDING_DIMENSION,
    };

    Ok(GeminiConfig {
        api_key,
        chat_model: lookup("KITE_GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        embedding_dimension,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::pipeline::DisplayPolicy;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    /// 홈 디렉토리 설정 파일의 영향을 받지 않도록 빈 파일 사용
    fn empty_file() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    const AZURE_ENV: &[(&str, &str)] = &[
        ("KITE_SEARCH_BACKEND", "azure"),
        ("AZURE_OPENAI_ENDPOINT", "https://kite.openai.azure.com"),
        ("AZURE_OPENAI_API_KEY", "oai-key"),
        ("AZURE_OPENAI_DEPLOYMENT_NAME", "gpt-4o"),
        ("AZURE_OPENAI_EMBEDDING_DEPLOYMENT", "text-embedding-3-small"),
        ("AZURE_SEARCH_ENDPOINT", "https://kite.search.windows.net"),
        ("AZURE_SEARCH_KEY", "search-key"),
    ];

    #[test]
    fn test_config_file_shares_data_dir() {
        let config_path = default_config_path().unwrap();
        assert_eq!(config_path.parent(), Some(default_data_dir().as_path()));
        assert!(config_path.ends_with(".kite-rag/config.toml"));
    }

    #[test]
    fn test_full_azure_config() {
        let file = empty_file();
        let config = Config::load_with(Some(file.path()), env(AZURE_ENV), true).unwrap();

        assert_eq!(config.search_backend, SearchBackend::Azure);
        assert_eq!(config.llm_provider, LlmProvider::Azure);

        let openai = config.azure_openai.unwrap();
        assert_eq!(openai.api_version, "2024-02-01");
        assert_eq!(openai.embedding_dimension, 1536);

        let search = config.azure_search.unwrap();
        assert_eq!(search.index_name, "kite-documents");
        assert_eq!(search.vector_field, "content_vector");
        assert!(config.gemini.is_none());
    }

    #[test]
    fn test_missing_credential_is_fatal_when_required() {
        let file = empty_file();
        let vars: Vec<_> = AZURE_ENV
            .iter()
            .copied()
            .filter(|(k, _)| *k != "AZURE_SEARCH_KEY")
            .collect();

        let err = Config::load_with(Some(file.path()), env(&vars), true).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { ref name } if name == "AZURE_SEARCH_KEY"));

        // 관대 모드에서는 해당 프로바이더만 비어 있음
        let config = Config::load_with(Some(file.path()), env(&vars), false).unwrap();
        assert!(config.azure_search.is_none());
        assert!(config.azure_openai.is_some());
    }

    #[test]
    fn test_defaults_local_and_gemini() {
        let file = empty_file();
        let config = Config::load_with(
            Some(file.path()),
            env(&[("GOOGLE_AI_API_KEY", "g-key"), ("KITE_DATA_DIR", "/tmp/kite")]),
            true,
        )
        .unwrap();

        assert_eq!(config.search_backend, SearchBackend::Local);
        assert_eq!(config.llm_provider, LlmProvider::Gemini);
        assert_eq!(config.index_path(), PathBuf::from("/tmp/kite/index.db"));

        let gemini = config.gemini.unwrap();
        assert_eq!(gemini.api_key, "g-key");
        assert_eq!(gemini.chat_model, "gemini-2.0-flash");
        assert_eq!(gemini.embedding_dimension, 768);
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_invalid_values() {
        let file = empty_file();
        let cases = [
            ("KITE_SEARCH_BACKEND", "elastic"),
            ("KITE_LLM_PROVIDER", "openai"),
            ("KITE_MIN_SCORE", "high"),
            ("KITE_MIN_SCORE", "-1"),
            ("KITE_SEARCH_TOP", "0"),
        ];

        for (name, value) in cases {
            let result = Config::load_with(
                Some(file.path()),
                env(&[(name, value), ("GEMINI_API_KEY", "k")]),
                true,
            );
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { .. })),
                "{}={} should be rejected",
                name,
                value
            );
        }
    }

    #[test]
    fn test_invalid_endpoint() {
        let file = empty_file();
        let vars: Vec<_> = AZURE_ENV
            .iter()
            .copied()
            .map(|(k, v)| {
                if k == "AZURE_SEARCH_ENDPOINT" {
                    (k, "kite.search.windows.net")
                } else {
                    (k, v)
                }
            })
            .collect();

        let err = Config::load_with(Some(file.path()), env(&vars), true).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "AZURE_SEARCH_ENDPOINT")
        );
    }

    #[test]
    fn test_file_then_env_override() {
        let mut file = empty_file();
        writeln!(
            file,
            r#"
[pipeline]
min_score = 0.5
search_top = 8
display_policy = "show_unfiltered"

[prompts]
action_fallback = "다시 시도해주세요."

[terms]
"웹소켓" = "WebSocket"
"#
        )
        .unwrap();

        let config = Config::load_with(
            Some(file.path()),
            env(&[("GEMINI_API_KEY", "k"), ("KITE_MIN_SCORE", "0.7")]),
            true,
        )
        .unwrap();

        assert_eq!(config.pipeline.min_score, 0.7);
        assert_eq!(config.pipeline.search_top, 8);
        assert_eq!(config.pipeline.display_policy, DisplayPolicy::ShowUnfiltered);
        assert_eq!(config.prompts.action_fallback, "다시 시도해주세요.");
        assert_eq!(config.extra_terms.get("웹소켓").map(String::as_str), Some("WebSocket"));
        assert_eq!(config.config_file.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_unknown_file_section_is_parse_error() {
        let mut file = empty_file();
        writeln!(file, "[server]\nport = 8000").unwrap();

        let result = Config::load_with(Some(file.path()), env(&[("GEMINI_API_KEY", "k")]), true);
        assert!(matches!(result, Err(ConfigError::ParseFile { .. })));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Config::load_with(
            Some(Path::new("/nonexistent/kite/config.toml")),
            env(&[("GEMINI_API_KEY", "k")]),
            true,
        );
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_apply_overrides() {
        let file = empty_file();
        let mut config =
            Config::load_with(Some(file.path()), env(&[("GEMINI_API_KEY", "k")]), true).unwrap();

        config.apply_overrides(Some(0.1), Some(3), true).unwrap();
        assert_eq!(config.pipeline.min_score, 0.1);
        assert_eq!(config.pipeline.search_top, 3);
        assert_eq!(config.pipeline.display_policy, DisplayPolicy::ShowUnfiltered);

        assert!(config.apply_overrides(None, Some(0), false).is_err());
    }
}
