//! CLI 모듈
//!
//! kite CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{Config, LlmProvider, SearchBackend};
use crate::embedding::create_embedder;
use crate::ingest::{IngestReport, Ingestor};
use crate::pipeline::{AnalysisResponse, AnalyzeRequest, Orchestrator};
use crate::query::{QueryNormalizer, TermDictionary};
use crate::search::LocalHybridIndex;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "kite")]
#[command(version, about = "업무 맥락 분석 RAG - 하이브리드 검색 + 요약", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: <데이터 디렉토리>/.kite-rag/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 질문에 대한 업무 맥락 요약 + 액션 아이템
    Ask {
        /// 질문
        query: String,

        /// 최소 관련도 점수
        #[arg(long)]
        min_score: Option<f32>,

        /// 검색 결과 상한
        #[arg(short, long)]
        top: Option<usize>,

        /// 결과가 없을 때 필터 전 후보 문서 표시
        #[arg(long)]
        show_filtered: bool,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 쿼리 변형 목록 출력
    Expand {
        /// 검색 쿼리
        query: String,
    },

    /// 한영 용어 변환 힌트 출력
    Suggest {
        /// 검색 쿼리
        query: String,
    },

    /// JSON 문서를 로컬 인덱스에 추가
    Ingest {
        /// 문서 파일 (객체 하나 또는 배열)
        #[arg(long, conflicts_with = "dir")]
        file: Option<PathBuf>,

        /// 문서 폴더 (재귀, *.json)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 임베딩 없이 키워드 인덱스만 생성
        #[arg(long)]
        no_embed: bool,

        /// 변경 없는 문서도 다시 저장
        #[arg(long)]
        force: bool,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Ask {
            query,
            min_score,
            top,
            show_filtered,
            json,
        } => cmd_ask(config_path, &query, min_score, top, show_filtered, json).await,
        Commands::Expand { query } => cmd_expand(config_path, &query),
        Commands::Suggest { query } => cmd_suggest(config_path, &query),
        Commands::Ingest {
            file,
            dir,
            no_embed,
            force,
        } => cmd_ingest(config_path, file, dir, no_embed, force).await,
        Commands::Status => cmd_status(config_path),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 질문 명령어 (ask)
///
/// 전처리 → 하이브리드 검색 → 필터 → 요약/액션 아이템 생성
async fn cmd_ask(
    config_path: Option<&Path>,
    query: &str,
    min_score: Option<f32>,
    top: Option<usize>,
    show_filtered: bool,
    json: bool,
) -> Result<()> {
    let mut config = Config::load(config_path).context("설정 로드 실패")?;
    config
        .apply_overrides(min_score, top, show_filtered)
        .context("잘못된 옵션")?;

    let orchestrator = Orchestrator::from_config(&config).context("파이프라인 초기화 실패")?;

    if !json {
        println!("[*] 분석 중: \"{}\"", query);
    }

    let response = orchestrator.analyze(&AnalyzeRequest::new(query)).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }

    if let Some(ref error) = response.error {
        bail!("{}", error);
    }
    Ok(())
}

/// 쿼리 변형 명령어 (expand)
fn cmd_expand(config_path: Option<&Path>, query: &str) -> Result<()> {
    let normalizer = load_normalizer(config_path)?;

    for (i, variant) in normalizer.expand_query(query).iter().enumerate() {
        println!("{}. {}", i + 1, variant);
    }
    Ok(())
}

/// 변환 힌트 명령어 (suggest)
fn cmd_suggest(config_path: Option<&Path>, query: &str) -> Result<()> {
    let normalizer = load_normalizer(config_path)?;
    let suggestions = normalizer.get_suggestions(query);

    if suggestions.is_empty() {
        println!("[!] 사전에 등록된 용어가 없습니다.");
        return Ok(());
    }

    for suggestion in suggestions {
        println!("{}", suggestion);
    }
    Ok(())
}

/// 문서 수집 명령어 (ingest)
///
/// JSON 문서를 로컬 하이브리드 인덱스에 저장합니다.
async fn cmd_ingest(
    config_path: Option<&Path>,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    no_embed: bool,
    force: bool,
) -> Result<()> {
    let config = if no_embed {
        Config::load_lenient(config_path)
    } else {
        Config::load(config_path)
    }
    .context("설정 로드 실패")?;

    if config.search_backend == SearchBackend::Azure {
        println!("[!] KITE_SEARCH_BACKEND=azure: 로컬 인덱스에 저장합니다 (Azure 인덱서는 별도 구성)");
    }

    let index = LocalHybridIndex::open(&config.index_path()).context("로컬 인덱스 열기 실패")?;
    let embedder = if no_embed {
        None
    } else {
        Some(create_embedder(&config).context("임베딩 프로바이더 초기화 실패")?)
    };
    let ingestor = Ingestor::new(index, embedder).force(force);

    let report = match (file, dir) {
        (Some(file), _) => {
            println!("[*] 파일 수집: {}", file.display());
            ingestor.ingest_file(&file).await?
        }
        (None, Some(dir)) => {
            println!("[*] 폴더 수집: {}", dir.display());
            ingestor.ingest_dir(&dir).await?
        }
        (None, None) => bail!("--file 또는 --dir 중 하나를 지정해야 합니다"),
    };

    print_ingest_report(&report);
    Ok(())
}

/// 상태 명령어 (status)
///
/// 설정과 로컬 인덱스 상태를 확인합니다.
fn cmd_status(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_lenient(config_path).context("설정 로드 실패")?;

    println!("kite v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    match config.config_file {
        Some(ref path) => println!("[*] 설정 파일: {}", path.display()),
        None => println!("[*] 설정 파일: 없음 (기본값 사용)"),
    }
    println!(
        "[*] 관련도 임계값: {} / 검색 상한: {}",
        config.pipeline.min_score, config.pipeline.search_top
    );

    // LLM 프로바이더
    let (llm_name, llm_ready, llm_hint) = match config.llm_provider {
        LlmProvider::Azure => (
            "Azure OpenAI",
            config.azure_openai.is_some(),
            "AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_KEY, AZURE_OPENAI_DEPLOYMENT_NAME, AZURE_OPENAI_EMBEDDING_DEPLOYMENT",
        ),
        LlmProvider::Gemini => ("Gemini", config.gemini.is_some(), "GEMINI_API_KEY"),
    };
    print_provider("LLM", llm_name, llm_ready, llm_hint);

    // 검색 백엔드
    match config.search_backend {
        SearchBackend::Azure => print_provider(
            "검색",
            "Azure AI Search",
            config.azure_search.is_some(),
            "AZURE_SEARCH_ENDPOINT, AZURE_SEARCH_KEY",
        ),
        SearchBackend::Local => println!("[OK] 검색: 로컬 하이브리드 인덱스"),
    }

    // 로컬 인덱스 통계 (파일이 있을 때만)
    let index_path = config.index_path();
    if !index_path.exists() {
        println!("[!] 로컬 인덱스: 없음 (kite ingest로 생성)");
        return Ok(());
    }

    match LocalHybridIndex::open(&index_path).and_then(|index| index.stats()) {
        Ok(stats) => {
            println!(
                "[OK] 저장된 문서: {} 건 (임베딩 {} 건)",
                stats.document_count, stats.embedded_count
            );
            println!(
                "     총 콘텐츠: {}",
                format_bytes(stats.total_content_bytes)
            );
        }
        Err(e) => {
            println!("[!] 통계 조회 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 기본 사전 + 설정 파일의 추가 용어
fn load_normalizer(config_path: Option<&Path>) -> Result<QueryNormalizer> {
    let config = Config::load_lenient(config_path).context("설정 로드 실패")?;

    let mut dictionary = TermDictionary::builtin();
    dictionary.extend(config.extra_terms);
    Ok(QueryNormalizer::new(std::sync::Arc::new(dictionary)))
}

fn print_provider(label: &str, name: &str, ready: bool, hint: &str) {
    if ready {
        println!("[OK] {}: {}", label, name);
    } else {
        println!("[!] {}: {} (미설정)", label, name);
        println!("    필요: {}", hint);
    }
}

fn print_response(response: &AnalysisResponse) {
    println!();
    println!("{}", response.summary);

    if !response.documents.is_empty() {
        println!("\n[OK] 관련 문서 ({} 건):\n", response.documents.len());
        for (i, doc) in response.documents.iter().enumerate() {
            let d = &doc.document;
            println!(
                "{}. [{}] [점수: {:.4}] {}",
                i + 1,
                d.source,
                doc.score,
                truncate_text(&d.title, 60)
            );
            match d.sender {
                Some(ref sender) => println!("   {} | {}", d.date, sender),
                None => println!("   {}", d.date),
            }
            println!("   {}", truncate_text(&d.content, 120));
        }
    }

    if !response.action_items.is_empty() {
        println!("\n[OK] 액션 아이템:");
        for item in &response.action_items {
            println!("  - {}", item);
        }
    }

    println!(
        "\n예상 소요: {} | 난이도: {}",
        response.estimated_time, response.difficulty
    );
}

fn print_ingest_report(report: &IngestReport) {
    println!(
        "[OK] 완료: 추가 {}, 갱신 {}, 변경 없음 {}, 실패 {} (파일 {}개)",
        report.added, report.updated, report.unchanged, report.failed, report.files
    );
    if report.keyword_only > 0 {
        println!("     임베딩 없이 저장: {} 건", report.keyword_only);
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
