//! 문서 수집 - JSON 파일을 로컬 하이브리드 인덱스에 적재
//!
//! 파일 형식: 문서 객체 하나 또는 배열
//! ```json
//! [{"id": "doc_001", "title": "...", "content": "...", "source": "메일", "date": "2024-10-05"}]
//! ```
//!
//! 내용 해시(SHA-256)가 같은 문서는 건너뛰고, 임베딩 실패 시 키워드 전용으로 저장합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingProvider;
use crate::search::{Document, LocalHybridIndex};

/// 한 번에 임베딩할 문서 수
const EMBED_BATCH_SIZE: usize = 16;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DocumentFile {
    Many(Vec<Document>),
    One(Box<Document>),
}

/// 수집 결과 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// 임베딩 없이 저장된 문서
    pub keyword_only: usize,
    pub failed: usize,
}

/// 문서 내용 해시 (제목 + 본문 + 메타데이터)
pub fn content_hash(doc: &Document) -> String {
    let mut hasher = Sha256::new();
    for field in [&doc.title, &doc.content, &doc.source, &doc.date] {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(doc.sender.as_deref().unwrap_or_default().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 임베딩 입력 텍스트
fn embedding_text(doc: &Document) -> String {
    format!("{}\n{}", doc.title, doc.content)
}

/// JSON 파일에서 문서 읽기
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;

    let parsed: DocumentFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse documents in {:?}", path))?;

    let documents = match parsed {
        DocumentFile::Many(docs) => docs,
        DocumentFile::One(doc) => vec![*doc],
    };

    Ok(documents
        .into_iter()
        .filter(|d| {
            let valid = !d.id.trim().is_empty();
            if !valid {
                tracing::warn!("Skipping document without id in {:?}", path);
            }
            valid
        })
        .collect())
}

/// 폴더 아래 `.json` 파일 목록 (.gitignore 존중, 정렬)
pub fn collect_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {:?}", dir);
    }

    let mut files = Vec::new();
    for entry in WalkBuilder::new(dir).build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Failed to read entry: {}", e);
                continue;
            }
        };

        let is_json = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false)
            && entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            files.push(entry.into_path());
        }
    }

    files.sort();
    tracing::info!("Collected {} JSON files from {:?}", files.len(), dir);
    Ok(files)
}

/// 로컬 인덱스 적재기
pub struct Ingestor {
    index: LocalHybridIndex,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    force: bool,
}

impl Ingestor {
    /// `embedder`가 없으면 키워드 전용으로 저장
    pub fn new(index: LocalHybridIndex, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            index,
            embedder,
            force: false,
        }
    }

    /// 해시가 같아도 다시 저장
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn index(&self) -> &LocalHybridIndex {
        &self.index
    }

    /// 파일 하나 적재
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let documents = load_documents(path)?;
        let mut report = self.ingest_documents(documents).await?;
        report.files = 1;
        Ok(report)
    }

    /// 폴더 전체 적재 (파싱 실패한 파일은 건너뜀)
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        let mut total = IngestReport::default();

        for file in collect_json_files(dir)? {
            match self.ingest_file(&file).await {
                Ok(report) => total.merge(&report),
                Err(e) => {
                    tracing::warn!("Failed to ingest {:?}: {:#}", file, e);
                    total.failed += 1;
                }
            }
        }

        Ok(total)
    }

    /// 문서 목록 적재
    pub async fn ingest_documents(&self, documents: Vec<Document>) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        // 1. 변경된 문서만 추림
        let mut pending = Vec::new();
        for doc in documents {
            let hash = content_hash(&doc);
            let stored = self
                .index
                .content_hash(&doc.id)
                .context("Failed to read stored hash")?;

            match stored {
                Some(ref existing) if *existing == hash && !self.force => {
                    tracing::debug!("Unchanged, skipping: {}", doc.id);
                    report.unchanged += 1;
                }
                Some(_) => pending.push((doc, hash, true)),
                None => pending.push((doc, hash, false)),
            }
        }

        // 2. 배치 임베딩 + 저장
        for batch in pending.chunks(EMBED_BATCH_SIZE) {
            let embeddings = self.embed_batch(batch.iter().map(|(d, _, _)| d)).await;

            for (i, (doc, hash, existed)) in batch.iter().enumerate() {
                let embedding = embeddings.as_ref().and_then(|e| e.get(i)).map(Vec::as_slice);
                if embedding.is_none() {
                    report.keyword_only += 1;
                }

                match self.index.upsert(doc, hash, embedding) {
                    Ok(()) if *existed => report.updated += 1,
                    Ok(()) => report.added += 1,
                    Err(e) => {
                        tracing::warn!("Failed to store {}: {}", doc.id, e);
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Ingest: added {}, updated {}, unchanged {}, failed {}",
            report.added,
            report.updated,
            report.unchanged,
            report.failed
        );
        Ok(report)
    }

    async fn embed_batch<'a>(
        &self,
        docs: impl Iterator<Item = &'a Document>,
    ) -> Option<Vec<Vec<f32>>> {
        let embedder = self.embedder.as_ref()?;
        let texts: Vec<String> = docs.map(embedding_text).collect();

        match embedder.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == texts.len() => Some(vectors),
            Ok(vectors) => {
                tracing::warn!(
                    "{} returned {} embeddings for {} documents, storing keyword-only",
                    embedder.name(),
                    vectors.len(),
                    texts.len()
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Embedding via {} failed, storing keyword-only: {}",
                    embedder.name(),
                    e
                );
                None
            }
        }
    }
}

impl IngestReport {
    fn merge(&mut self, other: &IngestReport) {
        self.files += other.files;
        self.added += other.added;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.keyword_only += other.keyword_only;
        self.failed += other.failed;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::error::{ProviderError, ProviderResult};

    struct CountingEmbedder {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::empty("counting"));
            }
            Ok(vec![text.chars().count() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn doc(id: &str, content: &str) -> Document {
        Document {
            id: id.to_string(),
            title: format!("제목 {}", id),
            content: content.to_string(),
            source: "위키".to_string(),
            date: "2024-10-01".to_string(),
            sender: None,
        }
    }

    fn setup(fail: bool) -> (TempDir, Ingestor, Arc<CountingEmbedder>) {
        let dir = TempDir::new().unwrap();
        let index = LocalHybridIndex::open(&dir.path().join("index.db")).unwrap();
        let embedder = Arc::new(CountingEmbedder {
            fail,
            calls: AtomicUsize::new(0),
        });
        let ingestor = Ingestor::new(index, Some(embedder.clone()));
        (dir, ingestor, embedder)
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let a = doc("d1", "본문");
        let mut b = a.clone();
        assert_eq!(content_hash(&a), content_hash(&b));

        b.content = "다른 본문".to_string();
        assert_ne!(content_hash(&a), content_hash(&b));

        let mut c = a.clone();
        c.sender = Some("홍길동".to_string());
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn test_load_single_and_array() {
        let dir = TempDir::new().unwrap();

        let single = dir.path().join("one.json");
        std::fs::write(
            &single,
            r#"{"id":"d1","title":"t","content":"c","source":"메일","date":"2024-10-05","sender":"김"}"#,
        )
        .unwrap();
        let docs = load_documents(&single).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].sender.as_deref(), Some("김"));

        let many = dir.path().join("many.json");
        std::fs::write(
            &many,
            r#"[{"id":"a","title":"","content":"","source":"","date":""},
                {"id":" ","title":"","content":"","source":"","date":""}]"#,
        )
        .unwrap();
        let docs = load_documents(&many).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a");
    }

    #[test]
    fn test_collect_json_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.json"), "[]").unwrap();
        std::fs::write(dir.path().join("nested/a.JSON"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.md"), "# x").unwrap();

        let files = collect_json_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false)));
    }

    #[tokio::test]
    async fn test_unchanged_documents_are_skipped() {
        let (_dir, ingestor, embedder) = setup(false);

        let report = ingestor
            .ingest_documents(vec![doc("d1", "레디스"), doc("d2", "카프카")])
            .await
            .unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

        let report = ingestor
            .ingest_documents(vec![doc("d1", "레디스"), doc("d2", "카프카 변경")])
            .await
            .unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

        let stats = ingestor.index().stats().unwrap();
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.embedded_count, 2);
    }

    #[tokio::test]
    async fn test_force_reingests() {
        let (_dir, ingestor, _) = setup(false);
        ingestor.ingest_documents(vec![doc("d1", "x")]).await.unwrap();

        let ingestor = ingestor.force(true);
        let report = ingestor.ingest_documents(vec![doc("d1", "x")]).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.unchanged, 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_stores_keyword_only() {
        let (_dir, ingestor, _) = setup(true);

        let report = ingestor
            .ingest_documents(vec![doc("d1", "레디스 스트림")])
            .await
            .unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.keyword_only, 1);

        let stats = ingestor.index().stats().unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.embedded_count, 0);
        assert_eq!(ingestor.index().get("d1").unwrap().unwrap().content, "레디스 스트림");
    }

    #[tokio::test]
    async fn test_ingest_dir_counts_bad_files() {
        let (dir, ingestor, _) = setup(false);
        let docs = dir.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(
            docs.join("good.json"),
            r#"[{"id":"g1","title":"t","content":"c","source":"지라","date":"2024-10-02"}]"#,
        )
        .unwrap();
        std::fs::write(docs.join("bad.json"), "{not json").unwrap();

        let report = ingestor.ingest_dir(&docs).await.unwrap();
        assert_eq!(report.files, 1);
        assert_eq!(report.added, 1);
        assert_eq!(report.failed, 1);
    }
}
