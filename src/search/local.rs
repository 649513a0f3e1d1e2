//! 로컬 하이브리드 인덱스 - SQLite FTS5 + 임베딩 코사인 유사도
//!
//! 저장 위치: `<data_dir>/index.db` (기본 `dirs::data_local_dir()/.kite-rag`)
//!
//! - documents 테이블: 문서 본문 + 임베딩(f32 little-endian BLOB)
//! - documents_fts: FTS5 키워드 인덱스 (트리거로 동기화)
//! - 검색: BM25 후보와 코사인 후보를 RRF로 통합
//! - 점수: 실행된 순위 목록 수 기준으로 정규화 (모든 목록 1위 = 1.0)
//!
//! ref: https://www.sqlite.org/fts5.html
//! ref: https://www.elastic.co/blog/hybrid-search-rrf

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

use super::{Document, ScoredDocument, SearchProvider};
use crate::error::{ProviderError, ProviderResult};

/// RRF 상수 (높은 순위에 더 많은 가중치)
pub const RRF_K: f32 = 60.0;

/// 인덱스 통계
#[derive(Debug, Clone, Serialize)]
pub struct LocalIndexStats {
    pub document_count: usize,
    pub embedded_count: usize,
    pub total_content_bytes: usize,
    pub db_path: PathBuf,
}

/// 로컬 하이브리드 인덱스
#[derive(Clone)]
pub struct LocalHybridIndex {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl LocalHybridIndex {
    /// 인덱스 열기 (없으면 생성)
    pub fn open(path: &Path) -> ProviderResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ProviderError::Storage(format!("failed to create index directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let index = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        index.initialize()?;
        Ok(index)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> ProviderResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ProviderError::Storage(format!("lock error: {}", e)))
    }

    /// 스키마 초기화
    fn initialize(&self) -> ProviderResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                pk INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                date TEXT NOT NULL,
                sender TEXT,
                content_hash TEXT NOT NULL,
                embedding BLOB,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source);

            CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
                title,
                content,
                content=documents,
                content_rowid=pk
            );

            CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
                INSERT INTO documents_fts(rowid, title, content)
                VALUES (new.pk, new.title, new.content);
            END;

            CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
                INSERT INTO documents_fts(documents_fts, rowid, title, content)
                VALUES ('delete', old.pk, old.title, old.content);
            END;

            CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
                INSERT INTO documents_fts(documents_fts, rowid, title, content)
                VALUES ('delete', old.pk, old.title, old.content);
                INSERT INTO documents_fts(rowid, title, content)
                VALUES (new.pk, new.title, new.content);
            END;
            "#,
        )?;

        tracing::debug!("Local index initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 문서 저장 (같은 id면 갱신)
    pub fn upsert(
        &self,
        doc: &Document,
        content_hash: &str,
        embedding: Option<&[f32]>,
    ) -> ProviderResult<()> {
        let conn = self.lock()?;
        let blob = embedding.map(encode_embedding);

        conn.execute(
            "INSERT INTO documents
                (id, title, content, source, date, sender, content_hash, embedding, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                source = excluded.source,
                date = excluded.date,
                sender = excluded.sender,
                content_hash = excluded.content_hash,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at",
            params![
                doc.id,
                doc.title,
                doc.content,
                doc.source,
                doc.date,
                doc.sender,
                content_hash,
                blob,
                Utc::now().to_rfc3339(),
            ],
        )?;

        tracing::debug!("Upserted document: {}", doc.id);
        Ok(())
    }

    /// id로 문서 조회
    pub fn get(&self, id: &str) -> ProviderResult<Option<Document>> {
        let conn = self.lock()?;
        load_document(&conn, id)
    }

    /// 저장된 content hash (변경 감지용)
    pub fn content_hash(&self, id: &str) -> ProviderResult<Option<String>> {
        let conn = self.lock()?;
        let hash = conn
            .query_row(
                "SELECT content_hash FROM documents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// 문서 삭제
    pub fn delete(&self, id: &str) -> ProviderResult<bool> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// 인덱스 통계
    pub fn stats(&self) -> ProviderResult<LocalIndexStats> {
        let conn = self.lock()?;

        let (count, embedded, total): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COUNT(embedding),
                    COALESCE(SUM(LENGTH(CAST(content AS BLOB))), 0)
             FROM documents",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(LocalIndexStats {
            document_count: count as usize,
            embedded_count: embedded as usize,
            total_content_bytes: total as usize,
            db_path: self.db_path.clone(),
        })
    }

    /// FTS5 키워드 검색 (BM25 순, 문서 id 목록)
    pub fn search_keyword(&self, text: &str, limit: usize) -> ProviderResult<Vec<String>> {
        let fts_query = build_fts_query(text);
        if fts_query.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT d.id
            FROM documents_fts
            JOIN documents d ON d.pk = documents_fts.rowid
            WHERE documents_fts MATCH ?1
            ORDER BY bm25(documents_fts)
            LIMIT ?2
            "#,
        )?;

        let ids = stmt
            .query_map(params![fts_query, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    /// 벡터 검색 (코사인 유사도 순, 유사도 > 0 인 문서만)
    pub fn search_vector(&self, vector: &[f32], limit: usize) -> ProviderResult<Vec<(String, f32)>> {
        if limit == 0 || vector.iter().all(|v| *v == 0.0) {
            return Ok(vec![]);
        }

        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, embedding FROM documents WHERE embedding IS NOT NULL")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut scored: Vec<(String, f32)> = rows
            .into_iter()
            .map(|(id, blob)| {
                let similarity = cosine_similarity(vector, &decode_embedding(&blob));
                (id, similarity)
            })
            .filter(|(_, similarity)| *similarity > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        Ok(scored)
    }
}

#[async_trait]
impl SearchProvider for LocalHybridIndex {
    async fn hybrid_search(
        &self,
        text: &str,
        vector: &[f32],
        limit: usize,
    ) -> ProviderResult<Vec<ScoredDocument>> {
        let candidates = limit.saturating_mul(2);

        // 0 벡터(임베딩 실패)면 벡터 순위는 실행되지 않음
        let keyword_active = !build_fts_query(text).is_empty();
        let vector_active = vector.iter().any(|v| *v != 0.0);
        let active_lists = usize::from(keyword_active) + usize::from(vector_active);

        let keyword_ids = self.search_keyword(text, candidates)?;
        let vector_ids: Vec<String> = self
            .search_vector(vector, candidates)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let merged: Vec<(String, f32)> =
            rrf_merge(&[keyword_ids.as_slice(), vector_ids.as_slice()], limit)
                .into_iter()
                .map(|(id, score)| (id, normalize_rrf(score, active_lists)))
                .collect();

        let conn = self.lock()?;
        let mut results = Vec::with_capacity(merged.len());
        for (id, score) in merged {
            match load_document(&conn, &id)? {
                Some(doc) => results.push(ScoredDocument::new(doc, score)),
                None => tracing::warn!("Indexed document disappeared during search: {}", id),
            }
        }

        tracing::info!(
            "Local search: {} keyword + {} vector candidates -> {} results",
            keyword_ids.len(),
            vector_ids.len(),
            results.len()
        );

        Ok(results)
    }

    fn name(&self) -> &str {
        "local-hybrid"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn load_document(conn: &Connection, id: &str) -> ProviderResult<Option<Document>> {
    let doc = conn
        .query_row(
            "SELECT id, title, content, source, date, sender FROM documents WHERE id = ?1",
            params![id],
            |row| {
                Ok(Document {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    content: row.get(2)?,
                    source: row.get(3)?,
                    date: row.get(4)?,
                    sender: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(doc)
}

/// RRF (Reciprocal Rank Fusion)
///
/// 순위 목록들을 `sum(1 / (k + rank))`로 통합합니다 (rank는 1부터).
/// 동점은 id 오름차순으로 정렬합니다.
pub fn rrf_merge(rankings: &[&[String]], limit: usize) -> Vec<(String, f32)> {
    let mut scores: HashMap<&str, f32> = HashMap::new();

    for ranking in rankings {
        for (rank, id) in ranking.iter().enumerate() {
            *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / (RRF_K + rank as f32 + 1.0);
        }
    }

    let mut merged: Vec<(String, f32)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();

    merged.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    merged.truncate(limit);
    merged
}

/// RRF 합을 0.0 ~ 1.0으로 정규화
///
/// 실행된 목록 `active_lists`개 모두에서 1위면 1.0입니다.
/// 키워드만 실행된 경우에도 1위 문서는 1.0이 되어 기본 임계값을 통과합니다.
pub fn normalize_rrf(score: f32, active_lists: usize) -> f32 {
    if active_lists == 0 {
        return 0.0;
    }
    score / (active_lists as f32 / (RRF_K + 1.0))
}

/// 코사인 유사도 (-1.0 ~ 1.0), 길이가 다르거나 0 벡터면 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// FTS5 MATCH 쿼리 생성
///
/// 각 단어를 따옴표로 감싸 OR로 연결합니다 (문장부호/연산자 제거).
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
fn build_fts_query(text: &str) -> String {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w))
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_index() -> (TempDir, LocalHybridIndex) {
        let dir = TempDir::new().unwrap();
        let index = LocalHybridIndex::open(&dir.path().join("index.db")).unwrap();
        (dir, index)
    }

    fn emb(v: &[f32]) -> Option<&[f32]> {
        Some(v)
    }

    fn doc(id: &str, title: &str, content: &str) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            source: "메일".to_string(),
            date: "2024-10-05".to_string(),
            sender: Some("홍길동".to_string()),
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let (_dir, index) = create_test_index();
        let d = doc("doc_001", "Redis Stream 설계", "PostgreSQL 매핑");

        index.upsert(&d, "hash1", emb(&[1.0, 0.0])).unwrap();
        assert_eq!(index.get("doc_001").unwrap(), Some(d));
        assert_eq!(index.content_hash("doc_001").unwrap(), Some("hash1".to_string()));
        assert_eq!(index.get("missing").unwrap(), None);
    }

    #[test]
    fn test_upsert_replaces_and_keeps_fts_in_sync() {
        let (_dir, index) = create_test_index();
        index
            .upsert(&doc("d1", "Kafka consumer", "old body"), "h1", None)
            .unwrap();
        index
            .upsert(&doc("d1", "Kafka consumer", "partition strategy"), "h2", None)
            .unwrap();

        assert!(index.search_keyword("old", 10).unwrap().is_empty());
        assert_eq!(index.search_keyword("partition", 10).unwrap(), vec!["d1"]);
        assert_eq!(index.stats().unwrap().document_count, 1);
    }

    #[test]
    fn test_delete() {
        let (_dir, index) = create_test_index();
        index.upsert(&doc("d1", "Redis", "Stream"), "h", None).unwrap();

        assert!(index.delete("d1").unwrap());
        assert!(!index.delete("d1").unwrap());
        assert!(index.search_keyword("Redis", 10).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let (_dir, index) = create_test_index();
        index.upsert(&doc("d1", "a", "1234567890"), "h", emb(&[1.0])).unwrap();
        index.upsert(&doc("d2", "b", "12345"), "h", None).unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.embedded_count, 1);
        assert_eq!(stats.total_content_bytes, 15);
    }

    #[test]
    fn test_keyword_search_is_or_of_terms() {
        let (_dir, index) = create_test_index();
        index.upsert(&doc("d1", "Redis Stream", "event buffer"), "h", None).unwrap();
        index.upsert(&doc("d2", "Table Design", "PostgreSQL schema"), "h", None).unwrap();
        index.upsert(&doc("d3", "Lunch menu", "kimchi"), "h", None).unwrap();

        let mut ids = index.search_keyword("Redis Design?", 10).unwrap();
        ids.sort();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[test]
    fn test_vector_search_orders_by_similarity() {
        let (_dir, index) = create_test_index();
        index.upsert(&doc("near", "a", "a"), "h", emb(&[1.0, 0.1])).unwrap();
        index.upsert(&doc("far", "b", "b"), "h", emb(&[0.5, 1.0])).unwrap();
        index.upsert(&doc("opposite", "c", "c"), "h", emb(&[-1.0, 0.0])).unwrap();

        let results = index.search_vector(&[1.0, 0.0], 10).unwrap();
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
    }

    #[test]
    fn test_zero_vector_skips_vector_search() {
        let (_dir, index) = create_test_index();
        index.upsert(&doc("d1", "a", "a"), "h", emb(&[1.0, 0.0])).unwrap();
        assert!(index.search_vector(&[0.0, 0.0], 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_search_fuses_rankings() {
        let (_dir, index) = create_test_index();
        index
            .upsert(&doc("both", "Redis Stream", "table"), "h", emb(&[1.0, 0.0]))
            .unwrap();
        index
            .upsert(&doc("keyword", "Redis cache", "ttl"), "h", emb(&[0.0, 1.0]))
            .unwrap();
        index
            .upsert(&doc("vector", "unrelated", "words"), "h", emb(&[0.9, 0.1]))
            .unwrap();

        let results = index.hybrid_search("Redis", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results[0].id(), "both");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        // 양쪽 목록 모두 1위면 정규화 점수 1.0
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert!(results.iter().all(|r| r.score <= 1.0 + 1e-5));
    }

    #[tokio::test]
    async fn test_hybrid_search_keyword_only_with_zero_vector() {
        let (_dir, index) = create_test_index();
        index.upsert(&doc("d1", "Redis", "x"), "h", emb(&[1.0, 0.0])).unwrap();
        index.upsert(&doc("d2", "Kafka", "y"), "h", emb(&[1.0, 0.0])).unwrap();

        let results = index.hybrid_search("Redis", &[0.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "d1");
        // 키워드 목록만 실행됐으므로 1위는 1.0
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hybrid_search_keyword_hit_without_embedding() {
        let (_dir, index) = create_test_index();
        index.upsert(&doc("plain", "Redis Stream", "x"), "h", None).unwrap();

        // 벡터 목록은 실행됐지만 임베딩이 없어 비어 있음
        let results = index.hybrid_search("Redis", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 0.5).abs() < 1e-5);
        assert!(results[0].score > 0.03);
    }

    #[test]
    fn test_normalize_rrf() {
        let top = 1.0 / (RRF_K + 1.0);
        assert!((normalize_rrf(top, 1) - 1.0).abs() < 1e-6);
        assert!((normalize_rrf(2.0 * top, 2) - 1.0).abs() < 1e-6);
        assert!((normalize_rrf(top, 2) - 0.5).abs() < 1e-6);
        assert_eq!(normalize_rrf(top, 0), 0.0);
    }

    #[test]
    fn test_rrf_merge() {
        let a = vec!["x".to_string(), "y".to_string()];
        let b = vec!["y".to_string(), "z".to_string()];
        let merged = rrf_merge(&[a.as_slice(), b.as_slice()], 10);

        assert_eq!(merged[0].0, "y");
        assert!((merged[0].1 - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-6);
        assert_eq!(merged.len(), 3);

        let limited = rrf_merge(&[a.as_slice(), b.as_slice()], 1);
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-4);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-4);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-4);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let v = vec![0.25, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }

    #[test]
    fn test_build_fts_query() {
        assert_eq!(build_fts_query("hello world"), "\"hello\" OR \"world\"");
        assert_eq!(build_fts_query("  "), "");
        assert_eq!(build_fts_query("설계가 뭐야?"), "\"설계가\" OR \"뭐야\"");
        assert_eq!(build_fts_query("a\"b OR"), "\"ab\" OR \"OR\"");
    }
}
