//! Azure AI Search 하이브리드 검색
//!
//! source: https://learn.microsoft.com/en-us/rest/api/searchservice/documents/search-post
//!
//! 키워드(`search`) + 벡터(`vectorQueries`)를 한 번에 요청하면
//! 서비스가 RRF로 통합한 `@search.score`를 돌려줍니다.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Document, ScoredDocument, SearchProvider};
use crate::config::AzureSearchConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, send_with_retry, RetryPolicy};

const PROVIDER: &str = "azure-search";

/// 조회할 필드
const SELECT_FIELDS: &str = "id,title,content,source,date,sender";

/// Azure AI Search 클라이언트
#[derive(Debug)]
pub struct AzureSearchClient {
    client: reqwest::Client,
    url: Url,
    api_key: String,
    vector_field: String,
    retry: RetryPolicy,
}

impl AzureSearchClient {
    pub fn new(config: &AzureSearchConfig) -> Result<Self> {
        let url = search_url(&config.endpoint, &config.index_name, &config.api_version)
            .with_context(|| format!("Invalid AZURE_SEARCH_ENDPOINT: {}", config.endpoint))?;

        Ok(Self {
            client: build_client(PROVIDER)?,
            url,
            api_key: config.api_key.clone(),
            vector_field: config.vector_field.clone(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// `{endpoint}/indexes/{index}/docs/search?api-version=...`
fn search_url(endpoint: &str, index: &str, api_version: &str) -> Result<Url, url::ParseError> {
    let base = format!("{}/", endpoint.trim_end_matches('/'));
    let mut url = Url::parse(&base)?.join(&format!("indexes/{}/docs/search", index))?;
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url)
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    search: &'a str,
    top: usize,
    select: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    vector_queries: Vec<VectorQuery<'a>>,
}

#[derive(Debug, Serialize)]
struct VectorQuery<'a> {
    kind: &'static str,
    vector: &'a [f32],
    fields: &'a str,
    k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "@search.score")]
    score: f32,
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    sender: Option<String>,
}

impl From<SearchHit> for ScoredDocument {
    fn from(hit: SearchHit) -> Self {
        ScoredDocument::new(
            Document {
                id: hit.id,
                title: hit.title.unwrap_or_default(),
                content: hit.content.unwrap_or_default(),
                source: hit.source.unwrap_or_default(),
                date: hit.date.unwrap_or_default(),
                sender: hit.sender.filter(|s| !s.trim().is_empty()),
            },
            hit.score,
        )
    }
}

fn build_request<'a>(
    text: &'a str,
    vector: &'a [f32],
    vector_field: &'a str,
    limit: usize,
) -> SearchRequest<'a> {
    // 0 벡터(임베딩 실패 폴백)는 보내지 않음 → 키워드 검색만 수행
    let vector_queries = if vector.iter().any(|v| *v != 0.0) {
        vec![VectorQuery {
            kind: "vector",
            vector,
            fields: vector_field,
            k: limit,
        }]
    } else {
        vec![]
    };

    SearchRequest {
        search: text,
        top: limit,
        select: SELECT_FIELDS,
        vector_queries,
    }
}

fn parse_response(body: &str) -> ProviderResult<Vec<ScoredDocument>> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::decode(PROVIDER, e))?;

    let mut documents: Vec<ScoredDocument> =
        response.value.into_iter().map(ScoredDocument::from).collect();

    // 서비스가 이미 정렬하지만 동점 순서는 유지한 채 한 번 더 보장
    documents.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(documents)
}

#[async_trait]
impl SearchProvider for AzureSearchClient {
    async fn hybrid_search(
        &self,
        text: &str,
        vector: &[f32],
        limit: usize,
    ) -> ProviderResult<Vec<ScoredDocument>> {
        let request = build_request(text, vector, &self.vector_field, limit);

        let body = send_with_retry(PROVIDER, &self.retry, None, || {
            self.client
                .post(self.url.clone())
                .header("api-key", &self.api_key)
                .json(&request)
        })
        .await?;

        let documents = parse_response(&body)?;
        tracing::info!("Azure search: {} documents found", documents.len());
        Ok(documents)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

// ============================================================================
// Tests
// ============================================================================
