//! Azure OpenAI 임베딩
//!
//! source: https://learn.microsoft.com/en-us/azure/ai-services/openai/reference#embeddings

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::EmbeddingProvider;
use crate::config::AzureOpenAiConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, deployment_url, send_with_retry, RetryPolicy};

const PROVIDER: &str = "azure-openai-embedding";

/// Azure OpenAI 임베딩 구현체 (text-embedding-3-small 기본 1536차원)
#[derive(Debug)]
pub struct AzureOpenAiEmbedding {
    client: reqwest::Client,
    url: Url,
    api_key: String,
    dimension: usize,
    retry: RetryPolicy,
}

impl AzureOpenAiEmbedding {
    pub fn new(config: &AzureOpenAiConfig) -> Result<Self> {
        let url = deployment_url(
            &config.endpoint,
            &config.embedding_deployment,
            "embeddings",
            &config.api_version,
        )
        .with_context(|| format!("Invalid AZURE_OPENAI_ENDPOINT: {}", config.endpoint))?;

        Ok(Self {
            client: build_client(PROVIDER)?,
            url,
            api_key: config.api_key.clone(),
            dimension: config.embedding_dimension,
            retry: RetryPolicy::default(),
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn parse_response(body: &str, dimension: usize) -> ProviderResult<Vec<f32>> {
    let response: EmbedResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::decode(PROVIDER, e))?;

    let embedding = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| ProviderError::empty(PROVIDER))?;

    if embedding.len() != dimension {
        return Err(ProviderError::decode(
            PROVIDER,
            format!("expected {} dimensions, got {}", dimension, embedding.len()),
        ));
    }

    Ok(embedding)
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAiEmbedding {
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest { input: text };
        let body = send_with_retry(PROVIDER, &self.retry, None, || {
            self.client
                .post(self.url.clone())
                .header("api-key", &self.api_key)
                .json(&request)
        })
        .await?;

        parse_response(&body, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
