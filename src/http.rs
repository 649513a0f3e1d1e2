//! HTTP 공통 - 재시도 및 Rate Limiter
//!
//! 모든 원격 프로바이더(Azure OpenAI, Azure AI Search, Gemini)가
//! 이 모듈의 `send_with_retry`를 통해 요청을 보냅니다.
//!
//! - 전송 실패 / 429: 지수 백오프로 재시도 (최대 `max_retries`)
//! - 그 외 비정상 상태: 즉시 실패

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::{ProviderError, ProviderResult};

/// 기본 HTTP 타임아웃
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// 429/전송 실패 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// 재시도 정책
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// 재시도 없음
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    /// attempt(0-based)번째 실패 후 대기 시간
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }
}

/// 타임아웃이 설정된 HTTP 클라이언트 생성
pub fn build_client(provider: &str) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("kite-rag/", env!("CARGO_PKG_VERSION")))
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Transport {
            provider: provider.to_string(),
            message: format!("failed to create HTTP client: {}", e),
        })
}

/// Azure OpenAI 배포 URL
///
/// `{endpoint}/openai/deployments/{deployment}/{operation}?api-version=...`
pub fn deployment_url(
    endpoint: &str,
    deployment: &str,
    operation: &str,
    api_version: &str,
) -> Result<url::Url, url::ParseError> {
    let base = format!("{}/", endpoint.trim_end_matches('/'));
    let mut url = url::Url::parse(&base)?
        .join(&format!("openai/deployments/{}/{}", deployment, operation))?;
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url)
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// 슬라이딩 윈도우 + 최소 간격 Rate Limiter
#[derive(Debug)]
pub struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능 시점까지 대기 후 현재 요청을 기록
    pub async fn acquire(&mut self) {
        // 1. 최소 딜레이 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();

        // 2. 윈도우 밖 요청 제거
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. 한도 초과 시 가장 오래된 요청이 빠질 때까지 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.requests.len()
    }
}

// ============================================================================
// Send with retry
// ============================================================================

/// 요청 전송 (재시도 포함), 성공 시 응답 본문 반환
///
/// `build`는 매 시도마다 새 요청을 만듭니다 (RequestBuilder는 재사용 불가).
pub async fn send_with_retry<F>(
    provider: &str,
    policy: &RetryPolicy,
    limiter: Option<&Mutex<RateLimiter>>,
    build: F,
) -> ProviderResult<String>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error: Option<ProviderError> = None;

    for attempt in 0..=policy.max_retries {
        if let Some(limiter) = limiter {
            limiter.lock().await.acquire().await;
        }

        let response = match build().send().await {
            Ok(resp) => resp,
            Err(e) => {
                last_error = Some(ProviderError::Transport {
                    provider: provider.to_string(),
                    message: e.to_string(),
                });
                if attempt < policy.max_retries {
                    let backoff = policy.backoff(attempt);
                    tracing::warn!(
                        "{} request failed, retrying in {:?} (attempt {}/{})",
                        provider,
                        backoff,
                        attempt + 1,
                        policy.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                break;
            }
        };

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Transport {
            provider: provider.to_string(),
            message: format!("failed to read response body: {}", e),
        })?;

        if status.is_success() {
            return Ok(body);
        }

        if status.as_u16() == 429 {
            last_error = Some(ProviderError::RateLimited {
                provider: provider.to_string(),
                attempts: attempt + 1,
            });
            if attempt < policy.max_retries {
                let backoff = policy.backoff(attempt);
                tracing::warn!(
                    "{} rate limit hit (429), backing off {:?} (attempt {}/{})",
                    provider,
                    backoff,
                    attempt + 1,
                    policy.max_retries
                );
                tokio::time::sleep(backoff).await;
                continue;
            }
            break;
        }

        return Err(ProviderError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    Err(last_error.unwrap_or_else(|| ProviderError::RateLimited {
        provider: provider.to_string(),
        attempts: policy.max_retries + 1,
    }))
}
