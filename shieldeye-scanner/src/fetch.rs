use crate::error::{Result, ScanError};
use crate::result::FetchedPage;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Status codes that are retried with backoff. Everything else is returned as-is.
pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Longest server-requested `Retry-After` we are willing to honour
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Immutable HTTP client settings, built once per scan
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub verify_tls: bool,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub pool_size: usize,
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            verify_tls: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            pool_size: 10,
            max_redirects: 10,
        }
    }
}

impl ClientConfig {
    /// Exponential backoff: base, 2*base, 4*base, ...
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.retry_base_delay.saturating_mul(factor)
    }
}

/// Connection-pooled GET with bounded retries
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    config: ClientConfig,
}

impl Fetcher {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_size)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .danger_accept_invalid_certs(!config.verify_tls)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// GET `url`, following redirects and retrying transient failures.
    ///
    /// Only the statuses in [`RETRY_STATUSES`] and connection failures are
    /// retried. When the retry budget runs out on a transient status the
    /// call fails with `RetriesExhausted`.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let parsed = Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
        let start = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            debug!("Fetching {} (attempt {})", url, attempt + 1);

            match self.client.get(parsed.clone()).send().await {
                Ok(response) => {
                    let status_code = response.status().as_u16();

                    if RETRY_STATUSES.contains(&status_code) {
                        if attempt >= self.config.max_retries {
                            warn!("Giving up on {} after {} retries (status {})", url, attempt, status_code);
                            return Err(ScanError::RetriesExhausted {
                                status: status_code,
                                attempts: attempt + 1,
                            });
                        }
                        attempt += 1;
                        let delay = self
                            .config
                            .backoff_delay(attempt)
                            .max(retry_after(&response).unwrap_or(Duration::ZERO));
                        debug!("{} returned {}, retrying in {:?}", url, status_code, delay);
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let final_url = response.url().clone();
                    let headers = response.headers().clone();
                    let body = response.text().await?;

                    let mut page = FetchedPage::new(url.to_string(), final_url);
                    page.status_code = status_code;
                    page.headers = headers;
                    page.body = body;
                    page.response_time = start.elapsed();
                    return Ok(page);
                }
                Err(e) if e.is_connect() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.backoff_delay(attempt);
                    debug!("Connection to {} failed ({}), retrying in {:?}", url, e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Single GET without retries, returning only the final status code
    pub async fn status_of(&self, url: &str, timeout: Duration) -> Result<u16> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        Ok(response.status().as_u16())
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    let secs: u64 = response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}
