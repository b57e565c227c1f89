//! Bounded retry loop for sites sitting behind an anti-bot wall.
//!
//! Every attempt rotates a browser header preset. A blocked response
//! (403/429/503 or a challenge page) is retried after an exponential delay
//! with jitter. Once the attempts on one origin are exhausted the same loop
//! runs against each configured mirror before giving up.

use std::{fmt, future::Future, sync::OnceLock, time::Duration};

use anyhow::anyhow;
use log::{debug, info, warn};
use rand::Rng;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method, StatusCode,
};

use super::{create_client, text};

const MAX_DELAY: Duration = Duration::from_secs(60);

const CHALLENGE_MARKERS: &[&str] = &[
    "<title>Just a moment...</title>",
    "cf-browser-verification",
    "Checking your browser before accessing",
    "/cdn-cgi/challenge-platform/",
    "window._cf_chl_opt",
    "Enable JavaScript and cookies to continue",
];

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
    pub timeout: Option<Duration>,
    /// Site origin the mirrors stand in for. Urls on other hosts are never rewritten.
    pub origin: Option<&'static str>,
    pub mirrors: &'static [&'static str],
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
            timeout: None,
            origin: None,
            mirrors: &[],
        }
    }
}

impl RetryPolicy {
    /// One attempt per origin, mirrors only.
    pub fn mirrors_only(origin: &'static str, mirrors: &'static [&'static str]) -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
        .with_mirrors(origin, mirrors)
    }

    pub fn with_mirrors(
        mut self,
        origin: &'static str,
        mirrors: &'static [&'static str],
    ) -> Self {
        self.origin = Some(origin);
        self.mirrors = mirrors;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Delay after failed attempt `attempt` (1-based), without jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };

        self.backoff_delay(attempt) + jitter
    }
}

#[derive(Debug)]
pub struct BlockedError {
    pub url: String,
    pub attempts: u32,
}

impl fmt::Display for BlockedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "blocked while loading {} ({} attempts across all domains)",
            self.url, self.attempts
        )
    }
}

impl std::error::Error for BlockedError {}

#[derive(Debug)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub body: String,
}

pub fn is_challenge_page(body: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|marker| body.contains(marker))
}

pub fn is_blocked(status: StatusCode, body: &str) -> bool {
    matches!(
        status,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    ) || is_challenge_page(body)
}

fn header_presets() -> &'static [HeaderMap] {
    static PRESETS: OnceLock<Vec<HeaderMap>> = OnceLock::new();
    PRESETS.get_or_init(|| {
        let windows = browser_headers(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#,
            r#""Windows""#,
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        );
        let mac = browser_headers(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            r#""Chromium";v="120", "Google Chrome";v="120", "Not_A Brand";v="8""#,
            r#""macOS""#,
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        );
        let linux = browser_headers(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#,
            r#""Linux""#,
            "*/*",
        );

        vec![windows, mac, linux]
    })
}

fn browser_headers(
    user_agent: &'static str,
    sec_ch_ua: &'static str,
    platform: &'static str,
    accept: &'static str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(user_agent));
    headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("ar,en-US;q=0.9,en;q=0.8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua"),
        HeaderValue::from_static(sec_ch_ua),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-mobile"),
        HeaderValue::from_static("?0"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-platform"),
        HeaderValue::from_static(platform),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-user"),
        HeaderValue::from_static("?1"),
    );
    headers
}

/// Header preset for `attempt` (1-based), cycling through the presets.
pub fn headers_for_attempt(attempt: u32) -> HeaderMap {
    let presets = header_presets();
    let idx = (attempt.saturating_sub(1) as usize) % presets.len();
    presets[idx].clone()
}

/// `url` followed by the same path on every mirror origin.
///
/// Only urls on `site` or one of its mirrors are rewritten, third-party hosts
/// (players, cdn) are tried as is.
pub fn candidate_urls(url: &str, site: Option<&str>, mirrors: &[&str]) -> Vec<String> {
    let mut urls = vec![url.to_owned()];

    let (Some(site), Some(origin)) = (site, text::origin_of(url)) else {
        return urls;
    };

    let is_site_url = std::iter::once(site)
        .chain(mirrors.iter().copied())
        .any(|domain| domain.trim_end_matches('/') == origin);
    if !is_site_url {
        return urls;
    }

    for mirror in mirrors {
        let mirror = mirror.trim_end_matches('/');
        if mirror == origin {
            continue;
        }
        urls.push(url.replacen(&origin, mirror, 1));
    }

    urls
}

/// Runs the retry loop with a custom `send` function.
pub async fn fetch_with<Sender, Fut>(
    url: &str,
    policy: &RetryPolicy,
    send: Sender,
) -> anyhow::Result<String>
where
    Sender: Fn(String, HeaderMap) -> Fut,
    Fut: Future<Output = anyhow::Result<FetchedPage>>,
{
    let mut attempts = 0;

    for candidate in candidate_urls(url, policy.origin, policy.mirrors) {
        for attempt in 1..=policy.max_attempts.max(1) {
            attempts += 1;

            match send(candidate.clone(), headers_for_attempt(attempt)).await {
                Ok(page) if !is_blocked(page.status, &page.body) => {
                    if page.status.is_success() {
                        return Ok(page.body);
                    }
                    return Err(anyhow!("[retry] {candidate} responded with {}", page.status));
                }
                Ok(page) => {
                    warn!(
                        "[retry] {candidate} blocked (status: {}, attempt {attempt}/{})",
                        page.status, policy.max_attempts
                    );
                }
                Err(err) => {
                    warn!(
                        "[retry] {candidate} failed (attempt {attempt}/{}): {err}",
                        policy.max_attempts
                    );
                }
            }

            if attempt < policy.max_attempts {
                let delay = policy.delay_for(attempt);
                debug!("[retry] waiting {}ms before next attempt", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
        }

        info!("[retry] giving up on {candidate}");
    }

    Err(BlockedError {
        url: url.to_owned(),
        attempts,
    }
    .into())
}

async fn send_page(
    method: Method,
    url: String,
    headers: HeaderMap,
    referer: Option<&str>,
    timeout: Option<Duration>,
) -> anyhow::Result<FetchedPage> {
    let mut request = create_client().request(method, &url).headers(headers);

    if let Some(referer) = referer {
        request = request.header(header::REFERER, referer);
    }

    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let res = request.send().await?;
    let status = res.status();
    let body = res.text().await?;

    Ok(FetchedPage { status, body })
}

pub async fn fetch_html(
    url: &str,
    referer: Option<&str>,
    policy: &RetryPolicy,
) -> anyhow::Result<String> {
    fetch_with(url, policy, |url, headers| {
        send_page(Method::GET, url, headers, referer, policy.timeout)
    })
    .await
}

pub async fn post_html(
    url: &str,
    referer: Option<&str>,
    policy: &RetryPolicy,
) -> anyhow::Result<String> {
    fetch_with(url, policy, |url, headers| {
        send_page(Method::POST, url, headers, referer, policy.timeout)
    })
    .await
}
