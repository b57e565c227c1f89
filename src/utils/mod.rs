pub mod dns_over_https;
pub mod hls;
pub mod html;
pub mod retry;
pub mod text;
pub mod unpack;

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use dns_over_https::DoHResolver;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    ClientBuilder,
};

pub fn get_user_agent<'a>() -> &'a str {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36 Edg/138.0.0.0"
}

pub fn create_client() -> &'static reqwest::Client {
    static LAZZY_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    LAZZY_CLIENT.get_or_init(|| {
        let mut headers = get_default_headers();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );

        create_client_builder()
            .default_headers(headers)
            .build()
            .unwrap_or_default()
    })
}

pub fn create_client_builder() -> reqwest::ClientBuilder {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(5))
        .read_timeout(Duration::from_secs(30))
        .user_agent(get_user_agent())
        .danger_accept_invalid_certs(true)
        .cookie_store(true)
        .dns_resolver(Arc::new(DoHResolver::default()))
}

pub fn get_default_headers() -> HeaderMap {
    let mut headers = HeaderMap::default();

    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("ar,en-US;q=0.7,en;q=0.3"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

pub async fn scrap_page<T>(
    request_builder: reqwest::RequestBuilder,
    processor: &dyn html::DOMProcessor<T>,
) -> Result<T, anyhow::Error> {
    let html = request_builder.send().await?.text().await?;

    Ok(process_html(&html, processor))
}

/// Same as [`scrap_page`] for a body fetched through the retry loop.
pub async fn scrap_page_with_retry<T>(
    url: &str,
    policy: &retry::RetryPolicy,
    processor: &dyn html::DOMProcessor<T>,
) -> Result<T, anyhow::Error> {
    let html = retry::fetch_html(url, None, policy).await?;

    Ok(process_html(&html, processor))
}

pub fn process_html<T>(html: &str, processor: &dyn html::DOMProcessor<T>) -> T {
    let document = scraper::Html::parse_document(html);
    let root = document.root_element();

    processor.process(&root)
}

pub async fn load_text(request_builder: reqwest::RequestBuilder) -> anyhow::Result<String> {
    Ok(request_builder.send().await?.text().await?)
}
