use serde::{Deserialize, Serialize};
use serplens_core::{Error, Result};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub mod export;
pub mod extract;
pub mod keywords;
pub mod pipeline;
pub mod search;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Timeout for the whole request (network + body).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_ms: Some(20_000),
            max_bytes: Some(5_000_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub timings_ms: BTreeMap<String, u128>,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }
}

/// Shared HTTP client with conservative defaults.
pub fn default_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("serplens/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        // Avoid hanging forever on DNS/TLS/body stalls; per-request timeouts can tighten this.
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::Fetch(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
}

impl LocalFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: default_client()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResponse> {
        let t0 = Instant::now();
        let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme {:?}: {url}",
                parsed.scheme()
            )));
        }

        let mut rb = self.client.get(parsed);
        if let Some(ms) = opts.timeout_ms {
            rb = rb.timeout(Duration::from_millis(ms));
        }
        let resp = rb.send().await.map_err(|e| Error::Fetch(e.to_string()))?;
        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let max_bytes = opts.max_bytes.unwrap_or(u64::MAX) as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("fetch".to_string(), t0.elapsed().as_millis());
        tracing::debug!(url, status, bytes = bytes.len(), truncated, "fetched");

        Ok(FetchResponse {
            url: url.to_string(),
            final_url,
            status,
            content_type,
            bytes,
            truncated,
            timings_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, routing::get, Router};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn fetch_reads_body_and_content_type() {
        let addr = serve(Router::new().route(
            "/",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "hello") }),
        ))
        .await;

        let fetcher = LocalFetcher::new().unwrap();
        let r = fetcher
            .fetch(&format!("http://{addr}/"), &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(r.status, 200);
        assert_eq!(r.content_type.as_deref(), Some("text/plain"));
        assert_eq!(r.text_lossy(), "hello");
        assert!(!r.truncated);
    }

    #[tokio::test]
    async fn fetch_truncates_at_max_bytes() {
        let addr = serve(Router::new().route("/", get(|| async { "x".repeat(10_000) }))).await;

        let fetcher = LocalFetcher::new().unwrap();
        let opts = FetchOptions {
            timeout_ms: Some(2_000),
            max_bytes: Some(100),
        };
        let r = fetcher
            .fetch(&format!("http://{addr}/"), &opts)
            .await
            .unwrap();
        assert_eq!(r.bytes.len(), 100);
        assert!(r.truncated);
    }

    #[tokio::test]
    async fn fetch_rejects_non_http_urls() {
        let fetcher = LocalFetcher::new().unwrap();
        let err = fetcher
            .fetch("file:///etc/passwd", &FetchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_url");

        let err = fetcher
            .fetch("not a url", &FetchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_url");
    }
}
