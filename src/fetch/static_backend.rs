//! Static backend (C3): a pooled `reqwest::Client`, generalising `http_client.rs`'s
//! `create_optimized_client` into the `Backend` fetch contract — redirect-chain handling,
//! per-request timeout, and streamed truncation at `max_body_bytes`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{redirect::Policy, Client, Proxy};

use crate::model::{FetchRequest, FetchResult, Method};

use super::Backend;

fn to_reqwest_method(m: Method) -> reqwest::Method {
    match m {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

/// One pooled `reqwest::Client` per configured proxy (or a single direct client when none
/// are configured), rotated round-robin per request — the client has to be built once per
/// proxy since reqwest fixes it at `Client` construction.
pub struct StaticBackend {
    clients: Vec<Client>,
    round_robin: AtomicUsize,
    max_body_bytes: u64,
    static_cookie_header: Option<String>,
}

impl StaticBackend {
    pub fn new(
        max_redirects: usize,
        max_body_bytes: u64,
        proxies: &[String],
        user_agent: &str,
        cookies: &[(String, String)],
    ) -> anyhow::Result<Self> {
        let build = |proxy: Option<&str>| -> anyhow::Result<Client> {
            let mut builder = Client::builder()
                .pool_max_idle_per_host(50)
                .pool_idle_timeout(Some(Duration::from_secs(90)))
                .tcp_nodelay(true)
                .gzip(true)
                .brotli(true)
                .use_rustls_tls()
                .redirect(Policy::custom(move |attempt| {
                    // Stop (rather than error) once the hop budget is spent, so a redirect
                    // loop or an overlong chain both surface as an ordinary FetchResult
                    // carrying the last 3xx reached, per spec.md §4.3.
                    if attempt.previous().len() >= max_redirects {
                        attempt.stop()
                    } else {
                        attempt.follow()
                    }
                }))
                .user_agent(user_agent)
                .cookie_store(true);
            if let Some(p) = proxy {
                builder = builder.proxy(Proxy::all(p)?);
            }
            Ok(builder.build()?)
        };

        let clients = if proxies.is_empty() {
            vec![build(None)?]
        } else {
            proxies
                .iter()
                .map(|p| build(Some(p)))
                .collect::<anyhow::Result<Vec<_>>>()?
        };

        Ok(Self {
            clients,
            round_robin: AtomicUsize::new(0),
            max_body_bytes,
            static_cookie_header: Self::static_cookie_header(cookies),
        })
    }

    fn next_client(&self) -> &Client {
        let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[idx]
    }

    /// A static cookie set applies across every origin visited, so it is sent as an explicit
    /// header per request rather than seeded into the client's cookie jar (which needs a URL).
    fn static_cookie_header(cookies: &[(String, String)]) -> Option<String> {
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[async_trait]
impl Backend for StaticBackend {
    async fn fetch(&self, request: FetchRequest) -> anyhow::Result<FetchResult> {
        let start = Instant::now();
        let mut builder = self
            .next_client()
            .request(to_reqwest_method(request.method), &request.url)
            .timeout(request.timeout);

        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        if let Some(cookie) = &self.static_cookie_header {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        let max = self.max_body_bytes as usize;
        let mut body = Vec::new();
        let mut truncated = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > max {
                let remaining = max.saturating_sub(body.len());
                body.extend_from_slice(&chunk[..remaining.min(chunk.len())]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResult {
            final_url,
            status,
            headers,
            body_bytes: body,
            content_type,
            elapsed: start.elapsed(),
            truncated,
            observed_subrequests: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_cookie_header_joins_pairs() {
        let cookies = vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())];
        assert_eq!(
            StaticBackend::static_cookie_header(&cookies),
            Some("a=1; b=2".to_string())
        );
    }

    #[test]
    fn static_cookie_header_none_when_empty() {
        assert_eq!(StaticBackend::static_cookie_header(&[]), None);
    }

    #[test]
    fn builds_client_without_proxy() {
        let backend = StaticBackend::new(5, 1024, &[], "endabyss/0.1", &[]);
        assert!(backend.is_ok());
    }

    #[test]
    fn builds_one_client_per_proxy() {
        let proxies = vec!["http://p1:8080".to_string(), "http://p2:8080".to_string()];
        let backend = StaticBackend::new(5, 1024, &proxies, "endabyss/0.1", &[]).unwrap();
        assert_eq!(backend.clients.len(), 2);
    }
}
