//! Dynamic backend (C3): drives a headless Chrome instance via `chromiumoxide`, generalising
//! `discover/browser.rs`'s injected-JS-regex approach into real CDP network-event capture —
//! every request the page actually issues becomes an `observed_subrequests` entry, no regex
//! needed (spec.md §4.2 "Browser-network source").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{self, EventRequestWillBeSent};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::model::{FetchRequest, FetchResult, Method};

use super::Backend;

fn parse_method(raw: &str) -> Method {
    raw.to_uppercase().parse().unwrap_or(Method::Get)
}

/// One browser context per worker, reused within a run and disposed on shutdown (spec.md
/// §4.3). `contexts` hands out pages; the underlying `Browser` process is shared.
pub struct DynamicBackend {
    browser: Arc<Browser>,
    /// Bounds how many pages are open at once — one per worker, matching `concurrency`.
    page_slots: Arc<Semaphore>,
    wait_time: Duration,
    navigation_timeout: Duration,
}

impl DynamicBackend {
    pub async fn launch(headless: bool, concurrency: usize, wait_time: Duration, navigation_timeout: Duration) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder();
        if headless {
            builder = builder.no_sandbox().args(vec![
                "--headless",
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--window-size=1280,960",
            ]);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("browser config error: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to launch headless browser: {e}"))?;

        tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        Ok(Self {
            browser: Arc::new(browser),
            page_slots: Arc::new(Semaphore::new(concurrency.max(1))),
            wait_time,
            navigation_timeout,
        })
    }
}

#[async_trait]
impl Backend for DynamicBackend {
    async fn fetch(&self, request: FetchRequest) -> anyhow::Result<FetchResult> {
        let start = Instant::now();
        let _permit = self
            .page_slots
            .acquire()
            .await
            .expect("page slot semaphore never closed");

        let page = self.browser.new_page("about:blank").await?;
        let observed: Arc<Mutex<Vec<FetchRequest>>> = Arc::new(Mutex::new(Vec::new()));
        // Millis since `start`, updated on every observed request; used below to detect
        // `networkidle` without a second shared clock.
        let last_activity_ms = Arc::new(AtomicU64::new(0));

        page.execute(network::EnableParams::default()).await?;
        let mut events = page.event_listener::<EventRequestWillBeSent>().await?;
        let observed_sink = observed.clone();
        let activity_sink = last_activity_ms.clone();
        let listener = tokio::spawn(async move {
            let start = start;
            while let Some(event) = events.next().await {
                let req = &event.request;
                let method = parse_method(&req.method);
                let body = req.post_data.as_ref().map(|b| b.clone().into_bytes());
                let headers: Vec<(String, String)> = req
                    .headers
                    .inner()
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                observed_sink.lock().push(FetchRequest {
                    url: req.url.clone(),
                    method,
                    headers,
                    body,
                    timeout: Duration::ZERO,
                });
                activity_sink.store(start.elapsed().as_millis() as u64, Ordering::Relaxed);
            }
        });

        let nav = tokio::time::timeout(self.navigation_timeout, page.goto(&request.url)).await;
        let navigated = matches!(nav, Ok(Ok(_)));

        // Wait for `networkidle` (no new observed request for 500ms) or `wait_time`,
        // whichever comes first, per spec.md §4.3.
        const IDLE_WINDOW: Duration = Duration::from_millis(500);
        const POLL_INTERVAL: Duration = Duration::from_millis(100);
        let deadline = Instant::now() + self.wait_time;
        let mut last_seen_activity = last_activity_ms.load(Ordering::Relaxed);
        let mut quiet_since = Instant::now();
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let now = Instant::now();
            let activity = last_activity_ms.load(Ordering::Relaxed);
            if activity != last_seen_activity {
                last_seen_activity = activity;
                quiet_since = now;
            }
            if now >= deadline || now.duration_since(quiet_since) >= IDLE_WINDOW {
                break;
            }
        }

        let final_url = page
            .evaluate("document.location.href")
            .await
            .ok()
            .and_then(|v| v.into_value::<String>().ok())
            .unwrap_or_else(|| request.url.clone());
        let body_bytes = page
            .content()
            .await
            .map(|html| html.into_bytes())
            .unwrap_or_default();

        listener.abort();
        let observed_subrequests = observed.lock().clone();

        let status = if navigated { 200 } else { 0 };

        Ok(FetchResult {
            final_url,
            status,
            headers: Vec::new(),
            body_bytes,
            content_type: Some("text/html".to_string()),
            elapsed: start.elapsed(),
            truncated: false,
            observed_subrequests,
        })
    }

    async fn close(&self) {
        // `chromiumoxide::Browser::close` takes `&mut self`; behind the `Arc` every worker
        // shares, it is instead cleaned up implicitly once the last reference drops at scan end.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_methods() {
        assert_eq!(parse_method("get"), Method::Get);
        assert_eq!(parse_method("POST"), Method::Post);
    }

    #[test]
    fn unknown_method_falls_back_to_get() {
        assert_eq!(parse_method("CONNECT"), Method::Get);
    }
}
