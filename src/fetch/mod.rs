//! Fetch Backends (C3): pluggable request dispatch behind a single trait so the scheduler
//! never needs to know whether a request went out over plain reqwest or a headless browser.

pub mod dynamic_backend;
pub mod static_backend;

use async_trait::async_trait;

use crate::model::{FetchRequest, FetchResult};

#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> anyhow::Result<FetchResult>;

    /// Release backend-owned resources (e.g. a browser process). No-op for stateless backends.
    async fn close(&self) {}
}
