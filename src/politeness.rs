//! Politeness Layer (C4): delay, jitter, global rate limiting, retry with backoff.
//!
//! Sits between a worker and a fetch backend. Sequence per request, per spec.md §4.4:
//! acquire rate-limit token -> sleep max(delay, jitter) -> dispatch -> retry on transport
//! failure/5xx with exponential backoff. Proxy rotation lives in `StaticBackend` (one client
//! per configured proxy), not here.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;

use crate::model::FetchResult;

type Bucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A permit that holds both the global and per-host concurrency slot for one in-flight
/// request. Dropping it releases both.
pub struct ConcurrencyPermit {
    _global: OwnedSemaphorePermit,
    _host: OwnedSemaphorePermit,
}

pub struct Politeness {
    /// `None` when `rate_limit` is 0/unset — the bucket is then bypassed entirely.
    rate_bucket: Option<Arc<Bucket>>,
    delay: Duration,
    random_delay_range: Duration,
    global_concurrency: Arc<Semaphore>,
    per_host_concurrency: DashMap<String, Arc<Semaphore>>,
    default_per_host: usize,
    max_retries: usize,
}

pub struct RetryOutcome {
    pub result: anyhow::Result<FetchResult>,
    pub attempts: usize,
}

impl Politeness {
    pub fn new(
        global_limit: usize,
        default_per_host: usize,
        rate_limit_per_sec: u32,
        delay: Duration,
        random_delay_range: Duration,
    ) -> Self {
        let rate_bucket = NonZeroU32::new(rate_limit_per_sec)
            .map(|q| Arc::new(RateLimiter::direct(Quota::per_second(q))));
        Self {
            rate_bucket,
            delay,
            random_delay_range,
            global_concurrency: Arc::new(Semaphore::new(global_limit)),
            per_host_concurrency: DashMap::new(),
            default_per_host,
            max_retries: 3,
        }
    }

    fn host_semaphore(&self, host: &str) -> Arc<Semaphore> {
        if let Some(s) = self.per_host_concurrency.get(host) {
            return s.clone();
        }
        let sem = Arc::new(Semaphore::new(self.default_per_host));
        self.per_host_concurrency.insert(host.to_string(), sem.clone());
        sem
    }

    /// Reduce a host's concurrency for `cooldown` after repeated 429/5xx responses, then
    /// restore it.
    pub fn cool_down_host(&self, host: &str, new_limit: usize, cooldown: Duration) {
        let map = self.per_host_concurrency.clone();
        let host = host.to_string();
        let default = self.default_per_host;
        map.insert(host.clone(), Arc::new(Semaphore::new(new_limit)));
        tokio::spawn(async move {
            sleep(cooldown).await;
            map.insert(host.clone(), Arc::new(Semaphore::new(default)));
        });
    }

    /// Acquire the global+per-host concurrency slots for `host`. A suspension point per
    /// spec.md §5.
    pub async fn acquire_concurrency(&self, host: &str) -> ConcurrencyPermit {
        let gperm = self
            .global_concurrency
            .clone()
            .acquire_owned()
            .await
            .expect("global semaphore never closed");
        let hperm = self
            .host_semaphore(host)
            .acquire_owned()
            .await
            .expect("host semaphore never closed");
        ConcurrencyPermit {
            _global: gperm,
            _host: hperm,
        }
    }

    /// Block until a rate-limit token is available (no-op if disabled). A suspension point.
    pub async fn acquire_rate_token(&self) {
        if let Some(bucket) = &self.rate_bucket {
            bucket.until_ready().await;
        }
    }

    /// Sleep the larger of the fixed delay and a uniform-random jitter. A suspension point.
    pub async fn pace(&self) {
        let jitter = if self.random_delay_range.is_zero() {
            Duration::ZERO
        } else {
            let millis = rand::thread_rng().gen_range(0..=self.random_delay_range.as_millis() as u64);
            Duration::from_millis(millis)
        };
        let wait = self.delay.max(jitter);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    /// Run `dispatch` with exponential backoff on transport failure or 5xx (base 500ms,
    /// factor 2, max 3 attempts, full jitter). 4xx responses are not retried — they are
    /// valid `FetchResult`s per spec.md §4.3 and returned immediately.
    pub async fn dispatch_with_retry<F, Fut>(&self, host: &str, mut dispatch: F) -> RetryOutcome
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<FetchResult>>,
    {
        let mut attempt = 0usize;
        let mut backoff_ms = 500u64;
        loop {
            attempt += 1;
            match dispatch().await {
                Ok(result) => {
                    if result.status == 429 || (500..600).contains(&result.status) {
                        self.cool_down_host(host, 1, Duration::from_secs(30));
                    }
                    if result.status >= 500 && attempt < self.max_retries {
                        self.backoff_sleep(&mut backoff_ms).await;
                        continue;
                    }
                    return RetryOutcome {
                        result: Ok(result),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return RetryOutcome {
                            result: Err(e),
                            attempts: attempt,
                        };
                    }
                    self.backoff_sleep(&mut backoff_ms).await;
                }
            }
        }
    }

    async fn backoff_sleep(&self, backoff_ms: &mut u64) {
        let full_jitter = rand::thread_rng().gen_range(0..=*backoff_ms);
        sleep(Duration::from_millis(full_jitter)).await;
        *backoff_ms = (*backoff_ms * 2).min(8_000);
    }
}
