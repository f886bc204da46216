//! Controller: orchestrates C1-C8 for one run. Owns the cancellation token and every piece of
//! shared state (Frontier, Aggregator, Politeness, rate bucket) — created here at scan start,
//! dropped at scan end, and injected into workers explicitly (spec.md §9: "no process-wide
//! singletons").

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::config::{BackendMode, ScanConfig};
use crate::dirprobe::DirProber;
use crate::error::ScanError;
use crate::fetch::dynamic_backend::DynamicBackend;
use crate::fetch::static_backend::StaticBackend;
use crate::fetch::Backend;
use crate::frontier::Frontier;
use crate::model::ScanResult;
use crate::normalize;
use crate::politeness::Politeness;
use crate::robots::RobotsGate;
use crate::scheduler::{self, ScanStatsCounters, WorkerContext};

/// Run one scan to completion (or cancellation). `external_cancel` lets the caller trigger
/// cancellation (timeout, Ctrl-C, a fatal condition elsewhere); the controller also enforces
/// `config.run_timeout` itself when set.
pub async fn run(config: ScanConfig, external_cancel: CancellationToken) -> Result<ScanResult, ScanError> {
    config.validate().map_err(ScanError::Configuration)?;

    let start = Instant::now();
    let cancel = external_cancel;

    if let Some(run_timeout) = config.run_timeout {
        let cancel_for_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(run_timeout).await;
            cancel_for_timeout.cancel();
        });
    }

    let frontier = Arc::new(Frontier::new(config.tracking_denylist.clone()));
    let aggregator = Arc::new(Aggregator::new());
    let dirprober = Arc::new(DirProber::new(config.wordlist.clone()));

    let politeness = Arc::new(Politeness::new(
        config.concurrency,
        default_per_host(config.concurrency),
        config.rate_limit,
        config.delay,
        config.random_delay_range,
    ));

    let robots = if config.respect_robots {
        Some(Arc::new(RobotsGate::new()))
    } else {
        None
    };
    let robots_client = reqwest::Client::builder()
        .user_agent(user_agent())
        .build()
        .map_err(|e| ScanError::Configuration(format!("failed to build robots.txt client: {e}")))?;

    let (backend, request_timeout): (Arc<dyn Backend>, Duration) = match config.mode {
        BackendMode::Static => {
            let b = StaticBackend::new(5, config.max_body_bytes, &config.proxies, user_agent(), &config.cookies)
                .map_err(|e| ScanError::Configuration(format!("failed to build static backend: {e}")))?;
            (Arc::new(b), config.static_timeout)
        }
        BackendMode::Dynamic => {
            let b = DynamicBackend::launch(config.headless, config.concurrency, config.wait_time, config.dynamic_timeout)
                .await
                .map_err(|e| ScanError::BackendUnavailable(e.to_string()))?;
            (Arc::new(b), config.dynamic_timeout)
        }
    };

    let targets = config.targets.clone();
    let in_scope: Box<dyn Fn(&str) -> bool + Send + Sync> =
        Box::new(move |url: &str| targets.iter().any(|t| normalize::in_scope(t, url)));

    scheduler::seed(&frontier, &config, |url| (in_scope)(url)).await;

    let ctx = Arc::new(WorkerContext {
        frontier: frontier.clone(),
        politeness,
        backend,
        aggregator: aggregator.clone(),
        dirprober,
        robots,
        robots_client,
        max_depth: config.max_depth,
        request_timeout,
        default_headers: config.headers.clone(),
        tracking_denylist: config.tracking_denylist.clone(),
        cancel: cancel.clone(),
        stats: ScanStatsCounters::default(),
        in_scope,
    });

    scheduler::run_pool(ctx.clone(), config.concurrency).await;

    let cancelled = cancel.is_cancelled();
    let fetched = ctx.stats.fetched.load(std::sync::atomic::Ordering::Relaxed);
    let failed = ctx.stats.failed.load(std::sync::atomic::Ordering::Relaxed);
    let deduped = ctx.stats.deduped.load(std::sync::atomic::Ordering::Relaxed);

    let (endpoints, forms, parameters) = aggregator.finalise();

    Ok(ScanResult {
        endpoints,
        forms,
        parameters,
        stats: crate::model::ScanStats {
            fetched,
            failed,
            deduped,
            elapsed_ms: start.elapsed().as_millis() as u64,
        },
        cancelled,
    })
}

fn default_per_host(concurrency: usize) -> usize {
    (concurrency / 2).max(1)
}

fn user_agent() -> &'static str {
    concat!("endabyss/", env!("CARGO_PKG_VERSION"))
}
