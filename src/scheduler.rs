//! Worker Pool / Scheduler (C6): a fixed-size pool of workers pulling from the Frontier,
//! generalising `runner.rs`'s `buffer_unordered` stream pump and `concurrent.rs`'s
//! `ConcurrentProbe` into an explicit loop with cancellation observed at every suspension
//! point (spec.md §4.6/§5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::aggregator::Aggregator;
use crate::config::ScanConfig;
use crate::dirprobe::{self, DirProber};
use crate::extract;
use crate::fetch::Backend;
use crate::frontier::{Frontier, PushOutcome};
use crate::model::{FetchRequest, Task};
use crate::normalize;
use crate::politeness::Politeness;
use crate::robots::RobotsGate;

#[derive(Default)]
pub struct ScanStatsCounters {
    pub fetched: AtomicU64,
    pub failed: AtomicU64,
    pub deduped: AtomicU64,
}

pub struct WorkerContext {
    pub frontier: Arc<Frontier>,
    pub politeness: Arc<Politeness>,
    pub backend: Arc<dyn Backend>,
    pub aggregator: Arc<Aggregator>,
    pub dirprober: Arc<DirProber>,
    pub robots: Option<Arc<RobotsGate>>,
    pub robots_client: reqwest::Client,
    pub max_depth: u32,
    pub request_timeout: Duration,
    pub default_headers: Vec<(String, String)>,
    pub tracking_denylist: Vec<String>,
    pub cancel: CancellationToken,
    pub stats: ScanStatsCounters,
    pub in_scope: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
        .unwrap_or_default()
}

/// Run `concurrency` workers to completion: either the Frontier drains and idles (natural
/// termination) or `ctx.cancel` fires.
pub async fn run_pool(ctx: Arc<WorkerContext>, concurrency: usize) {
    let mut handles = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move { worker_loop(ctx).await }));
    }
    for h in handles {
        let _ = h.await;
    }
    ctx.backend.close().await;
}

async fn worker_loop(ctx: Arc<WorkerContext>) {
    loop {
        let task = tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            task = ctx.frontier.pop() => task,
        };
        let Some(task) = task else { return };

        if ctx.cancel.is_cancelled() {
            ctx.frontier.task_done();
            continue;
        }

        process_task(&ctx, task).await;
        ctx.frontier.task_done();
    }
}

async fn process_task(ctx: &WorkerContext, task: Task) {
    let host = host_of(&task.url);

    if let Some(robots) = &ctx.robots {
        if !robots.is_allowed(&ctx.robots_client, &task.url).await {
            return;
        }
    }

    ctx.politeness.acquire_rate_token().await;
    ctx.politeness.pace().await;
    let _permit = ctx.politeness.acquire_concurrency(&host).await;

    let request = FetchRequest {
        url: task.url.clone(),
        method: task.method,
        headers: ctx.default_headers.clone(),
        body: None,
        timeout: ctx.request_timeout,
    };
    let backend = ctx.backend.clone();
    let outcome = ctx
        .politeness
        .dispatch_with_retry(&host, move || {
            let backend = backend.clone();
            let request = request.clone();
            async move { backend.fetch(request).await }
        })
        .await;

    let mut result = match outcome.result {
        Ok(r) => r,
        Err(e) => {
            ctx.stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(url = %task.url, error = %e, "transport error, dropping task");
            return;
        }
    };

    ctx.stats.fetched.fetch_add(1, Ordering::Relaxed);

    // A redirect can carry a default port / tracking params / dot-segments into
    // `final_url`; canonicalise it once here so the scope re-check, the recorded
    // endpoints, and the extraction base all see the same canonical form (spec.md §3:
    // "A FetchResult's final_url is itself canonical and re-checked for scope").
    let Ok(final_url) = normalize::canonicalize(&result.final_url, &ctx.tracking_denylist) else {
        tracing::debug!(url = %result.final_url, "final_url failed to canonicalize, dropping");
        return;
    };
    result.final_url = final_url;

    if !(ctx.in_scope)(&result.final_url) {
        tracing::debug!(url = %result.final_url, "final_url out of scope after redirect, dropping");
        return;
    }

    // Seeds are the only tasks that enter the frontier with neither a referrer nor a prior
    // discovery site (`scheduler::seed`) — everything else was already recorded as an
    // Endpoint by `extract::push_child` at the moment it was discovered. Record them here so
    // a seed URL shows up in the output even when nothing links back to it (spec.md §8
    // scenario 1).
    if task.referrer.is_none() && task.depth == 0 {
        let mut seed_endpoint = crate::model::Endpoint::new(
            result.final_url.clone(),
            task.method,
            crate::model::EndpointSource::Seed,
            0,
        );
        seed_endpoint.status = Some(result.status);
        seed_endpoint.content_type = result.content_type.clone();
        ctx.aggregator.record_endpoint(seed_endpoint);
    }

    if ctx.dirprober.is_active() {
        for probe_task in ctx.dirprober.expand(&result.final_url, task.depth) {
            push_task(ctx, probe_task).await;
        }
    }

    // A dirprobe-originated task is the only kind that ever carries a `referrer` today
    // (ordinary crawl tasks leave it `None`) — used here to tell a probe response apart
    // from an organic fetch without threading an extra flag through `Task`.
    let is_probe_task = task.referrer.is_some();
    if is_probe_task && task.method == crate::model::Method::Head && result.status == 405 {
        push_task(
            ctx,
            Task {
                url: task.url.clone(),
                method: crate::model::Method::Get,
                depth: task.depth,
                referrer: task.referrer.clone(),
            },
        )
        .await;
        return;
    }
    if is_probe_task && dirprobe::probe_indicates_existence(result.status) {
        ctx.aggregator.record_endpoint(crate::model::Endpoint::new(
            result.final_url.clone(),
            task.method,
            crate::model::EndpointSource::Dirscan,
            task.depth,
        ));
    }

    let mut output = extract::extract(
        &result,
        task.method,
        task.depth,
        ctx.max_depth,
        &ctx.tracking_denylist,
    );
    for endpoint in &mut output.endpoints {
        if endpoint.url == result.final_url {
            endpoint.status = Some(result.status);
            endpoint.content_type = result.content_type.clone();
        }
    }

    for new_task in std::mem::take(&mut output.new_tasks) {
        push_task(ctx, new_task).await;
    }
    for endpoint in output.endpoints {
        ctx.aggregator.record_endpoint(endpoint);
    }
    for form in output.forms {
        ctx.aggregator.record_form(form);
    }
    for params in output.parameters {
        ctx.aggregator.record_parameter_set(params);
    }
}

async fn push_task(ctx: &WorkerContext, task: Task) {
    let in_scope = &ctx.in_scope;
    match ctx.frontier.push(task, |url| in_scope(url)).await {
        PushOutcome::Enqueued => {}
        PushOutcome::AlreadyVisited | PushOutcome::OutOfScope | PushOutcome::Unparseable => {
            ctx.stats.deduped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Seed the frontier from the configured targets.
pub async fn seed(frontier: &Frontier, config: &ScanConfig, in_scope: impl Fn(&str) -> bool) {
    for target in &config.targets {
        let task = Task {
            url: target.seed_url.clone(),
            method: crate::model::Method::Get,
            depth: 0,
            referrer: None,
        };
        frontier.push(task, |url| in_scope(url)).await;
    }
}
