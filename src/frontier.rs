//! Frontier & De-duplicator (C5).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, Notify};

use crate::model::{Method, Task};
use crate::normalize::{self, SkipReason};

/// FIFO work queue of Tasks with a companion visited set keyed on `(method, canonical
/// dedup url)`. `push` is idempotent: concurrent pushes of the same key enqueue exactly once.
pub struct Frontier {
    queue: Mutex<VecDeque<Task>>,
    visited: DashMap<(Method, String), ()>,
    in_flight: AtomicUsize,
    notify: Notify,
    tracking_denylist: Vec<String>,
}

/// Outcome of a `push` attempt, surfaced to callers that track stats (deduped / skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    OutOfScope,
    AlreadyVisited,
    Unparseable,
}

impl Frontier {
    pub fn new(tracking_denylist: Vec<String>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            visited: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            notify: Notify::new(),
            tracking_denylist,
        }
    }

    /// Canonicalise, check scope, check-and-mark visited; enqueue if new.
    pub async fn push(
        &self,
        task: Task,
        in_scope: impl FnOnce(&str) -> bool,
    ) -> PushOutcome {
        let canonical = match normalize::canonicalize(&task.url, &self.tracking_denylist) {
            Ok(c) => c,
            Err(SkipReason::Unparseable) => return PushOutcome::Unparseable,
        };

        if !in_scope(&canonical) {
            return PushOutcome::OutOfScope;
        }

        let dedup_key = (task.method, normalize::dedup_key_url(&canonical));
        // `DashMap::insert` returning `None` means this call performed the first insert —
        // the single atomic operation that makes concurrent pushes of the same key enqueue
        // exactly once.
        if self.visited.insert(dedup_key, ()).is_some() {
            return PushOutcome::AlreadyVisited;
        }

        let mut task = task;
        task.url = canonical;
        self.queue.lock().await.push_back(task);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
        PushOutcome::Enqueued
    }

    /// Remove the head of the queue. Blocks while the queue is empty and in-flight work
    /// remains; returns `None` once the queue is empty and no in-flight workers remain —
    /// the termination signal.
    pub async fn pop(&self) -> Option<Task> {
        loop {
            {
                let mut q = self.queue.lock().await;
                if let Some(task) = q.pop_front() {
                    return Some(task);
                }
            }
            // Register as a waiter before re-checking `in_flight`: `task_done()` signals via
            // `notify_waiters()`, which only wakes waiters already registered at the time it
            // runs. Checking the count first and registering after would miss a `task_done()`
            // that lands in between, blocking this worker forever.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return None;
            }
            notified.await;
        }
    }

    /// A worker calls this once it has finished extracting from a popped task — the
    /// corresponding `in_flight` slot is released.
    pub fn task_done(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

pub type SharedFrontier = Arc<Frontier>;
