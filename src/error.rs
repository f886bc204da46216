use thiserror::Error;

/// Fatal conditions that abort a run before or during scheduling.
///
/// Recoverable conditions (scope rejection, dedup hits, parse failures, truncation) are
/// never represented here — they are absorbed locally by the component that hit them and
/// surfaced only as stats counters or `tracing::warn!` calls.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("headless browser backend unavailable: {0}")]
    BackendUnavailable(String),
}
