//! Core configuration input. Populated by the external collaborator (CLI, library caller);
//! the crawl engine only ever reads from it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{ScopeMode, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendMode {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub targets: Vec<Target>,
    pub mode: BackendMode,
    pub max_depth: u32,
    pub concurrency: usize,
    pub delay: Duration,
    pub random_delay_range: Duration,
    pub rate_limit: u32,
    pub proxies: Vec<String>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub max_body_bytes: u64,
    pub static_timeout: Duration,
    pub dynamic_timeout: Duration,
    pub headless: bool,
    pub wait_time: Duration,
    pub dirscan: bool,
    pub wordlist: Vec<String>,
    pub tracking_denylist: Vec<String>,
    pub respect_robots: bool,
    pub run_timeout: Option<Duration>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            mode: BackendMode::Static,
            max_depth: 5,
            concurrency: 10,
            delay: Duration::from_millis(0),
            random_delay_range: Duration::from_millis(0),
            rate_limit: 0,
            proxies: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            max_body_bytes: 10 * 1024 * 1024,
            static_timeout: Duration::from_secs(10),
            dynamic_timeout: Duration::from_secs(30),
            headless: true,
            wait_time: Duration::from_secs(2),
            dirscan: false,
            wordlist: Vec::new(),
            tracking_denylist: Vec::new(),
            respect_robots: false,
            run_timeout: None,
        }
    }
}

impl ScanConfig {
    /// Bound-check configuration values. Never panics — callers decide how to surface a
    /// `Configuration` error (see `error::ScanError`).
    pub fn validate(&self) -> Result<(), String> {
        if self.targets.is_empty() {
            return Err("at least one target is required".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }
        if self.max_depth > 1000 {
            return Err(format!("max_depth should not exceed 1000 (got {})", self.max_depth));
        }
        if self.static_timeout.is_zero() || self.dynamic_timeout.is_zero() {
            return Err("per-request timeouts must be greater than 0".to_string());
        }
        if self.max_body_bytes == 0 {
            return Err("max_body_bytes must be greater than 0".to_string());
        }
        // A 0-entry wordlist with dirscan enabled is a documented no-op (spec.md §8), not an
        // error, so there is deliberately no check rejecting it here.
        Ok(())
    }

    pub fn single(target: Target) -> Self {
        Self {
            targets: vec![target],
            ..Default::default()
        }
    }
}

pub fn parse_target(raw: &str, scope_mode: ScopeMode) -> anyhow::Result<Target> {
    let url = url::Url::parse(raw)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("target URL has no host: {raw}"))?
        .to_string();
    Ok(Target {
        scheme: url.scheme().to_string(),
        host,
        port: url.port(),
        path_prefix: {
            let p = url.path();
            if p.is_empty() { "/".to_string() } else { p.to_string() }
        },
        scope_mode,
        seed_url: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_once_targeted() {
        let mut cfg = ScanConfig::default();
        assert!(cfg.validate().is_err());
        cfg.targets.push(parse_target("https://h.com/", ScopeMode::SameRegisteredDomain).unwrap());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut cfg = ScanConfig::single(parse_target("https://h.com/", ScopeMode::SameHost).unwrap());
        cfg.concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_wordlist_with_dirscan_is_not_an_error() {
        let mut cfg = ScanConfig::single(parse_target("https://h.com/", ScopeMode::SameHost).unwrap());
        cfg.dirscan = true;
        assert!(cfg.validate().is_ok());
    }
}
