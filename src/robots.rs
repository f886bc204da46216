//! Optional robots.txt compliance (spec.md §9 Open Question: the source does not honour
//! robots.txt; off by default, available for defensive/legal-use callers via
//! `config.respect_robots`).

use std::collections::HashMap;

use parking_lot::Mutex;
use url::Url;

/// Disallow rules for one origin, keyed by user-agent (`*` is the catch-all group).
#[derive(Debug, Default, Clone)]
struct RobotsRules {
    disallow: Vec<String>,
}

/// Fetches and caches `/robots.txt` per origin the first time it is consulted. Only the `*`
/// user-agent group and `Disallow` directives are honoured — enough to keep a polite crawl
/// out of paths an operator has explicitly fenced off, without building a full RFC 9309
/// matcher.
pub struct RobotsGate {
    cache: Mutex<HashMap<String, RobotsRules>>,
}

impl RobotsGate {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch (if not already cached) and evaluate `url` against its origin's robots.txt.
    /// Network failures are treated as "no robots.txt" (allow), matching common crawler
    /// practice — a fatal dependency on a frequently-missing file would be a poor tradeoff.
    pub async fn is_allowed(&self, client: &reqwest::Client, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let origin = format!(
            "{}://{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default()
        );

        let cached = { self.cache.lock().get(&origin).cloned() };
        let rules = match cached {
            Some(r) => r,
            None => {
                let fetched = fetch_rules(client, &origin).await.unwrap_or_default();
                self.cache.lock().insert(origin, fetched.clone());
                fetched
            }
        };

        let path = parsed.path();
        !rules.disallow.iter().any(|rule| path.starts_with(rule))
    }
}

impl Default for RobotsGate {
    fn default() -> Self {
        Self::new()
    }
}

async fn fetch_rules(client: &reqwest::Client, origin: &str) -> anyhow::Result<RobotsRules> {
    let text = client
        .get(format!("{origin}/robots.txt"))
        .send()
        .await?
        .text()
        .await?;
    Ok(parse_robots_txt(&text))
}

/// Parse only the `User-agent: *` group's `Disallow` lines.
fn parse_robots_txt(text: &str) -> RobotsRules {
    let mut in_wildcard_group = false;
    let mut disallow = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        match key.as_str() {
            "user-agent" => in_wildcard_group = value == "*",
            "disallow" if in_wildcard_group && !value.is_empty() => {
                disallow.push(value.to_string());
            }
            _ => {}
        }
    }
    RobotsRules { disallow }
}
