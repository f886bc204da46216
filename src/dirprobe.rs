//! Directory Prober (C7): wordlist-driven existence probing, seeded from every directory
//! prefix (a path ending in `/`) discovered during the crawl. Runs as a parallel task source
//! feeding the same Frontier/Politeness path as ordinary crawl tasks (spec.md §4.7).

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::model::{Method, Task};

pub struct DirProber {
    words: Vec<String>,
    seen_prefixes: Mutex<HashSet<String>>,
}

impl DirProber {
    pub fn new(words: Vec<String>) -> Self {
        Self {
            words,
            seen_prefixes: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.words.is_empty()
    }

    /// `url` is a directory prefix if its path ends in `/`. Returns one HEAD task per
    /// wordlist entry the first time this exact prefix is seen; an empty wordlist is a
    /// documented no-op (spec.md §8).
    pub fn expand(&self, url: &str, depth: u32) -> Vec<Task> {
        if self.words.is_empty() || !url.ends_with('/') {
            return Vec::new();
        }
        {
            let mut seen = self.seen_prefixes.lock();
            if !seen.insert(url.to_string()) {
                return Vec::new();
            }
        }
        self.words
            .iter()
            .map(|word| Task {
                url: format!("{url}{word}"),
                method: Method::Head,
                depth,
                referrer: Some(url.to_string()),
            })
            .collect()
    }
}

/// A probe response is treated as "exists" per spec.md §4.7: any 2xx/3xx, or 401/403.
pub fn probe_indicates_existence(status: u16) -> bool {
    (200..400).contains(&status) || status == 401 || status == 403
}
