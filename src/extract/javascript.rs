//! JavaScript extractor (C2): LinkFinder-style regex sweep over inline/external script
//! bodies, generalising `gather/js_fisher.rs`'s narrow `fetch(...)`-only regex into a
//! fuller URL-literal and parameter-name pattern set.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::model::{EndpointSource, ExtractOutput, Method, ParameterSet, ParameterSource};
use crate::normalize;

const MAX_MATCH_LEN: usize = 2048;

/// Quoted string literals (single/double/back-tick) that look like an absolute URL, a
/// root-relative path, a path-relative path, or a REST-style `{name}` template.
static URL_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"["'`](https?://[^"'`\s]{3,}|/(?:[\w\-.~%!$&'()*+,;=:@/]|\{[A-Za-z0-9_]+\})*[\w\-/]|\.{1,2}/[\w\-./]*[\w\-])["'`]"#,
    )
    .expect("static regex is valid")
});

/// Apparent parameter names: `?foo=`, `&foo=`, or REST-template `{foo:` / `{foo}` segments.
static PARAM_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[?&]([A-Za-z_][A-Za-z0-9_]{0,63})=|\{([A-Za-z_][A-Za-z0-9_]{0,63})[:}]"#)
        .expect("static regex is valid")
});

static MIME_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z]+/[a-zA-Z0-9.+-]+$").expect("static regex is valid")
});

fn looks_like_mime(candidate: &str) -> bool {
    MIME_LIKE.is_match(candidate)
}

fn is_plausible_url_fragment(candidate: &str) -> bool {
    if candidate.len() > MAX_MATCH_LEN {
        return false;
    }
    if looks_like_mime(candidate) {
        return false;
    }
    // Reject single-word tokens with no path separator or dot (spec.md §4.2 (ii)).
    if !candidate.contains('/') && !candidate.contains('.') {
        return false;
    }
    true
}

/// Run the regex sweep over `text`; `base_url` resolves relative matches. Findings beyond
/// `max_depth` are still recorded as endpoints but not enqueued (handled by `push_child`).
pub fn extract(
    text: &str,
    base_url: &str,
    depth: u32,
    max_depth: u32,
    tracking_denylist: &[String],
) -> ExtractOutput {
    let mut out = ExtractOutput::default();
    let base = Url::parse(base_url).ok();

    for cap in URL_LITERAL.captures_iter(text) {
        let Some(m) = cap.get(1) else { continue };
        let candidate = m.as_str();
        if !is_plausible_url_fragment(candidate) {
            continue;
        }
        let Some(resolved) = resolve(candidate, base.as_ref()) else {
            continue;
        };
        // ParameterSet is built directly here rather than through push_child, so the resolved
        // URL needs its own canonicalisation before it crosses into the output (spec.md §3).
        let Ok(canonical) = normalize::canonicalize(&resolved, tracking_denylist) else {
            continue;
        };
        let source = if candidate.starts_with("http") {
            EndpointSource::ExtJs
        } else {
            EndpointSource::InlineJs
        };
        super::push_child(&mut out, canonical.clone(), Method::Get, source, depth, max_depth, tracking_denylist);

        let params = extract_param_names(candidate);
        if !params.is_empty() {
            out.parameters.push(ParameterSet {
                url: canonical,
                method: Method::Get,
                parameters: params.into_iter().map(|p| (p, String::new())).collect(),
                source: ParameterSource::JsInferred,
            });
        }
    }

    out
}

fn extract_param_names(fragment: &str) -> std::collections::BTreeMap<String, String> {
    let mut names = std::collections::BTreeMap::new();
    for cap in PARAM_NAME.captures_iter(fragment) {
        let name = cap.get(1).or_else(|| cap.get(2)).map(|m| m.as_str().to_string());
        if let Some(name) = name {
            names.insert(name, String::new());
        }
    }
    names
}

fn resolve(candidate: &str, base: Option<&Url>) -> Option<String> {
    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return Some(candidate.to_string());
    }
    let base = base?;
    base.join(candidate).ok().map(|u| u.to_string())
}
