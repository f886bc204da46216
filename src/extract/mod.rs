//! Extractors (C2): pull candidate endpoints and parameters out of a FetchResult.

pub mod html;
pub mod javascript;
pub mod json;

use url::Url;

use crate::model::{
    EndpointSource, Endpoint, ExtractOutput, FetchResult, Method, ParameterSet, ParameterSource, Task,
};
use crate::normalize;

/// Selects and runs the extractor appropriate for `result`'s content type (falling back to
/// sniffing the first 512 bytes when no content-type header is present), then folds in the
/// browser-network findings when the dynamic backend populated `observed_subrequests`, and the
/// query-string parameters of the fetched URL itself (spec.md §4.2 "From a URL's query string
/// -> ParameterSet(source=QUERY)").
pub fn extract(
    result: &FetchResult,
    method: Method,
    depth: u32,
    max_depth: u32,
    tracking_denylist: &[String],
) -> ExtractOutput {
    let mut out = sniff_and_extract(result, depth, max_depth, tracking_denylist);
    out.merge(browser_net_extract(result, depth, tracking_denylist));
    if let Some(params) = query_param_extract(result, method) {
        out.parameters.push(params);
    }
    out
}

fn query_param_extract(result: &FetchResult, method: Method) -> Option<ParameterSet> {
    let url = Url::parse(&result.final_url).ok()?;
    let parameters: std::collections::BTreeMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if parameters.is_empty() {
        return None;
    }
    Some(ParameterSet {
        url: result.final_url.clone(),
        method,
        parameters,
        source: ParameterSource::Query,
    })
}

fn sniff_and_extract(
    result: &FetchResult,
    depth: u32,
    max_depth: u32,
    tracking_denylist: &[String],
) -> ExtractOutput {
    let kind = classify_content(result);
    match kind {
        ContentKind::Html => html::extract(result, depth, max_depth, tracking_denylist),
        ContentKind::Json => json::extract(result, depth, max_depth, tracking_denylist),
        ContentKind::JavaScript => {
            let text = String::from_utf8_lossy(&result.body_bytes);
            javascript::extract(&text, &result.final_url, depth, max_depth, tracking_denylist)
        }
        ContentKind::Other => ExtractOutput::default(),
    }
}

/// Browser-observed subrequests are real requests the page issued, but the URL still has to
/// cross the same canonicalisation boundary as every other discovered endpoint (spec.md §3).
fn browser_net_extract(result: &FetchResult, depth: u32, tracking_denylist: &[String]) -> ExtractOutput {
    let mut out = ExtractOutput::default();
    for sub in &result.observed_subrequests {
        let Ok(canonical) = normalize::canonicalize(&sub.url, tracking_denylist) else {
            continue;
        };
        out.endpoints.push(Endpoint::new(
            canonical,
            sub.method,
            EndpointSource::BrowserNet,
            depth,
        ));
    }
    out
}

enum ContentKind {
    Html,
    Json,
    JavaScript,
    Other,
}

fn classify_content(result: &FetchResult) -> ContentKind {
    if let Some(ct) = &result.content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("html") {
            return ContentKind::Html;
        }
        if ct.contains("json") {
            return ContentKind::Json;
        }
        if ct.contains("javascript") || ct.contains("ecmascript") {
            return ContentKind::JavaScript;
        }
    }
    sniff_body(&result.body_bytes)
}

fn sniff_body(body: &[u8]) -> ContentKind {
    let sample = &body[..body.len().min(512)];
    let text = String::from_utf8_lossy(sample);
    let trimmed = text.trim_start();
    if trimmed.starts_with('<') {
        ContentKind::Html
    } else if trimmed.starts_with('{') || trimmed.starts_with('[') {
        ContentKind::Json
    } else {
        ContentKind::Other
    }
}

/// Clamp a child task's depth, recording endpoints-but-not-enqueuing beyond max_depth per
/// spec.md §4.2. `url` is the raw resolved href/script/fetch target; canonicalised here so
/// every Endpoint/Task this produces is canonical at the moment it crosses into the output
/// (spec.md §3: "every URL crossing a component boundary is canonical"). A URL that fails to
/// canonicalise is dropped — the caller must not enqueue or record it.
pub(crate) fn push_child(
    out: &mut ExtractOutput,
    url: String,
    method: crate::model::Method,
    source: EndpointSource,
    depth: u32,
    max_depth: u32,
    tracking_denylist: &[String],
) {
    let Ok(url) = normalize::canonicalize(&url, tracking_denylist) else {
        return;
    };
    let child_depth = depth + 1;
    out.endpoints.push(Endpoint::new(url.clone(), method, source, child_depth));
    if child_depth <= max_depth {
        out.new_tasks.push(Task {
            url,
            method,
            depth: child_depth,
            referrer: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result_with(ct: Option<&str>, body: &str) -> FetchResult {
        FetchResult {
            final_url: "https://h/page".to_string(),
            status: 200,
            headers: vec![],
            body_bytes: body.as_bytes().to_vec(),
            content_type: ct.map(|s| s.to_string()),
            elapsed: Duration::ZERO,
            truncated: false,
            observed_subrequests: vec![],
        }
    }

    #[test]
    fn classifies_by_content_type() {
        let r = result_with(Some("text/html; charset=utf-8"), "<html></html>");
        assert!(matches!(classify_content(&r), ContentKind::Html));
    }

    #[test]
    fn sniffs_when_content_type_missing() {
        let r = result_with(None, r#"{"a":1}"#);
        assert!(matches!(classify_content(&r), ContentKind::Json));
    }

    #[test]
    fn empty_body_yields_no_findings() {
        let r = result_with(Some("text/html"), "");
        let out = extract(&r, Method::Get, 0, 5, &[]);
        assert!(out.endpoints.is_empty());
        assert!(out.new_tasks.is_empty());
    }

    #[test]
    fn query_string_on_fetched_url_becomes_parameter_set() {
        let mut r = result_with(Some("text/html"), "<html></html>");
        r.final_url = "https://h/search?q=1".to_string();
        let out = extract(&r, Method::Get, 0, 5, &[]);
        let ps = out
            .parameters
            .iter()
            .find(|p| p.source == ParameterSource::Query)
            .expect("query parameter set");
        assert_eq!(ps.parameters.get("q"), Some(&"1".to_string()));
    }

    #[test]
    fn no_query_string_yields_no_query_parameter_set() {
        let r = result_with(Some("text/html"), "<html></html>");
        let out = extract(&r, Method::Get, 0, 5, &[]);
        assert!(!out.parameters.iter().any(|p| p.source == ParameterSource::Query));
    }

    #[test]
    fn push_child_canonicalizes_before_recording() {
        let mut out = ExtractOutput::default();
        push_child(
            &mut out,
            "https://H.example.com:443/a/../b?utm_source=x&keep=1".to_string(),
            Method::Get,
            EndpointSource::HtmlA,
            0,
            5,
            &[],
        );
        assert_eq!(out.endpoints.len(), 1);
        assert_eq!(out.endpoints[0].url, "https://h.example.com/b?keep=1");
        assert_eq!(out.new_tasks[0].url, "https://h.example.com/b?keep=1");
    }

    #[test]
    fn browser_net_extract_canonicalizes_observed_subrequests() {
        let mut r = result_with(Some("text/html"), "");
        r.observed_subrequests = vec![crate::model::FetchRequest::get(
            "https://H.example.com:443/x?utm_source=y",
            Duration::ZERO,
        )];
        let out = extract(&r, Method::Get, 0, 5, &[]);
        assert!(out
            .endpoints
            .iter()
            .any(|e| e.url == "https://h.example.com/x"));
    }
}
