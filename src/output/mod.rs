//! Output (external collaborator): pipeline-mode filters and result-file writers over the
//! core's `ScanResult`, generalising `output/writer_csv.rs`/`writer_jsonl.rs`'s "one function
//! per format" shape onto the new data model instead of `RawEvent`.

use std::fs;
use std::path::Path;

use crate::model::ScanResult;

/// One of the mutually-exclusive `-pipe*` flags from spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// `-pipeurl`: one endpoint URL per line.
    Url,
    /// `-pipeendpoint`: `METHOD URL` per line.
    Endpoint,
    /// `-pipeparam`: the URL with its query string, one per line.
    Param,
    /// `-pipejson`: the whole result struct as a single JSON document.
    Json,
}

/// Render `result` for one pipeline mode. `Json` returns pretty-printed JSON; the others
/// return newline-joined lines suitable for piping into another tool.
pub fn render_pipeline(result: &ScanResult, mode: PipelineMode) -> anyhow::Result<String> {
    match mode {
        PipelineMode::Url => Ok(result
            .endpoints
            .iter()
            .map(|e| e.url.as_str())
            .collect::<Vec<_>>()
            .join("\n")),
        PipelineMode::Endpoint => Ok(result
            .endpoints
            .iter()
            .map(|e| format!("{} {}", e.method, e.url))
            .collect::<Vec<_>>()
            .join("\n")),
        PipelineMode::Param => Ok(result
            .parameters
            .iter()
            .map(|p| {
                let qs = p
                    .parameters
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("&");
                if qs.is_empty() {
                    p.url.clone()
                } else {
                    format!("{}?{}", p.url, qs)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")),
        PipelineMode::Json => Ok(serde_json::to_string_pretty(result)?),
    }
}

/// A short human-readable summary for the non-pipeline default run, in `write_top_txt`'s
/// vein: a handful of headline numbers rather than the full dump.
pub fn plain_summary(result: &ScanResult) -> String {
    format!(
        "endpoints: {}  forms: {}  parameters: {}\nfetched: {}  failed: {}  deduped: {}  elapsed: {}ms{}",
        result.endpoints.len(),
        result.forms.len(),
        result.parameters.len(),
        result.stats.fetched,
        result.stats.failed,
        result.stats.deduped,
        result.stats.elapsed_ms,
        if result.cancelled { "  (cancelled)" } else { "" },
    )
}

/// Write the full result struct as JSON to `path`, creating parent directories as needed.
pub fn write_result_json(path: &Path, result: &ScanResult) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Endpoint, EndpointSource, Method, ParameterSet, ParameterSource, ScanStats};
    use std::collections::BTreeMap;

    fn sample_result() -> ScanResult {
        ScanResult {
            endpoints: vec![Endpoint::new(
                "https://h/a".to_string(),
                Method::Get,
                EndpointSource::HtmlA,
                0,
            )],
            forms: vec![],
            parameters: vec![ParameterSet {
                url: "https://h/search".to_string(),
                method: Method::Get,
                parameters: BTreeMap::from([("q".to_string(), "1".to_string())]),
                source: ParameterSource::Query,
            }],
            stats: ScanStats {
                fetched: 2,
                failed: 0,
                deduped: 1,
                elapsed_ms: 10,
            },
            cancelled: false,
        }
    }

    #[test]
    fn renders_url_mode() {
        let out = render_pipeline(&sample_result(), PipelineMode::Url).unwrap();
        assert_eq!(out, "https://h/a");
    }

    #[test]
    fn renders_endpoint_mode() {
        let out = render_pipeline(&sample_result(), PipelineMode::Endpoint).unwrap();
        assert_eq!(out, "GET https://h/a");
    }

    #[test]
    fn renders_param_mode_with_query_string() {
        let out = render_pipeline(&sample_result(), PipelineMode::Param).unwrap();
        assert_eq!(out, "https://h/search?q=1");
    }

    #[test]
    fn renders_json_mode_as_valid_json() {
        let out = render_pipeline(&sample_result(), PipelineMode::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["stats"]["fetched"], 2);
    }

    #[test]
    fn plain_summary_mentions_counts() {
        let summary = plain_summary(&sample_result());
        assert!(summary.contains("endpoints: 1"));
        assert!(summary.contains("fetched: 2"));
    }
}
