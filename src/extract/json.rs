//! JSON extractor (C2): walks a parsed body looking for string values that look like URLs,
//! reusing the JavaScript extractor's regex sweep on each string leaf, and infers parameter
//! sets from sibling object keys next to a discovered URL (spec.md §4.2).

use serde_json::Value;

use super::javascript;
use crate::model::{ExtractOutput, FetchResult, Method, ParameterSet, ParameterSource};

pub fn extract(
    result: &FetchResult,
    depth: u32,
    max_depth: u32,
    tracking_denylist: &[String],
) -> ExtractOutput {
    let text = String::from_utf8_lossy(&result.body_bytes);
    let mut out = ExtractOutput::default();
    let Ok(value) = serde_json::from_str::<Value>(&text) else {
        return out;
    };
    walk(&value, &result.final_url, depth, max_depth, tracking_denylist, &mut out);
    out
}

fn walk(
    value: &Value,
    base_url: &str,
    depth: u32,
    max_depth: u32,
    tracking_denylist: &[String],
    out: &mut ExtractOutput,
) {
    match value {
        Value::String(s) => {
            out.merge(javascript::extract(s, base_url, depth, max_depth, tracking_denylist));
        }
        Value::Array(items) => {
            for item in items {
                walk(item, base_url, depth, max_depth, tracking_denylist, out);
            }
        }
        Value::Object(map) => {
            let before = out.endpoints.len();
            for (_, v) in map.iter() {
                walk(v, base_url, depth, max_depth, tracking_denylist, out);
            }
            // Any endpoint discovered from a string leaf in this object gets the object's
            // other scalar keys attributed to it as a candidate parameter set.
            let sibling_params = sibling_scalar_keys(map);
            if !sibling_params.is_empty() {
                for endpoint in &out.endpoints[before..] {
                    out.parameters.push(ParameterSet {
                        url: endpoint.url.clone(),
                        method: Method::Get,
                        parameters: sibling_params.clone(),
                        source: ParameterSource::JsInferred,
                    });
                }
            }
        }
        _ => {}
    }
}

fn sibling_scalar_keys(map: &serde_json::Map<String, Value>) -> std::collections::BTreeMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k.clone(), s.clone())),
            Value::Number(n) => Some((k.clone(), n.to_string())),
            Value::Bool(b) => Some((k.clone(), b.to_string())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(body: &str) -> FetchResult {
        FetchResult {
            final_url: "https://h/api".to_string(),
            status: 200,
            headers: vec![],
            body_bytes: body.as_bytes().to_vec(),
            content_type: Some("application/json".to_string()),
            elapsed: Duration::ZERO,
            truncated: false,
            observed_subrequests: vec![],
        }
    }

    #[test]
    fn finds_url_in_nested_array() {
        let body = r#"{"data":[{"self":"/api/v1/items/1"}]}"#;
        let out = extract(&result(body), 0, 5, &[]);
        assert!(out.endpoints.iter().any(|e| e.url == "https://h/api/v1/items/1"));
    }

    #[test]
    fn invalid_json_yields_no_findings() {
        let out = extract(&result("not json"), 0, 5, &[]);
        assert!(out.endpoints.is_empty());
    }

    #[test]
    fn infers_sibling_keys_as_parameters() {
        let body = r#"{"link":"/search","q":"rust","page":2}"#;
        let out = extract(&result(body), 0, 5, &[]);
        let ps = out
            .parameters
            .iter()
            .find(|p| p.url == "https://h/search")
            .expect("parameter set for discovered url");
        assert!(ps.parameters.contains_key("q"));
        assert!(ps.parameters.contains_key("page"));
    }

    #[test]
    fn empty_object_yields_nothing() {
        let out = extract(&result("{}"), 0, 5, &[]);
        assert!(out.endpoints.is_empty());
        assert!(out.parameters.is_empty());
    }
}
