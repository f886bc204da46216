//! HTML extractor (C2): selector-driven DOM walk built on `scraper`, generalising the
//! selector-list pattern the pack's link-extraction module uses, with inline `<script>`
//! bodies recursed into the JavaScript extractor per spec.md §4.2.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::javascript;
use crate::model::{
    EndpointSource, ExtractOutput, FetchResult, Form, FormField, InputType, Method, ParameterSet,
    ParameterSource,
};
use crate::normalize;

static SEL_A: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static SEL_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("link[href]").unwrap());
static SEL_SCRIPT_SRC: Lazy<Selector> = Lazy::new(|| Selector::parse("script[src]").unwrap());
static SEL_SCRIPT_INLINE: Lazy<Selector> = Lazy::new(|| Selector::parse("script:not([src])").unwrap());
static SEL_IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());
static SEL_IFRAME: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe[src]").unwrap());
static SEL_FORM: Lazy<Selector> = Lazy::new(|| Selector::parse("form").unwrap());
static SEL_FORM_FIELD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input[name], textarea[name], select[name]").unwrap());
static SEL_META_REFRESH: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[http-equiv="refresh" i]"#).unwrap());
static SEL_DATA_URL: Lazy<Selector> = Lazy::new(|| Selector::parse("[data-url]").unwrap());
static SEL_DATA_HREF: Lazy<Selector> = Lazy::new(|| Selector::parse("[data-href]").unwrap());

pub fn extract(result: &FetchResult, depth: u32, max_depth: u32, tracking_denylist: &[String]) -> ExtractOutput {
    let text = String::from_utf8_lossy(&result.body_bytes);
    let doc = Html::parse_document(&text);
    let base = Url::parse(&result.final_url).ok();
    let mut out = ExtractOutput::default();

    for el in doc.select(&SEL_A) {
        push_attr(&mut out, &el, "href", base.as_ref(), EndpointSource::HtmlA, depth, max_depth, tracking_denylist);
    }
    for el in doc.select(&SEL_LINK) {
        push_attr(&mut out, &el, "href", base.as_ref(), EndpointSource::HtmlAttr, depth, max_depth, tracking_denylist);
    }
    for el in doc.select(&SEL_SCRIPT_SRC) {
        push_attr(&mut out, &el, "src", base.as_ref(), EndpointSource::HtmlAttr, depth, max_depth, tracking_denylist);
    }
    for el in doc.select(&SEL_IMG) {
        push_attr(&mut out, &el, "src", base.as_ref(), EndpointSource::HtmlAttr, depth, max_depth, tracking_denylist);
    }
    for el in doc.select(&SEL_IFRAME) {
        push_attr(&mut out, &el, "src", base.as_ref(), EndpointSource::HtmlAttr, depth, max_depth, tracking_denylist);
    }
    for el in doc.select(&SEL_DATA_URL) {
        push_attr(&mut out, &el, "data-url", base.as_ref(), EndpointSource::HtmlAttr, depth, max_depth, tracking_denylist);
    }
    for el in doc.select(&SEL_DATA_HREF) {
        push_attr(&mut out, &el, "data-href", base.as_ref(), EndpointSource::HtmlAttr, depth, max_depth, tracking_denylist);
    }
    for el in doc.select(&SEL_META_REFRESH) {
        if let Some(content) = el.value().attr("content") {
            if let Some(target) = parse_refresh_target(content) {
                push_resolved(&mut out, &target, base.as_ref(), EndpointSource::HtmlAttr, depth, max_depth, tracking_denylist);
            }
        }
    }
    for form in doc.select(&SEL_FORM) {
        extract_form(&mut out, form, base.as_ref(), depth, max_depth, tracking_denylist);
    }
    for script in doc.select(&SEL_SCRIPT_INLINE) {
        let body = script.text().collect::<String>();
        if !body.trim().is_empty() {
            out.merge(javascript::extract(&body, &result.final_url, depth, max_depth, tracking_denylist));
        }
    }

    out
}

fn push_attr(
    out: &mut ExtractOutput,
    el: &ElementRef,
    attr: &str,
    base: Option<&Url>,
    source: EndpointSource,
    depth: u32,
    max_depth: u32,
    tracking_denylist: &[String],
) {
    let Some(raw) = el.value().attr(attr) else { return };
    push_resolved(out, raw, base, source, depth, max_depth, tracking_denylist);
}

fn push_resolved(
    out: &mut ExtractOutput,
    raw: &str,
    base: Option<&Url>,
    source: EndpointSource,
    depth: u32,
    max_depth: u32,
    tracking_denylist: &[String],
) {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') || raw.starts_with("javascript:") || raw.starts_with("mailto:") {
        return;
    }
    let Some(resolved) = resolve(raw, base) else { return };
    super::push_child(out, resolved, Method::Get, source, depth, max_depth, tracking_denylist);
}

fn resolve(raw: &str, base: Option<&Url>) -> Option<String> {
    if let Ok(abs) = Url::parse(raw) {
        return Some(abs.to_string());
    }
    base?.join(raw).ok().map(|u| u.to_string())
}

/// `content="5; url=/next"` -> `/next`.
fn parse_refresh_target(content: &str) -> Option<String> {
    let (_, rest) = content.split_once(';')?;
    let rest = rest.trim();
    let target = rest.strip_prefix("url=").or_else(|| rest.strip_prefix("URL="))?;
    let target = target.trim().trim_matches('\'').trim_matches('"');
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

fn extract_form(
    out: &mut ExtractOutput,
    form: ElementRef,
    base: Option<&Url>,
    depth: u32,
    max_depth: u32,
    tracking_denylist: &[String],
) {
    let method = form
        .value()
        .attr("method")
        .and_then(|m| m.parse::<Method>().ok())
        .unwrap_or(Method::Get);
    let action_raw = form.value().attr("action").unwrap_or("");
    let action_resolved = if action_raw.is_empty() {
        base.map(|b| b.to_string()).unwrap_or_default()
    } else {
        resolve(action_raw, base).unwrap_or_else(|| action_raw.to_string())
    };
    if action_resolved.is_empty() {
        return;
    }
    // Form/ParameterSet are built directly rather than exclusively through push_child, so the
    // action URL needs its own canonicalisation before it crosses into the output (spec.md §3).
    let Ok(action_url) = normalize::canonicalize(&action_resolved, tracking_denylist) else {
        return;
    };

    let mut fields = Vec::new();
    for field in form.select(&SEL_FORM_FIELD) {
        let Some(name) = field.value().attr("name") else { continue };
        let input_type = match field.value().name() {
            "textarea" => InputType::Text,
            "select" => InputType::Other("select".to_string()),
            _ => match field.value().attr("type").unwrap_or("text").to_ascii_lowercase().as_str() {
                "password" => InputType::Password,
                "hidden" => InputType::Hidden,
                "checkbox" => InputType::Checkbox,
                "radio" => InputType::Radio,
                "email" => InputType::Email,
                "number" => InputType::Number,
                other => InputType::Other(other.to_string()),
            },
        };
        fields.push(FormField {
            name: name.to_string(),
            default_value: field.value().attr("value").map(|v| v.to_string()),
            input_type,
        });
    }

    super::push_child(out, action_url.clone(), method, EndpointSource::HtmlForm, depth, max_depth, tracking_denylist);
    if !fields.is_empty() {
        out.parameters.push(ParameterSet {
            url: action_url.clone(),
            method,
            parameters: fields
                .iter()
                .map(|f| (f.name.clone(), f.default_value.clone().unwrap_or_default()))
                .collect(),
            source: ParameterSource::Form,
        });
    }
    out.forms.push(Form {
        action_url,
        method,
        fields,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(body: &str) -> FetchResult {
        FetchResult {
            final_url: "https://h/page".to_string(),
            status: 200,
            headers: vec![],
            body_bytes: body.as_bytes().to_vec(),
            content_type: Some("text/html".to_string()),
            elapsed: Duration::ZERO,
            truncated: false,
            observed_subrequests: vec![],
        }
    }

    #[test]
    fn extracts_anchor_links() {
        let r = result(r#"<html><body><a href="/about">about</a></body></html>"#);
        let out = extract(&r, 0, 5, &[]);
        assert!(out.endpoints.iter().any(|e| e.url == "https://h/about"));
    }

    #[test]
    fn skips_fragment_and_javascript_hrefs() {
        let r = result(r#"<a href="#top">t</a><a href="javascript:void(0)">j</a>"#);
        let out = extract(&r, 0, 5, &[]);
        assert!(out.endpoints.is_empty());
    }

    #[test]
    fn harvests_form_fields() {
        let r = result(
            r#"<form method="post" action="/login">
                 <input type="text" name="user">
                 <input type="password" name="pass">
               </form>"#,
        );
        let out = extract(&r, 0, 5, &[]);
        assert_eq!(out.forms.len(), 1);
        let form = &out.forms[0];
        assert_eq!(form.action_url, "https://h/login");
        assert_eq!(form.method, Method::Post);
        assert_eq!(form.fields.len(), 2);

        let ps = out
            .parameters
            .iter()
            .find(|p| p.source == ParameterSource::Form)
            .expect("form parameter set");
        assert_eq!(ps.url, "https://h/login");
        assert_eq!(ps.method, Method::Post);
        assert!(ps.parameters.contains_key("user"));
        assert!(ps.parameters.contains_key("pass"));
    }

    #[test]
    fn recurses_inline_script_into_js_extractor() {
        let r = result(r#"<script>fetch("/api/ping")</script>"#);
        let out = extract(&r, 0, 5, &[]);
        assert!(out.endpoints.iter().any(|e| e.url == "https://h/api/ping"));
    }

    #[test]
    fn follows_meta_refresh() {
        let r = result(r#"<meta http-equiv="refresh" content="0; url=/next">"#);
        let out = extract(&r, 0, 5, &[]);
        assert!(out.endpoints.iter().any(|e| e.url == "https://h/next"));
    }

    #[test]
    fn respects_max_depth_for_new_tasks() {
        let r = result(r#"<a href="/x">x</a>"#);
        let out = extract(&r, 5, 5, &[]);
        assert_eq!(out.endpoints.len(), 1);
        assert!(out.new_tasks.is_empty());
    }

    #[test]
    fn anchor_href_is_canonicalized_before_recording() {
        let r = result(r#"<a href="/x/../y?utm_source=z&id=1">y</a>"#);
        let out = extract(&r, 0, 5, &["utm_source".to_string()]);
        assert!(out.endpoints.iter().any(|e| e.url == "https://h/y?id=1"));
    }

    #[test]
    fn form_action_is_canonicalized_before_recording() {
        let r = result(r#"<form action="/login?utm_source=z" method="post"><input name="u"></form>"#);
        let out = extract(&r, 0, 5, &["utm_source".to_string()]);
        assert_eq!(out.forms[0].action_url, "https://h/login");
        let ps = out
            .parameters
            .iter()
            .find(|p| p.source == ParameterSource::Form)
            .expect("form parameter set");
        assert_eq!(ps.url, "https://h/login");
    }
}
