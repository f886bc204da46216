use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP method. Kept as a small hand-rolled enum rather than pulling in the `http` crate, which
/// nothing else in this dependency stack needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Default for Method {
    fn default() -> Self {
        Method::Get
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        };
        f.write_str(s)
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(format!("unknown HTTP method: {other}")),
        }
    }
}

/// Where an Endpoint was observed or inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndpointSource {
    HtmlA,
    HtmlForm,
    HtmlAttr,
    InlineJs,
    ExtJs,
    Json,
    BrowserNet,
    Dirscan,
    /// A caller-supplied seed URL — not discovered by extraction, but still a valid request
    /// target and expected in the output (spec.md §8 scenario 1 lists the seed itself).
    Seed,
}

/// Scope predicate a Target is crawled under. Recommendation from spec.md's Open Questions:
/// scope state is tracked per-seed, not globally, so mixed-mode multi-target scans are well
/// defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeMode {
    SameRegisteredDomain,
    SameHost,
    ExactPrefix,
}

/// An origin plus a path prefix and scope predicate. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path_prefix: String,
    pub scope_mode: ScopeMode,
    /// The full seed URL as given (including any query string) — used to build the initial
    /// Task. `path_prefix` alone is for `ScopeMode::ExactPrefix` matching and intentionally
    /// drops the query string, so it cannot double as the seed URL itself.
    pub seed_url: String,
}

impl Target {
    pub fn origin(&self) -> String {
        match self.port {
            Some(p) => format!("{}://{}:{}", self.scheme, self.host, p),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }
}

/// A (method, URL) endpoint observed or inferred as a valid request target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub method: Method,
    pub sources: BTreeSet<EndpointSource>,
    pub content_type: Option<String>,
    pub status: Option<u16>,
    pub depth: u32,
}

impl Endpoint {
    pub fn new(url: String, method: Method, source: EndpointSource, depth: u32) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source);
        Self {
            url,
            method,
            sources,
            content_type: None,
            status: None,
            depth,
        }
    }

    /// Identity for dedup: (method, url).
    pub fn key(&self) -> (Method, String) {
        (self.method, self.url.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
    Text,
    Password,
    Hidden,
    Checkbox,
    Radio,
    Email,
    Number,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub default_value: Option<String>,
    pub input_type: InputType,
}

/// A discovered HTML form. Identity: (method, action_url, sorted field names).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub action_url: String,
    pub method: Method,
    pub fields: Vec<FormField>,
}

impl Form {
    pub fn key(&self) -> (Method, String, Vec<String>) {
        let mut names: Vec<String> = self.fields.iter().map(|f| f.name.clone()).collect();
        names.sort();
        (self.method, self.action_url.clone(), names)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterSource {
    Query,
    Form,
    JsInferred,
}

/// A URL's request parameters, grouped by source. Identity: (method, url-without-query,
/// sorted parameter names).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub url: String,
    pub method: Method,
    pub parameters: std::collections::BTreeMap<String, String>,
    pub source: ParameterSource,
}

impl ParameterSet {
    pub fn key(&self, url_without_query: &str) -> (Method, String, Vec<String>) {
        let mut names: Vec<String> = self.parameters.keys().cloned().collect();
        names.sort();
        (self.method, url_without_query.to_string(), names)
    }
}

/// Outbound request description passed to a fetch backend.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }
}

/// Result of dispatching a FetchRequest through a backend.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub final_url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body_bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub elapsed: Duration,
    pub truncated: bool,
    /// Only populated by the dynamic backend.
    pub observed_subrequests: Vec<FetchRequest>,
}

/// A unit of crawl work sitting in the Frontier.
#[derive(Debug, Clone)]
pub struct Task {
    pub url: String,
    pub method: Method,
    pub depth: u32,
    pub referrer: Option<String>,
}

/// Aggregate output of one extract() call.
#[derive(Debug, Default)]
pub struct ExtractOutput {
    pub new_tasks: Vec<Task>,
    pub endpoints: Vec<Endpoint>,
    pub forms: Vec<Form>,
    pub parameters: Vec<ParameterSet>,
}

impl ExtractOutput {
    pub fn merge(&mut self, mut other: ExtractOutput) {
        self.new_tasks.append(&mut other.new_tasks);
        self.endpoints.append(&mut other.endpoints);
        self.forms.append(&mut other.forms);
        self.parameters.append(&mut other.parameters);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub fetched: u64,
    pub failed: u64,
    pub deduped: u64,
    pub elapsed_ms: u64,
}

/// Core output: the full crawl result returned to the external collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    pub endpoints: Vec<Endpoint>,
    pub forms: Vec<Form>,
    pub parameters: Vec<ParameterSet>,
    pub stats: ScanStats,
    pub cancelled: bool,
}
