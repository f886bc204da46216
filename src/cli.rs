use clap::Parser;

/// EndAbyss: a bounded-concurrency endpoint-discovery crawler.
#[derive(clap::Parser, Debug)]
#[command(
    author,
    version,
    about = "EndAbyss - endpoint discovery crawl engine",
    long_about = None,
    after_help = "EXAMPLES:
  Basic crawl:
    endabyss -t https://example.com

  Two seeds, dynamic backend, directory probing:
    endabyss -t https://example.com -t https://api.example.com -m dynamic -x -w wordlist.txt

  Pipe discovered endpoint URLs into another tool:
    endabyss -t https://example.com -pipeurl | sort -u"
)]
pub struct Cli {
    /// Target URL to crawl. Repeatable.
    #[arg(short = 't', long = "target")]
    pub target: Vec<String>,

    /// Path to a file of newline-delimited target URLs.
    #[arg(short = 'f', long = "targetfile")]
    pub targetfile: Option<String>,

    /// Scope predicate applied to every target: same-host, same-registered-domain, or an
    /// exact path-prefix match.
    #[arg(long, value_enum, default_value = "same-registered-domain")]
    pub scope: ScopeArg,

    /// Fetch backend: a pooled HTTP client, or a headless browser observing real network
    /// requests.
    #[arg(short = 'm', long = "mode", value_enum, default_value = "static")]
    pub mode: ModeArg,

    /// Maximum link-following depth from each seed.
    #[arg(short = 'd', long = "depth", default_value_t = 5)]
    pub depth: u32,

    /// Global in-flight request concurrency.
    #[arg(short = 'c', long = "concurrency", default_value_t = 10)]
    pub concurrency: usize,

    /// Enable wordlist-driven directory probing.
    #[arg(short = 'x', long = "dirscan")]
    pub dirscan: bool,

    /// Wordlist file for `--dirscan` (one word per line).
    #[arg(short = 'w', long = "wordlist")]
    pub wordlist: Option<String>,

    /// Fixed delay before every request, in milliseconds.
    #[arg(long = "delay", default_value_t = 0)]
    pub delay_ms: u64,

    /// Upper bound of an additional uniform-random delay, in milliseconds.
    #[arg(long = "random-delay", default_value_t = 0)]
    pub random_delay_ms: u64,

    /// Upstream proxy URL. Repeatable; proxies are rotated round-robin.
    #[arg(long = "proxy")]
    pub proxy: Vec<String>,

    /// Global request rate limit, in requests per second. 0 disables the limiter.
    #[arg(long = "rate-limit", default_value_t = 0)]
    pub rate_limit: u32,

    /// Emit one endpoint URL per line. Mutually exclusive with the other `-pipe*` flags.
    #[arg(long = "pipeurl")]
    pub pipeurl: bool,

    /// Emit `METHOD URL` per line. Mutually exclusive with the other `-pipe*` flags.
    #[arg(long = "pipeendpoint")]
    pub pipeendpoint: bool,

    /// Emit the URL with its query string, one per line. Mutually exclusive with the other
    /// `-pipe*` flags.
    #[arg(long = "pipeparam")]
    pub pipeparam: bool,

    /// Emit the full result struct as a single JSON document. Mutually exclusive with the
    /// other `-pipe*` flags.
    #[arg(long = "pipejson")]
    pub pipejson: bool,

    /// Write the full JSON result to this file in addition to stdout.
    #[arg(short = 'o', long = "out")]
    pub out: Option<String>,

    /// Custom request header, formatted `Name: Value`. Repeatable.
    #[arg(short = 'H', long = "header")]
    pub header: Vec<String>,

    /// Static cookie, formatted `name=value`. Repeatable.
    #[arg(long = "cookie")]
    pub cookie: Vec<String>,

    /// Honour robots.txt (off by default).
    #[arg(long = "respect-robots")]
    pub respect_robots: bool,

    /// Overall wall-clock budget for the scan, in seconds. Unset runs to natural completion.
    #[arg(long = "run-timeout")]
    pub run_timeout_secs: Option<u64>,

    /// Enable verbose (info-level) logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Enable debug-level logging.
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum ModeArg {
    Static,
    Dynamic,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum ScopeArg {
    SameHost,
    SameRegisteredDomain,
    ExactPrefix,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

impl Cli {
    /// Resolve the `-pipe*` flags to at most one pipeline mode. `Err` when more than one is
    /// set — bad usage, exit code 1.
    pub fn pipeline_mode(&self) -> Result<Option<endabyss::output::PipelineMode>, String> {
        use endabyss::output::PipelineMode;
        let picked: Vec<PipelineMode> = [
            (self.pipeurl, PipelineMode::Url),
            (self.pipeendpoint, PipelineMode::Endpoint),
            (self.pipeparam, PipelineMode::Param),
            (self.pipejson, PipelineMode::Json),
        ]
        .into_iter()
        .filter_map(|(set, mode)| set.then_some(mode))
        .collect();

        match picked.len() {
            0 => Ok(None),
            1 => Ok(Some(picked[0])),
            _ => Err("at most one of -pipeurl/-pipeendpoint/-pipeparam/-pipejson may be set".to_string()),
        }
    }
}
