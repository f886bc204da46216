use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use endabyss::config::{parse_target, BackendMode, ScanConfig};
use endabyss::model::ScopeMode;
use endabyss::output;

use crate::cli::{Cli, ModeArg, ScopeArg};

/// Bad-usage exit code (spec.md §6).
const EXIT_BAD_USAGE: i32 = 1;
/// Exit code for "every target failed" (no endpoints, no successful fetches, nothing
/// cancelled — i.e. the scan ran but produced nothing usable).
const EXIT_ALL_TARGETS_FAILED: i32 = 2;
/// Exit code when a signal cancelled the run.
const EXIT_CANCELLED: i32 = 130;

pub async fn run_from_cli(cli: Cli) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    let crate_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter_str = format!("endabyss={crate_level},reqwest=info,hyper=info,h2=info");
    let env_filter = EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(true)
        .with_target(false)
        .init();

    let pipeline_mode = match cli.pipeline_mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_BAD_USAGE);
        }
    };

    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_BAD_USAGE);
        }
    };

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, cancelling scan");
            cancel_for_signal.cancel();
        }
    });

    tracing::info!(targets = config.targets.len(), mode = ?config.mode, "starting scan");
    let result = endabyss::controller::run(config, cancel.clone()).await?;

    if let Some(out_path) = &cli.out {
        output::write_result_json(Path::new(out_path), &result)?;
    }

    match pipeline_mode {
        Some(mode) => println!("{}", output::render_pipeline(&result, mode)?),
        None => println!("{}", output::plain_summary(&result)),
    }

    if result.cancelled {
        std::process::exit(EXIT_CANCELLED);
    }
    if result.endpoints.is_empty() && result.stats.fetched == 0 {
        std::process::exit(EXIT_ALL_TARGETS_FAILED);
    }

    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<ScanConfig> {
    let scope_mode = match cli.scope {
        ScopeArg::SameHost => ScopeMode::SameHost,
        ScopeArg::SameRegisteredDomain => ScopeMode::SameRegisteredDomain,
        ScopeArg::ExactPrefix => ScopeMode::ExactPrefix,
    };

    let mut raw_targets = cli.target.clone();
    if let Some(path) = &cli.targetfile {
        let text = std::fs::read_to_string(path)?;
        raw_targets.extend(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string));
    }
    if raw_targets.is_empty() {
        anyhow::bail!("at least one -t/--target or -f/--targetfile entry is required");
    }
    let targets = raw_targets
        .iter()
        .map(|raw| parse_target(raw, scope_mode))
        .collect::<anyhow::Result<Vec<_>>>()?;

    // The engine itself activates dirprobe purely on a non-empty wordlist (spec.md §4.7); the
    // `-ds/--dirscan` flag gates that at the CLI boundary so `-w` alone is inert.
    let wordlist = match (&cli.wordlist, cli.dirscan) {
        (Some(path), true) => std::fs::read_to_string(path)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    let headers = cli
        .header
        .iter()
        .filter_map(|h| h.split_once(':').map(|(k, v)| (k.trim().to_string(), v.trim().to_string())))
        .collect();

    let cookies = cli
        .cookie
        .iter()
        .filter_map(|c| c.split_once('=').map(|(k, v)| (k.trim().to_string(), v.trim().to_string())))
        .collect();

    let mode = match cli.mode {
        ModeArg::Static => BackendMode::Static,
        ModeArg::Dynamic => BackendMode::Dynamic,
    };

    let config = ScanConfig {
        targets,
        mode,
        max_depth: cli.depth,
        concurrency: cli.concurrency,
        delay: Duration::from_millis(cli.delay_ms),
        random_delay_range: Duration::from_millis(cli.random_delay_ms),
        rate_limit: cli.rate_limit,
        proxies: cli.proxy.clone(),
        headers,
        cookies,
        wordlist,
        dirscan: cli.dirscan,
        respect_robots: cli.respect_robots,
        run_timeout: cli.run_timeout_secs.map(Duration::from_secs),
        ..ScanConfig::default()
    };

    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}
