//! Folio Smoke Harness
//!
//! Registers the offline cache worker against a live origin, then requests
//! every precached URL twice through the worker to confirm the second pass
//! is served from the cache. Prints a JSON summary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use folio_common::{init_logging, LogConfig, LogFormat};
use folio_core::SiteConfig;
use folio_net::{LoaderConfig, Request, ResourceLoader};
use folio_sw::{RegistrationOptions, ServiceWorkerContainer};
use serde_json::json;
use tracing::{info, warn};

/// Performance timing collector for tracking operation durations.
#[derive(Default)]
struct PerfTiming {
    timings: HashMap<&'static str, Vec<Duration>>,
}

impl PerfTiming {
    fn record(&mut self, operation: &'static str, duration: Duration) {
        self.timings.entry(operation).or_default().push(duration);
    }

    fn summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();

        for (op, durations) in &self.timings {
            if durations.is_empty() {
                continue;
            }

            let ms: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
            let total_ms: f64 = ms.iter().sum();
            let min_ms = ms.iter().copied().fold(f64::INFINITY, f64::min);
            let max_ms = ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            summary.insert(
                op.to_string(),
                json!({
                    "count": ms.len(),
                    "total_ms": round2(total_ms),
                    "avg_ms": round2(total_ms / ms.len() as f64),
                    "min_ms": round2(min_ms),
                    "max_ms": round2(max_ms),
                }),
            );
        }

        serde_json::Value::Object(summary)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse command line arguments
#[derive(Default)]
struct Args {
    config: Option<String>,
    origin: Option<String>,
    generation: Option<String>,
    snapshot: Option<String>,
    perf_output: Option<String>,
    json_logs: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut parsed = Self::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config = args.next(),
                "--origin" => parsed.origin = args.next(),
                "--generation" => parsed.generation = args.next(),
                "--snapshot" => parsed.snapshot = args.next(),
                "--perf-output" => parsed.perf_output = args.next(),
                "--json-logs" => parsed.json_logs = true,
                other => eprintln!("ignoring unknown argument {other}"),
            }
        }

        parsed
    }
}

fn load_config(args: &Args) -> anyhow::Result<SiteConfig> {
    let mut config = match args.config {
        Some(ref path) => SiteConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => SiteConfig::default(),
    };
    if let Some(ref origin) = args.origin {
        config.origin = origin.clone();
    }
    if let Some(ref generation) = args.generation {
        config.worker.generation = generation.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let mut log_config = LogConfig::for_debug_flag(config.worker.debug);
    if args.json_logs {
        log_config = log_config.with_format(LogFormat::Json);
    }
    init_logging(log_config)?;

    info!(
        origin = %config.origin,
        generation = %config.worker.generation,
        entries = config.worker.precache.len(),
        "Starting folio smoke harness"
    );

    let caches = match args.snapshot {
        Some(ref path) if std::path::Path::new(path).exists() => {
            folio_sw::CacheStorage::load(path).await?
        }
        _ => folio_sw::CacheStorage::new(),
    };

    let loader = Arc::new(ResourceLoader::new(LoaderConfig::default())?);
    let (container, _events) = ServiceWorkerContainer::with_storage(loader, caches.clone());
    let mut perf = PerfTiming::default();

    let started = Instant::now();
    let report = container
        .register(
            config.script_url()?.as_str(),
            RegistrationOptions {
                scope: None,
                generation: config.worker.generation.clone(),
                precache: config.worker.precache.clone(),
            },
        )
        .await?;
    perf.record("register", started.elapsed());

    for failure in &report.install.failed {
        warn!(url = %failure.url, reason = %failure.reason, "Precache entry failed");
    }

    let page = config.origin_url()?;
    let mut served = Vec::new();
    for pass in ["cold", "warm"] {
        for entry in &config.worker.precache {
            let url = page.join(entry)?;
            let started = Instant::now();
            let result = container.handle_fetch(&page, Request::get(url.clone())).await;
            perf.record(if pass == "cold" { "fetch_cold" } else { "fetch_warm" }, started.elapsed());

            served.push(match result {
                Ok(response) => json!({
                    "pass": pass,
                    "url": url.as_str(),
                    "status": response.status,
                    "from_cache": response.from_cache,
                }),
                Err(e) => json!({ "pass": pass, "url": url.as_str(), "error": e.to_string() }),
            });
        }
    }

    if let Some(ref path) = args.snapshot {
        caches.persist(path).await?;
    }

    let summary = json!({
        "generation": config.worker.generation,
        "scope": report.scope,
        "cached": report.install.cached.len(),
        "failed": report.install.failed.len(),
        "evicted": report.activate.as_ref().map(|a| a.evicted.clone()).unwrap_or_default(),
        "buckets": caches.keys().await,
        "usage_bytes": caches.usage().await,
        "requests": served,
        "perf": perf.summary(),
    });

    if let Some(ref perf_path) = args.perf_output {
        std::fs::write(perf_path, perf.summary().to_string())
            .with_context(|| format!("writing {perf_path}"))?;
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
