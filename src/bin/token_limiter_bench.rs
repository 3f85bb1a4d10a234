// src/bin/token_limiter_bench.rs

use indicatif::{ProgressBar, ProgressStyle};
use prettytable::{row, Table};
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::sync::{Barrier, Semaphore};
use tracing::{error, info};

use token_limiter::config::LimiterConfig;
use token_limiter::storage::{MemoryQuotaStore, QuotaStore};
use token_limiter::TokenLimiterRegistry;

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "token_limiter_bench",
    about = "Concurrent load against many token limiters"
)]
struct Opt {
    /// Quota store to use
    #[structopt(short, long, possible_values = &["memory", "redis"], default_value = "memory")]
    store: String,

    /// Redis URL, overrides TOKEN_LIMITER_REDIS_URL
    #[structopt(long)]
    redis_url: Option<String>,

    /// Number of distinct keys (routes)
    #[structopt(short = "k", long, default_value = "10")]
    num_keys: usize,

    /// Number of concurrent callers
    #[structopt(short = "u", long, default_value = "100")]
    num_callers: usize,

    /// Requests issued by each caller
    #[structopt(short = "r", long, default_value = "100")]
    requests_per_caller: usize,

    /// Tokens refilled per second for every key
    #[structopt(long, default_value = "100")]
    rate: u32,

    /// Bucket capacity for every key
    #[structopt(long, default_value = "100")]
    burst: u32,

    /// Maximum number of requests in flight
    #[structopt(short = "c", long, default_value = "64")]
    concurrency: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct KeyStats {
    allowed: u64,
    denied: u64,
    local: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    token_limiter::logging::init_with_default(if opt.disable_logs {
        "token_limiter_bench=error,token_limiter=error"
    } else {
        "token_limiter_bench=info,token_limiter=warn"
    });

    let mut config = LimiterConfig::from_env()?;
    if let Some(url) = &opt.redis_url {
        config.redis.url = url.clone();
    }

    match opt.store.as_str() {
        "memory" => {
            let registry =
                TokenLimiterRegistry::from_config(Arc::new(MemoryQuotaStore::new()), &config);
            run_benchmark(Arc::new(registry), "memory", opt).await
        }
        "redis" => {
            let registry = match TokenLimiterRegistry::connect(&config).await {
                Ok(registry) => registry,
                Err(e) => {
                    error!("Failed to connect to Redis: {}", e);
                    return Err(e.into());
                }
            };
            run_benchmark(Arc::new(registry), "redis", opt).await
        }
        other => Err(format!("Unknown store: {}", other).into()),
    }
}

async fn run_benchmark<S: QuotaStore>(
    registry: Arc<TokenLimiterRegistry<S>>,
    name: &str,
    opt: Opt,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Benchmarking {} store: {} keys, {} callers x {} requests",
        name, opt.num_keys, opt.num_callers, opt.requests_per_caller
    );

    let keys: Vec<String> = (0..opt.num_keys.max(1))
        .map(|i| format!("/bench/route/{}", i))
        .collect();
    for key in &keys {
        registry.get_or_create(opt.rate, opt.burst, key)?;
    }

    let total = (opt.num_callers * opt.requests_per_caller) as u64;
    let progress = ProgressBar::new(total);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} requests ({per_sec})")?,
    );

    let barrier = Arc::new(Barrier::new(opt.num_callers.max(1)));
    let semaphore = Arc::new(Semaphore::new(opt.concurrency.max(1)));
    let keys = Arc::new(keys);
    let start_time = Instant::now();

    let handles = (0..opt.num_callers).map(|_| {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        let semaphore = Arc::clone(&semaphore);
        let keys = Arc::clone(&keys);
        let progress = progress.clone();
        let requests = opt.requests_per_caller;

        tokio::spawn(async move {
            barrier.wait().await;
            let mut stats = vec![KeyStats::default(); keys.len()];

            for _ in 0..requests {
                let index = rand::random_range(0..keys.len());
                let Some(limiter) = registry.get(&keys[index]) else {
                    continue;
                };

                let Ok(_permit) = semaphore.acquire().await else {
                    break;
                };
                let allowed = limiter.allow().await;

                let entry = &mut stats[index];
                if allowed {
                    entry.allowed += 1;
                } else {
                    entry.denied += 1;
                }
                if !limiter.is_store_alive() {
                    entry.local += 1;
                }
                progress.inc(1);
            }
            stats
        })
    });

    let results = futures::future::join_all(handles).await;
    let elapsed = start_time.elapsed();
    progress.finish_and_clear();

    let mut per_key = vec![KeyStats::default(); keys.len()];
    for stats in results.into_iter().flatten() {
        for (total, caller) in per_key.iter_mut().zip(stats) {
            total.allowed += caller.allowed;
            total.denied += caller.denied;
            total.local += caller.local;
        }
    }

    let mut table = Table::new();
    table.add_row(row!["Key", "Allowed", "Denied", "Local"]);
    for (key, stats) in keys.iter().zip(&per_key) {
        table.add_row(row![key, stats.allowed, stats.denied, stats.local]);
    }
    table.printstd();

    let allowed: u64 = per_key.iter().map(|s| s.allowed).sum();
    let denied: u64 = per_key.iter().map(|s| s.denied).sum();
    let requests = allowed + denied;

    println!("\nBenchmark Results ({}):", name);
    println!("  Total Requests:     {}", requests);
    println!("  Allowed:            {}", allowed);
    println!("  Denied:             {}", denied);
    println!("  Duration:           {:?}", elapsed);
    println!(
        "  Throughput:         {:.2} requests/second",
        requests as f64 / elapsed.max(Duration::from_micros(1)).as_secs_f64()
    );
    println!("  Monitor runs:       {}", registry.monitor().runs());

    registry.shutdown();
    Ok(())
}
