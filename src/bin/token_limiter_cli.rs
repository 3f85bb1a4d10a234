// src/bin/token_limiter_cli.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::time;
use tracing::{error, info, warn};

use token_limiter::config::LimiterConfig;
use token_limiter::storage::{MemoryQuotaStore, QuotaStore};
use token_limiter::TokenLimiterRegistry;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "token_limiter_cli",
    about = "Drive a token limiter with simulated traffic"
)]
struct Opt {
    /// Quota store to use
    #[structopt(short, long, possible_values = &["memory", "redis"], default_value = "memory")]
    store: String,

    /// Redis URL, overrides TOKEN_LIMITER_REDIS_URL
    #[structopt(long)]
    redis_url: Option<String>,

    /// Key to use for rate limiting
    #[structopt(short, long, default_value = "/api/demo")]
    key: String,

    /// Tokens refilled per second
    #[structopt(short, long, default_value = "10")]
    rate: u32,

    /// Bucket capacity
    #[structopt(short, long, default_value = "10")]
    burst: u32,

    /// Simulation mode
    #[structopt(long, possible_values = &["burst", "steady"], default_value = "burst")]
    simulation: String,

    /// Number of requests to simulate (0 runs until Ctrl-C)
    #[structopt(short = "n", long, default_value = "20")]
    num_requests: usize,

    /// Time between requests in milliseconds (steady mode)
    #[structopt(short = "t", long, default_value = "100")]
    request_interval_ms: u64,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

#[derive(Debug, Default)]
struct Tally {
    allowed: usize,
    denied: usize,
    degraded: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let log_level = if opt.disable_logs {
        "error"
    } else {
        match opt.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    token_limiter::logging::init_with_default(&format!(
        "token_limiter_cli={},token_limiter={}",
        log_level, log_level
    ));

    let mut config = LimiterConfig::from_env()?;
    if let Some(url) = &opt.redis_url {
        config.redis.url = url.clone();
    }

    match opt.store.as_str() {
        "memory" => {
            let registry =
                TokenLimiterRegistry::from_config(Arc::new(MemoryQuotaStore::new()), &config);
            run_simulation(&opt, &registry).await
        }
        "redis" => {
            let registry = match TokenLimiterRegistry::connect(&config).await {
                Ok(registry) => registry,
                Err(e) => {
                    error!("Failed to connect to Redis at {}: {}", config.redis.url, e);
                    return Err(e.into());
                }
            };
            info!("Connected to Redis at {}", config.redis.url);
            run_simulation(&opt, &registry).await
        }
        other => Err(format!("Unknown store: {}", other).into()),
    }
}

async fn run_simulation<S: QuotaStore>(
    opt: &Opt,
    registry: &TokenLimiterRegistry<S>,
) -> Result<(), Box<dyn std::error::Error>> {
    let limiter = registry.get_or_create(opt.rate, opt.burst, &opt.key)?;
    info!(
        "Limiting {} at {} tokens/s with burst {}",
        opt.key, opt.rate, opt.burst
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;
    }

    let interval = match opt.simulation.as_str() {
        "burst" => Duration::ZERO,
        _ => Duration::from_millis(opt.request_interval_ms),
    };

    let mut tally = Tally::default();
    let start_time = Instant::now();
    let mut i = 0;

    while !stop.load(Ordering::SeqCst) && (opt.num_requests == 0 || i < opt.num_requests) {
        let request_time = Instant::now();
        i += 1;

        let allowed = limiter.allow().await;
        let shared = limiter.is_store_alive();
        if !shared {
            tally.degraded += 1;
        }

        if allowed {
            tally.allowed += 1;
            info!("Request {}: ALLOWED ({})", i, if shared { "shared" } else { "local" });
        } else {
            tally.denied += 1;
            warn!("Request {}: DENIED ({})", i, if shared { "shared" } else { "local" });
        }

        let elapsed = request_time.elapsed();
        if elapsed < interval {
            time::sleep(interval - elapsed).await;
        }
    }

    let elapsed = start_time.elapsed();
    registry.shutdown();

    println!("\nSimulation Results ({}):", opt.simulation);
    println!("-------------------------");
    println!("Total requests: {}", tally.allowed + tally.denied);
    println!("Allowed: {}", tally.allowed);
    println!("Denied: {}", tally.denied);
    println!("Answered locally: {}", tally.degraded);
    println!("Store alive at exit: {}", registry.is_store_alive());
    println!("Time elapsed: {:?}", elapsed);

    Ok(())
}
