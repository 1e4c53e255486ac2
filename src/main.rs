use anyhow::{Context, Result};
use clap::Parser;
use speed_rotator::{
    account::{AccountProcessor, ApiClient, Credential},
    config::AppConfig,
    logger,
    measurement::{MeasurementConfig, MeasurementSession},
    prompt::StdinAllocation,
    proxy::{
        CheckerConfig, DistributionMode, NoAllocation, ProxyEndpoint, ProxyHealthChecker,
        ProxyParser, ProxyPool,
    },
    scheduler::CycleScheduler,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::signal;

/// Multi-account network speed reporter with per-account proxy rotation
#[derive(Parser)]
#[command(name = "speed-rotator")]
#[command(about = "Measure network speed for several accounts and report the results")]
struct Cli {
    /// File with one bearer token per line
    #[arg(short, long, default_value = "token.txt")]
    tokens: PathBuf,

    /// File with one proxy per line
    #[arg(short, long, default_value = "proxy.txt")]
    proxies: PathBuf,

    /// How proxies are split between accounts (even, manual)
    #[arg(short, long, default_value = "even")]
    distribution: DistributionMode,

    /// Minutes between test cycles
    #[arg(short, long, default_value = "1")]
    interval: u64,

    /// Connect directly even if a proxy list is present
    #[arg(long)]
    no_proxy: bool,

    /// Per-attempt proxy timeout in milliseconds
    #[arg(long, default_value = "10000")]
    proxy_timeout_ms: u64,

    /// Proxy acquisition attempts per request
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Seconds to wait between accounts
    #[arg(long, default_value = "30")]
    account_delay_secs: u64,

    /// Reporting service root
    #[arg(long, default_value = speed_rotator::account::DEFAULT_BASE_URL)]
    base_url: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    logger::info("Initializing Multi-Account Speed Test Client...");

    let mut scheduler = match build(cli) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            logger::error(format!("Initialization error: {:#}", e));
            return Err(e);
        }
    };

    tokio::select! {
        _ = scheduler.run_forever() => {}
        signal = shutdown_signal() => {
            logger::warning(format!("Received {} signal", signal));
        }
    }

    Ok(())
}

fn build(cli: Cli) -> Result<CycleScheduler> {
    let checker = CheckerConfig::new()
        .with_enabled(!cli.no_proxy)
        .with_timeout(Duration::from_millis(cli.proxy_timeout_ms))
        .with_max_retries(cli.max_retries);

    let mut config = AppConfig::new()
        .with_tokens_path(cli.tokens)
        .with_proxies_path(cli.proxies)
        .with_distribution(cli.distribution)
        .with_base_url(cli.base_url)
        .with_check_interval_minutes(cli.interval)
        .with_account_delay(Duration::from_secs(cli.account_delay_secs))
        .with_checker(checker)
        .with_measurement(MeasurementConfig::default());
    config.validate()?;

    let accounts = Credential::load_file(&config.tokens_path)?;
    logger::success(format!(
        "Loaded {} tokens from {}",
        accounts.len(),
        config.tokens_path.display()
    ));

    let proxies = if config.checker.enabled {
        load_proxies(&config.proxies_path)
    } else {
        Vec::new()
    };
    config.checker.enabled = !proxies.is_empty();

    logger::info(format!(
        "Tokens: {}, Proxies: {}",
        accounts.len(),
        proxies.len()
    ));

    let pool = if config.checker.enabled {
        let pool = match config.distribution {
            DistributionMode::Even => {
                ProxyPool::partition(&accounts, proxies, config.distribution, &mut NoAllocation)?
            }
            DistributionMode::Manual => ProxyPool::partition(
                &accounts,
                proxies,
                config.distribution,
                &mut StdinAllocation::stdin(),
            )?,
        };
        logger::success(format!("Proxy groups configured ({} distribution):", config.distribution));
        for (index, size) in pool.group_sizes().iter().enumerate() {
            logger::info(format!("Token {}: {} proxies assigned", index + 1, size));
        }
        if pool.unassigned() > 0 {
            logger::warning(format!("{} proxies left unassigned", pool.unassigned()));
        }
        pool
    } else {
        logger::warning("Running without proxies");
        ProxyPool::default()
    };

    logger::success("Configuration completed!");
    logger::info("Current settings:");
    let summary = serde_json::to_string_pretty(&config.summary())
        .context("failed to render settings")?;
    logger::info(summary);

    let api = ApiClient::new(&config.base_url, config.request_timeout)?;
    let session = MeasurementSession::new(config.measurement.clone())?;
    let proxies = ProxyHealthChecker::new(config.checker.clone(), pool);
    let processor = AccountProcessor::new(api, proxies, session);

    Ok(CycleScheduler::new(
        processor,
        accounts,
        config.check_interval,
        config.account_delay,
    ))
}

/// A missing, unreadable or empty proxy list disables proxy use
fn load_proxies(path: &Path) -> Vec<ProxyEndpoint> {
    match ProxyParser::parse_file(path) {
        Ok(proxies) if proxies.is_empty() => {
            logger::warning(format!("No usable proxies in {}", path.display()));
            proxies
        }
        Ok(proxies) => {
            logger::success(format!("Loaded {} proxies from {}", proxies.len(), path.display()));
            proxies
        }
        Err(e) => {
            logger::warning(format!("{}; continuing without proxies", e));
            Vec::new()
        }
    }
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            logger::error(format!("Failed to listen for Ctrl+C: {}", e));
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                logger::error(format!("Failed to listen for SIGTERM: {}", e));
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "exit",
        () = terminate => "terminate",
    }
}
