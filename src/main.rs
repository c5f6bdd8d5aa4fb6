// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use newscrawl::config::settings::Settings;
use newscrawl::config::sites::SiteRegistry;
use newscrawl::crawler::manager::CrawlerManager;
use newscrawl::crawler::session::CrawlServices;
use newscrawl::domain::services::content_processor::ProcessorRegistry;
use newscrawl::domain::services::failure_handler::FailureHandler;
use newscrawl::domain::services::rate_limiter::{RateLimiterConfig, RateLimiterManager};
use newscrawl::domain::services::retry_policy::RetryPolicy;
use newscrawl::engines::http_fetcher::HttpFetcher;
use newscrawl::infrastructure::memory::{MemoryArticleRepository, MemoryIndexer, MemoryMessageQueue};
use newscrawl::queue::scheduler::CrawlerScheduler;
use newscrawl::utils::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动排程器
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting newscrawl...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    // 3. Load site registry
    let sites = Arc::new(SiteRegistry::load_from_file(&settings.sites_file)?);
    info!("Site registry loaded ({} sites)", sites.len());

    // 4. Initialize rate limiter with per-site domain delays
    let rate_limiter = Arc::new(RateLimiterManager::new(RateLimiterConfig::from(
        &settings.rate_limit,
    )));
    rate_limiter.set_domain_delays_from_sites(&sites);
    info!("Rate limiter initialized");

    // 5. Initialize failure handler and restore persisted state
    let failure_handler = Arc::new(
        FailureHandler::new(RetryPolicy::default()).with_permanent_failure_callback(Box::new(
            |task| {
                error!(
                    "Permanent failure for {} after {} retries ({})",
                    task.url, task.retry_count, task.error_category
                );
            },
        )),
    );
    let snapshot_path = settings.failure_store.snapshot_path.clone();
    if std::path::Path::new(&snapshot_path).exists() {
        match failure_handler.load_from_file(&snapshot_path) {
            Ok(()) => info!("Restored failure snapshot from {}", snapshot_path),
            Err(e) => warn!("Failed to restore failure snapshot: {}", e),
        }
    }

    // 6. Initialize fetcher and collaborators
    let fetcher = Arc::new(HttpFetcher::new(&settings.fetcher)?);
    let repository = Arc::new(MemoryArticleRepository::new());
    let queue = Arc::new(MemoryMessageQueue::new());
    let indexer = Arc::new(MemoryIndexer::new());
    let processors = Arc::new(ProcessorRegistry::with_builtin_processors());

    let services = CrawlServices {
        fetcher,
        rate_limiter,
        failure_handler: failure_handler.clone(),
        repository,
        queue,
        indexer,
        processors,
    };

    // 7. Initialize crawler manager
    let manager = Arc::new(CrawlerManager::new(
        sites,
        settings.crawler,
        settings.retry,
        services,
    ));

    // 8. Schedule all sites by default policy and wait for shutdown
    let scheduler = CrawlerScheduler::new(
        manager,
        settings.scheduler.worker_pool_size,
        Duration::from_secs(settings.scheduler.misfire_grace_seconds),
    );
    let (scheduled, total) = scheduler.schedule_all_sites();
    info!("Scheduled {}/{} sites, scheduler running", scheduled, total);
    for job in scheduler.list_jobs() {
        info!(
            "Job {}: {} ({}), next run {}",
            job.id,
            job.site,
            job.trigger,
            job.next_run
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string())
        );
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    scheduler.shutdown();
    if let Err(e) = failure_handler.save_to_file(&snapshot_path) {
        error!("Failed to persist failure snapshot: {}", e);
    }
    info!("newscrawl shut down");

    Ok(())
}
