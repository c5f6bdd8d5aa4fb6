// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// 应用程序配置设置
///
/// 包含流量控制、爬虫限制、即时重试、排程器和失败快照等所有配置项
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 流量控制配置
    pub rate_limit: RateLimitSettings,
    /// 爬虫限制配置
    pub crawler: CrawlerSettings,
    /// 即时重试配置（单次抓取内的固定次数重试）
    pub retry: ImmediateRetrySettings,
    /// 排程器配置
    pub scheduler: SchedulerSettings,
    /// 抓取引擎配置
    pub fetcher: FetcherSettings,
    /// 失败任务快照配置
    pub failure_store: FailureStoreSettings,
    /// 站点配置文件路径
    pub sites_file: String,
}

/// 流量控制配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// 默认域名延迟（秒）
    pub default_domain_delay: f64,
    /// 最小域名延迟（秒）
    pub min_domain_delay: f64,
    /// 最大域名延迟（秒）
    pub max_domain_delay: f64,
    /// 全局时间窗口内最大请求数
    pub global_rate_limit: usize,
    /// 全局限流时间窗口（秒）
    pub global_time_window: u64,
    /// 失败后增加延迟的倍数
    pub failure_backoff_factor: f64,
    /// 成功后减少延迟的倍数
    pub success_recovery_factor: f64,
    /// 触发限流的连续失败次数
    pub max_failures_before_throttle: u32,
    /// 限流持续时间（分钟）
    pub throttle_duration_minutes: i64,
}

/// 爬虫限制配置设置
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CrawlerSettings {
    /// 最大爬取深度
    pub max_depth: u32,
    /// 每个站点最多爬取页面数
    pub max_pages: u64,
    /// 初始爬取的 URL 数量
    pub initial_urls: usize,
    /// 同时进行的种子抓取会话数
    pub seed_concurrency: usize,
}

/// 即时重试配置设置
///
/// 这是单次页面抓取内的固定次数重试，与失败处理器跨会话的
/// 分类重试（scheduled retry）互不计数
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ImmediateRetrySettings {
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 重试间隔最短时间（秒）
    pub min_delay: f64,
    /// 重试间隔最长时间（秒）
    pub max_delay: f64,
}

/// 排程器配置设置
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SchedulerSettings {
    /// 立即执行任务的工作池大小
    pub worker_pool_size: usize,
    /// 错过触发时间后的宽限期（秒）
    pub misfire_grace_seconds: u64,
}

/// 抓取引擎配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherSettings {
    /// 单次请求超时时间（秒）
    pub timeout_seconds: u64,
    /// User-Agent
    pub user_agent: String,
}

/// 失败任务快照配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FailureStoreSettings {
    /// 快照文件路径
    pub snapshot_path: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从配置文件和环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Default rate limit settings
            .set_default("rate_limit.default_domain_delay", 3.0)?
            .set_default("rate_limit.min_domain_delay", 1.5)?
            .set_default("rate_limit.max_domain_delay", 20.0)?
            .set_default("rate_limit.global_rate_limit", 40)?
            .set_default("rate_limit.global_time_window", 60)?
            .set_default("rate_limit.failure_backoff_factor", 2.0)?
            .set_default("rate_limit.success_recovery_factor", 0.9)?
            .set_default("rate_limit.max_failures_before_throttle", 5)?
            .set_default("rate_limit.throttle_duration_minutes", 2)?
            // Default crawler limits
            .set_default("crawler.max_depth", 1)?
            .set_default("crawler.max_pages", 10)?
            .set_default("crawler.initial_urls", 3)?
            .set_default("crawler.seed_concurrency", 5)?
            // Default immediate retry settings
            .set_default("retry.max_attempts", 3)?
            .set_default("retry.min_delay", 3.0)?
            .set_default("retry.max_delay", 10.0)?
            // Default scheduler settings
            .set_default("scheduler.worker_pool_size", 3)?
            .set_default("scheduler.misfire_grace_seconds", 600)?
            // Default fetcher settings
            .set_default("fetcher.timeout_seconds", 30)?
            .set_default(
                "fetcher.user_agent",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
            )?
            // Default failure store settings
            .set_default("failure_store.snapshot_path", "output/failed_tasks.json")?
            .set_default("sites_file", "config/sites.yaml")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("NEWSCRAWL").separator("__"));

        builder.build()?.try_deserialize()
    }
}
