// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::settings::RateLimitSettings;
use crate::config::sites::SiteRegistry;
use crate::utils::url_utils::extract_domain;

/// 流量控制配置
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
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

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            default_domain_delay: 3.0,
            min_domain_delay: 1.5,
            max_domain_delay: 20.0,
            global_rate_limit: 40,
            global_time_window: 60,
            failure_backoff_factor: 2.0,
            success_recovery_factor: 0.9,
            max_failures_before_throttle: 5,
            throttle_duration_minutes: 2,
        }
    }
}

impl From<&RateLimitSettings> for RateLimiterConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            default_domain_delay: settings.default_domain_delay,
            min_domain_delay: settings.min_domain_delay,
            max_domain_delay: settings.max_domain_delay,
            global_rate_limit: settings.global_rate_limit,
            global_time_window: settings.global_time_window,
            failure_backoff_factor: settings.failure_backoff_factor,
            success_recovery_factor: settings.success_recovery_factor,
            max_failures_before_throttle: settings.max_failures_before_throttle,
            throttle_duration_minutes: settings.throttle_duration_minutes,
        }
    }
}

/// 单个域名的时钟状态
///
/// 仅由流量控制器在对应条目的锁内修改
#[derive(Debug, Clone)]
struct DomainClock {
    /// 上次访问时间
    last_access: Option<Instant>,
    /// 连续失败次数
    failure_count: u32,
    /// 连续成功次数
    success_count: u32,
    /// 当前自适应延迟（秒）
    current_delay: f64,
    /// 总请求数
    total_requests: u64,
    /// 总成功数
    total_success: u64,
    /// 是否被限流
    is_throttled: bool,
    /// 限流解除时间
    throttled_until: Option<DateTime<Utc>>,
}

impl Default for DomainClock {
    fn default() -> Self {
        Self {
            last_access: None,
            failure_count: 0,
            success_count: 0,
            current_delay: 0.0,
            total_requests: 0,
            total_success: 0,
            is_throttled: false,
            throttled_until: None,
        }
    }
}

/// 域名状态统计
#[derive(Debug, Clone, Serialize)]
pub struct DomainStats {
    /// 域名
    pub domain: String,
    /// 总请求数
    pub total_requests: u64,
    /// 总成功数
    pub total_success: u64,
    /// 成功率（百分比）
    pub success_rate: f64,
    /// 连续失败次数
    pub failure_count: u32,
    /// 当前自适应延迟（秒）
    pub current_delay: f64,
    /// 是否被限流
    pub is_throttled: bool,
    /// 限流解除时间
    pub throttled_until: Option<String>,
}

/// 流量控制管理器
///
/// 提供域名级别和全局级别的爬取频率限制。域名时钟按键加锁，
/// 互不干扰；全局滑动窗口是唯一的共享资源，由单独的锁保护。
///
/// 准入是乐观的：`admit` 无论返回多长的等待时间，都会立刻记录
/// 本次调用的时间戳，避免并发调用同时计算出零等待。
pub struct RateLimiterManager {
    config: RateLimiterConfig,
    /// 域名时钟，首次请求时惰性创建
    clocks: DashMap<String, DomainClock>,
    /// 域名自定义延迟设定
    delay_overrides: DashMap<String, f64>,
    /// 全局请求时间窗口
    global_window: Mutex<VecDeque<Instant>>,
}

impl RateLimiterManager {
    /// 创建新的流量控制管理器
    pub fn new(config: RateLimiterConfig) -> Self {
        info!(
            "Rate limiter initialized: default delay {}s, global limit {} req/{}s",
            config.default_domain_delay, config.global_rate_limit, config.global_time_window
        );
        Self {
            config,
            clocks: DashMap::new(),
            delay_overrides: DashMap::new(),
            global_window: Mutex::new(VecDeque::new()),
        }
    }

    /// 为特定域名设定延迟值
    pub fn set_domain_delay(&self, domain: impl Into<String>, delay: f64) {
        let domain = domain.into();
        info!("Custom delay for {}: {}s", domain, delay);
        self.delay_overrides.insert(domain, delay);
    }

    /// 从站点注册表批量设定域名延迟
    ///
    /// 域名取自各站点第一个起始 URL
    pub fn set_domain_delays_from_sites(&self, registry: &SiteRegistry) {
        for site in registry.iter() {
            if let Some(delay) = site.domain_delay {
                if let Some(first_url) = site.start_urls.first() {
                    let domain = extract_domain(first_url);
                    if !domain.is_empty() {
                        self.set_domain_delay(domain, delay);
                    }
                }
            }
        }
    }

    /// 获取域名的配置延迟（自定义设定优先）
    fn domain_delay(&self, domain: &str) -> f64 {
        self.delay_overrides
            .get(domain)
            .map(|d| *d)
            .unwrap_or(self.config.default_domain_delay)
    }

    /// 计算 URL 准入前需要等待的时间
    ///
    /// 调用方必须在等待返回的时长后再发起实际请求；本方法从不阻塞。
    /// 域名被限流时返回剩余限流时长，否则返回域名延迟与全局限流
    /// 两者中较长的等待时间。
    pub fn admit(&self, url: &str) -> Duration {
        let domain = extract_domain(url);
        let mut clock = self.clocks.entry(domain.clone()).or_default();

        // 域名限流检查
        if clock.is_throttled {
            if let Some(until) = clock.throttled_until {
                let now = Utc::now();
                if now < until {
                    let remaining = (until - now).to_std().unwrap_or_default();
                    warn!(
                        "{} is throttled, {:.1}s remaining",
                        domain,
                        remaining.as_secs_f64()
                    );
                    return remaining;
                }
                // 限流时间已过，重置状态
                info!("Throttle lifted for {}", domain);
                clock.is_throttled = false;
                clock.throttled_until = None;
                clock.failure_count = 0;
            }
        }

        let now = Instant::now();
        let effective_delay = clock.current_delay.max(self.domain_delay(&domain));
        let domain_wait = match clock.last_access {
            Some(last) => (effective_delay - now.duration_since(last).as_secs_f64()).max(0.0),
            None => 0.0,
        };

        let global_wait = self.check_global_rate_limit(now);

        // 乐观准入：无条件记录本次时间戳
        clock.last_access = Some(now);
        drop(clock);

        let wait = domain_wait.max(global_wait);
        if wait > 0.0 {
            debug!(
                "Admission wait {:.2}s for {} (domain {:.2}s, global {:.2}s)",
                wait, domain, domain_wait, global_wait
            );
        }
        Duration::from_secs_f64(wait)
    }

    /// 检查全局滑动窗口，返回需要等待的秒数并记录本次请求
    fn check_global_rate_limit(&self, now: Instant) -> f64 {
        let mut window = self.global_window.lock();
        let window_span = Duration::from_secs(self.config.global_time_window);

        // 移除时间窗口外的记录
        while let Some(front) = window.front() {
            if now.duration_since(*front) > window_span {
                window.pop_front();
            } else {
                break;
            }
        }

        let wait = if window.len() >= self.config.global_rate_limit {
            window
                .front()
                .map(|oldest| {
                    (window_span.as_secs_f64() - now.duration_since(*oldest).as_secs_f64())
                        .max(0.0)
                })
                .unwrap_or(0.0)
        } else {
            0.0
        };

        window.push_back(now);
        if wait > 0.0 {
            counter!("rate_limiter_global_waits_total").increment(1);
        }
        wait
    }

    /// 报告请求结果，调整对应域名的自适应延迟
    ///
    /// 状态码 403/429/503 视为反爬信号，额外记一次失败以加速限流
    pub fn report_result(&self, url: &str, success: bool, status_code: Option<u16>) {
        let domain = extract_domain(url);
        self.update_domain_status(&domain, success);

        if let Some(code) = status_code {
            if matches!(code, 403 | 429 | 503) {
                warn!(
                    "{} returned status {}, possible bot detection, marking extra failure",
                    domain, code
                );
                self.update_domain_status(&domain, false);
            }
        }
    }

    /// 根据请求成败更新域名状态
    fn update_domain_status(&self, domain: &str, success: bool) {
        let mut clock = self.clocks.entry(domain.to_string()).or_default();
        clock.total_requests += 1;

        if success {
            clock.total_success += 1;
            clock.success_count += 1;
            clock.failure_count = 0;

            // 成功则适当减少延迟，但不低于最小值
            if clock.current_delay > 0.0 {
                clock.current_delay = (clock.current_delay * self.config.success_recovery_factor)
                    .max(self.config.min_domain_delay);
            }
        } else {
            clock.failure_count += 1;
            clock.success_count = 0;

            // 失败则增加延迟，但不超过最大值；首次失败从配置延迟起步
            clock.current_delay = if clock.current_delay <= 0.0 {
                self.domain_delay(domain)
                    .clamp(self.config.min_domain_delay, self.config.max_domain_delay)
            } else {
                (clock.current_delay * self.config.failure_backoff_factor)
                    .min(self.config.max_domain_delay)
            };

            if clock.failure_count >= self.config.max_failures_before_throttle {
                let until =
                    Utc::now() + chrono::Duration::minutes(self.config.throttle_duration_minutes);
                clock.is_throttled = true;
                clock.throttled_until = Some(until);
                counter!("rate_limiter_throttled_total", "domain" => domain.to_string())
                    .increment(1);
                warn!(
                    "{} failed {} consecutive times, throttled until {}",
                    domain,
                    clock.failure_count,
                    until.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        gauge!("rate_limiter_domain_delay_seconds", "domain" => domain.to_string())
            .set(clock.current_delay);
    }

    /// 获取指定域名的状态统计
    pub fn domain_stats(&self, domain: &str) -> Option<DomainStats> {
        self.clocks.get(domain).map(|clock| DomainStats {
            domain: domain.to_string(),
            total_requests: clock.total_requests,
            total_success: clock.total_success,
            success_rate: if clock.total_requests > 0 {
                clock.total_success as f64 / clock.total_requests as f64 * 100.0
            } else {
                0.0
            },
            failure_count: clock.failure_count,
            current_delay: clock.current_delay,
            is_throttled: clock.is_throttled,
            throttled_until: clock
                .throttled_until
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        })
    }

    /// 获取所有域名的状态统计
    pub fn all_domain_stats(&self) -> Vec<DomainStats> {
        self.clocks
            .iter()
            .filter_map(|entry| self.domain_stats(entry.key()))
            .collect()
    }

    /// 清除指定域名的统计数据
    pub fn clear_domain(&self, domain: &str) {
        if self.clocks.remove(domain).is_some() {
            info!("Cleared rate limiter state for {}", domain);
        }
    }

    /// 清除所有统计数据
    pub fn clear_all(&self) {
        self.clocks.clear();
        self.global_window.lock().clear();
        info!("Cleared all rate limiter state");
    }
}
