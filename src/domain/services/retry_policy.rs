// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::models::failed_task::ErrorCategory;

/// 各错误类别不在表中时的默认最大重试次数
const FALLBACK_MAX_RETRIES: u32 = 3;
/// 各错误类别不在表中时的默认基本延迟范围（秒）
const FALLBACK_BASE_DELAY: (f64, f64) = (10.0, 30.0);

/// 差异化重试策略
///
/// 纯查表加计算，构造后不可变。为每个错误类别定义最大重试次数
/// 和基本延迟范围，配合全局退避因子、抖动和延迟上限。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 各错误类别的最大重试次数
    pub max_retries: HashMap<ErrorCategory, u32>,
    /// 各错误类别的基本延迟范围（最小秒数, 最大秒数）
    pub base_delays: HashMap<ErrorCategory, (f64, f64)>,
    /// 重试延迟增长因子
    pub backoff_factor: f64,
    /// 随机抖动比例（0-1 之间的小数）
    pub jitter: f64,
    /// 最大延迟上限（秒）
    pub max_delay: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let max_retries = HashMap::from([
            (ErrorCategory::Network, 5),
            (ErrorCategory::Server, 3),
            (ErrorCategory::Client, 1),
            (ErrorCategory::RateLimit, 8),
            (ErrorCategory::Parsing, 2),
            (ErrorCategory::Permission, 1),
            (ErrorCategory::Unknown, 3),
        ]);
        let base_delays = HashMap::from([
            (ErrorCategory::Network, (5.0, 15.0)),
            (ErrorCategory::Server, (10.0, 30.0)),
            (ErrorCategory::Client, (5.0, 10.0)),
            (ErrorCategory::RateLimit, (30.0, 60.0)),
            (ErrorCategory::Parsing, (5.0, 15.0)),
            (ErrorCategory::Permission, (60.0, 120.0)),
            (ErrorCategory::Unknown, (10.0, 20.0)),
        ]);
        Self {
            max_retries,
            base_delays,
            backoff_factor: 2.0,
            jitter: 0.1,
            max_delay: 3600.0,
        }
    }
}

impl RetryPolicy {
    /// 指定类别的最大重试次数
    pub fn max_retries_for(&self, category: ErrorCategory) -> u32 {
        self.max_retries
            .get(&category)
            .copied()
            .unwrap_or(FALLBACK_MAX_RETRIES)
    }

    /// 判断当前重试次数下是否还应该重试
    pub fn should_retry(&self, category: ErrorCategory, retry_count: u32) -> bool {
        retry_count < self.max_retries_for(category)
    }

    /// 计算下次重试的退避延迟（秒）
    ///
    /// 指数退避：在基本延迟范围内取随机值，乘以退避因子的
    /// 重试次数次方，加上 ±jitter 比例的随机抖动，封顶于上限
    pub fn backoff_delay(&self, category: ErrorCategory, retry_count: u32) -> f64 {
        let (min_delay, max_delay) = self
            .base_delays
            .get(&category)
            .copied()
            .unwrap_or(FALLBACK_BASE_DELAY);

        let base = if max_delay > min_delay {
            rand::random_range(min_delay..max_delay)
        } else {
            min_delay
        };
        let mut delay = base * self.backoff_factor.powi(retry_count as i32);

        let jitter_amount = delay * self.jitter;
        if jitter_amount > 0.0 {
            delay += rand::random_range(-jitter_amount..jitter_amount);
        }

        delay.min(self.max_delay).max(0.0)
    }

    /// 计算下次重试的绝对时间
    pub fn next_retry_at(&self, category: ErrorCategory, retry_count: u32) -> DateTime<Utc> {
        let delay = self.backoff_delay(category, retry_count);
        Utc::now() + chrono::Duration::milliseconds((delay * 1000.0) as i64)
    }
}
