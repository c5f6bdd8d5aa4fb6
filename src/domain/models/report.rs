// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 爬虫会话统计
///
/// 在一次会话内累计成功、失败和重试计数，会话结束时生成报告
#[derive(Debug, Clone)]
pub struct CrawlStats {
    site_name: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    total_urls: u64,
    successful_urls: u64,
    failed_urls: u64,
    retry_urls: u64,
    depth_stats: HashMap<u32, u64>,
    error_types: HashMap<String, u64>,
}

impl CrawlStats {
    /// 创建新的统计对象
    pub fn new(site_name: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            start_time: Utc::now(),
            end_time: None,
            total_urls: 0,
            successful_urls: 0,
            failed_urls: 0,
            retry_urls: 0,
            depth_stats: HashMap::new(),
            error_types: HashMap::new(),
        }
    }

    /// 记录成功爬取的 URL
    pub fn record_success(&mut self, depth: u32) {
        self.successful_urls += 1;
        self.total_urls += 1;
        *self.depth_stats.entry(depth).or_insert(0) += 1;
    }

    /// 记录失败的 URL
    pub fn record_failure(&mut self, error_type: &str) {
        self.failed_urls += 1;
        self.total_urls += 1;
        *self.error_types.entry(error_type.to_string()).or_insert(0) += 1;
    }

    /// 记录一次重试
    pub fn record_retry(&mut self) {
        self.retry_urls += 1;
    }

    /// 标记会话结束时间
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// 生成会话报告
    pub fn generate_report(&self, success: bool, total_scraped: u64, depth: u32) -> CrawlReport {
        let end_time = self.end_time.unwrap_or_else(Utc::now);
        let duration = (end_time - self.start_time).num_milliseconds() as f64 / 1000.0;
        let success_rate = if self.total_urls > 0 {
            self.successful_urls as f64 / self.total_urls as f64 * 100.0
        } else {
            0.0
        };

        CrawlReport {
            site_name: self.site_name.clone(),
            success,
            start_time: self.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            end_time: end_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            duration_seconds: duration,
            total_urls: self.total_urls,
            successful_urls: self.successful_urls,
            failed_urls: self.failed_urls,
            retry_urls: self.retry_urls,
            success_rate: format!("{:.2}%", success_rate),
            total_scraped,
            depth,
            depth_stats: self.depth_stats.clone(),
            error_types: self.error_types.clone(),
        }
    }
}

/// 爬虫会话报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    /// 站点名称
    pub site_name: String,
    /// 会话是否成功（成功 ⇔ 取得了非空的种子链接集合）
    pub success: bool,
    /// 开始时间
    pub start_time: String,
    /// 结束时间
    pub end_time: String,
    /// 持续时间（秒）
    pub duration_seconds: f64,
    /// 处理的 URL 总数
    pub total_urls: u64,
    /// 成功的 URL 数
    pub successful_urls: u64,
    /// 失败的 URL 数
    pub failed_urls: u64,
    /// 重试的 URL 数
    pub retry_urls: u64,
    /// 成功率
    pub success_rate: String,
    /// 爬取的页面总数
    pub total_scraped: u64,
    /// 到达的爬取深度
    pub depth: u32,
    /// 按深度统计的成功数
    pub depth_stats: HashMap<u32, u64>,
    /// 按错误类型统计的失败数
    pub error_types: HashMap<String, u64>,
}
