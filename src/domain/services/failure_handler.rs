// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::models::failed_task::{snapshot_time, ErrorCategory, FailedTask};
use crate::domain::services::retry_policy::RetryPolicy;

/// 失败快照错误类型
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("快照文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("快照序列化失败: {0}")]
    Serde(#[from] serde_json::Error),
}

/// 永久失败回调
///
/// 任务耗尽类别的重试预算时触发，每个任务恰好一次
pub type PermanentFailureCallback = Box<dyn Fn(&FailedTask) + Send + Sync>;

/// 按状态码和错误讯息分类错误
///
/// 状态码优先：429 → 限流，403 → 权限，4xx → 客户端，5xx → 服务器；
/// 否则按讯息中的特征词判断网络或解析错误，默认未知
pub fn classify_error(message: &str, status_code: Option<u16>) -> ErrorCategory {
    if let Some(code) = status_code {
        match code {
            429 => return ErrorCategory::RateLimit,
            403 => return ErrorCategory::Permission,
            400..=499 => return ErrorCategory::Client,
            500..=599 => return ErrorCategory::Server,
            _ => {}
        }
    }

    let lowered = message.to_lowercase();

    const NETWORK_SIGNATURES: [&str; 6] =
        ["timeout", "connection", "socket", "ssl", "dns", "network"];
    if NETWORK_SIGNATURES.iter().any(|s| lowered.contains(s)) {
        return ErrorCategory::Network;
    }

    const PARSING_SIGNATURES: [&str; 5] = ["parse", "json", "decode", "syntax", "selector"];
    if PARSING_SIGNATURES.iter().any(|s| lowered.contains(s)) {
        return ErrorCategory::Parsing;
    }

    ErrorCategory::Unknown
}

/// 等待重试和永久失败的任务队列
#[derive(Default)]
struct FailureQueues {
    /// 等待重试的任务
    pending: HashMap<String, FailedTask>,
    /// 永久失败的任务
    permanent: HashMap<String, FailedTask>,
}

/// 失败快照文件结构
#[derive(Serialize, Deserialize)]
struct FailureSnapshot {
    pending_tasks: HashMap<String, FailedTask>,
    permanent_failures: HashMap<String, FailedTask>,
    #[serde(with = "snapshot_time")]
    saved_at: chrono::DateTime<Utc>,
}

/// 类别或站点维度的任务计数
#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureCount {
    /// 等待重试的任务数
    pub pending: usize,
    /// 永久失败的任务数
    pub permanent: usize,
}

/// 失败任务统计
#[derive(Debug, Clone, Serialize)]
pub struct FailureStats {
    /// 等待重试的任务总数
    pub total_pending: usize,
    /// 永久失败的任务总数
    pub total_permanent_failures: usize,
    /// 按错误类别统计
    pub by_category: HashMap<String, FailureCount>,
    /// 按站点统计
    pub by_site: HashMap<String, FailureCount>,
}

/// 失败处理器
///
/// 管理失败任务的分类、计划重试（scheduled retry）和持久化。
/// 这里的重试是跨会话的长周期重试，与爬虫会话内的即时重试
/// （immediate retry）互不计数。
pub struct FailureHandler {
    retry_policy: RetryPolicy,
    on_permanent_failure: Option<PermanentFailureCallback>,
    queues: Mutex<FailureQueues>,
}

impl FailureHandler {
    /// 使用指定重试策略创建失败处理器
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            retry_policy,
            on_permanent_failure: None,
            queues: Mutex::new(FailureQueues::default()),
        }
    }

    /// 设定永久失败回调
    pub fn with_permanent_failure_callback(mut self, callback: PermanentFailureCallback) -> Self {
        self.on_permanent_failure = Some(callback);
        self
    }

    /// 注册失败任务
    ///
    /// 对同一 URL 幂等：已存在的任务重新分类、递增重试次数并合并
    /// 额外数据；新任务从重试次数 0 开始。之后按重试策略决定任务
    /// 去向：可重试则计算下次重试时间留在等待队列，否则移入永久
    /// 失败队列并触发一次回调。
    ///
    /// # 参数
    ///
    /// * `url` - 失败的 URL
    /// * `site_name` - 站点名称
    /// * `error_message` - 错误讯息
    /// * `status_code` - HTTP 状态码
    /// * `extra_data` - 额外数据
    ///
    /// # 返回值
    ///
    /// 返回登记后任务的副本
    pub fn register_failure(
        &self,
        url: &str,
        site_name: &str,
        error_message: &str,
        status_code: Option<u16>,
        extra_data: Option<HashMap<String, serde_json::Value>>,
    ) -> FailedTask {
        let category = classify_error(error_message, status_code);

        let (task, became_permanent) = {
            let mut queues = self.queues.lock();

            let task = match queues.pending.get_mut(url) {
                Some(existing) => {
                    existing.error_category = category;
                    existing.error_message = error_message.to_string();
                    existing.status_code = status_code;
                    existing.retry_count += 1;
                    existing.last_failed_at = Utc::now();
                    if let Some(extra) = extra_data {
                        existing.extra_data.extend(extra);
                    }
                    info!(
                        "Updated failed task {} (retry {} / category {})",
                        url, existing.retry_count, category
                    );
                    existing.clone()
                }
                None => {
                    let mut task =
                        FailedTask::new(url, site_name, category, error_message, status_code);
                    if let Some(extra) = extra_data {
                        task.extra_data = extra;
                    }
                    info!("Registered new failed task {} (category {})", url, category);
                    queues.pending.insert(url.to_string(), task.clone());
                    task
                }
            };

            if self
                .retry_policy
                .should_retry(task.error_category, task.retry_count)
            {
                let next = self
                    .retry_policy
                    .next_retry_at(task.error_category, task.retry_count);
                let task = match queues.pending.get_mut(url) {
                    Some(entry) => {
                        entry.next_retry_at = Some(next);
                        entry.clone()
                    }
                    None => task,
                };
                info!(
                    "Task {} scheduled for retry at {}",
                    url,
                    next.format("%Y-%m-%d %H:%M:%S")
                );
                (task, false)
            } else {
                // 耗尽重试预算，移入永久失败队列
                let task = queues.pending.remove(url).unwrap_or(task);
                warn!(
                    "Task {} reached max retries ({}), marked as permanent failure",
                    url, task.retry_count
                );
                counter!(
                    "failure_handler_permanent_total",
                    "category" => task.error_category.as_str()
                )
                .increment(1);
                queues.permanent.insert(url.to_string(), task.clone());
                (task, true)
            }
        };

        // 回调在锁外触发，且每个任务恰好一次
        if became_permanent {
            if let Some(callback) = &self.on_permanent_failure {
                callback(&task);
            }
        }

        task
    }

    /// 获取准备好可以重试的任务
    ///
    /// 返回 `next_retry_at` 已到期的等待任务，按重试时间升序，
    /// 最多 `max_count` 条。不修改任何状态：调用方尝试后必须
    /// 调用 `mark_success` 或再次 `register_failure`。
    pub fn ready_tasks(&self, max_count: usize) -> Vec<FailedTask> {
        let queues = self.queues.lock();
        let now = Utc::now();
        let mut ready: Vec<FailedTask> = queues
            .pending
            .values()
            .filter(|t| t.next_retry_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        ready.sort_by_key(|t| t.next_retry_at);
        ready.truncate(max_count);
        ready
    }

    /// 获取指定站点准备好可以重试的任务
    pub fn ready_tasks_for_site(&self, site_name: &str, max_count: usize) -> Vec<FailedTask> {
        let queues = self.queues.lock();
        let now = Utc::now();
        let mut ready: Vec<FailedTask> = queues
            .pending
            .values()
            .filter(|t| t.site_name == site_name)
            .filter(|t| t.next_retry_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        ready.sort_by_key(|t| t.next_retry_at);
        ready.truncate(max_count);
        ready
    }

    /// 标记任务成功完成，从等待队列移除
    ///
    /// URL 不在等待队列时是无操作，返回 false
    pub fn mark_success(&self, url: &str) -> bool {
        let removed = self.queues.lock().pending.remove(url).is_some();
        if removed {
            info!("Task {} completed, removed from retry queue", url);
        }
        removed
    }

    /// 等待重试的任务数
    pub fn pending_count(&self) -> usize {
        self.queues.lock().pending.len()
    }

    /// 获取指定 URL 的等待任务副本
    pub fn pending_task(&self, url: &str) -> Option<FailedTask> {
        self.queues.lock().pending.get(url).cloned()
    }

    /// 获取指定 URL 的永久失败任务副本
    pub fn permanent_task(&self, url: &str) -> Option<FailedTask> {
        self.queues.lock().permanent.get(url).cloned()
    }

    /// 将失败任务保存到快照文件
    ///
    /// 时间戳以 `YYYY-MM-DD HH:MM:SS`（UTC）序列化
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let snapshot = {
            let queues = self.queues.lock();
            FailureSnapshot {
                pending_tasks: queues.pending.clone(),
                permanent_failures: queues.permanent.clone(),
                saved_at: Utc::now(),
            }
        };

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&path, json)?;
        info!(
            "Saved {} pending and {} permanent failed tasks to {}",
            snapshot.pending_tasks.len(),
            snapshot.permanent_failures.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// 从快照文件加载失败任务
    ///
    /// 替换现有队列；存储的重试次数、类别和时间戳是权威值，
    /// 不做任何重新计算
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let content = std::fs::read_to_string(&path)?;
        let snapshot: FailureSnapshot = serde_json::from_str(&content)?;

        let mut queues = self.queues.lock();
        queues.pending = snapshot.pending_tasks;
        queues.permanent = snapshot.permanent_failures;
        info!(
            "Loaded {} pending and {} permanent failed tasks from {} (saved at {})",
            queues.pending.len(),
            queues.permanent.len(),
            path.as_ref().display(),
            snapshot.saved_at.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(())
    }

    /// 获取失败任务统计
    pub fn stats(&self) -> FailureStats {
        let queues = self.queues.lock();

        let mut by_category: HashMap<String, FailureCount> = HashMap::new();
        for category in ErrorCategory::ALL {
            by_category.insert(category.as_str().to_string(), FailureCount::default());
        }
        let mut by_site: HashMap<String, FailureCount> = HashMap::new();

        for task in queues.pending.values() {
            if let Some(count) = by_category.get_mut(task.error_category.as_str()) {
                count.pending += 1;
            }
            by_site.entry(task.site_name.clone()).or_default().pending += 1;
        }
        for task in queues.permanent.values() {
            if let Some(count) = by_category.get_mut(task.error_category.as_str()) {
                count.permanent += 1;
            }
            by_site
                .entry(task.site_name.clone())
                .or_default()
                .permanent += 1;
        }

        FailureStats {
            total_pending: queues.pending.len(),
            total_permanent_failures: queues.permanent.len(),
            by_category,
            by_site,
        }
    }
}
