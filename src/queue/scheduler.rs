// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::crawler::manager::CrawlerManager;
use crate::utils::errors::SchedulerError;

/// 新闻类站点的默认触发频率（每 10 分钟）
pub const NEWS_CRON: &str = "*/10 * * * *";
/// 其他类别站点的默认触发频率（每小时整点）
pub const DEFAULT_CRON: &str = "0 * * * *";

/// 解析 Cron 表达式
///
/// 接受 5 字段的 crontab 语法，内部补上秒字段转换为 6 字段形式
fn parse_cron(expr: &str) -> Result<Schedule, SchedulerError> {
    let fields = expr.split_whitespace().count();
    let normalized = match fields {
        5 => format!("0 {}", expr),
        6 | 7 => expr.to_string(),
        _ => {
            return Err(SchedulerError::InvalidCronExpression(
                expr.to_string(),
                format!("unexpected field count {}", fields),
            ))
        }
    };
    Schedule::from_str(&normalized)
        .map_err(|e| SchedulerError::InvalidCronExpression(expr.to_string(), e.to_string()))
}

/// 排程任务信息
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    /// 任务 ID
    pub id: Uuid,
    /// 站点名称
    pub site: String,
    /// 触发器描述（Cron 表达式）
    pub trigger: String,
    /// 下次触发时间
    pub next_run: Option<DateTime<Utc>>,
}

/// 单个站点的排程任务
struct ScheduledJob {
    id: Uuid,
    cron_expression: String,
    schedule: Schedule,
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

/// 爬虫排程器
///
/// 每个站点至多持有一个排程任务；重复排程默认替换而不是叠加。
/// 触发的任务在工作池上执行，同一站点同时只允许一个实例在跑，
/// 重叠的触发被跳过而不是排队。触发回调内的任何错误只记录
/// 日志，不会杀死排程循环。
pub struct CrawlerScheduler {
    manager: Arc<CrawlerManager>,
    jobs: Mutex<HashMap<String, ScheduledJob>>,
    run_now_permits: Arc<Semaphore>,
    misfire_grace: Duration,
}

impl CrawlerScheduler {
    /// 创建新的排程器
    ///
    /// # 参数
    ///
    /// * `manager` - 爬虫管理器
    /// * `worker_pool_size` - 立即执行任务的工作池大小
    /// * `misfire_grace` - 错过触发时间后的宽限期
    pub fn new(
        manager: Arc<CrawlerManager>,
        worker_pool_size: usize,
        misfire_grace: Duration,
    ) -> Self {
        info!(
            "Scheduler initialized (worker pool {}, misfire grace {:?})",
            worker_pool_size, misfire_grace
        );
        Self {
            manager,
            jobs: Mutex::new(HashMap::new()),
            run_now_permits: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            misfire_grace,
        }
    }

    /// 排程特定站点的爬取任务
    ///
    /// 站点已有任务时默认替换；`replace_existing` 为 false 时不做
    /// 任何修改并返回错误
    ///
    /// # 返回值
    ///
    /// * `Ok(Uuid)` - 新任务的 ID
    /// * `Err(SchedulerError)` - 站点未知、表达式无效或已有任务
    pub fn schedule_site(
        &self,
        site_name: &str,
        cron_expression: &str,
        replace_existing: bool,
    ) -> Result<Uuid, SchedulerError> {
        if !self.manager.sites().contains(site_name) {
            error!("Cannot schedule unknown site {}", site_name);
            return Err(SchedulerError::UnknownSite(site_name.to_string()));
        }
        let schedule = parse_cron(cron_expression)?;

        let mut jobs = self.jobs.lock();
        if jobs.contains_key(site_name) {
            if !replace_existing {
                warn!("Site {} already scheduled, skipping", site_name);
                return Err(SchedulerError::AlreadyScheduled(site_name.to_string()));
            }
            if let Some(old) = jobs.remove(site_name) {
                old.handle.abort();
                info!("Replaced existing job {} for {}", old.id, site_name);
            }
        }

        let id = Uuid::new_v4();
        let running = Arc::new(AtomicBool::new(false));
        let handle = self.spawn_job_loop(site_name.to_string(), schedule.clone(), running.clone());

        jobs.insert(
            site_name.to_string(),
            ScheduledJob {
                id,
                cron_expression: cron_expression.to_string(),
                schedule,
                handle,
                running,
            },
        );
        info!(
            "Scheduled site {} with cron expression {}",
            site_name, cron_expression
        );
        Ok(id)
    }

    /// 排程任务的触发循环
    fn spawn_job_loop(
        &self,
        site_name: String,
        schedule: Schedule,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let manager = self.manager.clone();
        let misfire_grace = self.misfire_grace;

        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = schedule.after(&now).next() else {
                    warn!("Schedule for {} has no upcoming fire times", site_name);
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                // 错过宽限期的触发直接跳过
                let lateness = Utc::now()
                    .signed_duration_since(next)
                    .to_std()
                    .unwrap_or_default();
                if lateness > misfire_grace {
                    warn!(
                        "Missed fire time for {} by {:.0}s, skipping (misfire)",
                        site_name,
                        lateness.as_secs_f64()
                    );
                    continue;
                }

                // 同一站点至多一个并发实例，重叠触发跳过而不是排队
                if running.swap(true, Ordering::SeqCst) {
                    warn!(
                        "Previous crawl for {} still running, skipping trigger",
                        site_name
                    );
                    continue;
                }

                let manager = manager.clone();
                let flag = running.clone();
                let job_site = site_name.clone();
                tokio::spawn(async move {
                    match manager.run_crawler(&job_site).await {
                        Ok(report) => info!(
                            "Scheduled crawl for {} finished (success={}, scraped={})",
                            job_site, report.success, report.total_scraped
                        ),
                        Err(e) => error!("Scheduled crawl for {} failed: {}", job_site, e),
                    }
                    flag.store(false, Ordering::SeqCst);
                });
            }
        })
    }

    /// 排程特定类别的所有站点
    ///
    /// # 返回值
    ///
    /// (成功排程的站点数, 该类别的站点总数)
    pub fn schedule_category(&self, category: &str, cron_expression: &str) -> (usize, usize) {
        let sites = self.manager.sites().sites_in_category(category);
        if sites.is_empty() {
            warn!("No sites found in category {}", category);
            return (0, 0);
        }

        let total = sites.len();
        let mut success = 0;
        for site in sites {
            if self.schedule_site(&site, cron_expression, true).is_ok() {
                success += 1;
            }
        }
        info!(
            "Scheduled {}/{} sites in category {}",
            success, total, category
        );
        (success, total)
    }

    /// 按默认策略排程所有站点
    ///
    /// 新闻类别每 10 分钟，其余类别每小时整点
    ///
    /// # 返回值
    ///
    /// (成功排程的站点数, 站点总数)
    pub fn schedule_all_sites(&self) -> (usize, usize) {
        let grouped = self.manager.sites().sites_by_category();
        let mut success = 0;
        let mut total = 0;

        for (category, sites) in grouped {
            let cron = if category == "news" {
                NEWS_CRON
            } else {
                DEFAULT_CRON
            };
            total += sites.len();
            for site in sites {
                if self.schedule_site(&site, cron, true).is_ok() {
                    success += 1;
                }
            }
            info!("Scheduled category {} with {}", category, cron);
        }
        info!("Scheduled {}/{} sites by default policy", success, total);
        (success, total)
    }

    /// 移除特定站点的排程任务
    pub fn remove_site(&self, site_name: &str) -> Result<(), SchedulerError> {
        let removed = self.jobs.lock().remove(site_name);
        match removed {
            Some(job) => {
                job.handle.abort();
                info!("Removed scheduled job {} for {}", job.id, site_name);
                Ok(())
            }
            None => {
                warn!("Site {} has no scheduled job", site_name);
                Err(SchedulerError::NotScheduled(site_name.to_string()))
            }
        }
    }

    /// 立即执行特定站点的爬取任务
    ///
    /// 通过有界工作池在排程之外触发一次爬取，从调用方角度是
    /// 发射后不管
    pub fn run_now(&self, site_name: &str) -> Result<(), SchedulerError> {
        if !self.manager.sites().contains(site_name) {
            error!("Cannot run unknown site {}", site_name);
            return Err(SchedulerError::UnknownSite(site_name.to_string()));
        }

        let permits = self.run_now_permits.clone();
        let manager = self.manager.clone();
        let site = site_name.to_string();
        info!("Submitting immediate crawl for {}", site);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            match manager.run_crawler(&site).await {
                Ok(report) => info!(
                    "Immediate crawl for {} finished (success={})",
                    site, report.success
                ),
                Err(e) => error!("Immediate crawl for {} failed: {}", site, e),
            }
        });
        Ok(())
    }

    /// 列出所有排程任务及下次触发时间
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock();
        let mut infos: Vec<JobInfo> = jobs
            .iter()
            .map(|(site, job)| JobInfo {
                id: job.id,
                site: site.clone(),
                trigger: job.cron_expression.clone(),
                next_run: job.schedule.upcoming(Utc).next(),
            })
            .collect();
        infos.sort_by(|a, b| a.site.cmp(&b.site));
        infos
    }

    /// 指定站点是否有正在运行的任务实例
    pub fn is_running(&self, site_name: &str) -> bool {
        self.jobs
            .lock()
            .get(site_name)
            .map(|job| job.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// 关闭排程器，中止所有排程任务
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock();
        for (site, job) in jobs.drain() {
            job.handle.abort();
            info!("Aborted scheduled job for {}", site);
        }
        info!("Scheduler shut down");
    }
}
