// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::settings::{CrawlerSettings, ImmediateRetrySettings};
use crate::config::sites::SiteRegistry;
use crate::crawler::session::{CrawlServices, CrawlSession};
use crate::domain::models::report::CrawlReport;
use crate::utils::errors::CrawlerError;

/// 站点摘要信息
#[derive(Debug, Clone, Serialize)]
pub struct SiteSummary {
    /// 站点名称
    pub name: String,
    /// 站点类别
    pub category: String,
    /// 站点数字 ID
    pub site_id: u32,
    /// 起始 URL 列表
    pub start_urls: Vec<String>,
    /// 域名延迟覆盖
    pub domain_delay: Option<f64>,
}

/// 爬虫管理器
///
/// 提供统一的爬虫执行入口：按站点、按类别或全量执行。
/// 每次执行创建一个新的爬虫会话，服务集合在会话间共享。
pub struct CrawlerManager {
    sites: Arc<SiteRegistry>,
    limits: CrawlerSettings,
    retry: ImmediateRetrySettings,
    services: CrawlServices,
}

impl CrawlerManager {
    /// 创建新的爬虫管理器
    pub fn new(
        sites: Arc<SiteRegistry>,
        limits: CrawlerSettings,
        retry: ImmediateRetrySettings,
        services: CrawlServices,
    ) -> Self {
        info!("Crawler manager initialized with {} sites", sites.len());
        Self {
            sites,
            limits,
            retry,
            services,
        }
    }

    /// 执行单个站点的爬虫
    ///
    /// # 参数
    ///
    /// * `site_name` - 站点名称
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlReport)` - 会话报告
    /// * `Err(CrawlerError)` - 站点不存在或配置无效
    pub async fn run_crawler(&self, site_name: &str) -> Result<CrawlReport, CrawlerError> {
        let site = self
            .sites
            .get(site_name)
            .ok_or_else(|| CrawlerError::UnknownSite(site_name.to_string()))?
            .clone();

        info!("Running crawler for {}", site_name);
        let session = CrawlSession::new(site, self.limits, self.retry, self.services.clone())?;
        let report = session.run_full_scraper().await;
        info!(
            "Crawler for {} finished: success={}, scraped={}",
            site_name, report.success, report.total_scraped
        );
        Ok(report)
    }

    /// 依次执行所有站点的爬虫
    ///
    /// # 返回值
    ///
    /// 站点名称到会话成败的映射
    pub async fn run_all_crawlers(&self) -> HashMap<String, bool> {
        let mut names = self.sites.site_names();
        names.sort();
        info!("Running crawlers for all {} sites", names.len());
        self.run_sites(names).await
    }

    /// 执行指定类别的所有站点爬虫
    pub async fn run_category_crawlers(&self, category: &str) -> HashMap<String, bool> {
        let mut names = self.sites.sites_in_category(category);
        if names.is_empty() {
            warn!("No sites found in category {}", category);
            return HashMap::new();
        }
        names.sort();
        info!(
            "Running crawlers for category {} ({} sites)",
            category,
            names.len()
        );
        self.run_sites(names).await
    }

    /// 依次执行一组站点，单个站点的失败不影响其余站点
    async fn run_sites(&self, names: Vec<String>) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for name in names {
            let success = match self.run_crawler(&name).await {
                Ok(report) => report.success,
                Err(e) => {
                    error!("Crawler for {} failed: {}", name, e);
                    false
                }
            };
            results.insert(name, success);
        }
        results
    }

    /// 列出所有站点摘要
    pub fn list_sites(&self) -> Vec<SiteSummary> {
        let mut sites: Vec<SiteSummary> = self
            .sites
            .iter()
            .map(|site| SiteSummary {
                name: site.name.clone(),
                category: site.website_category.clone(),
                site_id: site.site_id,
                start_urls: site.start_urls.clone(),
                domain_delay: site.domain_delay,
            })
            .collect();
        sites.sort_by(|a, b| a.site_id.cmp(&b.site_id));
        sites
    }

    /// 站点注册表
    pub fn sites(&self) -> &SiteRegistry {
        &self.sites
    }
}
