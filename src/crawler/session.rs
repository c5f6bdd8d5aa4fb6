// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::stream::{self, StreamExt};
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::settings::{CrawlerSettings, ImmediateRetrySettings};
use crate::config::sites::SiteConfig;
use crate::domain::models::article::ArticleRecord;
use crate::domain::models::page::PageResult;
use crate::domain::models::report::{CrawlReport, CrawlStats};
use crate::domain::repositories::article_repository::{ArticleIndexer, ArticleRepository};
use crate::domain::services::content_processor::ProcessorRegistry;
use crate::domain::services::failure_handler::FailureHandler;
use crate::domain::services::rate_limiter::RateLimiterManager;
use crate::engines::traits::{FetchError, FetchOptions, PageFetcher};
use crate::queue::message_queue::{task_topic, MessageQueue, RESULT_TOPIC};
use crate::utils::errors::CrawlerError;
use crate::utils::text_processing::random_delay;
use crate::utils::url_utils::{strip_query, UrlRule};

/// 每层穿插处理的计划重试任务数上限
const RETRY_BATCH: usize = 5;

/// 爬虫会话依赖的服务集合
///
/// 全部显式注入，由应用入口构造并在各会话间共享
#[derive(Clone)]
pub struct CrawlServices {
    /// 页面抓取引擎
    pub fetcher: Arc<dyn PageFetcher>,
    /// 流量控制管理器
    pub rate_limiter: Arc<RateLimiterManager>,
    /// 失败处理器
    pub failure_handler: Arc<FailureHandler>,
    /// 爬取记录仓库
    pub repository: Arc<dyn ArticleRepository>,
    /// 消息队列
    pub queue: Arc<dyn MessageQueue>,
    /// 全文索引
    pub indexer: Arc<dyn ArticleIndexer>,
    /// 内容处理器注册表
    pub processors: Arc<ProcessorRegistry>,
}

/// 单个页面的抓取产出
struct ScrapedPage {
    record: ArticleRecord,
    next_links: Vec<String>,
}

/// 爬虫会话
///
/// 驱动一个站点的一次完整爬取：种子抓取、逐层扩展队列、
/// 深度和页面数预算、穿插计划重试。会话内的已访问集合是
/// 私有状态，会话结束即丢弃。
///
/// 单个 URL 的任何失败都不会中止会话；只有空的种子集合会让
/// 会话以失败结束。
pub struct CrawlSession {
    site: SiteConfig,
    limits: CrawlerSettings,
    retry: ImmediateRetrySettings,
    services: CrawlServices,
    url_rule: UrlRule,
    stats: Mutex<CrawlStats>,
}

impl CrawlSession {
    /// 创建新的爬虫会话
    pub fn new(
        site: SiteConfig,
        limits: CrawlerSettings,
        retry: ImmediateRetrySettings,
        services: CrawlServices,
    ) -> Result<Self, CrawlerError> {
        let url_rule = UrlRule::new(&site.url_pattern, site.is_regex)
            .map_err(|e| CrawlerError::InvalidSiteConfig(format!("{}: {}", site.name, e)))?;
        let stats = Mutex::new(CrawlStats::new(&site.name));
        info!(
            "Initialized crawl session for {}: max_depth={}, max_pages={}, initial_urls={}",
            site.name, limits.max_depth, limits.max_pages, limits.initial_urls
        );
        Ok(Self {
            site,
            limits,
            retry,
            services,
            url_rule,
            stats,
        })
    }

    /// 执行完整的爬虫流程，进行多层爬取
    ///
    /// # 返回值
    ///
    /// 会话报告；`success` 为 true 当且仅当取得了非空的种子集合
    pub async fn run_full_scraper(&self) -> CrawlReport {
        info!("Starting full crawl for {}", self.site.name);
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue = self.collect_seed_links().await;

        if queue.is_empty() {
            warn!("{} produced no seed links, session aborted", self.site.name);
            let mut stats = self.stats.lock();
            stats.finish();
            return stats.generate_report(false, 0, 0);
        }

        let mut depth: u32 = 0;
        let mut total_scraped: u64 = 0;

        while !queue.is_empty()
            && depth < self.limits.max_depth
            && total_scraped < self.limits.max_pages
        {
            info!(
                "Crawling level {} for {} ({} urls queued)",
                depth + 1,
                self.site.name,
                queue.len()
            );
            let mut next_queue: Vec<String> = Vec::new();
            let mut articles: Vec<ArticleRecord> = Vec::new();

            // 先穿插处理一批计划重试任务
            total_scraped += self
                .process_retry_queue(self.retry_budget(total_scraped), depth)
                .await;

            for link in &queue {
                if visited.contains(link) || total_scraped >= self.limits.max_pages {
                    continue;
                }
                visited.insert(link.clone());

                let wait = self.services.rate_limiter.admit(link);
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }

                if let Some(scraped) = self.fetch_article(link, depth).await {
                    self.publish_result(&scraped.record).await;
                    next_queue.extend(scraped.next_links);
                    articles.push(scraped.record);
                    total_scraped += 1;
                }

                if total_scraped >= self.limits.max_pages {
                    info!(
                        "Reached max pages ({}) for {}, stopping",
                        self.limits.max_pages, self.site.name
                    );
                    break;
                }
            }

            self.persist_batch(depth, &articles).await;

            // 准备下一层：去重并排除已访问的 URL
            let mut next: Vec<String> = next_queue
                .into_iter()
                .collect::<HashSet<_>>()
                .difference(&visited)
                .cloned()
                .collect();
            next.sort();
            queue = next;
            depth += 1;

            if total_scraped < self.limits.max_pages {
                total_scraped += self
                    .process_retry_queue(self.retry_budget(total_scraped), depth)
                    .await;
            }
        }

        let report = {
            let mut stats = self.stats.lock();
            stats.finish();
            stats.generate_report(true, total_scraped, depth)
        };
        info!(
            "Crawl finished for {}: {} pages over {} levels, success rate {}",
            self.site.name, report.total_scraped, report.depth, report.success_rate
        );
        report
    }

    /// 本轮允许穿插处理的重试任务数
    fn retry_budget(&self, total_scraped: u64) -> usize {
        let remaining = self.limits.max_pages.saturating_sub(total_scraped);
        (RETRY_BATCH as u64).min(remaining) as usize
    }

    /// 抓取配置（选择器对编排逻辑不透明，原样传递）
    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: None,
            content_selector: self.site.content_selector.clone(),
            extract_only_metadata: self.site.extract_only_metadata,
        }
    }

    /// 并发抓取全部起始 URL，收集、过滤并截断种子链接
    async fn collect_seed_links(&self) -> Vec<String> {
        info!(
            "Collecting seed links for {} from {} start urls",
            self.site.name,
            self.site.start_urls.len()
        );

        let concurrency = self.limits.seed_concurrency.max(1);
        let results: Vec<Result<PageResult, FetchError>> =
            stream::iter(self.site.start_urls.clone())
                .map(|url| self.fetch_seed(url))
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut all_links: HashSet<String> = HashSet::new();
        for result in results.into_iter().flatten() {
            all_links.extend(result.internal_links);
        }

        let filtered: HashSet<String> = all_links
            .into_iter()
            .filter(|link| self.url_rule.matches(link))
            .collect();

        let existing = match self.services.repository.existing_urls().await {
            Ok(urls) => urls,
            Err(e) => {
                warn!("Failed to load existing urls, assuming none: {}", e);
                HashSet::new()
            }
        };

        let mut fresh: Vec<String> = filtered.difference(&existing).cloned().collect();
        info!(
            "Found {} valid links for {}, {} of them new",
            filtered.len(),
            self.site.name,
            fresh.len()
        );

        // 排序保证截断结果稳定
        fresh.sort();
        fresh.truncate(self.limits.initial_urls);
        self.publish_tasks(&fresh).await;
        fresh
    }

    /// 将入队的 URL 作为任务消息发布到站点专属主题
    async fn publish_tasks(&self, urls: &[String]) {
        let topic = task_topic(&self.site.name);
        for url in urls {
            let payload = serde_json::json!({
                "url": url,
                "site": self.site.name,
                "queued_at": chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            });
            if let Err(e) = self.services.queue.publish(&topic, payload).await {
                warn!("Failed to publish task for {}: {}", url, e);
            }
        }
    }

    /// 抓取单个起始 URL，结果上报流量控制，失败登记失败处理器
    async fn fetch_seed(&self, url: String) -> Result<PageResult, FetchError> {
        let wait = self.services.rate_limiter.admit(&url);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        match self.services.fetcher.fetch(&url, &self.fetch_options()).await {
            Ok(page) => {
                self.services
                    .rate_limiter
                    .report_result(&url, true, page.status_code);
                self.stats.lock().record_success(0);
                Ok(page)
            }
            Err(e) => {
                let status = e.status_code();
                warn!("Seed fetch failed for {}: {}", url, e);
                self.services.rate_limiter.report_result(&url, false, status);
                let task = self.services.failure_handler.register_failure(
                    &url,
                    &self.site.name,
                    &e.to_string(),
                    status,
                    None,
                );
                self.stats.lock().record_failure(task.error_category.as_str());
                Err(e)
            }
        }
    }

    /// 抓取单个页面，带固定次数的即时重试
    ///
    /// 即时重试在本次调用内完成；耗尽后将 URL 交给失败处理器，
    /// 由其按错误类别排程跨会话的计划重试。两种重试互不计数。
    async fn fetch_article(&self, url: &str, depth: u32) -> Option<ScrapedPage> {
        let options = self.fetch_options();
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 0..max_attempts {
            debug!("Fetching {} (attempt {}/{})", url, attempt + 1, max_attempts);
            match self.services.fetcher.fetch(url, &options).await {
                Ok(page) => {
                    self.services
                        .rate_limiter
                        .report_result(url, true, page.status_code);
                    self.stats.lock().record_success(depth);
                    counter!("crawler_pages_scraped_total", "site" => self.site.name.clone())
                        .increment(1);
                    return Some(self.build_scraped_page(page));
                }
                Err(e) => {
                    let status = e.status_code();
                    warn!("Fetch failed for {} (attempt {}): {}", url, attempt + 1, e);

                    if attempt + 1 < max_attempts {
                        let delay = random_delay(self.retry.min_delay, self.retry.max_delay)
                            * (attempt + 1) as f64;
                        info!("Retrying {} in {:.2}s", url, delay);
                        self.stats.lock().record_retry();
                        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                    } else {
                        // 即时重试耗尽，转入计划重试
                        self.services.rate_limiter.report_result(url, false, status);
                        let task = self.services.failure_handler.register_failure(
                            url,
                            &self.site.name,
                            &e.to_string(),
                            status,
                            None,
                        );
                        self.stats.lock().record_failure(task.error_category.as_str());
                    }
                }
            }
        }
        None
    }

    /// 从页面结果构建爬取记录和下一层链接
    fn build_scraped_page(&self, page: PageResult) -> ScrapedPage {
        let processor = self.services.processors.get(&self.site.name);

        let content = if self.site.extract_only_metadata {
            String::new()
        } else {
            page.content
                .as_deref()
                .map(|c| processor.clean_content(c))
                .unwrap_or_default()
        };

        let mut record = ArticleRecord::from_page(&page, &self.site, content);
        if !record.content.is_empty() {
            record.publish_time = processor.extract_publish_time(&record.content);
        }

        // 下一层链接：去查询参数、按规则过滤、去重
        let mut seen = HashSet::new();
        let next_links: Vec<String> = page
            .internal_links
            .iter()
            .map(|link| strip_query(link))
            .filter(|link| self.url_rule.matches(link))
            .filter(|link| seen.insert(link.clone()))
            .collect();

        debug!(
            "Scraped {} with {} next-level links",
            record.url,
            next_links.len()
        );
        ScrapedPage { record, next_links }
    }

    /// 处理一批到期的计划重试任务
    ///
    /// 走与队列 URL 相同的单页抓取路径；成功的任务从失败队列
    /// 移除并计入爬取总数
    async fn process_retry_queue(&self, max_items: usize, depth: u32) -> u64 {
        if max_items == 0 {
            return 0;
        }
        let tasks = self
            .services
            .failure_handler
            .ready_tasks_for_site(&self.site.name, max_items);
        if tasks.is_empty() {
            debug!("No retry tasks ready for {}", self.site.name);
            return 0;
        }

        info!(
            "Processing {} scheduled retry tasks for {}",
            tasks.len(),
            self.site.name
        );
        let mut successful = 0;
        for task in tasks {
            self.stats.lock().record_retry();

            let wait = self.services.rate_limiter.admit(&task.url);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            if let Some(scraped) = self.fetch_article(&task.url, depth).await {
                info!("Scheduled retry succeeded for {}", task.url);
                self.services.failure_handler.mark_success(&task.url);
                self.publish_result(&scraped.record).await;
                self.persist_batch(depth, std::slice::from_ref(&scraped.record))
                    .await;
                successful += 1;
            } else {
                warn!("Scheduled retry failed for {}", task.url);
            }
        }
        successful
    }

    /// 将单条记录发布到共享结果主题
    ///
    /// 发布失败只记录日志，不中断会话
    async fn publish_result(&self, record: &ArticleRecord) {
        match serde_json::to_value(record) {
            Ok(payload) => {
                if let Err(e) = self.services.queue.publish(RESULT_TOPIC, payload).await {
                    warn!("Failed to publish result for {}: {}", record.url, e);
                }
            }
            Err(e) => warn!("Failed to serialize result for {}: {}", record.url, e),
        }
    }

    /// 批量持久化并索引一层的爬取记录
    ///
    /// 协作方的写入失败只记录日志，不中断会话
    async fn persist_batch(&self, depth: u32, articles: &[ArticleRecord]) {
        if articles.is_empty() {
            return;
        }
        match self.services.repository.save(articles).await {
            Ok(()) => info!(
                "Saved {} articles for {} at level {}",
                articles.len(),
                self.site.name,
                depth + 1
            ),
            Err(e) => error!("Failed to save {} articles: {}", articles.len(), e),
        }
        match self.services.indexer.bulk_index(articles).await {
            Ok(()) => debug!("Indexed {} articles", articles.len()),
            Err(e) => error!("Failed to index {} articles: {}", articles.len(), e),
        }
    }
}
