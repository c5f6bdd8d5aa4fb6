// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use newscrawl::config::sites::SiteConfig;
use newscrawl::crawler::manager::CrawlerManager;
use newscrawl::queue::scheduler::{CrawlerScheduler, DEFAULT_CRON, NEWS_CRON};
use newscrawl::utils::errors::SchedulerError;

use super::helpers::mock_fetcher::MockFetcher;
use super::helpers::{build_manager, crawler_settings, sample_site};

fn metadata_site() -> SiteConfig {
    let mut site = sample_site("metadata", &["https://czbooks.net/"], "");
    site.site_id = 99;
    site.website_category = "metadata".to_string();
    site.extract_only_metadata = true;
    site
}

fn test_manager() -> (Arc<CrawlerManager>, Arc<MockFetcher>) {
    let fetcher = Arc::new(MockFetcher::new().page("https://udn.com/", &[]));
    let sites = vec![
        sample_site("udn", &["https://udn.com/"], "news/story/"),
        sample_site("tvbs", &["https://news.tvbs.com.tw/"], "news/"),
        metadata_site(),
    ];
    let (manager, _harness) = build_manager(sites, fetcher.clone(), crawler_settings(1, 5, 3));
    (manager, fetcher)
}

fn test_scheduler(manager: Arc<CrawlerManager>) -> CrawlerScheduler {
    CrawlerScheduler::new(manager, 3, Duration::from_secs(600))
}

#[tokio::test]
async fn test_reschedule_replaces_existing_job() {
    let (manager, _) = test_manager();
    let scheduler = test_scheduler(manager);

    let first = scheduler.schedule_site("udn", "*/10 * * * *", true).unwrap();
    let second = scheduler.schedule_site("udn", "0 * * * *", true).unwrap();
    assert_ne!(first, second);

    // 同一站点只剩一个任务，且触发器是新的表达式
    let jobs = scheduler.list_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].site, "udn");
    assert_eq!(jobs[0].trigger, "0 * * * *");
    assert_eq!(jobs[0].id, second);
    // 每小时整点触发
    let next = jobs[0].next_run.unwrap();
    assert_eq!(next.format("%M:%S").to_string(), "00:00");

    scheduler.shutdown();
}

#[tokio::test]
async fn test_schedule_without_replace_keeps_old_job() {
    let (manager, _) = test_manager();
    let scheduler = test_scheduler(manager);

    let first = scheduler.schedule_site("udn", "*/10 * * * *", true).unwrap();
    let result = scheduler.schedule_site("udn", "0 * * * *", false);
    assert!(matches!(result, Err(SchedulerError::AlreadyScheduled(_))));

    let jobs = scheduler.list_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, first);
    assert_eq!(jobs[0].trigger, "*/10 * * * *");

    scheduler.shutdown();
}

#[tokio::test]
async fn test_schedule_unknown_site_rejected() {
    let (manager, _) = test_manager();
    let scheduler = test_scheduler(manager);

    let result = scheduler.schedule_site("nonexistent", "*/10 * * * *", true);
    assert!(matches!(result, Err(SchedulerError::UnknownSite(_))));
    assert!(scheduler.list_jobs().is_empty());
}

#[tokio::test]
async fn test_invalid_cron_rejected() {
    let (manager, _) = test_manager();
    let scheduler = test_scheduler(manager);

    let result = scheduler.schedule_site("udn", "not a cron", true);
    assert!(matches!(
        result,
        Err(SchedulerError::InvalidCronExpression(_, _))
    ));
}

#[tokio::test]
async fn test_schedule_category_counts() {
    let (manager, _) = test_manager();
    let scheduler = test_scheduler(manager);

    // udn 和 tvbs 属于 news 类别
    let (success, total) = scheduler.schedule_category("news", "*/10 * * * *");
    assert_eq!((success, total), (2, 2));
    assert_eq!(scheduler.list_jobs().len(), 2);

    let (success, total) = scheduler.schedule_category("nonexistent", "*/10 * * * *");
    assert_eq!((success, total), (0, 0));

    scheduler.shutdown();
}

#[tokio::test]
async fn test_schedule_all_sites_by_default_policy() {
    let (manager, _) = test_manager();
    let scheduler = test_scheduler(manager);

    let (success, total) = scheduler.schedule_all_sites();
    assert_eq!((success, total), (3, 3));

    let jobs = scheduler.list_jobs();
    for job in &jobs {
        match job.site.as_str() {
            // 新闻站点每 10 分钟
            "udn" | "tvbs" => assert_eq!(job.trigger, NEWS_CRON),
            // 其他类别每小时整点
            "metadata" => assert_eq!(job.trigger, DEFAULT_CRON),
            other => panic!("unexpected job for {}", other),
        }
        assert!(job.next_run.is_some());
    }

    scheduler.shutdown();
}

#[tokio::test]
async fn test_remove_site() {
    let (manager, _) = test_manager();
    let scheduler = test_scheduler(manager);

    scheduler.schedule_site("udn", "*/10 * * * *", true).unwrap();
    assert!(scheduler.remove_site("udn").is_ok());
    assert!(scheduler.list_jobs().is_empty());

    // 再次移除是已报告的失败，不是恐慌
    assert!(matches!(
        scheduler.remove_site("udn"),
        Err(SchedulerError::NotScheduled(_))
    ));
}

#[tokio::test]
async fn test_run_now_invokes_crawler_out_of_band() {
    let (manager, fetcher) = test_manager();
    let scheduler = test_scheduler(manager);

    assert!(matches!(
        scheduler.run_now("nonexistent"),
        Err(SchedulerError::UnknownSite(_))
    ));

    // 已知站点：发射后不管，爬虫在工作池上执行
    scheduler.run_now("udn").unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(fetcher.call_count("https://udn.com/") >= 1);
}
