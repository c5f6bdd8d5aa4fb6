// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;
use std::sync::Arc;

use newscrawl::crawler::session::{CrawlServices, CrawlSession};
use newscrawl::domain::models::failed_task::ErrorCategory;
use newscrawl::domain::services::failure_handler::FailureHandler;
use newscrawl::domain::services::retry_policy::RetryPolicy;
use newscrawl::infrastructure::memory::MemoryArticleRepository;
use newscrawl::queue::message_queue::{task_topic, RESULT_TOPIC};

use super::helpers::mock_fetcher::MockFetcher;
use super::helpers::{build_services, crawler_settings, retry_settings, sample_site};

#[tokio::test]
async fn test_session_bounded_by_max_pages() {
    // 种子页有 6 条有效链接，但页面预算只有 4
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(
                "https://udn.com/",
                &[
                    "https://udn.com/news/story/1",
                    "https://udn.com/news/story/2",
                    "https://udn.com/news/story/3",
                    "https://udn.com/news/story/4",
                    "https://udn.com/news/story/5",
                    "https://udn.com/news/story/6",
                ],
            )
            .page("https://udn.com/news/story/1", &["https://udn.com/news/story/7"])
            .page("https://udn.com/news/story/2", &[])
            .page("https://udn.com/news/story/3", &[])
            .page("https://udn.com/news/story/4", &[])
            .page("https://udn.com/news/story/5", &[])
            .page("https://udn.com/news/story/6", &[]),
    );
    let harness = build_services(fetcher.clone());
    let site = sample_site("udn", &["https://udn.com/"], "news/story/");
    let session = CrawlSession::new(
        site,
        crawler_settings(3, 4, 10),
        retry_settings(1),
        harness.services.clone(),
    )
    .unwrap();

    let report = session.run_full_scraper().await;

    assert!(report.success);
    assert_eq!(report.total_scraped, 4);
    assert!(report.depth <= 3);
    assert_eq!(harness.repository.record_count(), 4);
    // 页面预算用尽后不再抓取剩余链接
    assert_eq!(fetcher.call_count("https://udn.com/news/story/5"), 0);
    assert_eq!(fetcher.call_count("https://udn.com/news/story/6"), 0);
}

#[tokio::test]
async fn test_session_bounded_by_max_depth() {
    // 三层链条，深度预算只允许一层
    let fetcher = Arc::new(
        MockFetcher::new()
            .page("https://udn.com/", &["https://udn.com/news/story/1"])
            .page("https://udn.com/news/story/1", &["https://udn.com/news/story/2"])
            .page("https://udn.com/news/story/2", &["https://udn.com/news/story/3"]),
    );
    let harness = build_services(fetcher.clone());
    let site = sample_site("udn", &["https://udn.com/"], "news/story/");
    let session = CrawlSession::new(
        site,
        crawler_settings(1, 100, 10),
        retry_settings(1),
        harness.services.clone(),
    )
    .unwrap();

    let report = session.run_full_scraper().await;

    assert!(report.success);
    assert_eq!(report.depth, 1);
    assert_eq!(report.total_scraped, 1);
    assert_eq!(fetcher.call_count("https://udn.com/news/story/2"), 0);
}

#[tokio::test]
async fn test_session_visits_each_url_once() {
    // story/2 同时出现在种子页和 story/1 的下一层链接里
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(
                "https://udn.com/",
                &[
                    "https://udn.com/news/story/1",
                    "https://udn.com/news/story/2",
                ],
            )
            .page("https://udn.com/news/story/1", &["https://udn.com/news/story/2"])
            .page("https://udn.com/news/story/2", &[]),
    );
    let harness = build_services(fetcher.clone());
    let site = sample_site("udn", &["https://udn.com/"], "news/story/");
    let session = CrawlSession::new(
        site,
        crawler_settings(3, 100, 10),
        retry_settings(1),
        harness.services.clone(),
    )
    .unwrap();

    let report = session.run_full_scraper().await;

    assert!(report.success);
    assert_eq!(fetcher.call_count("https://udn.com/news/story/1"), 1);
    assert_eq!(fetcher.call_count("https://udn.com/news/story/2"), 1);
    assert_eq!(report.total_scraped, 2);
}

#[tokio::test]
async fn test_empty_seed_set_fails_session() {
    // 种子页的链接都不符合 URL 规则
    let fetcher = Arc::new(MockFetcher::new().page(
        "https://udn.com/",
        &["https://udn.com/about", "https://udn.com/contact"],
    ));
    let harness = build_services(fetcher.clone());
    let site = sample_site("udn", &["https://udn.com/"], "news/story/");
    let session = CrawlSession::new(
        site,
        crawler_settings(3, 100, 10),
        retry_settings(1),
        harness.services.clone(),
    )
    .unwrap();

    let report = session.run_full_scraper().await;

    assert!(!report.success);
    assert_eq!(report.total_scraped, 0);
    assert_eq!(harness.repository.record_count(), 0);
    assert!(harness.queue.is_empty());
    // 只抓取了种子页本身
    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test]
async fn test_page_without_content_still_recorded() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page("https://udn.com/", &["https://udn.com/news/story/1"])
            .page_without_content("https://udn.com/news/story/1", &[]),
    );
    let harness = build_services(fetcher);
    let site = sample_site("udn", &["https://udn.com/"], "news/story/");
    let session = CrawlSession::new(
        site,
        crawler_settings(1, 100, 10),
        retry_settings(1),
        harness.services.clone(),
    )
    .unwrap();

    let report = session.run_full_scraper().await;

    assert!(report.success);
    assert_eq!(report.total_scraped, 1);
    let records = harness.repository.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].content.is_empty());
    assert!(records[0].publish_time.is_none());
}

#[tokio::test]
async fn test_failed_url_routed_to_failure_handler() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(
                "https://udn.com/",
                &[
                    "https://udn.com/news/story/1",
                    "https://udn.com/news/story/2",
                ],
            )
            .page("https://udn.com/news/story/1", &[])
            .failing("https://udn.com/news/story/2", Some(500), "server exploded"),
    );
    let harness = build_services(fetcher.clone());
    let site = sample_site("udn", &["https://udn.com/"], "news/story/");
    let session = CrawlSession::new(
        site,
        crawler_settings(1, 100, 10),
        retry_settings(2),
        harness.services.clone(),
    )
    .unwrap();

    let report = session.run_full_scraper().await;

    // 单个 URL 的失败不会中止会话
    assert!(report.success);
    assert_eq!(report.total_scraped, 1);
    assert_eq!(report.failed_urls, 1);

    // 即时重试两次都失败后才登记到失败处理器，且只登记一次
    assert_eq!(fetcher.call_count("https://udn.com/news/story/2"), 2);
    let task = harness
        .failure_handler
        .pending_task("https://udn.com/news/story/2")
        .expect("task registered");
    assert_eq!(task.retry_count, 0);
    assert_eq!(task.error_category, ErrorCategory::Server);
    assert_eq!(task.status_code, Some(500));

    // 失败同时上报了流量控制
    let stats = harness.rate_limiter.domain_stats("udn.com").unwrap();
    assert_eq!(stats.failure_count, 1);
}

#[tokio::test]
async fn test_existing_urls_excluded_from_seeds() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(
                "https://udn.com/",
                &[
                    "https://udn.com/news/story/1",
                    "https://udn.com/news/story/2",
                ],
            )
            .page("https://udn.com/news/story/2", &[]),
    );
    let harness = build_services(fetcher.clone());
    // story/1 已在仓库中
    let repository = Arc::new(MemoryArticleRepository::with_existing_urls(vec![
        "https://udn.com/news/story/1".to_string(),
    ]));
    let services = CrawlServices {
        repository: repository.clone(),
        ..harness.services.clone()
    };

    let site = sample_site("udn", &["https://udn.com/"], "news/story/");
    let session =
        CrawlSession::new(site, crawler_settings(1, 100, 10), retry_settings(1), services)
            .unwrap();

    let report = session.run_full_scraper().await;

    assert!(report.success);
    assert_eq!(fetcher.call_count("https://udn.com/news/story/1"), 0);
    assert_eq!(fetcher.call_count("https://udn.com/news/story/2"), 1);
}

#[tokio::test]
async fn test_results_published_to_shared_topic() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page("https://udn.com/", &["https://udn.com/news/story/1"])
            .page("https://udn.com/news/story/1", &[]),
    );
    let harness = build_services(fetcher);
    let site = sample_site("udn", &["https://udn.com/"], "news/story/");
    let session = CrawlSession::new(
        site,
        crawler_settings(1, 100, 10),
        retry_settings(1),
        harness.services.clone(),
    )
    .unwrap();

    session.run_full_scraper().await;

    let messages = harness.queue.messages_for(RESULT_TOPIC);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["url"], "https://udn.com/news/story/1");
    assert_eq!(messages[0]["site"], "udn");
    // 清理后的正文里提取到了发布时间
    assert_eq!(messages[0]["publish_time"], "2024-06-01 10:00:00");
    assert_eq!(harness.indexer.indexed_count(), 1);

    // 入队的种子 URL 发布到了站点专属任务主题
    let tasks = harness.queue.messages_for(&task_topic("udn"));
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["url"], "https://udn.com/news/story/1");
}

#[tokio::test]
async fn test_ready_retry_tasks_drained_through_session() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page("https://udn.com/", &["https://udn.com/news/story/1"])
            .page("https://udn.com/news/story/1", &[])
            .page("https://udn.com/news/story/9", &[]),
    );
    let harness = build_services(fetcher.clone());

    // 零延迟重试策略让登记的任务立即到期
    let zero_policy = RetryPolicy {
        base_delays: ErrorCategory::ALL
            .iter()
            .map(|c| (*c, (0.0, 0.0)))
            .collect::<HashMap<_, _>>(),
        jitter: 0.0,
        ..RetryPolicy::default()
    };
    let failure_handler = Arc::new(FailureHandler::new(zero_policy));
    failure_handler.register_failure(
        "https://udn.com/news/story/9",
        "udn",
        "connection timeout",
        None,
        None,
    );
    assert_eq!(failure_handler.pending_count(), 1);

    let services = CrawlServices {
        failure_handler: failure_handler.clone(),
        ..harness.services.clone()
    };
    let site = sample_site("udn", &["https://udn.com/"], "news/story/");
    let session =
        CrawlSession::new(site, crawler_settings(1, 100, 10), retry_settings(1), services)
            .unwrap();

    let report = session.run_full_scraper().await;

    // 计划重试任务走同一条单页抓取路径，成功后从失败队列移除
    assert_eq!(fetcher.call_count("https://udn.com/news/story/9"), 1);
    assert!(failure_handler
        .pending_task("https://udn.com/news/story/9")
        .is_none());
    assert_eq!(failure_handler.pending_count(), 0);
    // 重试成功计入爬取总数
    assert_eq!(report.total_scraped, 2);
}
