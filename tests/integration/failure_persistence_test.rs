// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use newscrawl::domain::models::failed_task::ErrorCategory;
use newscrawl::domain::services::failure_handler::FailureHandler;
use newscrawl::domain::services::retry_policy::RetryPolicy;

/// 构造一个包含等待任务和永久失败任务的处理器
fn populated_handler() -> FailureHandler {
    let handler = FailureHandler::new(RetryPolicy::default());

    handler.register_failure(
        "https://udn.com/news/story/1",
        "udn",
        "connection timeout",
        None,
        None,
    );
    handler.register_failure(
        "https://udn.com/news/story/1",
        "udn",
        "connection reset",
        None,
        None,
    );
    handler.register_failure(
        "https://news.tvbs.com.tw/politics/1",
        "tvbs",
        "429 Too Many Requests",
        Some(429),
        None,
    );
    // PERMISSION 的重试预算是 1：第二次注册转为永久失败
    handler.register_failure(
        "https://www.setn.com/News.aspx",
        "setn",
        "access denied",
        Some(403),
        None,
    );
    handler.register_failure(
        "https://www.setn.com/News.aspx",
        "setn",
        "access denied",
        Some(403),
        None,
    );

    handler
}

#[test]
fn test_snapshot_round_trip_preserves_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failed_tasks.json");

    let original = populated_handler();
    original.save_to_file(&path).unwrap();

    let restored = FailureHandler::new(RetryPolicy::default());
    restored.load_from_file(&path).unwrap();

    // 等待/永久分区一致
    let original_stats = original.stats();
    let restored_stats = restored.stats();
    assert_eq!(original_stats.total_pending, restored_stats.total_pending);
    assert_eq!(
        original_stats.total_permanent_failures,
        restored_stats.total_permanent_failures
    );

    // 重试次数、类别和时间戳逐项一致
    for url in [
        "https://udn.com/news/story/1",
        "https://news.tvbs.com.tw/politics/1",
    ] {
        let before = original.pending_task(url).unwrap();
        let after = restored.pending_task(url).unwrap();
        assert_eq!(before.retry_count, after.retry_count);
        assert_eq!(before.error_category, after.error_category);
        assert_eq!(before.site_name, after.site_name);
        assert_eq!(before.status_code, after.status_code);
        // 快照精度为秒
        assert_eq!(
            before.first_failed_at.timestamp(),
            after.first_failed_at.timestamp()
        );
        assert_eq!(
            before.next_retry_at.map(|t| t.timestamp()),
            after.next_retry_at.map(|t| t.timestamp())
        );
    }

    let permanent = restored
        .permanent_task("https://www.setn.com/News.aspx")
        .unwrap();
    assert_eq!(permanent.retry_count, 1);
    assert_eq!(permanent.error_category, ErrorCategory::Permission);
}

#[test]
fn test_snapshot_file_structure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failed_tasks.json");

    populated_handler().save_to_file(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw["pending_tasks"].is_object());
    assert!(raw["permanent_failures"].is_object());
    // saved_at 使用 YYYY-MM-DD HH:MM:SS 格式
    let saved_at = raw["saved_at"].as_str().unwrap();
    assert_eq!(saved_at.len(), 19);
    assert_eq!(&saved_at[4..5], "-");

    let task = &raw["pending_tasks"]["https://news.tvbs.com.tw/politics/1"];
    assert_eq!(task["error_category"], "rate_limit");
    assert_eq!(task["status_code"], 429);
}

#[test]
fn test_restore_replaces_existing_queues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failed_tasks.json");
    populated_handler().save_to_file(&path).unwrap();

    let handler = FailureHandler::new(RetryPolicy::default());
    handler.register_failure("https://other.example/x", "other", "timeout", None, None);
    handler.load_from_file(&path).unwrap();

    // 加载后旧状态被完全替换
    assert!(handler.pending_task("https://other.example/x").is_none());
    assert!(handler
        .pending_task("https://udn.com/news/story/1")
        .is_some());
}

#[test]
fn test_load_missing_file_is_an_error() {
    let handler = FailureHandler::new(RetryPolicy::default());
    assert!(handler.load_from_file("/nonexistent/failed_tasks.json").is_err());
}
