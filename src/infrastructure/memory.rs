// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::debug;

use crate::domain::models::article::ArticleRecord;
use crate::domain::repositories::article_repository::{ArticleIndexer, ArticleRepository};
use crate::queue::message_queue::{MessageQueue, QueueError};
use crate::utils::errors::{IndexerError, RepositoryError};

/// 内存爬取记录仓库
///
/// 进程内实现，用于本地运行和测试；已爬取 URL 集合带显式
/// 失效入口以满足仓库接口的缓存契约
#[derive(Default)]
pub struct MemoryArticleRepository {
    inner: Mutex<MemoryRepositoryState>,
}

#[derive(Default)]
struct MemoryRepositoryState {
    records: Vec<ArticleRecord>,
    url_cache: HashSet<String>,
    cache_valid: bool,
}

impl MemoryArticleRepository {
    /// 创建空仓库
    pub fn new() -> Self {
        Self::default()
    }

    /// 预填充已存在的 URL
    pub fn with_existing_urls(urls: impl IntoIterator<Item = String>) -> Self {
        let repo = Self::default();
        {
            let mut state = repo.inner.lock();
            state.url_cache = urls.into_iter().collect();
            state.cache_valid = true;
        }
        repo
    }

    /// 已保存的记录数
    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// 已保存记录的副本
    pub fn records(&self) -> Vec<ArticleRecord> {
        self.inner.lock().records.clone()
    }
}

#[async_trait]
impl ArticleRepository for MemoryArticleRepository {
    async fn existing_urls(&self) -> Result<HashSet<String>, RepositoryError> {
        let mut state = self.inner.lock();
        if !state.cache_valid {
            state.url_cache = state.records.iter().map(|r| r.url.clone()).collect();
            state.cache_valid = true;
        }
        Ok(state.url_cache.clone())
    }

    async fn invalidate_url_cache(&self) {
        self.inner.lock().cache_valid = false;
    }

    async fn save(&self, records: &[ArticleRecord]) -> Result<(), RepositoryError> {
        let mut state = self.inner.lock();
        for record in records {
            state.url_cache.insert(record.url.clone());
        }
        state.records.extend_from_slice(records);
        Ok(())
    }
}

/// 内存消息队列
///
/// 保存全部已发布消息，供本地运行和测试检查
#[derive(Default)]
pub struct MemoryMessageQueue {
    messages: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MemoryMessageQueue {
    /// 创建空队列
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定主题下的消息副本
    pub fn messages_for(&self, topic: &str) -> Vec<serde_json::Value> {
        self.messages
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// 已发布的消息总数
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// 队列是否为空
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl MessageQueue for MemoryMessageQueue {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), QueueError> {
        debug!("Published message to {}", topic);
        self.messages.lock().push((topic.to_string(), payload));
        Ok(())
    }

    async fn consume(&self, topic: &str) -> Result<Vec<serde_json::Value>, QueueError> {
        let mut messages = self.messages.lock();
        let mut consumed = Vec::new();
        messages.retain(|(t, payload)| {
            if t == topic {
                consumed.push(payload.clone());
                false
            } else {
                true
            }
        });
        Ok(consumed)
    }
}

/// 内存全文索引
#[derive(Default)]
pub struct MemoryIndexer {
    indexed: Mutex<Vec<ArticleRecord>>,
}

impl MemoryIndexer {
    /// 创建空索引
    pub fn new() -> Self {
        Self::default()
    }

    /// 已索引的记录数
    pub fn indexed_count(&self) -> usize {
        self.indexed.lock().len()
    }
}

#[async_trait]
impl ArticleIndexer for MemoryIndexer {
    async fn bulk_index(&self, records: &[ArticleRecord]) -> Result<(), IndexerError> {
        self.indexed.lock().extend_from_slice(records);
        Ok(())
    }
}
