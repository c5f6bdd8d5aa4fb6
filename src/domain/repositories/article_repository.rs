// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::domain::models::article::ArticleRecord;
use crate::utils::errors::{IndexerError, RepositoryError};

/// 爬取记录仓库接口
///
/// 已爬取 URL 的查询结果允许缓存，实现方必须提供显式的
/// 缓存失效入口
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// 获取已保存记录的 URL 集合
    async fn existing_urls(&self) -> Result<HashSet<String>, RepositoryError>;

    /// 使已爬取 URL 的缓存失效
    async fn invalidate_url_cache(&self);

    /// 批量保存爬取记录
    async fn save(&self, records: &[ArticleRecord]) -> Result<(), RepositoryError>;
}

/// 全文索引接口
#[async_trait]
pub trait ArticleIndexer: Send + Sync {
    /// 批量索引爬取记录
    async fn bulk_index(&self, records: &[ArticleRecord]) -> Result<(), IndexerError>;
}
