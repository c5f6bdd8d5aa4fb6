// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("存储错误: {0}")]
    StorageError(String),

    #[error("无效参数: {0}")]
    InvalidParameter(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

/// 索引层错误类型
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("索引错误: {0}")]
    IndexError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

/// 爬虫管理器错误类型
#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("未知站点: {0}")]
    UnknownSite(String),

    #[error("站点配置无效: {0}")]
    InvalidSiteConfig(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

/// 排程器错误类型
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("未知站点: {0}")]
    UnknownSite(String),

    #[error("站点 {0} 已有排程任务")]
    AlreadyScheduled(String),

    #[error("站点 {0} 没有排程任务")]
    NotScheduled(String),

    #[error("无效的 Cron 表达式 {0}: {1}")]
    InvalidCronExpression(String, String),
}
