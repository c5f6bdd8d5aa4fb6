// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::sites::ContentSelector;
use crate::domain::models::page::PageResult;

/// 抓取错误类型
#[derive(Error, Debug)]
pub enum FetchError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 非成功状态码
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    /// 超时
    #[error("Timeout")]
    Timeout,
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl FetchError {
    /// 错误关联的 HTTP 状态码（可用时）
    ///
    /// 流量控制和失败处理都依据状态码调整行为，实现方必须
    /// 尽可能保留它
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            FetchError::HttpStatus(code) => Some(*code),
            _ => None,
        }
    }

    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::RequestFailed(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            FetchError::HttpStatus(code) => matches!(code, 429 | 500..=599),
            FetchError::Timeout => true,
            FetchError::Other(_) => false,
        }
    }
}

/// 单次抓取的配置
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// 请求超时时间（None 使用引擎默认值）
    pub timeout: Option<Duration>,
    /// 内容提取选择器
    pub content_selector: Option<ContentSelector>,
    /// 是否只提取元数据（跳过正文提取）
    pub extract_only_metadata: bool,
}

/// 页面抓取能力
///
/// 核心编排逻辑只依赖此接口；具体引擎（HTTP、浏览器渲染等）
/// 按需实现
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// 抓取页面并返回结构化结果
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PageResult, FetchError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}
