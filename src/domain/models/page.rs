// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 页面抓取结果
///
/// 抓取引擎返回的结构化页面数据；状态码在可用时必须填写，
/// 流量控制和失败处理都依赖它
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 页面 URL
    pub url: String,
    /// 页面标题
    pub title: String,
    /// 页面描述
    pub description: String,
    /// 页面关键字
    pub keywords: String,
    /// 按选择器提取的正文内容
    pub content: Option<String>,
    /// 页面内部链接
    pub internal_links: Vec<String>,
    /// HTTP 状态码
    pub status_code: Option<u16>,
}

impl PageResult {
    /// 创建仅含 URL 的空结果
    pub fn empty(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            description: String::new(),
            keywords: String::new(),
            content: None,
            internal_links: Vec::new(),
            status_code: None,
        }
    }
}
