// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::sites::SiteConfig;
use crate::domain::models::page::PageResult;

/// 爬取记录
///
/// 一次成功页面抓取产出的文章数据，写入仓库、消息队列和索引
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// 文章 URL
    pub url: String,
    /// 标题
    pub title: String,
    /// 描述
    pub description: String,
    /// 关键字
    pub keywords: String,
    /// 清理后的正文内容
    pub content: String,
    /// 发布时间（YYYY-MM-DD HH:MM:SS，未提取到则为 None）
    pub publish_time: Option<String>,
    /// 抓取时间（YYYY-MM-DD HH:MM:SS）
    pub scraped_time: String,
    /// 站点名称
    pub site: String,
    /// 站点数字 ID
    pub site_id: u32,
    /// 站点类别
    pub website_category: String,
}

impl ArticleRecord {
    /// 从页面结果和站点配置构建爬取记录
    ///
    /// 正文内容由调用方先经站点内容处理器清理后传入
    pub fn from_page(page: &PageResult, site: &SiteConfig, content: String) -> Self {
        Self {
            url: page.url.clone(),
            title: page.title.clone(),
            description: page.description.clone(),
            keywords: page.keywords.clone(),
            content,
            publish_time: None,
            scraped_time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            site: site.name.clone(),
            site_id: site.site_id,
            website_category: site.website_category.clone(),
        }
    }
}
