// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::utils::text_processing::extract_publish_time;

/// 通用清理规则：移除分享、影音、推荐阅读等非文章内容
static GENERIC_CLEANUP: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?s)分享\s*推薦.*$").unwrap(),
        Regex::new(r"(?s)相關新聞\s*推薦.*$").unwrap(),
        Regex::new(r"(?s)影音推薦.*$").unwrap(),
    ]
});

/// 站点内容处理能力
///
/// 每个站点可以注册自己的实现来清理正文内容；核心编排逻辑
/// 通过注册表按站点名称查找，而不是继承覆盖
pub trait ContentProcessor: Send + Sync {
    /// 清理文章正文
    fn clean_content(&self, content: &str) -> String;

    /// 从清理后的正文中提取发布时间
    fn extract_publish_time(&self, content: &str) -> Option<String> {
        extract_publish_time(content)
    }
}

/// 通用内容处理器
///
/// 只应用跨站点的通用清理规则
#[derive(Debug, Default)]
pub struct DefaultProcessor;

impl ContentProcessor for DefaultProcessor {
    fn clean_content(&self, content: &str) -> String {
        let mut cleaned = content.to_string();
        for pattern in GENERIC_CLEANUP.iter() {
            cleaned = pattern.replace(&cleaned, "").into_owned();
        }
        cleaned
    }
}

/// udn 内容处理器
#[derive(Debug, Default)]
pub struct UdnProcessor;

static UDN_RELATED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)延伸閱讀：.*$").unwrap());

impl ContentProcessor for UdnProcessor {
    fn clean_content(&self, content: &str) -> String {
        let cleaned = DefaultProcessor.clean_content(content);
        UDN_RELATED.replace(&cleaned, "").into_owned()
    }
}

/// tvbs 内容处理器
#[derive(Debug, Default)]
pub struct TvbsProcessor;

static TVBS_RELATED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)相關新聞：.*$").unwrap());

impl ContentProcessor for TvbsProcessor {
    fn clean_content(&self, content: &str) -> String {
        let cleaned = DefaultProcessor.clean_content(content);
        TVBS_RELATED.replace(&cleaned, "").into_owned()
    }
}

/// setn 内容处理器
#[derive(Debug, Default)]
pub struct SetnProcessor;

static SETN_BRAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"三立新聞網[／\s]").unwrap());
static SETN_REPORTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"記者[\x{4e00}-\x{9fff}]+?／[^／]+?報導").unwrap());

impl ContentProcessor for SetnProcessor {
    fn clean_content(&self, content: &str) -> String {
        let cleaned = DefaultProcessor.clean_content(content);
        let cleaned = SETN_BRAND.replace_all(&cleaned, "").into_owned();
        SETN_REPORTER.replace_all(&cleaned, "").into_owned()
    }
}

/// 内容处理器注册表
///
/// 以站点名称为键的策略表，启动时注册，未注册的站点回退到
/// 通用处理器
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn ContentProcessor>>,
    fallback: Arc<dyn ContentProcessor>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self {
            processors: HashMap::new(),
            fallback: Arc::new(DefaultProcessor),
        }
    }
}

impl ProcessorRegistry {
    /// 创建包含内建站点处理器的注册表
    pub fn with_builtin_processors() -> Self {
        let mut registry = Self::default();
        registry.register("udn", Arc::new(UdnProcessor));
        registry.register("tvbs", Arc::new(TvbsProcessor));
        registry.register("setn", Arc::new(SetnProcessor));
        registry
    }

    /// 注册站点内容处理器
    pub fn register(&mut self, site_name: impl Into<String>, processor: Arc<dyn ContentProcessor>) {
        let site_name = site_name.into();
        info!("Registered content processor for {}", site_name);
        self.processors.insert(site_name, processor);
    }

    /// 按站点名称查找处理器，未注册时返回通用处理器
    pub fn get(&self, site_name: &str) -> Arc<dyn ContentProcessor> {
        self.processors
            .get(site_name)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
