// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// 站点配置错误类型
#[derive(Error, Debug)]
pub enum SiteConfigError {
    #[error("读取站点配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析站点配置失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("站点 {0} 配置无效: {1}")]
    Invalid(String, String),
}

/// 内容提取选择器配置
///
/// 描述文章正文在页面中的位置，对核心编排逻辑不透明，
/// 原样传递给抓取引擎
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSelector {
    /// 选择器名称
    pub name: String,
    /// 基础选择器
    #[serde(rename = "baseSelector")]
    pub base_selector: String,
    /// 字段选择器列表
    pub fields: Vec<SelectorField>,
}

/// 单个字段的选择器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorField {
    /// 字段名称
    pub name: String,
    /// CSS 选择器
    pub selector: String,
    /// 是否匹配多个元素
    #[serde(default)]
    pub multiple: bool,
}

/// 单个站点的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// 站点名称（注册表键，加载时填充）
    #[serde(default)]
    pub name: String,
    /// 站点数字 ID
    pub site_id: u32,
    /// 站点类别标签
    pub website_category: String,
    /// 起始 URL 列表
    pub start_urls: Vec<String>,
    /// URL 接受模式（空字符串表示接受所有内部链接）
    #[serde(default)]
    pub url_pattern: String,
    /// url_pattern 是否为正则表达式
    #[serde(default)]
    pub is_regex: bool,
    /// 域名延迟覆盖（秒）
    #[serde(default)]
    pub domain_delay: Option<f64>,
    /// 内容提取选择器
    #[serde(default)]
    pub content_selector: Option<ContentSelector>,
    /// 是否只提取元数据（跳过正文提取）
    #[serde(default)]
    pub extract_only_metadata: bool,
}

/// 站点注册表
///
/// 从 YAML 配置文件加载全部站点定义，提供按名称、ID 和类别的查询
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: HashMap<String, SiteConfig>,
    id_to_name: HashMap<u32, String>,
}

impl SiteRegistry {
    /// 从 YAML 文件加载站点注册表
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SiteConfigError> {
        let content = std::fs::read_to_string(path)?;
        let raw: HashMap<String, SiteConfig> = serde_yaml::from_str(&content)?;
        let registry = Self::from_map(raw)?;
        info!("Loaded {} site configurations", registry.len());
        Ok(registry)
    }

    /// 从已解析的映射构建站点注册表
    pub fn from_map(raw: HashMap<String, SiteConfig>) -> Result<Self, SiteConfigError> {
        let mut sites = HashMap::new();
        let mut id_to_name = HashMap::new();
        for (name, mut site) in raw {
            if site.start_urls.is_empty() {
                return Err(SiteConfigError::Invalid(
                    name,
                    "start_urls 不能为空".to_string(),
                ));
            }
            site.name = name.clone();
            id_to_name.insert(site.site_id, name.clone());
            sites.insert(name, site);
        }
        Ok(Self { sites, id_to_name })
    }

    /// 按名称获取站点配置
    pub fn get(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.get(name)
    }

    /// 按站点 ID 获取站点配置
    pub fn get_by_id(&self, site_id: u32) -> Option<&SiteConfig> {
        self.id_to_name
            .get(&site_id)
            .and_then(|name| self.sites.get(name))
    }

    /// 是否包含指定站点
    pub fn contains(&self, name: &str) -> bool {
        self.sites.contains_key(name)
    }

    /// 所有站点名称
    pub fn site_names(&self) -> Vec<String> {
        self.sites.keys().cloned().collect()
    }

    /// 指定类别的所有站点名称
    pub fn sites_in_category(&self, category: &str) -> Vec<String> {
        self.sites
            .values()
            .filter(|s| s.website_category == category)
            .map(|s| s.name.clone())
            .collect()
    }

    /// 按类别分组的站点名称
    pub fn sites_by_category(&self) -> HashMap<String, Vec<String>> {
        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for site in self.sites.values() {
            grouped
                .entry(site.website_category.clone())
                .or_default()
                .push(site.name.clone());
        }
        grouped
    }

    /// 遍历全部站点配置
    pub fn iter(&self) -> impl Iterator<Item = &SiteConfig> {
        self.sites.values()
    }

    /// 站点数量
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// 注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
