// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use regex::Regex;
use url::Url;

/// 从 URL 中提取域名（host 部分），作为限流的粒度单位
///
/// 无法解析的 URL 返回空字符串，调用方会将其归入同一个默认时钟
pub fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

/// 移除 URL 的查询参数部分
pub fn strip_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => base.to_string(),
        None => url.to_string(),
    }
}

/// 站点 URL 接受规则
///
/// 子串匹配或正则匹配，对应站点配置的 `url_pattern` / `is_regex`；
/// 空模式表示接受所有 URL
#[derive(Debug, Clone)]
pub enum UrlRule {
    /// 接受所有 URL
    Any,
    /// URL 包含指定子串时接受
    Substring(String),
    /// URL 匹配正则表达式时接受
    Pattern(Regex),
}

impl UrlRule {
    /// 根据站点配置构建接受规则
    pub fn new(pattern: &str, is_regex: bool) -> Result<Self, regex::Error> {
        if pattern.is_empty() {
            return Ok(UrlRule::Any);
        }
        if is_regex {
            Ok(UrlRule::Pattern(Regex::new(pattern)?))
        } else {
            Ok(UrlRule::Substring(pattern.to_string()))
        }
    }

    /// 检查 URL 是否符合规则
    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlRule::Any => true,
            UrlRule::Substring(pattern) => url.contains(pattern),
            // 与原始行为一致：正则从 URL 开头匹配
            UrlRule::Pattern(re) => re.find(url).is_some_and(|m| m.start() == 0),
        }
    }
}
