// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::settings::FetcherSettings;
use crate::config::sites::ContentSelector;
use crate::domain::models::page::PageResult;
use crate::engines::traits::{FetchError, FetchOptions, PageFetcher};

/// HTTP 抓取引擎
///
/// 基于 reqwest 的默认引擎：抓取页面、提取元数据、按站点
/// 选择器提取正文、收集同域内部链接。不执行 JavaScript。
pub struct HttpFetcher {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpFetcher {
    /// 创建新的 HTTP 抓取引擎
    pub fn new(settings: &FetcherSettings) -> Result<Self, FetchError> {
        let default_timeout = Duration::from_secs(settings.timeout_seconds);
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(default_timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self {
            client,
            default_timeout,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    /// 执行 HTTP 抓取
    ///
    /// # 参数
    ///
    /// * `url` - 目标 URL
    /// * `options` - 抓取配置
    ///
    /// # 返回值
    ///
    /// * `Ok(PageResult)` - 结构化页面结果
    /// * `Err(FetchError)` - 抓取过程中出现的错误，状态码可用时随错误返回
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PageResult, FetchError> {
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let response = self.client.get(url).timeout(timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        let status_code = status.as_u16();
        let body = response.text().await?;

        let page = parse_page(url, &body, options, status_code)?;
        debug!(
            "Fetched {} ({} internal links, content: {})",
            url,
            page.internal_links.len(),
            page.content.is_some()
        );
        Ok(page)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// 解析页面 HTML，提取元数据、正文和内部链接
fn parse_page(
    url: &str,
    body: &str,
    options: &FetchOptions,
    status_code: u16,
) -> Result<PageResult, FetchError> {
    let base = Url::parse(url)
        .map_err(|e| FetchError::Other(format!("invalid base url {}: {}", url, e)))?;
    let document = Html::parse_document(body);

    let title = select_first_text(&document, "title").unwrap_or_default();
    let description = select_meta(&document, "description").unwrap_or_default();
    let keywords = select_meta(&document, "keywords").unwrap_or_default();

    let internal_links = collect_internal_links(&document, &base);

    let content = if options.extract_only_metadata {
        None
    } else {
        options
            .content_selector
            .as_ref()
            .and_then(|selector| extract_content(&document, selector))
    };

    Ok(PageResult {
        url: url.to_string(),
        title,
        description,
        keywords,
        content,
        internal_links,
        status_code: Some(status_code),
    })
}

/// 提取第一个匹配元素的文本
fn select_first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

/// 提取 meta 标签的 content 属性
fn select_meta(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[name="{}"]"#, name)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
}

/// 收集同域内部链接（绝对化、去重、跳过锚点和脚本链接）
fn collect_internal_links(document: &Html, base: &Url) -> Vec<String> {
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let mut links = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:")
        {
            continue;
        }
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        if resolved.host_str() != base.host_str() {
            continue;
        }
        let link = resolved.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
    links
}

/// 按站点选择器提取正文内容
fn extract_content(document: &Html, selector: &ContentSelector) -> Option<String> {
    let base_selector = Selector::parse(&selector.base_selector).ok()?;
    let scope = document.select(&base_selector).next()?;

    let mut parts = Vec::new();
    for field in &selector.fields {
        let Ok(field_selector) = Selector::parse(&field.selector) else {
            continue;
        };
        if field.multiple {
            for el in scope.select(&field_selector) {
                let text = el.text().collect::<String>();
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
        } else if let Some(el) = scope.select(&field_selector).next() {
            let text = el.text().collect::<String>();
            let text = text.trim();
            if !text.is_empty() {
                parts.push(text.to_string());
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}
