// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use newscrawl::domain::models::page::PageResult;
use newscrawl::engines::traits::{FetchError, FetchOptions, PageFetcher};

/// 单个 URL 的脚本化抓取结果
#[derive(Clone)]
enum PageScript {
    Success {
        links: Vec<String>,
        content: Option<String>,
    },
    Failure {
        message: String,
        status: Option<u16>,
    },
}

/// 脚本化的抓取引擎
///
/// 按 URL 预先配置成功或失败结果，并记录每个 URL 被抓取的次数；
/// 未配置的 URL 返回 404 失败
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, PageScript>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 配置一个成功页面及其内部链接
    pub fn page(mut self, url: &str, links: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            PageScript::Success {
                links: links.iter().map(|l| l.to_string()).collect(),
                content: Some(format!("{} 的內容 2024-06-01 10:00:00", url)),
            },
        );
        self
    }

    /// 配置一个无正文的成功页面
    pub fn page_without_content(mut self, url: &str, links: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            PageScript::Success {
                links: links.iter().map(|l| l.to_string()).collect(),
                content: None,
            },
        );
        self
    }

    /// 配置一个失败页面
    pub fn failing(mut self, url: &str, status: Option<u16>, message: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            PageScript::Failure {
                message: message.to_string(),
                status,
            },
        );
        self
    }

    /// 指定 URL 被抓取的次数
    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| *u == url).count()
    }

    /// 抓取调用总数
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str, _options: &FetchOptions) -> Result<PageResult, FetchError> {
        self.calls.lock().push(url.to_string());

        match self.pages.get(url) {
            Some(PageScript::Success { links, content }) => Ok(PageResult {
                url: url.to_string(),
                title: format!("標題 {}", url),
                description: String::new(),
                keywords: String::new(),
                content: content.clone(),
                internal_links: links.clone(),
                status_code: Some(200),
            }),
            Some(PageScript::Failure { message, status }) => match status {
                Some(code) => Err(FetchError::HttpStatus(*code)),
                None => Err(FetchError::Other(message.clone())),
            },
            None => Err(FetchError::HttpStatus(404)),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
