// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newscrawl::config::settings::FetcherSettings;
use newscrawl::config::sites::{ContentSelector, SelectorField};
use newscrawl::engines::http_fetcher::HttpFetcher;
use newscrawl::engines::traits::{FetchOptions, PageFetcher};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(&FetcherSettings {
        timeout_seconds: 5,
        user_agent: "newscrawl-test/1.0".to_string(),
    })
    .unwrap()
}

fn article_selector() -> ContentSelector {
    ContentSelector {
        name: "Article".to_string(),
        base_selector: "body".to_string(),
        fields: vec![SelectorField {
            name: "content".to_string(),
            selector: "section.article".to_string(),
            multiple: true,
        }],
    }
}

#[tokio::test]
async fn test_fetch_extracts_page_structure() {
    let server = MockServer::start().await;
    let html = r#"
        <html>
          <head>
            <title>新聞標題</title>
            <meta name="description" content="描述文字">
          </head>
          <body>
            <section class="article"><p>正文段落</p></section>
            <a href="/news/story/1">站內連結</a>
            <a href="https://elsewhere.example/x">站外連結</a>
          </body>
        </html>
    "#;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let options = FetchOptions {
        content_selector: Some(article_selector()),
        ..Default::default()
    };
    let page = fetcher().fetch(&server.uri(), &options).await.unwrap();

    assert_eq!(page.title, "新聞標題");
    assert_eq!(page.description, "描述文字");
    assert_eq!(page.status_code, Some(200));
    assert_eq!(page.internal_links, vec![format!("{}/news/story/1", server.uri())]);
    assert_eq!(page.content.as_deref(), Some("正文段落"));
}

#[tokio::test]
async fn test_fetch_reports_status_code_on_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetcher()
        .fetch(&format!("{}/missing", server.uri()), &FetchOptions::default())
        .await
        .unwrap_err();

    // 失败时状态码必须保留，下游的分类依赖它
    assert_eq!(err.status_code(), Some(404));
}

#[tokio::test]
async fn test_fetch_rate_limit_status_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = fetcher()
        .fetch(&format!("{}/limited", server.uri()), &FetchOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(429));
    assert!(err.is_retryable());
}
