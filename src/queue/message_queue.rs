// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

/// 共享的爬取结果主题
pub const RESULT_TOPIC: &str = "CrawlResults";

/// 站点专属的任务主题名称
pub fn task_topic(site_name: &str) -> String {
    format!("{}Tasks", site_name)
}

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 发布失败
    #[error("Publish failed: {0}")]
    Publish(String),

    /// 消费失败
    #[error("Consume failed: {0}")]
    Consume(String),

    /// 序列化失败
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 消息队列接口
///
/// 爬取编排只使用发布端；消费端供任务分发方使用
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 向指定主题发布一条消息
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), QueueError>;

    /// 从指定主题取走当前可用的消息
    async fn consume(&self, topic: &str) -> Result<Vec<serde_json::Value>, QueueError>;
}
