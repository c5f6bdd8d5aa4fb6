// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 错误类别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// 网络错误（连接问题、超时等）
    #[serde(rename = "network_error")]
    Network,
    /// 服务器错误（5xx 状态码）
    #[serde(rename = "server_error")]
    Server,
    /// 客户端错误（4xx 状态码）
    #[serde(rename = "client_error")]
    Client,
    /// 限流错误（429 状态码）
    #[serde(rename = "rate_limit")]
    RateLimit,
    /// 解析错误（网页内容解析失败）
    #[serde(rename = "parsing_error")]
    Parsing,
    /// 权限错误（403 状态码）
    #[serde(rename = "permission_error")]
    Permission,
    /// 未知错误
    #[serde(rename = "unknown_error")]
    Unknown,
}

impl ErrorCategory {
    /// 所有错误类别
    pub const ALL: [ErrorCategory; 7] = [
        ErrorCategory::Network,
        ErrorCategory::Server,
        ErrorCategory::Client,
        ErrorCategory::RateLimit,
        ErrorCategory::Parsing,
        ErrorCategory::Permission,
        ErrorCategory::Unknown,
    ];

    /// 类别的持久化标签
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network_error",
            ErrorCategory::Server => "server_error",
            ErrorCategory::Client => "client_error",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Parsing => "parsing_error",
            ErrorCategory::Permission => "permission_error",
            ErrorCategory::Unknown => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 失败任务数据结构
///
/// 每个正在失败或永久失败的 URL 对应一条记录，由失败处理器独占持有；
/// 快照中的时间戳使用 `YYYY-MM-DD HH:MM:SS`（UTC）格式序列化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTask {
    /// 任务 URL
    pub url: String,
    /// 站点名称
    pub site_name: String,
    /// 错误类别
    pub error_category: ErrorCategory,
    /// 错误讯息
    pub error_message: String,
    /// HTTP 状态码
    pub status_code: Option<u16>,
    /// 重试次数
    pub retry_count: u32,
    /// 首次失败时间
    #[serde(with = "snapshot_time")]
    pub first_failed_at: DateTime<Utc>,
    /// 最近失败时间
    #[serde(with = "snapshot_time")]
    pub last_failed_at: DateTime<Utc>,
    /// 下次重试时间
    #[serde(with = "snapshot_time_opt", default)]
    pub next_retry_at: Option<DateTime<Utc>>,
    /// 额外数据
    #[serde(default)]
    pub extra_data: HashMap<String, serde_json::Value>,
}

impl FailedTask {
    /// 创建重试次数为 0 的新失败任务
    pub fn new(
        url: impl Into<String>,
        site_name: impl Into<String>,
        error_category: ErrorCategory,
        error_message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            site_name: site_name.into(),
            error_category,
            error_message: error_message.into(),
            status_code,
            retry_count: 0,
            first_failed_at: now,
            last_failed_at: now,
            next_retry_at: None,
            extra_data: HashMap::new(),
        }
    }
}

/// 快照时间戳格式 `YYYY-MM-DD HH:MM:SS`（UTC）
pub mod snapshot_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// 可空的快照时间戳格式
pub mod snapshot_time_opt {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::snapshot_time::FORMAT;

    pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match dt {
            Some(dt) => serializer.serialize_some(&dt.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            Some(s) => NaiveDateTime::parse_from_str(&s, FORMAT)
                .map(|naive| Some(naive.and_utc()))
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
