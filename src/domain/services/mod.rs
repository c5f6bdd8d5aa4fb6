// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 站点内容处理能力注册表
pub mod content_processor;

/// 失败分类与差异化重试
pub mod failure_handler;

/// 域名级别和全局级别的流量控制
pub mod rate_limiter;

/// 差异化重试策略表
pub mod retry_policy;
