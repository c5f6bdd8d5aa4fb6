// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;

/// 发布时间匹配模式，统一转换为 YYYY-MM-DD HH:MM:SS
static PUBLISH_TIME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2}(?::\d{2})?)").unwrap(),
        Regex::new(r"(\d{4}/\d{2}/\d{2} \d{2}:\d{2}(?::\d{2})?)").unwrap(),
        Regex::new(r"(\d{4}\.\d{2}\.\d{2} \d{2}:\d{2}(?::\d{2})?)").unwrap(),
    ]
});

/// 从内容中提取发布时间，并统一格式为 YYYY-MM-DD HH:MM:SS
///
/// 未找到时返回 None
pub fn extract_publish_time(content: &str) -> Option<String> {
    for pattern in PUBLISH_TIME_PATTERNS.iter() {
        if let Some(m) = pattern.captures(content).and_then(|c| c.get(1)) {
            let mut date_str = m.as_str().replace(['/', '.'], "-");
            // 缺少秒数时补齐
            if date_str.len() == 16 {
                date_str.push_str(":00");
            }
            return Some(date_str);
        }
    }
    None
}

/// 生成 [min_delay, max_delay) 区间内的随机延迟秒数
pub fn random_delay(min_delay: f64, max_delay: f64) -> f64 {
    if max_delay <= min_delay {
        return min_delay;
    }
    rand::random_range(min_delay..max_delay)
}
