//! 通用工具函数

use regex::Regex;
use std::sync::OnceLock;

use crate::models::Priority;

/// 生成排队号，普通号以 `A` 开头，急诊号以 `E` 开头
///
/// 序号来自同一天共用的计数器，因此同日号码互不重复。
pub fn format_token(priority: Priority, sequence: u32) -> String {
    let prefix = match priority {
        Priority::Normal => 'A',
        Priority::Emergency => 'E',
    };
    format!("{}-{}", prefix, sequence)
}

fn contact_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\+?[0-9][0-9 \-]{5,18}[0-9]$").expect("contact pattern is valid")
    })
}

/// 验证联系电话：7到15位数字，可带前导 `+`，允许空格和连字符分隔
pub fn is_valid_contact(contact: &str) -> bool {
    let contact = contact.trim();
    if !contact_pattern().is_match(contact) {
        return false;
    }
    let digits = contact.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=15).contains(&digits)
}

/// 空白字符串视为未填写
pub fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
