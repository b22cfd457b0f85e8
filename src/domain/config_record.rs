// ==========================================
// 动态配置 - 配置记录实体
// ==========================================
// 存储: dynamic_config 表（一行 = 一份配置快照）
// 约束: 同一 config_key 至多一行 is_active = 1
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 快照时间戳格式（定宽 14 位: YYYYMMDDHHMMSS）
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// 备份列表的人类可读格式（与恢复工具输出保持一致）
pub const DISPLAY_FORMAT: &str = "%Y-%m.%d %H:%M:%S";

/// 配置快照记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub config_key: String,
    pub serialized_value: String,
    pub timestamp: NaiveDateTime,
    pub is_active: bool,
}

impl ConfigRecord {
    /// 新建一条活动记录
    pub fn new_active(config_key: &str, serialized_value: &str, timestamp: NaiveDateTime) -> Self {
        Self {
            config_key: config_key.to_string(),
            serialized_value: serialized_value.to_string(),
            timestamp,
            is_active: true,
        }
    }

    /// 是否为备份（非活动）记录
    pub fn is_backup(&self) -> bool {
        !self.is_active
    }
}

/// 格式化为存储用时间戳
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// 解析存储用时间戳
///
/// 只接受 14 位纯数字，避免 chrono 对宽松输入（如 "2024010112"）的误判。
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.len() != 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_format_timestamp_is_fixed_width() {
        assert_eq!(format_timestamp(&ts(7, 5, 3)), "20240309070503");
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("20240309070503"), Some(ts(7, 5, 3)));
        assert_eq!(parse_timestamp(" 20240309070503 "), Some(ts(7, 5, 3)));
    }

    #[test]
    fn test_parse_timestamp_rejects_malformed() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("2024030907050"), None);
        assert_eq!(parse_timestamp("2024-03-09 07:05"), None);
        assert_eq!(parse_timestamp("20241309070503"), None);
    }

    #[test]
    fn test_new_active_record() {
        let record = ConfigRecord::new_active("theme", "dark", ts(1, 0, 0));
        assert!(record.is_active);
        assert!(!record.is_backup());
        assert_eq!(record.config_key, "theme");
    }
}
