// ==========================================
// 动态配置 - 领域模型层
// ==========================================
// 职责: 定义存储记录与时间戳格式
// 红线: 不含数据访问逻辑
// ==========================================

pub mod config_record;

pub use config_record::{
    format_timestamp, parse_timestamp, ConfigRecord, DISPLAY_FORMAT, TIMESTAMP_FORMAT,
};
