// ==========================================
// 动态配置 - 配置快照仓储
// ==========================================
// 表: dynamic_config (config_key, serialized_value, timestamp, is_active)
// 约束: 同一 config_key 至多一条活动记录；复合写操作全部在单个事务内完成
// ==========================================

mod core;

pub use self::core::{DynamicConfigRepository, RotationOutcome, TABLE_NAME};
