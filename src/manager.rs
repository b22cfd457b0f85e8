// ==========================================
// 动态配置 - 配置管理器
// ==========================================
// 职责:
// - 提供者注册表（构造时冻结）
// - 活动配置的一次性懒加载与自动应用
// - 存储新快照并轮转备份、从备份恢复、清除
// 并发: 正确性依赖存储层事务；进程内只用锁保护内存状态
// ==========================================

pub mod cache;
pub mod clock;
mod core;

pub use self::cache::ActiveConfigCache;
pub use self::clock::{Clock, SystemClock};
pub use self::core::DynamicConfigManager;
