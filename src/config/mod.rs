// ==========================================
// 动态配置 - 配置层
// ==========================================
// 职责: 管理器自身的运行参数（备份保留数、缓存 TTL、注册策略等）
// ==========================================

pub mod settings;

pub use settings::{
    env_keys, DuplicateKeyPolicy, ManagerSettings, DEFAULT_ACTIVE_CACHE_TTL_MS,
    DEFAULT_BACKUP_RETENTION,
};
