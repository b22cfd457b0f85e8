// ==========================================
// 动态配置 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑（注册校验、日志级别策略都在管理器）
// 约束: 所有查询使用参数化，防止 SQL 注入
// ==========================================

pub mod dynamic_config_repo;
pub mod error;

pub use dynamic_config_repo::{DynamicConfigRepository, RotationOutcome, TABLE_NAME};
pub use error::{RepositoryError, RepositoryResult};
