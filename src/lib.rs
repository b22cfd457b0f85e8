// ==========================================
// 动态配置 - 核心库
// ==========================================
// 职责: 运行时配置快照的持久化、版本化与应用
// 技术栈: Rust + SQLite (rusqlite)
// 红线: 提供者只负责序列化/应用，存储与备份轮转只在管理器与仓储中完成
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 存储记录与时间戳格式
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 配置提供者 - 注册与全局变量提供者
pub mod provider;

// 配置层 - 管理器运行参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 错误类型
pub mod error;

// 管理器 - 加载/应用/存储/恢复
pub mod manager;

// 应用层 - 宿主启动接线
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

pub use app::{bootstrap, get_default_db_path, BootstrapError, BootstrapOptions};
pub use config::{DuplicateKeyPolicy, ManagerSettings};
pub use db::{ConnectionProvider, SqliteConnectionProvider};
pub use domain::ConfigRecord;
pub use error::{ManagerError, ManagerResult, RegistrationError};
pub use manager::{ActiveConfigCache, Clock, DynamicConfigManager, SystemClock};
pub use provider::{
    build_providers, ConfigProvider, GlobalState, GlobalsProvider, ProviderError,
    ProviderFactoryRegistry, ProviderSpecs, RegisterConfigsHook,
};
pub use repository::{DynamicConfigRepository, RepositoryError, RepositoryResult};

// ==========================================
// 常量定义
// ==========================================

// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
