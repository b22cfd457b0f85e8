// ==========================================
// 动态配置 - 宿主启动接线
// ==========================================
// 职责: 打开数据库 → 建表 → 解析提供者声明 → 构建管理器 → 首次加载
// 时机: 宿主在请求处理开始之前调用，保证自动应用的配置先生效
// ==========================================

use crate::config::{env_keys, ManagerSettings};
use crate::db::SqliteConnectionProvider;
use crate::manager::DynamicConfigManager;
use crate::provider::{build_providers, ProviderFactoryRegistry, ProviderSpecs, RegisterConfigsHook};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// 启动失败（均为致命错误，宿主应中止启动）
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Registration(#[from] crate::error::RegistrationError),

    #[error(transparent)]
    Repository(#[from] crate::repository::RepositoryError),

    #[error(transparent)]
    Manager(#[from] crate::error::ManagerError),
}

/// 启动参数
pub struct BootstrapOptions<'a> {
    pub db_path: String,
    pub specs: ProviderSpecs,
    pub factories: &'a ProviderFactoryRegistry,
    pub hooks: Vec<&'a dyn RegisterConfigsHook>,
    pub settings: ManagerSettings,
}

/// 构建管理器并完成首次加载
///
/// 首次加载失败只记录 error（存储暂不可用不应阻止宿主启动），注册错误则直接返回。
pub fn bootstrap(options: BootstrapOptions<'_>) -> Result<Arc<DynamicConfigManager>, BootstrapError> {
    tracing::info!("初始化动态配置，数据库路径: {}", options.db_path);

    let connections = Arc::new(SqliteConnectionProvider::open(&options.db_path)?);
    let providers = build_providers(&options.specs, options.factories, &options.hooks)?;
    tracing::info!(count = providers.len(), "动态配置提供者注册完成");

    let manager = DynamicConfigManager::new(connections, providers, options.settings)?;
    manager.ensure_schema()?;

    if let Err(e) = manager.load_configs() {
        tracing::error!(error = %e, "启动时加载动态配置失败，将在首次访问时重试");
    }

    Ok(Arc::new(manager))
}

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 DYNAMIC_CONFIG_DB_PATH（非空时）
/// - 用户数据目录/dynamic-config/dynamic_config.db
/// - 回退: ./dynamic_config.db
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(env_keys::DB_PATH) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./dynamic_config.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("dynamic-config");
        // best-effort: 目录创建失败时 SQLite 打开会给出明确错误
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("dynamic_config.db");
        }
    }

    path.to_string_lossy().to_string()
}
