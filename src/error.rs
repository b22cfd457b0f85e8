// ==========================================
// 动态配置 - 管理器错误类型
// ==========================================
// 分类:
// - RegistrationError: 注册期错误（部署配置缺陷，启动即失败）
// - ManagerError: 运行期需要显式上报给调用方的错误（恢复校验等）
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 注册期错误
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Invalid key for dynamic config: {key:?}")]
    InvalidKey { key: String },

    #[error("Invalid spec for dynamic config: key={key}, reason={reason}")]
    InvalidSpec { key: String, reason: String },

    #[error("Invalid object for dynamic config: key={key}, reason={reason}")]
    InvalidObject { key: String, reason: String },

    #[error("Duplicate dynamic config key: {key}")]
    DuplicateKey { key: String },
}

/// 管理器运行期错误
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Config not registered: {key}")]
    ConfigNotRegistered { key: String },

    #[error("Invalid backup timestamp: {timestamp}")]
    InvalidBackup { key: String, timestamp: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type ManagerResult<T> = Result<T, ManagerError>;
