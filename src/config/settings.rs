// ==========================================
// 动态配置 - 管理器参数
// ==========================================
// 来源优先级: 环境变量 > JSON 配置 > 默认值
// ==========================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 默认备份保留数
pub const DEFAULT_BACKUP_RETENTION: usize = 3;

/// 默认活动配置缓存 TTL（毫秒）
pub const DEFAULT_ACTIVE_CACHE_TTL_MS: u64 = 1_000;

/// 环境变量键
pub mod env_keys {
    pub const BACKUP_RETENTION: &str = "DYNAMIC_CONFIG_BACKUP_RETENTION";
    pub const CACHE_TTL_MS: &str = "DYNAMIC_CONFIG_CACHE_TTL_MS";
    pub const DUPLICATE_KEYS: &str = "DYNAMIC_CONFIG_DUPLICATE_KEYS";
    pub const REFRESH_ON_STORE: &str = "DYNAMIC_CONFIG_REFRESH_ON_STORE";
    pub const DB_PATH: &str = "DYNAMIC_CONFIG_DB_PATH";
}

/// 重复 key 注册策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKeyPolicy {
    /// 后注册者覆盖先注册者（记录 warn 日志）
    #[default]
    Overwrite,
    /// 视为注册错误
    Reject,
}

impl DuplicateKeyPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "overwrite" => Some(DuplicateKeyPolicy::Overwrite),
            "reject" => Some(DuplicateKeyPolicy::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// 每个 key 最多保留的备份数
    pub backup_retention: usize,
    /// 活动配置读缓存 TTL（毫秒，0 = 不缓存）
    pub active_cache_ttl_ms: u64,
    pub duplicate_key_policy: DuplicateKeyPolicy,
    /// store 成功后是否同步刷新内存中的已加载数据（默认保持旧行为：不刷新）
    pub refresh_on_store: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            backup_retention: DEFAULT_BACKUP_RETENTION,
            active_cache_ttl_ms: DEFAULT_ACTIVE_CACHE_TTL_MS,
            duplicate_key_policy: DuplicateKeyPolicy::default(),
            refresh_on_store: false,
        }
    }
}

fn is_true(v: &str) -> bool {
    matches!(
        v.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl ManagerSettings {
    /// 从 JSON 文档解析（缺省字段取默认值）
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// 默认值 + 环境变量覆写
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// 用环境变量覆写当前参数
    ///
    /// 非法值忽略并记录 warn，不影响启动。
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(env_keys::BACKUP_RETENTION) {
            match raw.trim().parse::<usize>() {
                Ok(v) => self.backup_retention = v,
                Err(_) => tracing::warn!(
                    env = env_keys::BACKUP_RETENTION,
                    raw_value = %raw,
                    "备份保留数格式错误，使用原值"
                ),
            }
        }

        if let Some(raw) = lookup(env_keys::CACHE_TTL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(v) => self.active_cache_ttl_ms = v,
                Err(_) => tracing::warn!(
                    env = env_keys::CACHE_TTL_MS,
                    raw_value = %raw,
                    "缓存 TTL 格式错误，使用原值"
                ),
            }
        }

        if let Some(raw) = lookup(env_keys::DUPLICATE_KEYS) {
            match DuplicateKeyPolicy::parse(&raw) {
                Some(policy) => self.duplicate_key_policy = policy,
                None => tracing::warn!(
                    env = env_keys::DUPLICATE_KEYS,
                    raw_value = %raw,
                    "重复 key 策略无法识别，使用原值"
                ),
            }
        }

        if let Some(raw) = lookup(env_keys::REFRESH_ON_STORE) {
            self.refresh_on_store = is_true(&raw);
        }

        self
    }

    pub fn active_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.active_cache_ttl_ms)
    }
}
