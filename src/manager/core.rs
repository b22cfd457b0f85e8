use crate::config::{DuplicateKeyPolicy, ManagerSettings};
use crate::db::ConnectionProvider;
use crate::domain::config_record::format_timestamp;
use crate::error::{ManagerError, ManagerResult, RegistrationError};
use crate::manager::cache::ActiveConfigCache;
use crate::manager::clock::{Clock, SystemClock};
use crate::provider::ConfigProvider;
use crate::repository::DynamicConfigRepository;
use chrono::NaiveDateTime;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// 已加载的活动配置
#[derive(Debug, Clone)]
struct LoadedEntry {
    serialized: String,
    applied: bool,
}

#[derive(Debug, Default)]
struct LoadState {
    loaded: bool,
    data: HashMap<String, LoadedEntry>,
}

pub struct DynamicConfigManager {
    repo: DynamicConfigRepository,
    cache: Arc<ActiveConfigCache>,
    clock: Arc<dyn Clock>,
    settings: ManagerSettings,
    /// 注册顺序
    keys: Vec<String>,
    registry: HashMap<String, Arc<dyn ConfigProvider>>,
    state: Mutex<LoadState>,
}

impl DynamicConfigManager {
    /// 创建管理器并冻结注册表
    ///
    /// 重复 key 按 `settings.duplicate_key_policy` 处理：覆盖（warn）或拒绝（error）。
    pub fn new(
        connections: Arc<dyn ConnectionProvider>,
        providers: Vec<Arc<dyn ConfigProvider>>,
        settings: ManagerSettings,
    ) -> Result<Self, RegistrationError> {
        let mut keys = Vec::with_capacity(providers.len());
        let mut registry: HashMap<String, Arc<dyn ConfigProvider>> = HashMap::new();

        for provider in providers {
            let key = provider.key().to_string();
            if registry.contains_key(&key) {
                match settings.duplicate_key_policy {
                    DuplicateKeyPolicy::Overwrite => {
                        tracing::warn!(config_key = %key, "重复注册的配置 key，后注册者覆盖先注册者");
                    }
                    DuplicateKeyPolicy::Reject => {
                        tracing::error!(config_key = %key, "重复注册的配置 key");
                        return Err(RegistrationError::DuplicateKey { key });
                    }
                }
            } else {
                keys.push(key.clone());
            }
            registry.insert(key, provider);
        }

        let cache = ActiveConfigCache::shared(settings.active_cache_ttl());

        Ok(Self {
            repo: DynamicConfigRepository::new(connections),
            cache,
            clock: Arc::new(SystemClock),
            settings,
            keys,
            registry,
            state: Mutex::new(LoadState::default()),
        })
    }

    /// 替换快照时间来源
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 使用进程级共享缓存（多个管理器实例共用）
    pub fn with_cache(mut self, cache: Arc<ActiveConfigCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// 建表（幂等）
    pub fn ensure_schema(&self) -> ManagerResult<()> {
        self.repo.ensure_schema()?;
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ==========================================
    // 加载与应用
    // ==========================================

    /// 一次性懒加载活动配置
    ///
    /// 已加载时直接返回；存储读取失败时不置位加载标志，下次调用会重试。
    /// 自动应用的提供者按注册顺序在加载完成后立即应用，应用时不持有状态锁，
    /// provider.apply 内可以回调管理器。
    pub fn load_configs(&self) -> ManagerResult<()> {
        let pending = {
            let mut state = self.state();
            if state.loaded {
                return Ok(());
            }

            let active = self
                .cache
                .get_with_set_callback(|| self.repo.fetch_active())?;

            state.data.clear();
            for (key, serialized) in active {
                if !self.registry.contains_key(&key) {
                    continue;
                }
                tracing::debug!(config_key = %key, "从数据库加载配置");
                state.data.insert(
                    key,
                    LoadedEntry {
                        serialized,
                        applied: false,
                    },
                );
            }
            state.loaded = true;

            self.keys
                .iter()
                .filter_map(|key| {
                    let provider = self.registry.get(key)?;
                    if !provider.should_auto_apply() {
                        return None;
                    }
                    let entry = state.data.get(key)?;
                    Some((provider.clone(), entry.serialized.clone()))
                })
                .collect::<Vec<_>>()
        };

        for (provider, serialized) in pending {
            self.apply_and_mark(provider.as_ref(), &serialized);
        }
        Ok(())
    }

    /// 重置加载标志与已加载数据，下次访问重新查询存储
    pub fn force_reload(&self) {
        let mut state = self.state();
        state.loaded = false;
        state.data.clear();
        self.cache.invalidate();
        tracing::debug!("已重置动态配置加载状态");
    }

    pub fn is_loaded(&self) -> bool {
        self.state().loaded
    }

    fn ensure_loaded(&self) {
        if let Err(e) = self.load_configs() {
            tracing::error!(error = %e, "加载动态配置失败");
        }
    }

    /// 应用已加载的配置
    ///
    /// # 返回
    /// - false: 无已加载数据，或应用失败
    /// - true: 应用成功，或已应用且未强制
    pub fn apply_config(&self, provider: &dyn ConfigProvider, force_apply: bool) -> bool {
        let key = provider.key();
        self.ensure_loaded();

        let serialized = {
            let state = self.state();
            match state.data.get(key) {
                None => {
                    tracing::debug!(config_key = key, "尝试应用数据库中没有数据的配置");
                    return false;
                }
                Some(entry) if entry.applied && !force_apply => {
                    tracing::debug!(config_key = key, "配置已应用");
                    return true;
                }
                Some(entry) => entry.serialized.clone(),
            }
        };

        // 已加载数据只来自已注册的 key，应用时以注册表中的实例为准
        let target: &dyn ConfigProvider = match self.registry.get(key) {
            Some(registered) => registered.as_ref(),
            None => provider,
        };
        self.apply_and_mark(target, &serialized)
    }

    /// 在状态锁之外调用 provider.apply，成功后再加锁置位 applied
    fn apply_and_mark(&self, provider: &dyn ConfigProvider, serialized: &str) -> bool {
        let key = provider.key();
        if !provider.apply(serialized) {
            tracing::error!(config_key = key, "从数据库应用配置失败");
            return false;
        }

        // 应用期间数据可能已被 force_reload/refresh_on_store 替换，只标记同一份载荷
        if let Some(entry) = self.state().data.get_mut(key) {
            if entry.serialized == serialized {
                entry.applied = true;
            }
        }
        tracing::info!(config_key = key, "已从数据库应用配置");
        true
    }

    // ==========================================
    // 存储
    // ==========================================

    /// 存储提供者的新快照（备份轮转 + 写入在同一事务内）
    ///
    /// 默认不刷新内存中的已加载数据：`retrieve_raw`/`apply_config` 仍反映首次加载结果，
    /// 除非开启 `refresh_on_store`。
    pub fn store_config(
        &self,
        provider: &dyn ConfigProvider,
        additional_data: Option<&Value>,
        serialized: Option<&str>,
    ) -> bool {
        let key = provider.key();
        if !self.registry.contains_key(key) {
            tracing::error!(config_key = key, "尝试存储未注册的配置");
            return false;
        }

        let payload = match serialized {
            Some(raw) => raw.to_string(),
            None => match provider.serialize(additional_data) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::error!(config_key = key, error = %e, "配置序列化失败");
                    return false;
                }
            },
        };

        let timestamp = self.clock.now();
        let outcome = match self.repo.store_with_rotation(
            key,
            &payload,
            timestamp,
            self.settings.backup_retention,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(config_key = key, error = %e, "存储配置失败");
                return false;
            }
        };
        self.cache.invalidate();

        tracing::info!(
            config_key = key,
            timestamp = %format_timestamp(&timestamp),
            rotated = outcome.rotated,
            evicted = outcome.evicted,
            "已存储配置"
        );

        if self.settings.refresh_on_store {
            let mut state = self.state();
            if state.loaded {
                state.data.insert(
                    key.to_string(),
                    LoadedEntry {
                        serialized: payload,
                        applied: false,
                    },
                );
            }
        }

        true
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 最近一次加载得到的原始载荷
    pub fn retrieve_raw(&self, provider: &dyn ConfigProvider) -> Option<String> {
        self.ensure_loaded();
        self.state()
            .data
            .get(provider.key())
            .map(|entry| entry.serialized.clone())
    }

    /// 全部已注册 key（按注册顺序），与是否有存储数据无关
    pub fn list_types(&self) -> Vec<String> {
        self.ensure_loaded();
        self.keys.clone()
    }

    pub fn get_config_object(&self, key: &str) -> Option<Arc<dyn ConfigProvider>> {
        match self.registry.get(key) {
            Some(provider) => Some(provider.clone()),
            None => {
                tracing::error!(config_key = key, "尝试获取未注册的配置对象");
                None
            }
        }
    }

    /// 备份时间戳（新 → 旧），直接查询存储不走缓存
    pub fn list_backups(&self, provider: &dyn ConfigProvider) -> ManagerResult<Vec<NaiveDateTime>> {
        Ok(self.repo.list_backups(provider.key())?)
    }

    // ==========================================
    // 恢复与清除
    // ==========================================

    /// 从备份恢复（活动/备份标志位交换，不复制数据，不自动应用）
    ///
    /// # 错误
    /// - ConfigNotRegistered: key 未注册
    /// - InvalidBackup: 该时间戳下不存在备份
    pub fn restore_from_backup(
        &self,
        provider: &dyn ConfigProvider,
        timestamp: NaiveDateTime,
    ) -> ManagerResult<()> {
        let key = provider.key();
        if !self.registry.contains_key(key) {
            tracing::error!(config_key = key, "尝试恢复未注册的配置");
            return Err(ManagerError::ConfigNotRegistered {
                key: key.to_string(),
            });
        }

        let ts = format_timestamp(&timestamp);
        if !self.repo.restore_backup(key, timestamp)? {
            tracing::error!(config_key = key, timestamp = %ts, "尝试恢复不存在的备份");
            return Err(ManagerError::InvalidBackup {
                key: key.to_string(),
                timestamp: ts,
            });
        }
        self.cache.invalidate();

        tracing::info!(config_key = key, timestamp = %ts, "已从备份恢复配置");
        Ok(())
    }

    /// 删除某个 key 的全部记录（无论是否注册），不影响内存状态
    pub fn clear_config(&self, key: &str) -> bool {
        match self.repo.clear(key) {
            Ok(rows) => {
                self.cache.invalidate();
                tracing::info!(config_key = key, rows, "已清除配置");
                true
            }
            Err(e) => {
                tracing::error!(config_key = key, error = %e, "清除配置失败");
                false
            }
        }
    }
}
