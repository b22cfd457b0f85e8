// ==========================================
// 活动配置读缓存
// ==========================================
// 短 TTL 读穿缓存，吸收同一请求内的重复加载；尽力而为，过期数据绝不返回
// ==========================================

use crate::repository::error::RepositoryResult;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// 活动配置 (config_key, serialized_value)，保持存储层返回的顺序
pub type ActiveConfigs = Vec<(String, String)>;

#[derive(Debug)]
pub struct ActiveConfigCache {
    ttl: Duration,
    entry: Mutex<Option<(Instant, ActiveConfigs)>>,
}

impl ActiveConfigCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// 可在多个管理器实例之间共享的句柄
    pub fn shared(ttl: Duration) -> Arc<Self> {
        Arc::new(Self::new(ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 命中且未过期直接返回，否则调用 `fetch` 并写回缓存
    ///
    /// `fetch` 失败时不写缓存，错误原样返回。
    pub fn get_with_set_callback<F>(&self, fetch: F) -> RepositoryResult<ActiveConfigs>
    where
        F: FnOnce() -> RepositoryResult<ActiveConfigs>,
    {
        if self.ttl.is_zero() {
            return fetch();
        }

        if let Some((stored_at, data)) = self.lock().as_ref() {
            if stored_at.elapsed() < self.ttl {
                return Ok(data.clone());
            }
        }

        let data = fetch()?;
        *self.lock() = Some((Instant::now(), data.clone()));
        Ok(data)
    }

    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<(Instant, ActiveConfigs)>> {
        self.entry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn sample() -> ActiveConfigs {
        vec![("theme".to_string(), "dark".to_string())]
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = ActiveConfigCache::new(Duration::from_secs(60));
        let calls = Cell::new(0);

        for _ in 0..3 {
            let data = cache
                .get_with_set_callback(|| {
                    calls.set(calls.get() + 1);
                    Ok(sample())
                })
                .unwrap();
            assert_eq!(data, sample());
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = ActiveConfigCache::new(Duration::ZERO);
        let calls = Cell::new(0);

        for _ in 0..3 {
            cache
                .get_with_set_callback(|| {
                    calls.set(calls.get() + 1);
                    Ok(sample())
                })
                .unwrap();
        }
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_expired_entry_is_refetched() {
        let cache = ActiveConfigCache::new(Duration::from_millis(5));
        cache.get_with_set_callback(|| Ok(sample())).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let data = cache.get_with_set_callback(|| Ok(Vec::new())).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let cache = ActiveConfigCache::new(Duration::from_secs(60));
        cache.get_with_set_callback(|| Ok(sample())).unwrap();
        cache.invalidate();

        let data = cache.get_with_set_callback(|| Ok(Vec::new())).unwrap();
        assert!(data.is_empty());
    }
}
