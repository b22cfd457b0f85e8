// ==========================================
// 动态配置 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供主库(读写)/只读库两种连接获取能力，管理器不关心具体接线
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

// ==========================================
// ConnectionProvider - 连接提供者
// ==========================================

/// 存储访问接口
///
/// - primary: 读写连接（所有写事务走这里）
/// - replica: 只读连接（加载活动配置、列出备份）
pub trait ConnectionProvider: Send + Sync {
    fn primary(&self) -> RepositoryResult<MutexGuard<'_, Connection>>;

    fn replica(&self) -> RepositoryResult<MutexGuard<'_, Connection>>;
}

/// 基于 rusqlite 的连接提供者
///
/// 未单独指定只读连接时，读写共用同一个连接。
pub struct SqliteConnectionProvider {
    primary: Arc<Mutex<Connection>>,
    replica: Option<Arc<Mutex<Connection>>>,
}

impl SqliteConnectionProvider {
    /// 读写共用一个连接
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            primary: conn,
            replica: None,
        }
    }

    /// 主库/只读库分离
    pub fn with_replica(primary: Arc<Mutex<Connection>>, replica: Arc<Mutex<Connection>>) -> Self {
        Self {
            primary,
            replica: Some(replica),
        }
    }

    /// 按路径打开数据库（共用连接）
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// 内存数据库（测试/临时场景）
    pub fn open_in_memory() -> RepositoryResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        configure_sqlite_connection(&conn)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    /// 共享的读写连接句柄
    pub fn primary_handle(&self) -> Arc<Mutex<Connection>> {
        self.primary.clone()
    }

    fn lock(conn: &Mutex<Connection>) -> RepositoryResult<MutexGuard<'_, Connection>> {
        conn.lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl ConnectionProvider for SqliteConnectionProvider {
    fn primary(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        Self::lock(&self.primary)
    }

    fn replica(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        match &self.replica {
            Some(replica) => Self::lock(replica),
            None => Self::lock(&self.primary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_falls_back_to_primary() {
        let provider = SqliteConnectionProvider::open_in_memory().unwrap();
        {
            let conn = provider.primary().unwrap();
            conn.execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (7);")
                .unwrap();
        }
        let conn = provider.replica().unwrap();
        let v: i64 = conn.query_row("SELECT v FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
