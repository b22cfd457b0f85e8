use crate::db::ConnectionProvider;
use crate::domain::config_record::{format_timestamp, parse_timestamp, ConfigRecord};
use crate::repository::error::RepositoryResult;
use chrono::NaiveDateTime;
use rusqlite::{
    params, Connection, OptionalExtension, Result as SqliteResult, Row, TransactionBehavior,
};
use std::sync::Arc;

pub const TABLE_NAME: &str = "dynamic_config";

/// 一次 store 的备份轮转结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationOutcome {
    /// 原活动记录是否被转为备份
    pub rotated: bool,
    /// 因超出保留数而删除的最旧备份条数（0 或 1）
    pub evicted: usize,
}

pub struct DynamicConfigRepository {
    connections: Arc<dyn ConnectionProvider>,
}

impl DynamicConfigRepository {
    pub fn new(connections: Arc<dyn ConnectionProvider>) -> Self {
        Self { connections }
    }

    /// 建表（幂等）
    pub fn ensure_schema(&self) -> RepositoryResult<()> {
        let conn = self.connections.primary()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS dynamic_config (
              config_key TEXT NOT NULL,
              serialized_value TEXT NOT NULL,
              timestamp TEXT NOT NULL,
              is_active INTEGER NOT NULL DEFAULT 0 CHECK(is_active IN (0, 1))
            );

            CREATE INDEX IF NOT EXISTS idx_dynamic_config_key_active ON dynamic_config(config_key, is_active);
            CREATE INDEX IF NOT EXISTS idx_dynamic_config_key_timestamp ON dynamic_config(config_key, timestamp);
            "#,
        )?;
        Ok(())
    }

    /// 读取所有活动配置 (config_key, serialized_value)，按写入时间先后排序
    ///
    /// 表不存在时返回空集合（尚未执行迁移的库视为“没有配置”）。
    pub fn fetch_active(&self) -> RepositoryResult<Vec<(String, String)>> {
        let conn = self.connections.replica()?;
        if !table_exists(&conn)? {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT config_key, serialized_value
            FROM dynamic_config
            WHERE is_active = 1
            ORDER BY timestamp ASC, rowid ASC
            "#,
        )?;
        let active = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(active)
    }

    /// 备份轮转 + 写入新活动记录（单事务）
    ///
    /// 事务以 IMMEDIATE 开启：先读后写，并发写入方在 busy_timeout 内排队等待。
    pub fn store_with_rotation(
        &self,
        config_key: &str,
        serialized_value: &str,
        timestamp: NaiveDateTime,
        retention: usize,
    ) -> RepositoryResult<RotationOutcome> {
        let mut conn = self.connections.primary()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = rotate_backups(&tx, config_key, retention)?;
        tx.execute(
            r#"
            INSERT INTO dynamic_config (config_key, serialized_value, timestamp, is_active)
            VALUES (?1, ?2, ?3, 1)
            "#,
            params![config_key, serialized_value, format_timestamp(&timestamp)],
        )?;

        tx.commit()?;
        Ok(outcome)
    }

    /// 列出备份时间戳（新 → 旧）
    pub fn list_backups(&self, config_key: &str) -> RepositoryResult<Vec<NaiveDateTime>> {
        let conn = self.connections.replica()?;
        if !table_exists(&conn)? {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT timestamp
            FROM dynamic_config
            WHERE config_key = ?1 AND is_active = 0
            ORDER BY timestamp DESC, rowid DESC
            "#,
        )?;
        let raw = stmt
            .query_map(params![config_key], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut backups = Vec::with_capacity(raw.len());
        for ts in raw {
            match parse_timestamp(&ts) {
                Some(parsed) => backups.push(parsed),
                None => tracing::warn!(
                    config_key = config_key,
                    timestamp = %ts,
                    "跳过时间戳格式错误的备份记录"
                ),
            }
        }
        Ok(backups)
    }

    /// 从备份恢复：当前活动记录转为备份，指定备份转为活动（单事务，纯标志位交换，IMMEDIATE）
    ///
    /// # 返回
    /// - Ok(false): 该时间戳下不存在备份，未做任何修改
    pub fn restore_backup(&self, config_key: &str, timestamp: NaiveDateTime) -> RepositoryResult<bool> {
        let mut conn = self.connections.primary()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let backup_rowid: Option<i64> = tx
            .query_row(
                r#"
                SELECT rowid
                FROM dynamic_config
                WHERE config_key = ?1 AND is_active = 0 AND timestamp = ?2
                ORDER BY rowid DESC
                LIMIT 1
                "#,
                params![config_key, format_timestamp(&timestamp)],
                |row| row.get(0),
            )
            .optional()?;

        let Some(rowid) = backup_rowid else {
            return Ok(false);
        };

        tx.execute(
            "UPDATE dynamic_config SET is_active = 0 WHERE config_key = ?1 AND is_active = 1",
            params![config_key],
        )?;
        tx.execute(
            "UPDATE dynamic_config SET is_active = 1 WHERE rowid = ?1",
            params![rowid],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// 删除某个 key 的全部记录（活动 + 备份）
    pub fn clear(&self, config_key: &str) -> RepositoryResult<usize> {
        let conn = self.connections.primary()?;
        if !table_exists(&conn)? {
            return Ok(0);
        }
        let rows = conn.execute(
            "DELETE FROM dynamic_config WHERE config_key = ?1",
            params![config_key],
        )?;
        Ok(rows)
    }

    /// 某个 key 的全部记录（旧 → 新），用于诊断与测试
    pub fn find_by_key(&self, config_key: &str) -> RepositoryResult<Vec<ConfigRecord>> {
        let conn = self.connections.replica()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT config_key, serialized_value, timestamp, is_active
            FROM dynamic_config
            WHERE config_key = ?1
            ORDER BY timestamp ASC, rowid ASC
            "#,
        )?;
        let records = stmt
            .query_map(params![config_key], |row| map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }
}

fn table_exists(conn: &Connection) -> RepositoryResult<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1",
            params![TABLE_NAME],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    Ok(exists)
}

/// 备份轮转（必须在写事务内调用）
///
/// 1. 无活动记录 → 直接返回
/// 2. 活动记录转为最新备份
/// 3. 备份数超过 retention → 只删除最旧的一条
fn rotate_backups(conn: &Connection, config_key: &str, retention: usize) -> RepositoryResult<RotationOutcome> {
    let has_active: Option<i64> = conn
        .query_row(
            "SELECT rowid FROM dynamic_config WHERE config_key = ?1 AND is_active = 1 LIMIT 1",
            params![config_key],
            |row| row.get(0),
        )
        .optional()?;
    if has_active.is_none() {
        return Ok(RotationOutcome::default());
    }

    conn.execute(
        "UPDATE dynamic_config SET is_active = 0 WHERE config_key = ?1 AND is_active = 1",
        params![config_key],
    )?;

    let backup_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM dynamic_config WHERE config_key = ?1 AND is_active = 0",
        params![config_key],
        |row| row.get(0),
    )?;

    let mut evicted = 0;
    if backup_count as usize > retention {
        // SQLite 默认不支持 DELETE ... ORDER BY ... LIMIT，按 rowid 删除
        evicted = conn.execute(
            r#"
            DELETE FROM dynamic_config
            WHERE rowid = (
              SELECT rowid FROM dynamic_config
              WHERE config_key = ?1 AND is_active = 0
              ORDER BY timestamp ASC, rowid ASC
              LIMIT 1
            )
            "#,
            params![config_key],
        )?;
        tracing::debug!(config_key = config_key, backup_count, retention, "已删除最旧备份");
    }

    Ok(RotationOutcome {
        rotated: true,
        evicted,
    })
}

fn map_row(row: &Row) -> SqliteResult<ConfigRecord> {
    let config_key: String = row.get(0)?;
    let serialized_value: String = row.get(1)?;
    let timestamp_str: String = row.get(2)?;
    let is_active: i64 = row.get(3)?;

    let timestamp = parse_timestamp(&timestamp_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {}", timestamp_str).into(),
        )
    })?;

    Ok(ConfigRecord {
        config_key,
        serialized_value,
        timestamp,
        is_active: is_active != 0,
    })
}
