use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{fs, path::PathBuf, str::FromStr};

use shared::domain::{CachedConversationRecord, ChannelId};

/// Sqlite-backed conversation cache: one row per channel id holding the
/// serialized [`CachedConversationRecord`]. Rows are created lazily and
/// never expired.
#[derive(Clone)]
pub struct ConversationDb {
    pool: Pool<Sqlite>,
}

impl ConversationDb {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let db = Self { pool };
        db.ensure_chat_history_table().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_chat_history_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_history (
                channel_id TEXT PRIMARY KEY,
                record     TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure chat_history table exists")?;
        Ok(())
    }

    pub async fn get_record(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<CachedConversationRecord>> {
        let row = sqlx::query("SELECT record FROM chat_history WHERE channel_id = ?")
            .bind(channel_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.get(0);
                let record = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt cached record for channel {channel_id}"))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub async fn put_record(
        &self,
        channel_id: &ChannelId,
        record: &CachedConversationRecord,
    ) -> Result<()> {
        let raw = serde_json::to_string(record)?;
        sqlx::query(
            "INSERT INTO chat_history (channel_id, record, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(channel_id) DO UPDATE SET record=excluded.record, updated_at=excluded.updated_at",
        )
        .bind(channel_id.as_str())
        .bind(raw)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_record(&self, channel_id: &ChannelId) -> Result<()> {
        sqlx::query("DELETE FROM chat_history WHERE channel_id = ?")
            .bind(channel_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chat_history")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_channel_ids(&self) -> Result<Vec<ChannelId>> {
        let rows = sqlx::query("SELECT channel_id FROM chat_history ORDER BY channel_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| ChannelId::new(row.get::<String, _>(0)))
            .collect())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    if path.is_empty() || path.starts_with(':') {
        return Ok(());
    }
    let path = PathBuf::from(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
