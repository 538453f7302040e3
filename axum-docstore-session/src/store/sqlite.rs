use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use sqlx::{FromRow, SqlitePool};

use crate::{
    session::SessionId,
    store::{Collection, IndexModel, MODIFIED_FIELD, SessionRecord},
    utils::{Clock, SystemClock},
};

/// Session records in a SQLite table.
///
/// SQLite has no TTL indexes, so expiry is applied as a filter on reads and
/// through [`SqliteCollection::purge_expired`].
pub struct SqliteCollection {
    pool: SqlitePool,
    table: Arc<str>,
    // 0 means records never expire
    expire_after: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

#[derive(FromRow)]
struct Row {
    id: String,
    data: String,
    modified: i64,
}

impl TryFrom<Row> for SessionRecord {
    type Error = sqlx::Error;

    fn try_from(row: Row) -> Result<Self, Self::Error> {
        let id = SessionId::parse(&row.id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(SessionRecord {
            id,
            data: row.data,
            modified: row.modified.max(0) as u64,
        })
    }
}

impl Clone for SqliteCollection {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            table: self.table.clone(),
            expire_after: self.expire_after.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl SqliteCollection {
    /// Creates `table` if it does not exist yet.
    pub async fn new(pool: SqlitePool, table: &str) -> sqlx::Result<Self> {
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(sqlx::Error::Configuration(
                format!("invalid table name `{table}`").into(),
            ));
        }

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL,
                modified INTEGER NOT NULL
            )"
        ))
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            table: table.into(),
            expire_after: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Deletes every record past its expiry. Returns how many were removed.
    pub async fn purge_expired(&self) -> sqlx::Result<u64> {
        let expire_after = self.expire_after.load(Ordering::SeqCst);
        if expire_after == 0 {
            return Ok(0);
        }

        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE modified + ?1 < ?2",
            self.table
        ))
        .bind(expire_after as i64)
        .bind(self.clock.now_secs() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

impl Collection for SqliteCollection {
    type Error = sqlx::Error;

    async fn find_by_id(&self, id: &SessionId) -> sqlx::Result<Option<SessionRecord>> {
        let expire_after = self.expire_after.load(Ordering::SeqCst) as i64;

        let row: Option<Row> = sqlx::query_as(&format!(
            "
            SELECT id, data, modified
            FROM {}
            WHERE id = ?1
              AND (?2 = 0 OR modified + ?2 >= ?3)
            ",
            self.table
        ))
        .bind(id.to_hex())
        .bind(expire_after)
        .bind(self.clock.now_secs() as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRecord::try_from).transpose()
    }

    async fn upsert_by_id(&self, record: SessionRecord) -> sqlx::Result<()> {
        let modified =
            i64::try_from(record.modified).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        sqlx::query(&format!(
            "
            INSERT INTO {} (id, data, modified)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (id) DO UPDATE SET
                data = excluded.data,
                modified = excluded.modified
            ",
            self.table
        ))
        .bind(record.id.to_hex())
        .bind(record.data)
        .bind(modified)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_by_id(&self, id: &SessionId) -> sqlx::Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?1", self.table))
            .bind(id.to_hex())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_indexes(&self, indexes: &[IndexModel]) -> sqlx::Result<()> {
        for index in indexes {
            if !index
                .field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(sqlx::Error::Configuration(
                    format!("invalid index field `{}`", index.field).into(),
                ));
            }

            // Timestamps have second resolution, a unique index would reject
            // two sessions saved within the same second.
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {table}_{field} ON {table} ({field})",
                table = self.table,
                field = index.field,
            ))
            .execute(&self.pool)
            .await?;

            if index.field == MODIFIED_FIELD
                && let Some(expire_after) = index.expire_after
            {
                self.expire_after
                    .store(expire_after.as_secs(), Ordering::SeqCst);
            }
        }

        Ok(())
    }
}
