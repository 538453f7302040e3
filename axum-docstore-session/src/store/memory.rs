use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{
    session::SessionId,
    store::{Collection, IndexModel, MODIFIED_FIELD, SessionRecord},
    utils::{Clock, SystemClock},
};

#[derive(Debug, thiserror::Error)]
pub enum MemCollectionError {
    #[error("index on `{0}` already exists with different options")]
    IndexConflict(String),
}

/// In-process collection. Honours an expiry index on `modified` by hiding and
/// dropping expired records when they are read.
pub struct MemCollection {
    inner: Arc<RwLock<Inner>>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<SessionId, SessionRecord>,
    indexes: Vec<IndexModel>,
}

impl Inner {
    fn expire_after_secs(&self) -> Option<u64> {
        self.indexes
            .iter()
            .find(|index| index.field == MODIFIED_FIELD)
            .and_then(|index| index.expire_after)
            .map(|expire_after| expire_after.as_secs())
    }
}

impl Default for MemCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemCollection {
    fn clone(&self) -> Self {
        MemCollection {
            inner: self.inner.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl MemCollection {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()).into(),
            clock,
        }
    }

    /// Number of stored records, expired or not.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn indexes(&self) -> Vec<IndexModel> {
        self.inner.read().await.indexes.clone()
    }

    /// Drops every record past its expiry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let mut lock = self.inner.write().await;
        let Some(ttl) = lock.expire_after_secs() else {
            return 0;
        };

        let before = lock.records.len();
        lock.records
            .retain(|_, record| !is_expired(record, ttl, now));
        before - lock.records.len()
    }
}

fn is_expired(record: &SessionRecord, ttl: u64, now: u64) -> bool {
    record.modified.saturating_add(ttl) < now
}

impl Collection for MemCollection {
    type Error = MemCollectionError;

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<SessionRecord>, Self::Error> {
        let now = self.clock.now_secs();

        {
            let lock = self.inner.read().await;
            let Some(record) = lock.records.get(id) else {
                return Ok(None);
            };

            match lock.expire_after_secs() {
                Some(ttl) if is_expired(record, ttl, now) => {}
                _ => return Ok(Some(record.clone())),
            }
        }

        // It may have been saved again in between.
        let mut lock = self.inner.write().await;
        if let Some(ttl) = lock.expire_after_secs()
            && lock
                .records
                .get(id)
                .is_some_and(|record| is_expired(record, ttl, now))
        {
            lock.records.remove(id);
        }
        Ok(None)
    }

    async fn upsert_by_id(&self, record: SessionRecord) -> Result<(), Self::Error> {
        let mut lock = self.inner.write().await;
        lock.records.insert(record.id, record);
        Ok(())
    }

    async fn remove_by_id(&self, id: &SessionId) -> Result<bool, Self::Error> {
        let mut lock = self.inner.write().await;
        Ok(lock.records.remove(id).is_some())
    }

    async fn create_indexes(&self, indexes: &[IndexModel]) -> Result<(), Self::Error> {
        let mut lock = self.inner.write().await;

        for index in indexes {
            match lock.indexes.iter().find(|i| i.field == index.field) {
                Some(existing) if existing == index => {}
                Some(_) => return Err(MemCollectionError::IndexConflict(index.field.to_string())),
                None => lock.indexes.push(index.clone()),
            }
        }
        Ok(())
    }
}
