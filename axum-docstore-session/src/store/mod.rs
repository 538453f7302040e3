mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::{borrow::Cow, error::Error as StdError, time::Duration};

pub use memory::{MemCollection, MemCollectionError};
use serde::{Deserialize, Serialize};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCollection;

use crate::session::SessionId;

/// Field the expiry index is built on.
pub const MODIFIED_FIELD: &str = "modified";

/// One persisted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "_id")]
    pub id: SessionId,
    /// Encoded session values.
    pub data: String,
    /// Seconds since the epoch.
    pub modified: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexModel {
    pub field: Cow<'static, str>,
    pub expire_after: Option<Duration>,
    pub sparse: bool,
    pub unique: bool,
}

impl IndexModel {
    /// Sparse, unique index on `modified` that expires records `max_age`
    /// after their last modification.
    pub fn expiry(max_age: Duration) -> Self {
        Self {
            field: Cow::Borrowed(MODIFIED_FIELD),
            expire_after: Some(max_age),
            sparse: true,
            unique: true,
        }
    }
}

/// A collection of session documents keyed by id.
///
/// Implementations must be safe to share between concurrent requests.
/// Removal of expired documents is up to the implementation and does not have
/// to be immediate.
pub trait Collection: Send + Sync + 'static {
    type Error: StdError + Send + Sync + 'static;

    fn find_by_id(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Option<SessionRecord>, Self::Error>> + Send;

    /// Insert or fully replace the document with `record.id`.
    fn upsert_by_id(
        &self,
        record: SessionRecord,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns whether a document was removed.
    fn remove_by_id(&self, id: &SessionId)
    -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Creating an index that already exists with the same options is a no-op.
    fn create_indexes(
        &self,
        indexes: &[IndexModel],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid session id")]
    InvalidId,
    #[error("session record not found")]
    NotFound,
    #[error("session storage failed: {0}")]
    Storage(#[source] Box<dyn StdError + Send + Sync>),
}

impl RecordError {
    fn storage(error: impl StdError + Send + Sync + 'static) -> Self {
        RecordError::Storage(Box::new(error))
    }
}

/// Id-validating access to session records in a [`Collection`].
pub struct RecordStore<C> {
    collection: C,
}

impl<C: Collection> RecordStore<C> {
    pub fn new(collection: C) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub async fn create_expiry_index(&self, max_age: Duration) -> Result<(), RecordError> {
        self.collection
            .create_indexes(&[IndexModel::expiry(max_age)])
            .await
            .map_err(RecordError::storage)
    }

    pub async fn find(&self, id: &str) -> Result<SessionRecord, RecordError> {
        let id = parse_id(id)?;

        self.collection
            .find_by_id(&id)
            .await
            .map_err(RecordError::storage)?
            .ok_or(RecordError::NotFound)
    }

    pub async fn upsert(&self, record: SessionRecord) -> Result<(), RecordError> {
        self.collection
            .upsert_by_id(record)
            .await
            .map_err(RecordError::storage)
    }

    /// Removing an id that is not stored is not an error.
    pub async fn remove(&self, id: &str) -> Result<(), RecordError> {
        let id = parse_id(id)?;

        let removed = self
            .collection
            .remove_by_id(&id)
            .await
            .map_err(RecordError::storage)?;

        if !removed {
            tracing::debug!(%id, "session record already absent");
        }
        Ok(())
    }
}

fn parse_id(id: &str) -> Result<SessionId, RecordError> {
    SessionId::parse(id).map_err(|_| RecordError::InvalidId)
}
