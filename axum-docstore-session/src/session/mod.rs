mod builder;
mod extract;
mod id;
mod registry;
#[allow(clippy::module_inception)]
mod session;

use std::{error::Error as StdError, sync::Arc};

pub use builder::SessionStoreBuilder;
use http::{HeaderMap, request::Parts};
pub use id::{InvalidSessionId, SessionId};
pub use session::{MODIFIED_KEY, Session, SessionOptions, SessionValues};
use serde_json::{Map, Value};

use crate::{
    codec::{CodecError, KeyRing},
    session::registry::SessionRegistry,
    store::{Collection, RecordError, RecordStore, SessionRecord},
    transport::{TokenSink, TokenTransport, TransportError},
    utils::Clock,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session id")]
    InvalidIdentifier,
    #[error("session value `modified` must be a unix timestamp in seconds")]
    InvalidModified,
    #[error(transparent)]
    Token(#[from] CodecError),
    #[error("session record not found")]
    NotFound,
    #[error("session storage failed: {0}")]
    Storage(#[source] Box<dyn StdError + Send + Sync>),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("session store misconfigured: {0}")]
    Configuration(#[source] Box<dyn StdError + Send + Sync>),
}

impl From<RecordError> for SessionError {
    fn from(value: RecordError) -> Self {
        match value {
            RecordError::InvalidId => SessionError::InvalidIdentifier,
            RecordError::NotFound => SessionError::NotFound,
            RecordError::Storage(e) => SessionError::Storage(e),
        }
    }
}

/// Loads and saves sessions whose values live in a [`Collection`] and whose
/// ids travel to the client as signed tokens.
///
/// Cloning is cheap, every clone shares the same store.
///
/// [`Collection`]: crate::store::Collection
pub struct SessionStore<C>(Arc<SessionStoreInner<C>>);

struct SessionStoreInner<C> {
    records: RecordStore<C>,
    keys: KeyRing,
    transport: Box<dyn TokenTransport>,
    // `max_age` is ignored here, the key ring holds the current value
    options: SessionOptions,
    clock: Arc<dyn Clock>,
}

impl SessionStore<()> {
    pub fn builder() -> SessionStoreBuilder<()> {
        SessionStoreBuilder::new()
    }
}

impl<C> SessionStore<C> {
    /// Options new sessions start out with.
    pub fn options(&self) -> SessionOptions {
        SessionOptions {
            max_age: self.0.keys.max_age(),
            ..self.0.options.clone()
        }
    }

    pub fn max_age(&self) -> i64 {
        self.0.keys.max_age()
    }

    /// Sets the default max-age of new sessions and the age after which
    /// tokens stop decoding, in one step.
    ///
    /// Individual sessions are deleted by setting their own max-age below zero.
    pub fn set_max_age(&self, max_age: i64) {
        self.0.keys.set_max_age(max_age);
    }

    pub fn records(&self) -> &RecordStore<C> {
        &self.0.records
    }

    pub fn keys(&self) -> &KeyRing {
        &self.0.keys
    }
}

impl<C: Collection> SessionStore<C> {
    /// Returns the session registered under `name` for this request, loading
    /// it first if this is the first time it is asked for.
    pub async fn get<'a>(
        &self,
        parts: &'a mut Parts,
        name: &str,
    ) -> Result<&'a mut Session, SessionError> {
        let registered = SessionRegistry::of(&parts.extensions).is_some_and(|r| r.contains(name));

        let loaded = if registered {
            None
        } else {
            Some(self.new_session(&parts.headers, name).await?)
        };

        let registry = SessionRegistry::of_mut(&mut parts.extensions);
        Ok(registry.register(name, || {
            loaded.unwrap_or_else(|| Session::new(name, self.options()))
        }))
    }

    /// Loads the session `name` without registering it.
    ///
    /// A missing, forged or expired token, or a record that no longer exists,
    /// gives a new empty session rather than an error. Only a token that
    /// verifies but does not hold an id is reported.
    pub async fn new_session(&self, headers: &HeaderMap, name: &str) -> Result<Session, SessionError> {
        let mut session = Session::new(name, self.options());

        let token = match self.0.transport.get_token(headers, name) {
            Ok(token) => token,
            Err(error) => {
                tracing::debug!(name, %error, "no session token");
                return Ok(session);
            }
        };

        let id: String = match self.0.keys.decode(name, &token) {
            Ok(id) => id,
            Err(error @ CodecError::Deserialize(_)) => return Err(error.into()),
            Err(error) => {
                tracing::debug!(name, %error, "discarding session token");
                return Ok(session);
            }
        };

        match self.load(name, &id).await {
            Ok((id, values)) => session.loaded(id, values),
            Err(error @ SessionError::Storage(_)) => {
                tracing::warn!(name, %id, %error, "could not load session, starting a new one");
            }
            Err(error) => {
                tracing::debug!(name, %id, %error, "could not load session, starting a new one");
            }
        }

        Ok(session)
    }

    /// Persists `session` and writes its token into `sink`.
    ///
    /// A session with a negative max-age is deleted instead and its token
    /// cleared. Deleting a session that was never saved fails with
    /// [`SessionError::InvalidIdentifier`].
    pub async fn save(&self, sink: &mut TokenSink, session: &mut Session) -> Result<(), SessionError> {
        if session.options.max_age < 0 {
            let id = session.id().ok_or(SessionError::InvalidIdentifier)?;
            self.0.records.remove(&id.to_hex()).await?;
            self.0
                .transport
                .set_token(sink, session.name(), "", &session.options)?;
            return Ok(());
        }

        let id = session.id_or_insert(SessionId::new);

        self.upsert(id, session).await?;

        let token = self.0.keys.encode(session.name(), &id.to_hex())?;
        self.0
            .transport
            .set_token(sink, session.name(), &token, &session.options)?;

        Ok(())
    }

    /// Saves every session registered for this request.
    pub async fn save_all(&self, parts: &mut Parts, sink: &mut TokenSink) -> Result<(), SessionError> {
        let Some(registry) = parts.extensions.get_mut::<SessionRegistry>() else {
            return Ok(());
        };

        for session in registry.sessions_mut() {
            self.save(sink, session).await?;
        }
        Ok(())
    }

    async fn load(&self, name: &str, id: &str) -> Result<(SessionId, SessionValues), SessionError> {
        let record = self.0.records.find(id).await?;
        let values: Map<String, Value> = self.0.keys.decode_unbounded(name, &record.data)?;

        Ok((record.id, values.into()))
    }

    async fn upsert(&self, id: SessionId, session: &Session) -> Result<(), SessionError> {
        let modified = match session.values.get_value(MODIFIED_KEY) {
            Some(modified) => modified.as_u64().ok_or(SessionError::InvalidModified)?,
            None => self.0.clock.now_secs(),
        };

        let data = self
            .0
            .keys
            .encode_unbounded(session.name(), session.values.as_map())?;

        self.0
            .records
            .upsert(SessionRecord { id, data, modified })
            .await?;

        Ok(())
    }
}

impl<C> Clone for SessionStore<C> {
    fn clone(&self) -> Self {
        SessionStore(self.0.clone())
    }
}
