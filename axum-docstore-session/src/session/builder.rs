use std::{sync::Arc, time::Duration};

use cookie_monster::SameSite;

use crate::{
    codec::{DEFAULT_MAX_TOKEN_LENGTH, KeyPair, KeyRing},
    config::SessionConfig,
    session::{SessionError, SessionOptions, SessionStore, SessionStoreInner},
    store::{Collection, RecordStore},
    transport::{CookieTransport, TokenTransport},
    utils::{Clock, SystemClock, get_env},
};

/// 30 days
const DEFAULT_MAX_AGE: i64 = 30 * 24 * 60 * 60;

pub struct SessionStoreBuilder<C> {
    collection: C,
    key_pairs: Vec<KeyPair>,
    max_age: i64,
    ensure_ttl: bool,
    options: OptionsBuilder,
    transport: Box<dyn TokenTransport>,
    clock: Arc<dyn Clock>,
    max_token_length: usize,
    error: Option<String>,
}

pub(crate) struct OptionsBuilder {
    pub(crate) dev: bool,
    pub(crate) dev_options: SessionOptions,
    pub(crate) options: SessionOptions,
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Self {
            dev: false,
            // Make sure to use "/" as path so all paths can see the cookie in dev mode.
            dev_options: SessionOptions {
                path: "/".into(),
                domain: None,
                secure: false,
                http_only: false,
                same_site: SameSite::Lax,
                max_age: 0,
            },
            options: SessionOptions::default(),
        }
    }

    pub fn build(self) -> SessionOptions {
        if self.dev {
            self.dev_options
        } else {
            self.options
        }
    }
}

impl SessionStoreBuilder<()> {
    pub fn new() -> SessionStoreBuilder<()> {
        Self {
            collection: (),
            key_pairs: Vec::new(),
            max_age: DEFAULT_MAX_AGE,
            ensure_ttl: false,
            options: OptionsBuilder::new(),
            transport: Box::new(CookieTransport),
            clock: Arc::new(SystemClock),
            max_token_length: DEFAULT_MAX_TOKEN_LENGTH,
            error: None,
        }
    }
}

impl Default for SessionStoreBuilder<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SessionStoreBuilder<C> {
    /// Appends a key pair. The first pair signs new tokens, later pairs are
    /// only used to read tokens signed before a rotation.
    pub fn key_pair(mut self, pair: KeyPair) -> Self {
        self.key_pairs.push(pair);
        self
    }

    pub fn key_pairs(mut self, pairs: impl IntoIterator<Item = KeyPair>) -> Self {
        self.key_pairs.extend(pairs);
        self
    }

    /// Reads a key pair from environment variables, using their raw bytes.
    pub fn key_pair_env(mut self, hash_key: &str, block_key: Option<&str>) -> Self {
        let pair = get_env(hash_key).and_then(|hash_key| match block_key {
            Some(name) => get_env(name).map(|block_key| KeyPair::encrypted(hash_key, block_key)),
            None => Ok(KeyPair::new(hash_key)),
        });

        match pair {
            Ok(pair) => self.key_pairs.push(pair),
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Seconds. Applies to new sessions, token validity and the expiry index.
    pub fn max_age(mut self, max_age: i64) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn max_age_duration(self, max_age: Duration) -> Self {
        self.max_age(i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX))
    }

    /// Ask the collection to drop records `max_age` after their last save.
    pub fn ensure_ttl(mut self, ensure_ttl: bool) -> Self {
        self.ensure_ttl = ensure_ttl;
        self
    }

    pub fn options(mut self, f: impl FnOnce(SessionOptions) -> SessionOptions) -> Self {
        self.options.options = f(self.options.options);
        self
    }

    pub fn dev_options(mut self, f: impl FnOnce(SessionOptions) -> SessionOptions) -> Self {
        self.options.dev_options = f(self.options.dev_options);
        self
    }

    pub fn use_dev_options(mut self, dev: bool) -> Self {
        self.options.dev = dev;
        self
    }

    pub fn use_normal_options(self, prod: bool) -> Self {
        self.use_dev_options(!prod)
    }

    pub fn transport(mut self, transport: impl TokenTransport) -> Self {
        self.transport = Box::new(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 0 disables the limit.
    pub fn max_token_length(mut self, max_token_length: usize) -> Self {
        self.max_token_length = max_token_length;
        self
    }

    pub fn config(self, config: &SessionConfig) -> Self {
        let this = self.max_age(config.max_age).ensure_ttl(config.ensure_ttl);

        match config.key_pairs() {
            Ok(pairs) => this.key_pairs(pairs),
            Err(e) => SessionStoreBuilder {
                error: Some(e.to_string()),
                ..this
            },
        }
    }

    pub fn collection<C1>(self, collection: C1) -> SessionStoreBuilder<C1> {
        SessionStoreBuilder {
            collection,
            key_pairs: self.key_pairs,
            max_age: self.max_age,
            ensure_ttl: self.ensure_ttl,
            options: self.options,
            transport: self.transport,
            clock: self.clock,
            max_token_length: self.max_token_length,
            error: self.error,
        }
    }
}

impl<C: Collection> SessionStoreBuilder<C> {
    /// Creates the expiry index when asked to. The store is not usable if that
    /// fails.
    pub async fn build(self) -> Result<SessionStore<C>, SessionError> {
        if let Some(error) = self.error {
            return Err(SessionError::Configuration(error.into()));
        }

        let key_pairs = if self.key_pairs.is_empty() {
            tracing::warn!("no session keys configured, tokens will not survive a restart");
            vec![KeyPair::generate()]
        } else {
            self.key_pairs
        };

        let keys = KeyRing::new(key_pairs, self.max_age)
            .map_err(|e| SessionError::Configuration(e.into()))?
            .with_clock(self.clock.clone())
            .with_max_length(self.max_token_length);

        let records = RecordStore::new(self.collection);

        if self.ensure_ttl {
            if self.max_age <= 0 {
                return Err(SessionError::Configuration(
                    "an expiry index needs a positive max age".into(),
                ));
            }

            let expire_after = Duration::from_secs(self.max_age.unsigned_abs());
            records
                .create_expiry_index(expire_after)
                .await
                .map_err(|e| SessionError::Configuration(e.into()))?;

            tracing::debug!(?expire_after, "session expiry index ensured");
        }

        Ok(SessionStore(Arc::new(SessionStoreInner {
            records,
            keys,
            transport: self.transport,
            options: self.options.build(),
            clock: self.clock,
        })))
    }
}

#[cfg(test)]
mod session_builder {
    use cookie_monster::SameSite;

    use crate::{
        codec::KeyPair,
        session::{SessionError, SessionOptions, SessionStore},
        store::MemCollection,
    };

    #[tokio::test]
    async fn defaults() {
        let store = SessionStore::builder()
            .collection(MemCollection::new())
            .build()
            .await
            .unwrap();

        let options = store.options();
        assert_eq!(options.path, "/");
        assert!(options.secure);
        assert!(options.http_only);
        assert_eq!(options.max_age, 30 * 24 * 60 * 60);
        assert_eq!(store.keys().len(), 1);
    }

    #[tokio::test]
    async fn dev_options() {
        let store = SessionStore::builder()
            .key_pair(KeyPair::new("hash"))
            .options(|o| o)
            .dev_options(|o| SessionOptions {
                domain: Some("localhost".into()),
                ..o
            })
            .use_dev_options(true)
            .max_age(60)
            .collection(MemCollection::new())
            .build()
            .await
            .unwrap();

        let options = store.options();
        assert!(!options.secure);
        assert!(matches!(options.same_site, SameSite::Lax));
        assert_eq!(options.domain.as_deref(), Some("localhost"));
        assert_eq!(options.max_age, 60);
    }

    #[tokio::test]
    async fn ttl_needs_max_age() {
        let result = SessionStore::builder()
            .max_age(0)
            .ensure_ttl(true)
            .collection(MemCollection::new())
            .build()
            .await;

        assert!(matches!(result, Err(SessionError::Configuration(_))));
    }

    #[tokio::test]
    async fn index_failure_is_fatal() {
        let collection = MemCollection::new();

        SessionStore::builder()
            .max_age(60)
            .ensure_ttl(true)
            .collection(collection.clone())
            .build()
            .await
            .unwrap();

        let result = SessionStore::builder()
            .max_age(120)
            .ensure_ttl(true)
            .collection(collection)
            .build()
            .await;

        assert!(matches!(result, Err(SessionError::Configuration(_))));
    }

    #[tokio::test]
    async fn bad_keys() {
        let result = SessionStore::builder()
            .key_pair(KeyPair::encrypted("hash", "too short"))
            .collection(MemCollection::new())
            .build()
            .await;
        assert!(matches!(result, Err(SessionError::Configuration(_))));

        let result = SessionStore::builder()
            .key_pair_env("AXUM_DOCSTORE_SESSION_TEST_UNSET_KEY", None)
            .collection(MemCollection::new())
            .build()
            .await;
        assert!(matches!(result, Err(SessionError::Configuration(_))));
    }
}
