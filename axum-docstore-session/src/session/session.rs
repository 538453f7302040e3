use std::ops::{Deref, DerefMut};

use cookie_monster::SameSite;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::session::SessionId;

/// Value key that overrides the record's modification time.
pub const MODIFIED_KEY: &str = "modified";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    /// Seconds. Zero leaves the cookie a browser-session cookie, negative
    /// deletes the session on the next save.
    pub max_age: i64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: "/".into(),
            domain: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Strict,
            max_age: 0,
        }
    }
}

/// The values stored in a session. Opaque to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionValues(Map<String, Value>);

impl SessionValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the key is absent or holds a different type.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<Option<Value>, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.0.insert(key.into(), value))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub(crate) fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for SessionValues {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// A named session for one request.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Session {
    name: String,
    id: Option<SessionId>,
    is_new: bool,
    pub values: SessionValues,
    pub options: SessionOptions,
}

impl Deref for Session {
    type Target = SessionValues;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}

impl Session {
    pub fn new(name: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            name: name.into(),
            id: None,
            is_new: true,
            values: SessionValues::new(),
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Empty until the session is first saved.
    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    /// True unless the session was loaded from a stored record.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Deletes the session and its token on the next save.
    pub fn expire(&mut self) {
        self.options.max_age = -1;
    }

    pub(crate) fn loaded(&mut self, id: SessionId, values: SessionValues) {
        self.id = Some(id);
        self.values = values;
        self.is_new = false;
    }

    /// Assigns `id` unless the session already has one.
    pub(crate) fn id_or_insert(&mut self, id: impl FnOnce() -> SessionId) -> SessionId {
        *self.id.get_or_insert_with(id)
    }
}

#[cfg(test)]
mod session {
    use serde_json::json;

    use crate::session::{Session, SessionId, SessionOptions};

    #[test]
    fn values() {
        let mut session = Session::new("session", SessionOptions::default());

        session.insert("user", "alice").unwrap();
        session.insert("visits", 3).unwrap();

        assert_eq!(session.get::<String>("user").as_deref(), Some("alice"));
        assert_eq!(session.get::<u32>("visits"), Some(3));
        assert_eq!(session.get::<u32>("user"), None);
        assert_eq!(session.get_value("visits"), Some(&json!(3)));

        assert_eq!(session.remove("visits"), Some(json!(3)));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn id_is_assigned_once() {
        let mut session = Session::new("session", SessionOptions::default());
        assert!(session.id().is_none());
        assert!(session.is_new());

        let first = session.id_or_insert(SessionId::new);
        let second = session.id_or_insert(SessionId::new);

        assert_eq!(first, second);
        assert_eq!(session.id(), Some(&first));
    }

    #[test]
    fn expire() {
        let mut session = Session::new("session", SessionOptions::default());
        session.expire();
        assert!(session.options.max_age < 0);
    }
}
