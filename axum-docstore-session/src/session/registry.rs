use std::collections::HashMap;

use http::Extensions;

use crate::session::Session;

/// Sessions already handed out for the current request, by name.
///
/// Lives in the request extensions, so it never outlives the request.
#[derive(Clone, Default)]
pub(crate) struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn of(extensions: &Extensions) -> Option<&Self> {
        extensions.get::<Self>()
    }

    pub fn of_mut(extensions: &mut Extensions) -> &mut Self {
        extensions.get_or_insert_default::<Self>()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Returns the registered session, registering `session` if there is none.
    pub fn register(&mut self, name: &str, session: impl FnOnce() -> Session) -> &mut Session {
        self.sessions.entry(name.to_owned()).or_insert_with(session)
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }
}
