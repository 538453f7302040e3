mod cookie;
mod header;

pub use cookie::CookieTransport;
pub use header::HeaderTransport;

use axum::response::{IntoResponse, Response};
use cookie_monster::CookieJar;
use http::HeaderMap;

use crate::session::SessionOptions;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no token named `{0}` in request")]
    Missing(String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

/// Moves tokens between requests, responses and the session store.
///
/// Writing an empty token with a non-positive max-age asks the client to
/// forget the token.
pub trait TokenTransport: Send + Sync + 'static {
    fn get_token(&self, headers: &HeaderMap, name: &str) -> Result<String, TransportError>;

    fn set_token(
        &self,
        sink: &mut TokenSink,
        name: &str,
        token: &str,
        options: &SessionOptions,
    ) -> Result<(), TransportError>;
}

/// Outbound tokens for one response.
pub struct TokenSink {
    pub(crate) jar: CookieJar,
    pub(crate) headers: HeaderMap,
}

impl Default for TokenSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSink {
    pub fn new() -> Self {
        Self {
            jar: CookieJar::empty(),
            headers: HeaderMap::new(),
        }
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.jar
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Attaches the collected cookies and headers to `response`.
    pub fn into_response(self, response: impl IntoResponse) -> Response {
        (self.jar, self.headers, response).into_response()
    }
}

pub(crate) fn is_clear(token: &str, options: &SessionOptions) -> bool {
    token.is_empty() && options.max_age <= 0
}
