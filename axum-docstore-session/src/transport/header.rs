use std::borrow::Cow;

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::{
    session::SessionOptions,
    transport::{TokenSink, TokenTransport, TransportError, is_clear},
};

static PREFIX_NONE: &str = "";

/// Carries the token in a plain header, for clients that do not keep cookies.
///
/// Without a fixed header the session name is used as the header name.
#[derive(Debug, Clone)]
pub struct HeaderTransport {
    header: Option<HeaderName>,
    prefix: Cow<'static, str>,
}

impl Default for HeaderTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderTransport {
    pub fn new() -> Self {
        Self {
            header: None,
            prefix: Cow::Borrowed(PREFIX_NONE),
        }
    }

    pub fn named(header: HeaderName) -> Self {
        Self {
            header: Some(header),
            prefix: Cow::Borrowed(PREFIX_NONE),
        }
    }

    /// Expected in front of the token, e.g. `"Bearer "`. Compared case-insensitively.
    pub fn prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn header_name(&self, name: &str) -> Result<HeaderName, TransportError> {
        match &self.header {
            Some(header) => Ok(header.clone()),
            None => HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(name.to_owned())),
        }
    }
}

fn token_from_header_value<'a>(header: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix_len = prefix.len();

    if header.len() < prefix_len || !header.is_char_boundary(prefix_len) {
        return None;
    }

    if !header[..prefix_len].eq_ignore_ascii_case(prefix) {
        return None;
    }

    Some(&header[prefix_len..])
}

impl TokenTransport for HeaderTransport {
    fn get_token(&self, headers: &HeaderMap, name: &str) -> Result<String, TransportError> {
        let header = self.header_name(name)?;

        let value = headers
            .get(&header)
            .ok_or_else(|| TransportError::Missing(name.to_owned()))?
            .to_str()
            .map_err(|_| TransportError::InvalidHeader(header.to_string()))?;

        let token = token_from_header_value(value, &self.prefix)
            .ok_or_else(|| TransportError::InvalidHeader(header.to_string()))?;

        if token.is_empty() {
            return Err(TransportError::Missing(name.to_owned()));
        }
        Ok(token.to_owned())
    }

    fn set_token(
        &self,
        sink: &mut TokenSink,
        name: &str,
        token: &str,
        options: &SessionOptions,
    ) -> Result<(), TransportError> {
        let header = self.header_name(name)?;

        let value = if is_clear(token, options) {
            HeaderValue::from_static("")
        } else {
            HeaderValue::try_from(format!("{}{token}", self.prefix))
                .map_err(|_| TransportError::InvalidHeader(header.to_string()))?
        };

        sink.headers.insert(header, value);
        Ok(())
    }
}
