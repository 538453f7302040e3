use cookie_monster::{Cookie, CookieBuilder, CookieJar};
use http::HeaderMap;

use crate::{
    session::SessionOptions,
    transport::{TokenSink, TokenTransport, TransportError, is_clear},
};

/// Carries the token in a cookie named after the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieTransport;

impl CookieTransport {
    fn cookie(name: &str, token: &str, options: &SessionOptions) -> CookieBuilder {
        let mut cookie = Cookie::named(name.to_owned())
            .value(token.to_owned())
            .path(options.path.clone())
            .same_site(options.same_site.clone());

        if let Some(domain) = &options.domain {
            cookie = cookie.domain(domain.clone());
        }
        if options.secure {
            cookie = cookie.secure();
        }
        if options.http_only {
            cookie = cookie.http_only();
        }
        if options.max_age > 0 {
            cookie = cookie.max_age_secs(options.max_age.unsigned_abs());
        }
        cookie
    }
}

impl TokenTransport for CookieTransport {
    fn get_token(&self, headers: &HeaderMap, name: &str) -> Result<String, TransportError> {
        let jar = CookieJar::from_headers(headers);
        let cookie = jar
            .get(name)
            .ok_or_else(|| TransportError::Missing(name.to_owned()))?;

        Ok(cookie.value().to_owned())
    }

    fn set_token(
        &self,
        sink: &mut TokenSink,
        name: &str,
        token: &str,
        options: &SessionOptions,
    ) -> Result<(), TransportError> {
        let cookie = Self::cookie(name, token, options);

        if is_clear(token, options) {
            sink.jar.remove(cookie);
        } else {
            sink.jar.add(cookie.build());
        }
        Ok(())
    }
}

#[cfg(test)]
mod cookie {
    use axum::http::{HeaderMap, HeaderValue, header::COOKIE, header::SET_COOKIE};

    use crate::{
        session::SessionOptions,
        transport::{CookieTransport, TokenSink, TokenTransport, TransportError},
    };

    fn set_cookie_headers(sink: TokenSink) -> Vec<String> {
        let response = sink.into_response(());
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_ascii_lowercase())
            .collect()
    }

    #[test]
    fn get() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("other=1; session=token-value"));

        let token = CookieTransport.get_token(&headers, "session").unwrap();
        assert_eq!(token, "token-value");

        let missing = CookieTransport.get_token(&headers, "absent");
        assert!(matches!(missing, Err(TransportError::Missing(_))));
    }

    #[test]
    fn set_applies_options() {
        let options = SessionOptions {
            domain: Some("example.com".into()),
            max_age: 60,
            ..SessionOptions::default()
        };

        let mut sink = TokenSink::new();
        CookieTransport
            .set_token(&mut sink, "session", "token-value", &options)
            .unwrap();

        let headers = set_cookie_headers(sink);
        assert_eq!(headers.len(), 1);

        let cookie = &headers[0];
        assert!(cookie.starts_with("session=token-value"));
        assert!(cookie.contains("path=/"));
        assert!(cookie.contains("domain=example.com"));
        assert!(cookie.contains("max-age=60"));
        assert!(cookie.contains("secure"));
        assert!(cookie.contains("httponly"));
    }

    #[test]
    fn clear() {
        let options = SessionOptions {
            max_age: -1,
            ..SessionOptions::default()
        };

        let mut sink = TokenSink::new();
        CookieTransport
            .set_token(&mut sink, "session", "", &options)
            .unwrap();

        let headers = set_cookie_headers(sink);
        assert_eq!(headers.len(), 1);
        assert!(headers[0].starts_with("session="));
        assert!(!headers[0].starts_with("session=token"));
        assert!(headers[0].contains("max-age=0") || headers[0].contains("1970"));
    }
}
