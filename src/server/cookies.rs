use axum::http::{HeaderMap, header};
use cookie::Cookie;
use std::collections::HashMap;

/// Cookies sent by the client, parsed from the `Cookie` header.
///
/// Parsing is fail-open: a missing header, a header that is not valid UTF-8,
/// or individual malformed pairs all degrade to the cookie being absent
/// rather than the request being rejected.
#[derive(Debug, Default)]
pub struct CookieJar(HashMap<String, String>);

impl CookieJar {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let raw = headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        Self::parse(raw)
    }

    pub fn parse(raw: &str) -> Self {
        let mut cookies = HashMap::new();
        for cookie in Cookie::split_parse(raw.to_owned()).flatten() {
            cookies.insert(cookie.name().to_owned(), cookie.value().to_owned());
        }
        Self(cookies)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}
