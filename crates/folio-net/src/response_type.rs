//! Response tainting relative to the requesting origin.

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use url::{Origin, Url};

/// How a response relates to the origin that asked for it.
///
/// Only `Basic` responses are safe to store generically: `Cors` responses
/// carry an explicit grant for one origin and `Opaque` ones expose nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    /// Same-origin response.
    Basic,
    /// Cross-origin response the server allowed via CORS.
    Cors,
    /// Cross-origin response without a CORS grant.
    Opaque,
    /// Synthetic network error.
    Error,
}

impl ResponseType {
    /// Classify a response by the origin of the requester.
    ///
    /// `requester` is `None` for requests issued outside any document, which
    /// are treated as same-origin.
    pub fn classify(requester: Option<&Origin>, final_url: &Url, headers: &HeaderMap) -> Self {
        let Some(requester) = requester else {
            return Self::Basic;
        };

        if final_url.origin() == *requester {
            return Self::Basic;
        }

        let allowed = headers
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok())
            .map(str::trim);

        match allowed {
            Some("*") => Self::Cors,
            Some(value) if value == requester.ascii_serialization() => Self::Cors,
            _ => Self::Opaque,
        }
    }

    pub fn is_basic(&self) -> bool {
        *self == Self::Basic
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Cors => "cors",
            Self::Opaque => "opaque",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn origin(s: &str) -> Origin {
        Url::parse(s).unwrap().origin()
    }

    #[test]
    fn test_same_origin_is_basic() {
        let site = origin("https://example.com/");
        let url = Url::parse("https://example.com/assets/app.js").unwrap();
        assert_eq!(
            ResponseType::classify(Some(&site), &url, &HeaderMap::new()),
            ResponseType::Basic
        );
    }

    #[test]
    fn test_no_requester_is_basic() {
        let url = Url::parse("https://fonts.example.net/css").unwrap();
        assert_eq!(
            ResponseType::classify(None, &url, &HeaderMap::new()),
            ResponseType::Basic
        );
    }

    #[test]
    fn test_cross_origin_without_grant_is_opaque() {
        let site = origin("https://example.com/");
        let url = Url::parse("https://cdn.example.net/lib.js").unwrap();
        assert_eq!(
            ResponseType::classify(Some(&site), &url, &HeaderMap::new()),
            ResponseType::Opaque
        );
    }

    #[test]
    fn test_cross_origin_with_grant_is_cors() {
        let site = origin("https://example.com/");
        let url = Url::parse("https://fonts.example.net/css").unwrap();

        let mut wildcard = HeaderMap::new();
        wildcard.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        assert_eq!(
            ResponseType::classify(Some(&site), &url, &wildcard),
            ResponseType::Cors
        );

        let mut exact = HeaderMap::new();
        exact.insert(
            "access-control-allow-origin",
            HeaderValue::from_static("https://example.com"),
        );
        assert_eq!(
            ResponseType::classify(Some(&site), &url, &exact),
            ResponseType::Cors
        );
    }

    #[test]
    fn test_different_port_is_cross_origin() {
        let site = origin("http://127.0.0.1:8080/");
        let url = Url::parse("http://127.0.0.1:9090/").unwrap();
        assert!(!ResponseType::classify(Some(&site), &url, &HeaderMap::new()).is_basic());
    }
}
