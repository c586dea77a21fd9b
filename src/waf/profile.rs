//! Profile selection from request headers.

use axum::http::{HeaderMap, HeaderName};

use crate::waf::types::ProfileId;

/// Picks the profile governing a request from its selector header.
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    /// Lowercased, matching `HeaderName::as_str`.
    header: String,
    default_profile: ProfileId,
}

impl ProfileResolver {
    /// An empty `default_profile` falls back to `"default"`.
    pub fn new(header: &str, default_profile: &str) -> Self {
        Self {
            header: header.to_ascii_lowercase(),
            default_profile: ProfileId::new(default_profile).unwrap_or_default(),
        }
    }

    /// Profile named by the selector header; missing, empty or non-UTF-8
    /// values resolve to the default profile.
    pub fn resolve(&self, headers: &HeaderMap) -> ProfileId {
        headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(ProfileId::new)
            .unwrap_or_else(|| self.default_profile.clone())
    }

    /// Whether `name` is the selector header.
    pub fn is_selector(&self, name: &HeaderName) -> bool {
        name.as_str() == self.header
    }

    pub fn default_profile(&self) -> &ProfileId {
        &self.default_profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver() -> ProfileResolver {
        ProfileResolver::new("X-WAF-Profile", "default")
    }

    #[test]
    fn test_missing_and_empty_resolve_to_default() {
        let r = resolver();
        let missing = r.resolve(&HeaderMap::new());

        let mut headers = HeaderMap::new();
        headers.insert("x-waf-profile", HeaderValue::from_static(""));
        let empty = r.resolve(&headers);

        assert_eq!(missing, empty);
        assert_eq!(missing.as_str(), "default");
    }

    #[test]
    fn test_header_name_is_case_insensitive_value_is_not() {
        let r = resolver();
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"X-WAF-PROFILE").unwrap(),
            HeaderValue::from_static("Acme"),
        );
        assert_eq!(r.resolve(&headers).as_str(), "Acme");
    }

    #[test]
    fn test_non_utf8_value_resolves_to_default() {
        let r = resolver();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-waf-profile",
            HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
        );
        assert_eq!(r.resolve(&headers).as_str(), "default");
    }

    #[test]
    fn test_is_selector() {
        let r = resolver();
        assert!(r.is_selector(&HeaderName::from_static("x-waf-profile")));
        assert!(!r.is_selector(&HeaderName::from_static("x-waf-profiles")));
    }

    #[test]
    fn test_empty_default_falls_back() {
        let r = ProfileResolver::new("X-WAF-Profile", "");
        assert_eq!(r.default_profile().as_str(), "default");
    }
}
