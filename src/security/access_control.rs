//! Caller authorization.
//!
//! Identity is issued elsewhere; this module only turns a presented bearer
//! key into two booleans: may the caller use the gateway, and is it an admin.

use std::collections::HashSet;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use crate::config::AuthConfig;

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallerAccess {
    pub may_invoke: bool,
    pub is_admin: bool,
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, headers: &HeaderMap) -> CallerAccess;
}

/// Static key lists from config.
pub struct ApiKeyAuthorizer {
    admin_key: String,
    caller_keys: HashSet<String>,
}

impl ApiKeyAuthorizer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            admin_key: config.admin_key.clone(),
            caller_keys: config.caller_keys.iter().cloned().collect(),
        }
    }

    fn check(&self, presented: Option<&str>) -> CallerAccess {
        let is_admin = presented.is_some_and(|key| !self.admin_key.is_empty() && key == self.admin_key);
        // An empty caller list leaves the gateway open.
        let may_invoke = is_admin
            || self.caller_keys.is_empty()
            || presented.is_some_and(|key| self.caller_keys.contains(key));
        CallerAccess { may_invoke, is_admin }
    }
}

#[async_trait]
impl Authorizer for ApiKeyAuthorizer {
    async fn authorize(&self, headers: &HeaderMap) -> CallerAccess {
        self.check(bearer_token(headers))
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        headers
    }

    fn authorizer(callers: &[&str]) -> ApiKeyAuthorizer {
        ApiKeyAuthorizer::new(&AuthConfig {
            admin_key: "admin-secret".to_string(),
            caller_keys: callers.iter().map(|k| k.to_string()).collect(),
        })
    }

    #[tokio::test]
    async fn test_open_gateway_without_caller_keys() {
        let auth = authorizer(&[]);
        let access = auth.authorize(&HeaderMap::new()).await;
        assert!(access.may_invoke);
        assert!(!access.is_admin);
    }

    #[tokio::test]
    async fn test_caller_keys_are_enforced() {
        let auth = authorizer(&["leader-1"]);
        assert!(!auth.authorize(&HeaderMap::new()).await.may_invoke);
        assert!(!auth.authorize(&headers("Bearer nope")).await.may_invoke);
        assert!(auth.authorize(&headers("Bearer leader-1")).await.may_invoke);
    }

    #[tokio::test]
    async fn test_admin_key_grants_both() {
        let auth = authorizer(&["leader-1"]);
        let access = auth.authorize(&headers("Bearer admin-secret")).await;
        assert_eq!(access, CallerAccess { may_invoke: true, is_admin: true });
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
    }
}
