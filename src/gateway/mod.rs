//! Collaborator gateways.
//!
//! The ledger core depends on an authenticated identity but not on how it
//! is produced — session cookies, magic-link logins, and token verification
//! live upstream. `AuthGateway` is that seam: it resolves the request's
//! bearer credential to a user id, or to nothing, in which case the API
//! answers `AuthRequired` before any transaction begins.

use async_trait::async_trait;

/// Resolves the caller's identity from the request credential.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// `None` when the credential is missing or does not resolve to a user.
    async fn resolve_current_user(&self, bearer: Option<String>) -> Option<String>;
}

/// Gateway that trusts the bearer token as an opaque user id already
/// verified by the upstream identity provider (the deployment fronting
/// this service terminates the real session).
#[derive(Debug, Default, Clone)]
pub struct OpaqueTokenGateway;

#[async_trait]
impl AuthGateway for OpaqueTokenGateway {
    async fn resolve_current_user(&self, bearer: Option<String>) -> Option<String> {
        let token = bearer?;
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        Some(token.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
