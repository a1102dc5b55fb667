//! Per-request auth headers.
//!
//! Both transports call [`AuthHeaders::current`] at the moment they build a
//! request or a `connection_init` payload. Nothing is cached between calls.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use super::credential::Credential;

// ============================================================================
// Constants
// ============================================================================

/// Role sent when no credential is set.
pub const DEFAULT_PUBLIC_ROLE: &str = "public";

/// Header carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Header carrying the fallback role.
pub const ROLE_HEADER: &str = "role";

/// Header name always present in the computed set.
pub const WEBSOCKET_PROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

/// Value of [`WEBSOCKET_PROTOCOL_HEADER`].
pub const WEBSOCKET_PROTOCOL_VALUE: &str = "graphql-ws";

// ============================================================================
// AuthHeaders
// ============================================================================

/// Computes transport headers from static configuration and the credential.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    static_headers: BTreeMap<String, String>,
    public_role: String,
    credential: Credential,
}

impl AuthHeaders {
    /// Creates a header source.
    #[must_use]
    pub fn new(
        static_headers: BTreeMap<String, String>,
        public_role: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            static_headers,
            public_role: public_role.into(),
            credential,
        }
    }

    /// Returns the shared credential.
    #[inline]
    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Returns the fallback role.
    #[inline]
    #[must_use]
    pub fn public_role(&self) -> &str {
        &self.public_role
    }

    /// Computes the headers for a request made right now.
    #[inline]
    #[must_use]
    pub fn current(&self) -> BTreeMap<String, String> {
        self.current_with_generation().0
    }

    /// Computes the headers and returns the credential generation they used.
    #[must_use]
    pub fn current_with_generation(&self) -> (BTreeMap<String, String>, u64) {
        let (token, generation) = self.credential.snapshot();

        let mut headers = self.static_headers.clone();
        headers.insert(
            WEBSOCKET_PROTOCOL_HEADER.to_string(),
            WEBSOCKET_PROTOCOL_VALUE.to_string(),
        );

        match token {
            Some(token) => {
                headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"));
            }
            None => {
                headers.insert(ROLE_HEADER.to_string(), self.public_role.clone());
            }
        }

        (headers, generation)
    }
}

// ============================================================================
// Tests
// ============================================================================
