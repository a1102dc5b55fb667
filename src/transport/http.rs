//! Request/response transport.
//!
//! Queries and mutations are sent as a JSON `POST` to the GraphQL endpoint.
//! Headers are computed for every request; this layer never retries.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Request};
use tracing::{debug, trace};
use url::Url;

use crate::auth::AuthHeaders;
use crate::error::{Error, Result};
use crate::protocol::{GraphQLResponse, Operation};

// ============================================================================
// Constants
// ============================================================================

/// TCP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest body excerpt kept in [`Error::HttpStatus`].
const ERROR_BODY_SNIPPET_LEN: usize = 220;

// ============================================================================
// HttpTransport
// ============================================================================

/// Stateless HTTP transport.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    endpoint: Url,
    headers: AuthHeaders,
}

impl HttpTransport {
    /// Creates a transport posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(endpoint: Url, headers: AuthHeaders) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            headers,
        })
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Builds the HTTP request for `operation` with headers computed now.
    ///
    /// Context headers of the operation come first; auth headers override
    /// them.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHeader`] if a header name or value is not valid
    /// - [`Error::Http`] if the request cannot be built
    pub fn build_request(&self, operation: &Operation) -> Result<Request> {
        let mut headers = HeaderMap::new();
        let context = operation
            .context_headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()));
        let current = self.headers.current();
        let auth = current.iter().map(|(name, value)| (name.as_str(), value.as_str()));

        for (name, value) in context.chain(auth) {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::invalid_header(name))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| Error::invalid_header(name))?;
            headers.insert(header_name, header_value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = self
            .http
            .post(self.endpoint.clone())
            .headers(headers)
            .json(operation)
            .build()?;

        Ok(request)
    }

    /// Sends `operation` and parses the GraphQL response.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] on transport failure
    /// - [`Error::HttpStatus`] on non-success status
    /// - [`Error::Json`] if the body is not a GraphQL response
    pub async fn execute(&self, operation: &Operation) -> Result<GraphQLResponse> {
        let request = self.build_request(operation)?;
        trace!(operation = operation.label(), "Sending HTTP operation");

        let response = self.http.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(operation = operation.label(), %status, "GraphQL endpoint returned error status");
            return Err(Error::HttpStatus {
                status,
                body: summarize_error_body(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_BODY_SNIPPET_LEN {
        return trimmed.to_string();
    }
    let snippet: String = trimmed.chars().take(ERROR_BODY_SNIPPET_LEN).collect();
    format!("{snippet}...")
}

// ============================================================================
// Tests
// ============================================================================
