//! Error types for the GraphQL link.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use graphql_link::{Client, Operation, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let operation = Operation::parse("query { projects { id } }")?;
//!     let response = client.query(operation).await?;
//!     println!("{:?}", response.data);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Document | [`Error::InvalidDocument`], [`Error::InvalidOperation`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::RetriesExhausted`] |
//! | Protocol | [`Error::Protocol`], [`Error::HttpStatus`], [`Error::GraphQL`], [`Error::InvalidHeader`] |
//! | Cache | [`Error::CacheMiss`], [`Error::Cache`] |
//! | External | [`Error::Http`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use reqwest::StatusCode;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::GraphQLError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by [`ClientBuilder::build`](crate::ClientBuilder::build) when
    /// the client cannot be constructed. Never retried.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Document Errors
    // ========================================================================
    /// The GraphQL document could not be classified.
    #[error("Invalid document: {message}")]
    InvalidDocument {
        /// Description of the problem.
        message: String,
    },

    /// The operation was sent through the wrong entry point.
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Streaming connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The streaming connection worker is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The retry policy gave up reconnecting.
    ///
    /// Delivered to every subscription that was active at the time.
    #[error("Connection retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of failed attempts.
        attempts: u32,
        /// The error of the final attempt.
        last_error: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Unexpected `graphql-transport-ws` message or handshake failure.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Non-success HTTP status from the GraphQL endpoint.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Response status code.
        status: StatusCode,
        /// Truncated response body.
        body: String,
    },

    /// The server rejected a streamed operation.
    #[error("GraphQL error: {}", summarize(.errors))]
    GraphQL {
        /// Errors reported by the server.
        errors: Vec<GraphQLError>,
    },

    /// A configured or per-operation header is not a valid HTTP header.
    #[error("Invalid header: {name}")]
    InvalidHeader {
        /// Offending header name.
        name: String,
    },

    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// `cache-only` query with no cached result.
    #[error("No cached result for operation {operation}")]
    CacheMiss {
        /// Operation name or `<anonymous>`.
        operation: String,
    },

    /// Cache backend failure.
    #[error("Cache error: {message}")]
    Cache {
        /// Description of the cache failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Endpoint URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

fn summarize(errors: &[GraphQLError]) -> String {
    if errors.is_empty() {
        return "unknown error".to_string();
    }
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid document error.
    #[inline]
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    #[inline]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a retries exhausted error.
    #[inline]
    pub fn retries_exhausted(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::RetriesExhausted {
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a GraphQL error from server-reported errors.
    #[inline]
    pub fn graphql(errors: Vec<GraphQLError>) -> Self {
        Self::GraphQL { errors }
    }

    /// Creates an invalid header error.
    #[inline]
    pub fn invalid_header(name: impl Into<String>) -> Self {
        Self::InvalidHeader { name: name.into() }
    }

    /// Creates a cache miss error.
    #[inline]
    pub fn cache_miss(operation: impl Into<String>) -> Self {
        Self::CacheMiss {
            operation: operation.into(),
        }
    }

    /// Creates a cache error.
    #[inline]
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::RetriesExhausted { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry. Configuration and document
    /// errors are programmer errors and never are.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_) => true,
            Self::HttpStatus { status, .. } => status.is_server_error(),
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
