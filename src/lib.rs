//! GraphQL link - Authenticated GraphQL client transport.
//!
//! This library sends GraphQL operations over HTTP or a persistent
//! `graphql-transport-ws` connection, attaching the caller's access token to
//! every request and reconnect.
//!
//! # Architecture
//!
//! ```text
//! Client ──▶ Pipeline [error ▶ custom... ▶ split] ──┬──▶ HttpTransport
//!                                                  └──▶ StreamingConnection
//!                                                            ▲
//! AuthInterpreter ──▶ AuthBridge ──▶ Credential ─────────────┘ (read per request)
//! ```
//!
//! Key design principles:
//!
//! - Auth headers are computed when a request or `connection_init` is sent
//! - Subscriptions use the streaming connection, everything else uses HTTP
//! - The streaming connection is lazy and reconnects with exponential backoff
//! - A token change restarts an open streaming connection exactly once
//!
//! # Quick Start
//!
//! ```ignore
//! use graphql_link::{Client, Operation, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .graphql_url("https://api.example.com/v1/graphql")
//!         .build()?;
//!
//!     let apps = client
//!         .query(Operation::parse("query Apps { apps { id name } }")?)
//!         .await?;
//!     println!("{:?}", apps.data);
//!
//!     let mut ticks = client
//!         .subscribe(Operation::parse("subscription { apps { id } }")?)
//!         .await?;
//!     while let Some(tick) = ticks.recv().await {
//!         println!("{:?}", tick?.data);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`auth`] | Credential, header computation and the auth state bridge |
//! | [`cache`] | Query result cache and fetch policies |
//! | [`client`] | [`Client`] facade and [`ClientBuilder`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`link`] | Stage pipeline and transport split |
//! | [`protocol`] | Documents, operations and wire messages |
//! | [`transport`] | HTTP and streaming transports |

// ============================================================================
// Modules
// ============================================================================

/// Credential, auth headers and the auth state bridge.
pub mod auth;

/// Query result cache.
pub mod cache;

/// Client facade and configuration.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Link pipeline.
pub mod link;

/// GraphQL documents, operations and `graphql-transport-ws` messages.
pub mod protocol;

/// HTTP and streaming transports.
pub mod transport;

#[cfg(test)]
mod test_support;

// ============================================================================
// Re-exports
// ============================================================================

// Auth types
pub use auth::{
    AuthBridge, AuthEvent, AuthInterpreter, AuthState, AuthTransition, BridgeOutcome,
    ChannelInterpreter, Credential,
};

// Cache types
pub use cache::{Cache, CacheKey, FetchPolicy, InMemoryCache};

// Client types
pub use client::{Client, ClientBuilder};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::OperationId;

// Link types
pub use link::{ErrorContext, Execution, FnStage, Stage};

// Protocol types
pub use protocol::{Document, GraphQLError, GraphQLResponse, Operation, OperationKind};

// Transport types
pub use transport::{Backoff, RetryOptions, StreamingConnection, Subscription};
