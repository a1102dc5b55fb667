//! GraphQL client module.
//!
//! This module provides the main entry point of the crate.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Query, mutate and subscribe over the link pipeline |
//! | [`ClientBuilder`] | Fluent configuration builder |
//!
//! # Example
//!
//! ```ignore
//! use graphql_link::{ChannelInterpreter, Client, Operation};
//!
//! let auth = ChannelInterpreter::default();
//! let client = Client::builder()
//!     .graphql_url("https://api.example.com/v1/graphql")
//!     .interpreter(auth.clone())
//!     .build()?;
//!
//! auth.sign_in(access_token);
//! let me = client.query(Operation::parse("query { me { id } }")?).await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
