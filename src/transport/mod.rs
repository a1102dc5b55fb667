//! Transport layer.
//!
//! Operations leave the client over one of two transports, picked by the
//! [`TransportSelector`]:
//!
//! ```text
//!                    ┌──────────────────────┐
//!                    │  TransportSelector   │
//!                    └──────────┬───────────┘
//!             subscription      │      query / mutation
//!          ┌────────────────────┴─────────────────────┐
//!          ▼                                          ▼
//! ┌─────────────────────┐                  ┌─────────────────────┐
//! │ StreamingConnection │  ws:// wss://    │   HttpTransport     │  POST
//! │  (worker + retry)   │◄────────────────►│   (stateless)       │◄──────►
//! └─────────────────────┘                  └─────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `http` | Request/response transport |
//! | `retry` | Reconnect backoff policy |
//! | `selector` | Routing by operation kind |
//! | `streaming` | Persistent `graphql-transport-ws` connection |
//! | `subscription` | Result stream handed to callers |

// ============================================================================
// Submodules
// ============================================================================

/// Request/response transport.
pub mod http;

/// Reconnect policy.
pub mod retry;

/// Transport selection.
pub mod selector;

/// Streaming connection manager.
pub mod streaming;

/// Subscription result stream.
pub mod subscription;

// ============================================================================
// Re-exports
// ============================================================================

pub use http::HttpTransport;
pub use retry::{
    Backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_JITTER, DEFAULT_RETRY_ATTEMPTS, RetryOptions,
    RetryPredicate, RetryWait,
};
pub use selector::{Route, TransportSelector};
pub use streaming::{StreamingConnection, streaming_url};
pub use subscription::{ResultObserver, Subscription};
