//! Transport selection.
//!
//! Routing depends only on the document and on whether a streaming transport
//! exists. Connection state never influences it.

// ============================================================================
// Imports
// ============================================================================

use crate::protocol::Document;

// ============================================================================
// Route
// ============================================================================

/// Transport an operation is sent over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// The persistent WebSocket connection.
    Streaming,
    /// One-shot HTTP request.
    RequestResponse,
}

// ============================================================================
// TransportSelector
// ============================================================================

/// Routes subscriptions to the streaming transport and everything else to
/// HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSelector {
    streaming_enabled: bool,
}

impl TransportSelector {
    /// Creates a selector.
    ///
    /// With `streaming_enabled == false` every operation goes over HTTP.
    #[inline]
    #[must_use]
    pub const fn new(streaming_enabled: bool) -> Self {
        Self { streaming_enabled }
    }

    /// Returns `true` if a streaming transport is configured.
    #[inline]
    #[must_use]
    pub const fn streaming_enabled(&self) -> bool {
        self.streaming_enabled
    }

    /// Picks the transport for `document`.
    #[inline]
    #[must_use]
    pub fn route(&self, document: &Document) -> Route {
        if self.streaming_enabled && document.is_subscription() {
            Route::Streaming
        } else {
            Route::RequestResponse
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
