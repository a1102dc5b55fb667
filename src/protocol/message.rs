//! `graphql-transport-ws` message types.
//!
//! Messages are JSON text frames tagged by `type`.
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `connection_init` | Client → Server | First frame, carries auth headers |
//! | `connection_ack` | Server → Client | Connection is usable |
//! | `subscribe` | Client → Server | Start an operation |
//! | `next` | Server → Client | One execution result |
//! | `error` | Server → Client | Operation rejected, terminal for that id |
//! | `complete` | Both | Operation finished / cancelled |
//! | `ping` / `pong` | Both | Keep-alive |

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::OperationId;

use super::response::{GraphQLError, GraphQLResponse};

// ============================================================================
// Constants
// ============================================================================

/// WebSocket subprotocol negotiated during the handshake.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

// ============================================================================
// ConnectionInitPayload
// ============================================================================

/// Payload of `connection_init`.
///
/// ```json
/// { "headers": { "authorization": "Bearer <token>", "Sec-WebSocket-Protocol": "graphql-ws" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInitPayload {
    /// Headers the server applies to every operation on this connection.
    pub headers: BTreeMap<String, String>,
}

// ============================================================================
// ClientMessage
// ============================================================================

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the protocol session.
    ConnectionInit {
        /// Connection parameters.
        payload: ConnectionInitPayload,
    },
    /// Starts an operation.
    Subscribe {
        /// Operation identifier.
        id: OperationId,
        /// Serialized [`Operation`](super::Operation).
        payload: Value,
    },
    /// Cancels an operation.
    Complete {
        /// Operation identifier.
        id: OperationId,
    },
    /// Keep-alive request.
    Ping {
        /// Optional payload.
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Keep-alive answer.
    Pong {
        /// Optional payload.
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

// ============================================================================
// ServerMessage
// ============================================================================

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted.
    ConnectionAck {
        /// Optional payload.
        #[serde(default)]
        payload: Option<Value>,
    },
    /// One execution result.
    Next {
        /// Operation identifier.
        id: OperationId,
        /// Execution result.
        payload: GraphQLResponse,
    },
    /// Operation rejected.
    Error {
        /// Operation identifier.
        id: OperationId,
        /// Validation or execution errors.
        payload: Vec<GraphQLError>,
    },
    /// Operation finished.
    Complete {
        /// Operation identifier.
        id: OperationId,
    },
    /// Keep-alive request.
    Ping {
        /// Optional payload.
        #[serde(default)]
        payload: Option<Value>,
    },
    /// Keep-alive answer.
    Pong {
        /// Optional payload.
        #[serde(default)]
        payload: Option<Value>,
    },
}

// ============================================================================
// Tests
// ============================================================================
