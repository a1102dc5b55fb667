//! GraphQL protocol types.
//!
//! This module defines what travels over both transports.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `document` | Executable document scanning and classification |
//! | `operation` | Operation body and context headers |
//! | `response` | Execution results and errors |
//! | `message` | `graphql-transport-ws` frames |

// ============================================================================
// Submodules
// ============================================================================

/// Executable document scanning.
pub mod document;

/// `graphql-transport-ws` message types.
pub mod message;

/// Operation body.
pub mod operation;

/// Response and error types.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use document::{Definition, Document, OperationKind};
pub use message::{ClientMessage, ConnectionInitPayload, SUBPROTOCOL, ServerMessage};
pub use operation::Operation;
pub use response::{GraphQLError, GraphQLResponse, Location};
