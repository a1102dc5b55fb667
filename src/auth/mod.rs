//! Authentication.
//!
//! The [`Credential`] is the single source of truth for the current access
//! token. Transports read it through [`AuthHeaders`]; the [`AuthBridge`]
//! writes it in response to auth state machine transitions.
//!
//! ```text
//! AuthInterpreter ──transition──▶ AuthBridge ──set/clear──▶ Credential
//!                                     │                        │
//!                                 restart / reset        read per request
//!                                     ▼                        ▼
//!                         StreamingConnection, Cache      AuthHeaders
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `bridge` | Transition handling |
//! | `credential` | Shared token slot |
//! | `headers` | Header computation |
//! | `machine` | State machine contract and [`ChannelInterpreter`] |

// ============================================================================
// Submodules
// ============================================================================

/// Auth state bridge.
pub mod bridge;

/// Shared credential.
pub mod credential;

/// Per-request auth headers.
pub mod headers;

/// Auth state machine contract.
pub mod machine;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{AuthBridge, BridgeOutcome};
pub use credential::Credential;
pub use headers::{
    AUTHORIZATION_HEADER, AuthHeaders, DEFAULT_PUBLIC_ROLE, ROLE_HEADER, WEBSOCKET_PROTOCOL_HEADER,
    WEBSOCKET_PROTOCOL_VALUE,
};
pub use machine::{
    AccessToken, AuthContext, AuthEvent, AuthInterpreter, AuthState, AuthTransition,
    ChannelInterpreter,
};
