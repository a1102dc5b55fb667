//! Authentication state machine contract.
//!
//! The state machine itself lives outside this crate. It is observed through
//! an [`AuthInterpreter`] that publishes every transition as an
//! [`AuthTransition`] (`state` after the transition plus the `event` that
//! caused it).
//!
//! # Format
//!
//! ```json
//! {
//!   "state": { "context": { "accessToken": { "value": "<jwt>" } } },
//!   "event": { "type": "TOKEN_CHANGED" }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ============================================================================
// Constants
// ============================================================================

/// Default buffer of [`ChannelInterpreter`].
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// AuthEvent
// ============================================================================

/// Transition event types the bridge reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthEvent {
    /// Sign-in completed.
    #[serde(rename = "SIGNED_IN")]
    SignedIn,
    /// Signed out.
    #[serde(rename = "SIGNOUT")]
    SignOut,
    /// Access token refreshed.
    #[serde(rename = "TOKEN_CHANGED")]
    TokenChanged,
    /// Any other event; ignored.
    #[serde(other)]
    Other,
}

// ============================================================================
// AuthState
// ============================================================================

/// Snapshot of the state machine after a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    /// Machine context.
    #[serde(default)]
    pub context: AuthContext,
}

/// Machine context fields the bridge reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Current access token.
    #[serde(rename = "accessToken", default)]
    pub access_token: AccessToken,
}

/// Access token slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Token string when authenticated.
    #[serde(default)]
    pub value: Option<String>,
}

impl AuthState {
    /// Creates a state holding `token`.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            context: AuthContext {
                access_token: AccessToken {
                    value: Some(token.into()),
                },
            },
        }
    }

    /// Returns the access token, if any.
    #[inline]
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.context.access_token.value.as_deref()
    }
}

// ============================================================================
// AuthTransition
// ============================================================================

/// One `(state, event)` pair emitted by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTransition {
    /// State after the transition.
    pub state: AuthState,
    /// Event that caused it.
    pub event: AuthEvent,
}

impl AuthTransition {
    /// `SIGNED_IN` with `token`.
    #[must_use]
    pub fn signed_in(token: impl Into<String>) -> Self {
        Self {
            state: AuthState::with_token(token),
            event: AuthEvent::SignedIn,
        }
    }

    /// `TOKEN_CHANGED` to `token`.
    #[must_use]
    pub fn token_changed(token: impl Into<String>) -> Self {
        Self {
            state: AuthState::with_token(token),
            event: AuthEvent::TokenChanged,
        }
    }

    /// `SIGNOUT`.
    #[must_use]
    pub fn sign_out() -> Self {
        Self {
            state: AuthState::default(),
            event: AuthEvent::SignOut,
        }
    }
}

// ============================================================================
// AuthInterpreter
// ============================================================================

/// Source of auth state machine transitions.
pub trait AuthInterpreter: Send + Sync {
    /// Subscribes to transitions emitted from now on.
    fn subscribe(&self) -> broadcast::Receiver<AuthTransition>;
}

// ============================================================================
// ChannelInterpreter
// ============================================================================

/// Interpreter backed by a broadcast channel.
///
/// For hosts that run their own auth flow and only need to publish its
/// outcome.
#[derive(Debug, Clone)]
pub struct ChannelInterpreter {
    tx: broadcast::Sender<AuthTransition>,
}

impl Default for ChannelInterpreter {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ChannelInterpreter {
    /// Creates an interpreter buffering up to `capacity` transitions per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes a transition and returns the number of subscribers reached.
    pub fn publish(&self, transition: AuthTransition) -> usize {
        self.tx.send(transition).unwrap_or(0)
    }

    /// Publishes `SIGNED_IN`.
    pub fn sign_in(&self, token: impl Into<String>) -> usize {
        self.publish(AuthTransition::signed_in(token))
    }

    /// Publishes `TOKEN_CHANGED`.
    pub fn change_token(&self, token: impl Into<String>) -> usize {
        self.publish(AuthTransition::token_changed(token))
    }

    /// Publishes `SIGNOUT`.
    pub fn sign_out(&self) -> usize {
        self.publish(AuthTransition::sign_out())
    }
}

impl AuthInterpreter for ChannelInterpreter {
    fn subscribe(&self) -> broadcast::Receiver<AuthTransition> {
        self.tx.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
