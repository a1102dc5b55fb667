//! Auth state bridge.
//!
//! Translates auth state machine transitions into credential updates,
//! streaming restarts and cache resets.
//!
//! | Event | Effect |
//! |-------|--------|
//! | `SIGNED_IN`, `TOKEN_CHANGED` | Credential := access token, restart streaming if open |
//! | `SIGNOUT` | Credential := none, reset cache |
//! | anything else | Nothing |
//!
//! The bridge never opens a connection by itself.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::cache::Cache;
use crate::transport::StreamingConnection;

use super::credential::Credential;
use super::machine::{AuthEvent, AuthInterpreter, AuthTransition};

// ============================================================================
// BridgeOutcome
// ============================================================================

/// What [`AuthBridge::handle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Credential replaced.
    CredentialUpdated {
        /// Whether an open streaming connection was restarted.
        restarted: bool,
    },
    /// Credential cleared and cache reset attempted.
    SignedOut,
    /// Event not relevant to transports.
    Ignored,
}

// ============================================================================
// AuthBridge
// ============================================================================

/// Applies auth transitions to the transports.
#[derive(Clone)]
pub struct AuthBridge {
    credential: Credential,
    streaming: Option<StreamingConnection>,
    cache: Arc<dyn Cache>,
}

impl AuthBridge {
    /// Creates a bridge over the shared credential.
    #[must_use]
    pub fn new(
        credential: Credential,
        streaming: Option<StreamingConnection>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            credential,
            streaming,
            cache,
        }
    }

    /// Applies one transition.
    pub async fn handle(&self, transition: &AuthTransition) -> BridgeOutcome {
        match transition.event {
            AuthEvent::SignedIn | AuthEvent::TokenChanged => {
                self.credential.set(transition.state.access_token());
                let restarted = self
                    .streaming
                    .as_ref()
                    .is_some_and(StreamingConnection::restart);

                debug!(
                    event = ?transition.event,
                    authenticated = self.credential.is_authenticated(),
                    restarted,
                    "Credential updated"
                );
                BridgeOutcome::CredentialUpdated { restarted }
            }
            AuthEvent::SignOut => {
                self.credential.clear();
                info!("Signed out, credential cleared");

                if let Err(e) = self.cache.reset().await {
                    error!(error = %e, "Failed to reset cache after sign-out");
                }
                BridgeOutcome::SignedOut
            }
            AuthEvent::Other => {
                trace!("Ignoring auth event");
                BridgeOutcome::Ignored
            }
        }
    }

    /// Applies every transition `interpreter` emits from now on.
    ///
    /// The task ends when the interpreter's channel closes.
    pub fn spawn(self, interpreter: &dyn AuthInterpreter, runtime: &Handle) -> JoinHandle<()> {
        let mut transitions = interpreter.subscribe();

        runtime.spawn(async move {
            loop {
                match transitions.recv().await {
                    Ok(transition) => {
                        self.handle(&transition).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth bridge fell behind, transitions skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Auth interpreter closed, bridge stopped");
        })
    }
}

impl fmt::Debug for AuthBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthBridge")
            .field("credential", &self.credential)
            .field("streaming", &self.streaming)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
