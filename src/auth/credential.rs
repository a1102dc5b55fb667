//! Shared bearer credential.
//!
//! The [`Credential`] is owned by the auth bridge and handed to both
//! transports at construction. Every replacement is a single atomic swap
//! under a readers-safe lock; readers always see either the old or the new
//! token, never a partial update.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

// ============================================================================
// Credential
// ============================================================================

/// Cloneable handle to the current bearer token.
///
/// `None` means unauthenticated.
#[derive(Clone, Default)]
pub struct Credential {
    inner: Arc<RwLock<Slot>>,
}

#[derive(Default)]
struct Slot {
    token: Option<Arc<str>>,
    /// Bumped on every replacement.
    generation: u64,
}

impl Credential {
    /// Creates an unauthenticated credential.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current token.
    #[inline]
    #[must_use]
    pub fn token(&self) -> Option<Arc<str>> {
        self.inner.read().token.clone()
    }

    /// Returns the current token together with its generation.
    ///
    /// Both values come from the same read.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> (Option<Arc<str>>, u64) {
        let slot = self.inner.read();
        (slot.token.clone(), slot.generation)
    }

    /// Returns the current generation.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Runs `f` only if the generation is still `generation`.
    ///
    /// `f` runs under the read lock, so a concurrent [`set`](Self::set)
    /// completes either before the check or after `f` returns.
    pub(crate) fn if_generation(&self, generation: u64, f: impl FnOnce()) -> bool {
        let slot = self.inner.read();
        if slot.generation != generation {
            return false;
        }
        f();
        true
    }

    /// Returns `true` if a token is set.
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.read().token.is_some()
    }

    /// Replaces the token.
    ///
    /// Empty strings are stored as `None`.
    pub fn set(&self, token: Option<&str>) {
        let token = token.filter(|t| !t.is_empty()).map(Arc::from);
        let mut slot = self.inner.write();
        slot.token = token;
        slot.generation = slot.generation.wrapping_add(1);
    }

    /// Clears the token.
    #[inline]
    pub fn clear(&self) {
        self.set(None);
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (token, generation) = self.snapshot();
        f.debug_struct("Credential")
            .field("authenticated", &token.is_some())
            .field("generation", &generation)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
