//! Unsubscribe tokens: the removal capability for one subscription.

use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a token.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId(Uuid);

impl TokenId {
    fn new() -> Self {
        TokenId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type ReleaseFn = Box<dyn FnOnce(&UnsubscribeToken) + Send>;

struct TokenInner {
    id: TokenId,
    /// Taken exactly once, by whichever of release/disarm gets there first.
    release: Mutex<Option<ReleaseFn>>,
}

/// Handle that removes its subscription when released.
///
/// Clones share identity: two tokens are equal iff they were cloned from
/// the same original. Releasing is idempotent across all clones.
#[derive(Clone)]
pub struct UnsubscribeToken {
    inner: Arc<TokenInner>,
}

impl UnsubscribeToken {
    /// Create a token with a fresh identity and the given removal callback.
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce(&UnsubscribeToken) + Send + 'static,
    {
        Self {
            inner: Arc::new(TokenInner {
                id: TokenId::new(),
                release: Mutex::new(Some(Box::new(release))),
            }),
        }
    }

    pub fn id(&self) -> TokenId {
        self.inner.id
    }

    /// Fire the removal callback.
    ///
    /// Returns true only for the call that actually ran it; every later call
    /// is a no-op returning false.
    pub fn release(&self) -> bool {
        let release = self.inner.release.lock().take();
        match release {
            Some(release) => {
                release(self);
                true
            }
            None => false,
        }
    }

    /// True once the token has been released, or its subscription removed
    /// by some other path.
    pub fn is_released(&self) -> bool {
        self.inner.release.lock().is_none()
    }

    /// Drop the removal callback without running it. Used when the owning
    /// subscription is removed through the bus rather than the token.
    pub(crate) fn disarm(&self) -> bool {
        self.inner.release.lock().take().is_some()
    }
}

impl PartialEq for UnsubscribeToken {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for UnsubscribeToken {}

impl Hash for UnsubscribeToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for UnsubscribeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsubscribeToken")
            .field("id", &self.inner.id)
            .field("released", &self.is_released())
            .finish()
    }
}
