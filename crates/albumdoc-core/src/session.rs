//! Per-user session store
//!
//! Holds the ordered list of staged files and the user's output preferences.
//! Every update is a single read-modify-write under the user's shard lock, and
//! a separate per-user async lock serializes the slow operations (downloads,
//! rendering) for one user without affecting anyone else.

use crate::output::OutputKind;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// State of one user's staging session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// Staged files in arrival order
    pub files: Vec<PathBuf>,
    /// Output file name chosen by the user
    pub output_name: Option<String>,
    /// Output kind chosen by the user
    pub output_kind: Option<OutputKind>,
    /// Set while a conversion is in flight
    #[serde(skip)]
    pub busy: bool,
}

impl UserSession {
    /// A session with nothing worth keeping
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.files.is_empty()
            && self.output_name.is_none()
            && self.output_kind.is_none()
            && !self.busy
    }

    /// Return to the pristine state, optionally keeping the output preferences
    pub fn reset(&mut self, keep_preferences: bool) {
        self.files.clear();
        self.busy = false;
        if !keep_preferences {
            self.output_name = None;
            self.output_kind = None;
        }
    }
}

/// Held per-user lock; releases and evicts the lock entry on drop
pub struct UserLock<'a> {
    store: &'a SessionStore,
    user_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means nobody is queued
        self.store
            .locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// In-memory session store keyed by user id
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<i64, UserSession>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl SessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the user's session (default if none exists)
    #[must_use]
    pub fn get(&self, user_id: i64) -> UserSession {
        self.sessions
            .get(&user_id)
            .map(|session| session.clone())
            .unwrap_or_default()
    }

    /// Apply `mutator` to the user's session as one read-modify-write.
    ///
    /// The session is created lazily and evicted again if the mutation
    /// leaves it blank.
    pub fn update<R>(&self, user_id: i64, mutator: impl FnOnce(&mut UserSession) -> R) -> R {
        let (result, blank) = {
            let mut session = self.sessions.entry(user_id).or_default();
            let result = mutator(&mut session);
            (result, session.is_blank())
        };
        if blank {
            self.sessions.remove_if(&user_id, |_, session| session.is_blank());
        }
        result
    }

    /// Clear staged files and the busy flag
    pub fn reset(&self, user_id: i64, keep_preferences: bool) {
        self.update(user_id, |session| session.reset(keep_preferences));
        debug!(user_id, keep_preferences, "Session reset");
    }

    /// Acquire the user's exclusive lock for downloads or rendering
    ///
    /// The lock entry is dropped from the store once the last holder or
    /// waiter is gone.
    pub async fn lock_user(&self, user_id: i64) -> UserLock<'_> {
        let lock = Arc::clone(self.locks.entry(user_id).or_default().value());
        UserLock {
            store: self,
            user_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of live sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no user has a live session
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
