//! Stop signals: one for the whole session and one per active path.
//!
//! Signals are set by an external controller at any time and checked by the
//! engine and workers between suspension points. Path tokens are children of
//! the session token, so stopping the session stops every path.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::model::PathId;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct PathTable {
    live: HashMap<PathId, CancellationToken>,
    /// Stop requests for paths not yet dispatched.
    pending: HashSet<PathId>,
}

/// Session-scoped stop flags shared between the handle and the engine.
#[derive(Clone)]
pub struct StopSignals {
    session: CancellationToken,
    stopped: Arc<AtomicBool>,
    paths: Arc<Mutex<PathTable>>,
}

impl StopSignals {
    pub fn new() -> Self {
        Self {
            session: CancellationToken::new(),
            stopped: Arc::new(AtomicBool::new(false)),
            paths: Arc::new(Mutex::new(PathTable::default())),
        }
    }

    /// Set the session signal. Returns `false` if it was already set.
    pub fn stop_session(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::SeqCst);
        self.session.cancel();
        first
    }

    pub fn is_session_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once the session signal is set.
    pub async fn session_stopped(&self) {
        self.session.cancelled().await
    }

    /// Create the signal for a path about to be dispatched.
    pub fn register_path(&self, id: &PathId) -> PathSignal {
        let token = self.session.child_token();
        let mut table = lock(&self.paths);
        if table.pending.remove(id) {
            token.cancel();
        }
        table.live.insert(id.clone(), token.clone());
        PathSignal { token }
    }

    /// Set a path's signal. A path that has not been dispatched yet starts
    /// out stopped.
    pub fn stop_path(&self, id: &PathId) {
        let mut table = lock(&self.paths);
        match table.live.get(id) {
            Some(token) => token.cancel(),
            None => {
                table.pending.insert(id.clone());
            }
        }
    }

    /// Drop stop requests that can no longer match a dispatch: ids from
    /// `cycle` or earlier, and ids that name no cycle at all.
    pub fn finish_cycle(&self, cycle: u32) {
        lock(&self.paths)
            .pending
            .retain(|id| id.cycle().is_some_and(|c| c > cycle));
    }

    #[cfg(test)]
    fn pending_stops(&self) -> usize {
        lock(&self.paths).pending.len()
    }

    /// Forget a finished path.
    pub fn release_path(&self, id: &PathId) {
        lock(&self.paths).live.remove(id);
    }

    pub fn active_paths(&self) -> Vec<PathId> {
        let mut ids: Vec<PathId> = lock(&self.paths).live.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for StopSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// The stop flag a worker checks before every action.
#[derive(Clone)]
pub struct PathSignal {
    token: CancellationToken,
}

impl PathSignal {
    /// A signal nobody else holds, for running a worker standalone.
    pub fn detached() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}
