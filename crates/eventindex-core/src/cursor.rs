//! Sync cursor: tracks how far the indexer has delivered events.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::indexer::IndexerState;

/// A point-in-time copy of the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSnapshot {
    /// Next height not yet fully delivered.
    pub current_height: u64,
    /// Set once historical sync has caught up with the chain tip.
    pub is_up_to_date: bool,
    /// Current phase of the owning indexer.
    pub state: IndexerState,
}

struct CursorInner {
    current_height: u64,
    is_up_to_date: bool,
    state: IndexerState,
}

/// The indexer's progress state, shared by the historical and live phases.
///
/// All reads and writes go through one mutex. Phase code never touches the
/// fields directly; it calls [`advance_to`](Self::advance_to) once every event
/// below the new height is on the queue.
pub struct SyncCursor {
    start_height: u64,
    inner: Mutex<CursorInner>,
}

impl SyncCursor {
    /// Create a cursor positioned at `start_height`.
    pub fn new(start_height: u64) -> Self {
        Self {
            start_height,
            inner: Mutex::new(CursorInner {
                current_height: start_height,
                is_up_to_date: false,
                state: IndexerState::Initializing,
            }),
        }
    }

    /// First height this cursor was created at.
    pub fn start_height(&self) -> u64 {
        self.start_height
    }

    /// Next height not yet fully delivered.
    pub fn current_height(&self) -> u64 {
        self.lock().current_height
    }

    pub fn is_up_to_date(&self) -> bool {
        self.lock().is_up_to_date
    }

    pub fn state(&self) -> IndexerState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CursorSnapshot {
        let inner = self.lock();
        CursorSnapshot {
            current_height: inner.current_height,
            is_up_to_date: inner.is_up_to_date,
            state: inner.state,
        }
    }

    /// Move the cursor to `next_height`.
    ///
    /// The cursor only moves forward: `next_height` must be strictly greater
    /// than the current height.
    pub fn advance_to(&self, next_height: u64) -> Result<(), IndexerError> {
        let mut inner = self.lock();
        if next_height <= inner.current_height {
            return Err(IndexerError::CursorRegression {
                current: inner.current_height,
                requested: next_height,
            });
        }
        inner.current_height = next_height;
        Ok(())
    }

    /// Record the historical-to-live handoff. Idempotent.
    pub fn mark_up_to_date(&self) {
        let mut inner = self.lock();
        inner.is_up_to_date = true;
        if inner.state == IndexerState::HistoricalSync {
            inner.state = IndexerState::Polling;
        }
    }

    /// Move to `HistoricalSync` if the cursor has never been started.
    ///
    /// Returns `false` if the owning indexer already ran.
    pub(crate) fn begin(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != IndexerState::Initializing {
            return false;
        }
        inner.state = IndexerState::HistoricalSync;
        true
    }

    pub(crate) fn mark_stopped(&self) {
        self.lock().state = IndexerState::Stopped;
    }

    fn lock(&self) -> MutexGuard<'_, CursorInner> {
        // The guarded data is plain integers; a panic elsewhere cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SyncCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("SyncCursor")
            .field("start_height", &self.start_height)
            .field("current_height", &snap.current_height)
            .field("is_up_to_date", &snap.is_up_to_date)
            .field("state", &snap.state)
            .finish()
    }
}
