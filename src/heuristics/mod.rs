//! Heuristics module for the delivery tour.
//!
//! This module exports the construction and improvement heuristics and the
//! cancellation flag long-running searches poll.

pub mod construction;
pub mod local_search;

pub use construction::*;
pub use local_search::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag asking a running search to stop early.
///
/// Searches check it between sweeps and return the best tour found so far.
/// The default token is never cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
