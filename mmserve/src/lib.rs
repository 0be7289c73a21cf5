//! A query server for Metamath proof databases.
//!
//! `mmserve` builds the statement database of a root file and its
//! includes, verifies its proofs incrementally, and answers
//! definition, hover, diagnostics, show-proof and unification queries
//! over immutable snapshots while a worker pool rebuilds edited
//! documents in the background.

pub mod config;
mod error;
pub mod opt;
pub mod query;
pub mod repl;
pub mod service;

pub use config::Workspace;
pub use error::Error;
pub use opt::Opt;

use std::sync::{Condvar, Mutex, MutexGuard};

/// Extension trait for [`Mutex`]`<T>`.
pub trait MutexExt<T> {
    /// Like `lock`, but propagates instead of catches panics.
    fn ulock(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn ulock(&self) -> MutexGuard<'_, T> {
        self.lock().expect("propagating poisoned mutex")
    }
}

/// Extension trait for [`Condvar`].
pub trait CondvarExt {
    /// Like `wait`, but propagates instead of catches panics.
    fn uwait<'a, T>(&self, g: MutexGuard<'a, T>) -> MutexGuard<'a, T>;
}

impl CondvarExt for Condvar {
    fn uwait<'a, T>(&self, g: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.wait(g).expect("propagating poisoned mutex")
    }
}
