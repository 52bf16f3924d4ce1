// src/wait/mod.rs

//! Eventual-consistency primitives.
//!
//! The engine offers no completion signal for removals, disk unlocks or
//! console sessions, so workflows wait by re-reading state:
//!
//! - [`poll_until`] re-invokes a fetch with a backoff schedule until a
//!   predicate holds or the iteration budget is spent.
//! - [`wait_until_equal`] compares two live reads at a fixed interval.
//!
//! Both suspend only in `tokio::time::sleep`, so a cancelled task unwinds at
//! the sleep without further side effects.

pub mod equal;
pub mod poll;

pub use equal::wait_until_equal;
pub use poll::{poll_until, PollOutcome, PollPolicy};
