//! Pure domain logic for the breakout/recording orchestration backend.
//!
//! Everything here is usable from the storage layer, the HTTP layer, and
//! background services alike: no I/O, no async. Decision tables,
//! partitioning, backoff math, and the domain types they operate on.

pub mod assign;
pub mod backoff;
pub mod error;
pub mod event;
pub mod meeting;
pub mod naming;
pub mod recording;
pub mod room;
pub mod session;
pub mod types;
