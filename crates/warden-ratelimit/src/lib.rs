//! # warden-ratelimit
//!
//! Admission controller: a per-identity sliding-window limiter over three
//! windows (minute, hour, day).
//!
//! State is three ascending lists of millisecond timestamps per identity,
//! pruned on every read. A rejected check never mutates stored state; an
//! admitted check appends `now` to all three lists and persists them. Checks
//! for one identity are serialized through [`KeyedLocks`]; different
//! identities proceed in parallel.

#![deny(unsafe_code)]

pub mod errors;
pub mod limiter;
pub mod locks;
pub mod state;
pub mod store;
pub mod window;

pub use errors::RateLimitError;
pub use limiter::{AdmissionController, AdmissionDecision, RateLimits, RateStats};
pub use locks::KeyedLocks;
pub use state::{RateWindowState, WindowCounts};
pub use store::{MemoryRateStore, RateStore, SqliteRateStore};
pub use window::Window;
