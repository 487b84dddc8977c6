//! Scheduler runner -- admission, execution and drain tracking.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, pause/start/clear, and queries
//! - `admission`: submit variants, function registration, and the admission rule
//! - `execution`: spawning admitted tasks and post-completion bookkeeping
//! - `drain`: empty/idle waiters

mod admission;
mod core;
mod drain;
mod execution;

pub use self::core::Scheduler;
