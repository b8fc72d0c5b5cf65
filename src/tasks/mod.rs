//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is alive.
//!
//! # Tasks
//! - Expiration sweep: evicts expired entries at the configured interval

mod sweep;

pub(crate) use sweep::{spawn_sweep_task, Sweep};
