//! conductdb - A strict, deterministic rule engine for student behavioral records
//!
//! Converts batches of minor infractions and merits into disciplinary
//! demerits (FAD) and reward credits, offsets them against each other,
//! and reverses them through cascading withdrawal.

pub mod clock;
pub mod engine;
pub mod model;
pub mod notify;
pub mod observability;
pub mod rules;
pub mod store;
