//! # Statsync Model
//!
//! Data model for the statsync engine.
//!
//! This crate provides:
//! - `StatValue` — a named, typed scalar (number, integer, or text)
//! - `StatsDocument` — a revisioned per-user stat map with dirty tracking
//!   and local-write-wins merge
//! - Leaderboard query/result types
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod leaderboard;
mod value;

pub use document::{DirtyMarks, DocumentState, StatsDocument};
pub use error::{ModelError, ModelResult};
pub use leaderboard::{LeaderboardQuery, LeaderboardResult, LeaderboardRow};
pub use value::{StatData, StatType, StatValue};
