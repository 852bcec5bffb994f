//! # Statsync Engine
//!
//! Stat synchronization and write-coalescing engine.
//!
//! This crate provides:
//! - `StatsEngine` — per-user document registry with load-on-add,
//!   coalesced flush-on-write, and a periodic background flush
//! - `CoalescingTimer` — collapses write bursts into batched firings
//! - Completion events drained through `do_work` (poll, never callback)
//! - `RemoteStatsStore` / `LeaderboardProvider` collaborator traits with
//!   mock implementations
//!
//! ## Architecture
//!
//! The engine keeps a **local-first** cache: writes land in the per-user
//! [`statsync_model::StatsDocument`] immediately and are pushed later, with
//! bursts inside a coalescing window collapsing into a single upsert. The
//! remote store is the optimistic-concurrency authority: every upsert
//! carries the last observed revision, and a stale revision is reconciled
//! by re-fetching and merging (local dirt wins) rather than force-writing.
//!
//! ## Key Invariants
//!
//! - No write is ever lost: dirt cleared before a flush is restored if the
//!   flush fails, and writes landing mid-flush register as new dirt
//! - The revision advances only after a confirmed successful upsert
//! - Validation errors fail the call synchronously; remote failures only
//!   surface on completion events
//! - Caller-facing methods never block on the network

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod event;
mod leaderboard;
mod store;
mod timer;

pub use config::EngineConfig;
pub use engine::{EngineStats, StatsEngine};
pub use error::{EngineError, EngineResult};
pub use event::{EventQueue, StatEvent, StatEventKind};
pub use leaderboard::{LeaderboardProvider, MockLeaderboardProvider};
pub use store::{
    MockStatsStore, NoOfflineWrites, OfflineWriteHook, RemoteStatsStore, StoreError, StoreResult,
};
pub use timer::{BatchCallback, CoalescingTimer};
