//! # Statsync Server
//!
//! In-memory reference implementation of the statsync remote store.
//!
//! The service enforces the same optimistic-concurrency contract a real
//! deployment would: an upsert must carry the revision the server holds,
//! and each accepted write bumps it. Engine integration tests and the demo
//! run against this crate instead of a network endpoint.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod service;

pub use service::StatsStoreService;
