//! Dateline: canonical "date added" reconciliation for media libraries
//!
//! Bursts of change notifications are coalesced per media item, then a
//! tiered waterfall (cache, import history, release date, file mtime)
//! settles one authoritative timestamp with a recorded provenance.

pub mod cache;
pub mod cli;
pub mod coalesce;
pub mod concurrency;
pub mod config;
pub mod decision;
pub mod error;
pub mod logging;
pub mod notification;
pub mod resolve;
pub mod source;
pub mod types;
