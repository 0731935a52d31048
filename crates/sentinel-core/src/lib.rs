//! Core pipeline for the notification sentinel.
//!
//! Polls the source site's notification feed, extracts and classifies
//! entries, filters them through a durable dedup store and hands the survivors
//! to a messenger. The source site and the messenger live behind ports
//! implemented in adapter crates (`sentinel-source`, `sentinel-telegram`).

pub mod actions;
pub mod classify;
pub mod config;
pub mod credentials;
pub mod dedup;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod normalize;
pub mod poller;
pub mod source;
pub mod watchlist;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
