//! In-memory response store for a caching forward proxy.
//!
//! [`CacheStore`] maps cache keys to immutable [`CacheEntry`] values with an
//! explicit expiry instant. Entries are only removed by overwrite or by
//! [`CacheStore::purge_expired`], which the [`sweeper`] task calls on a timer.

pub mod entry;
pub mod store;
pub mod sweeper;

pub use entry::CacheEntry;
pub use store::CacheStore;
pub use sweeper::{run_sweeper, spawn_sweeper};
