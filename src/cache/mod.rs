//! Query cache: server responses keyed by value-compared query keys.
//!
//! This module provides:
//! - Keys describing (resource, page, page size, filters) or (resource, id)
//! - De-duplication of concurrent fetches for the same key
//! - Time-based staleness with stale-while-refetch reads
//! - Prefix invalidation by resource and explicit seeding
//! - An observer channel for entry changes

mod data;
mod key;
mod layer;
mod storage;

pub use data::QueryData;
pub use key::{FilterField, FilterValue, Filters, QueryKey, Resource};
pub use layer::{CacheEvent, CacheWrite, CacheWriter, FetchResult, QueryCache};
