//! Resilient HTTP execution and the metrics query built on top of it.

mod overview;
mod retry;

pub use overview::{
    extract_snapshot, ArtistStatsSource, StatsFetcher, DEFAULT_OVERVIEW_QUERY_HASH,
    DEFAULT_QUERY_URL,
};
pub use retry::{RetryPolicy, RetryingClient};
