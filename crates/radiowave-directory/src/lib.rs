//! Station directory access: HTTP client, list filtering and result caching.

pub mod cache;
pub mod client;
pub mod error;
pub mod filter;
pub mod records;

pub use cache::{CachedDirectory, TtlCache};
pub use client::{DirectoryClient, StationSource};
pub use error::DirectoryError;
pub use filter::StationFilter;
