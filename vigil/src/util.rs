//! Utilities.
mod fetch;
pub use fetch::HttpFetcher;
