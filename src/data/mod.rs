//! Data acquisition: FRED API client with a read-through disk cache.

pub mod fred;

pub use fred::FredClient;
