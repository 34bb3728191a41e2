//! `factor-shares` library crate.
//!
//! The binary (`fshares`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (e.g., future notebooks, reports, services)
//! - code stays easy to navigate as the project grows

pub mod analysis;
pub mod app;
pub mod cli;
pub mod data;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod math;
pub mod plot;
pub mod report;
pub mod stationarity;
