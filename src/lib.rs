//! Weather Agent: a caching proxy in front of OpenWeather and OpenAI.
//!
//! Client-facing routes go through the [`orchestrator::Orchestrator`], which
//! puts every upstream call behind a short-TTL [`cache::FreshnessCache`] that
//! collapses concurrent identical requests into one fetch.

pub mod ai;
pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod server;
pub mod upstream;

pub use error::{Error, Result};
