//! Local music importer library.
//!
//! Reconciles local audio file names against the Spotify catalog and
//! collects the matches in a playlist. Shared by the CLI and the tests.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod listing;
pub mod match_log;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod publish;
pub mod safety;
pub mod scoring;
pub mod search;
pub mod spotify;

pub use error::{Error, Result};
