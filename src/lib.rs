//! NTS tracklist to Spotify resolution library - shared modules for all binaries.

pub mod catalog;
pub mod config;
pub mod confirm;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod normalize;
pub mod nts;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod retry;
pub mod scoring;
pub mod spotify;
pub mod store;
pub mod sync;
pub mod throttle;
