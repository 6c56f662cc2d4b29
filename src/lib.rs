pub mod api;
pub mod broadcast;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod feeds;
pub mod interfaces;
pub mod scheduler;
pub mod types;

/// Capacity of the derived-rate broadcast channel.
pub const BROADCAST_CAPACITY: usize = 64;
