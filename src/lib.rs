//! Newsboard - News search with a discussion board
//!
//! This crate searches a news provider for keywords, caches the results for a
//! while, and lets visitors leave comments stored in SQLite.

pub mod cache;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod news;
pub mod routes;
pub mod timestamp;
