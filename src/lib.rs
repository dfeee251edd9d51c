//! News Desk - A headline aggregator for static sites
//!
//! This crate fetches a fixed list of news sources through an RSS-to-JSON
//! conversion service, keeps a short-lived snapshot of the newest stories
//! and renders them as cards.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod render;
pub mod routes;
pub mod story;
