// Real-time subway arrivals for one stop: GTFS-RT ingestion, a small JSON
// API, and a countdown board re-rendered every second between polls.

pub mod aggregate;
pub mod board;
pub mod config;
pub mod countdown;
pub mod error;
pub mod feed;
pub mod layout;
pub mod models;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod source;
pub mod store;
pub mod track;
