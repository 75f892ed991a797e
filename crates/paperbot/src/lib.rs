//! PaperBot gateway library
//!
//! This library provides the proxy layer between PaperBot clients and the
//! research backend API, plus a client for consuming its event streams.

pub mod api;
pub mod client;
pub mod config;
