//! Hubgate - per-client rate limiting and server-push fan-out
//!
//! This crate provides two independent, process-local components: a
//! fixed-window request limiter keyed by client, and a broadcaster that
//! pushes each published event to every connected subscriber, evicting
//! subscribers whose delivery fails. A small HTTP host exposes both.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
