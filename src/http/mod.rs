//! HTTP surface for subscribing to and publishing events.

mod client_key;
mod server;
mod service;

pub use client_key::{client_key, scoped_key};
pub use server::HttpServer;
pub use service::{router, AppState, PUBLISH_POLICY, SUBSCRIBE_POLICY};
