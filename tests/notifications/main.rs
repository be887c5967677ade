//! Notification integration tests.
//!
//! Every backend runs over its in-memory substrate:
//! - per-backend producer/consumer behaviour
//! - the shared contract, checked against every backend
//! - naming, provisioning and polling properties
//! - HTTP callbacks against a real axum receiver

mod fanout;
mod jms;
mod naming;
mod partitioned;
mod pubsub;
#[cfg(feature = "http")]
mod http;
