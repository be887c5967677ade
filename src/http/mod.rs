//! HTTP callback transport.
//!
//! Requires the `http` feature.
//!
//! - [`HttpCallbackProducer`] performs one synchronous `POST <url>` per
//!   issued payload. Any non-2xx answer is a transport failure.
//! - [`receiver`] is the other end: an axum router exposing
//!   `POST /callback`, which hands each body to a sink and answers `OK`.
//!
//! ```ignore
//! let endpoint = Endpoint::new("http://localhost:8080/callback")?;
//! let producer = HttpCallbackProducer::new("orders", endpoint)?;
//! producer.issue(&order)?;
//! ```

mod producer;
pub mod receiver;

pub use producer::{Endpoint, HttpCallbackProducer};
pub use receiver::{router, serve, Sink, CALLBACK_PATH};
