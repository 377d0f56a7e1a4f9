//! # courier
//!
//! An HTTP client library with a unified surface for issuing requests
//! either awaited in place or as cooperative tasks. A request description
//! is normalized into an immutable context, checked against a mock layer
//! and an RFC 7234 cache, executed over a shared connection pool with
//! exponential-backoff retry, and returned as a rich [`Response`] with
//! optional per-request debug snapshots.
//!
//! ```no_run
//! use courier::{Client, RequestOptions};
//!
//! # async fn run() -> Result<(), courier::Error> {
//! let client = Client::builder()
//!     .cache(courier::cache::CacheConfig::default())
//!     .build();
//!
//! let mut options = RequestOptions::default();
//! options.retries = Some(2);
//! let response = client.send("GET", "https://api.example.com/users", options).await?;
//!
//! if response.is_success() {
//!     println!("{}", response.text());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! HTTP error statuses are responses here, never `Err` values; only
//! validation failures, transport errors, timeouts, cancellation and
//! mock-stray conditions surface as [`Error`].

pub mod cache;
pub mod client;
pub mod constants;
pub mod context;
pub mod dns;
pub mod error;
pub mod executor;
pub mod mock;
pub mod options;
pub mod pool;
pub mod profile;
pub mod response;
pub mod retry;
pub mod task;
pub mod transport;
pub mod uri;

pub use client::{Client, ClientBuilder};
pub use context::{PreparedRequest, RequestContext};
pub use error::{Error, ErrorKind};
pub use options::{Body, CacheRequestOptions, Part, RequestOptions};
pub use response::Response;
pub use task::Task;
