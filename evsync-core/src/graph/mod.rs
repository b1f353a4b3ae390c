//! Graph API client.
//!
//! - [`GraphClient`]: retrying GET calls, cursor pagination and the typed
//!   endpoints (pages, events, token exchange)
//! - [`GraphError`]: the classified outcome of a failed call
//! - [`RetryPolicy`]: attempt bound and exponential backoff
//! - [`GraphTransport`]: the HTTP seam, implemented with `reqwest`

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod retry;
pub mod transport;

pub use client::GraphClient;
pub use config::GraphClientConfig;
pub use endpoints::merge_event_segments;
pub use error::{GraphError, GraphErrorKind, EXPIRED_TOKEN_CODE};
pub use retry::RetryPolicy;
pub use transport::{GraphTransport, RawResponse, ReqwestTransport, TransportError};
