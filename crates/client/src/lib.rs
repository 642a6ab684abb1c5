//! Classbook client library.
//!
//! Talks to the class server on behalf of the command-line front end and owns
//! the authentication session: the stored token pair, bearer decoration of
//! outgoing requests, and the refresh-and-retry protocol that makes an expired
//! access token invisible to callers.
//!
//! # Architecture
//!
//! - [`transport`] - `Transport` trait and the `reqwest` implementation
//! - [`store`] - `KeyValueStore` trait with file-backed and in-memory stores
//! - [`endpoint`] - One typed variant per server endpoint
//! - [`session`] - `SessionManager`: login, logout, decoration, refresh
//! - [`classes`] - Class listing, creation and reservation
//! - [`config`] - Environment configuration

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod classes;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use classes::{ClassForm, ClassesApi};
pub use config::{ClientConfig, ConfigError};
pub use endpoint::Endpoint;
pub use error::{ClientError, ExpiryReason};
pub use session::{RefreshRejectedPolicy, SessionManager, SessionStatus};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};
