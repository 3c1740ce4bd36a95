/* src/lib.rs */

//! A small RFC 2136 dynamic update client with TSIG authentication.
//!
//! Build a [`ZoneContext`] once (directly or through [`Settings`]), hand it to
//! [`NsUpdater`], and call [`NsUpdater::get`], [`NsUpdater::create`] or
//! [`NsUpdater::delete`]. Every call is a single signed round trip; retries are
//! left to the caller, guided by [`Error::is_retryable`].

pub mod client;
pub mod config;
pub mod error;
pub mod record;
pub mod response;
pub mod svcb;
pub mod transport;
pub mod tsig;
pub mod update;

pub use client::NsUpdater;
pub use config::{Settings, ZoneContext};
pub use error::{Error, ErrorKind, UpdateResult};
pub use record::{DnsRecord, RecordType};
pub use transport::{DnsTransport, Protocol, Transport};
pub use tsig::{TsigAlgorithm, TsigKey};
pub use update::{Operation, OperationKind, UpdateTransaction};
