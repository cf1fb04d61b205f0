//! # Multi Conn - Fan-out Connection Adapter
//!
//! Multi Conn is a Rust library that makes a set of independently dialed
//! network connections look like a single one. Every operation issued on the
//! adapter is replicated to each upstream connection, which makes it a good
//! fit for sending the same traffic to several backends, for example
//! replicating metrics lines to more than one collector.
//!
//! ## Key Features
//!
//! - **Fan-out**: Writes, deadlines and close go to every upstream, in the
//!   order the upstreams were dialed
//! - **Partial Failure Tolerance**: A write succeeds as long as one upstream
//!   accepted it; the failures of the others are reported out of band
//! - **Strict Lifecycle**: Deadlines and close fail when any upstream fails,
//!   since a silently unset deadline or a leaked socket is worse than a
//!   missing copy of the data
//! - **Substitutable**: [`MultiConnection`] implements the same
//!   [`Connection`] trait as the sockets it wraps
//! - **Observable**: Dial failures, degraded sets and partial writes are
//!   delivered to a [`Reporter`] instead of disappearing into a global log
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//! use multi_conn::{CollectingReporter, MultiConnection, NetDialer};
//!
//! let reporter = Arc::new(CollectingReporter::new());
//! let mut conn = MultiConnection::dial_with(
//!     &NetDialer,
//!     reporter.clone(),
//!     "tcp",
//!     &["127.0.0.1:2003", "127.0.0.1:2004"],
//!     Duration::from_millis(500),
//! );
//!
//! // Dialing never fails as a whole, check what actually connected.
//! for diagnostic in reporter.drain() {
//!     eprintln!("{diagnostic}");
//! }
//!
//! conn.set_write_deadline(Some(Instant::now() + Duration::from_secs(1)))?;
//! let written = conn.write(b"servers.web1.load 0.42 1700000000\n")?;
//! println!("{written} bytes written across {} upstreams", conn.len());
//! conn.close()?;
//! # Ok::<(), multi_conn::FanOutError>(())
//! ```
//!
//! ## Reading
//!
//! Reading from several independent streams has no well defined merge. The
//! adapter's read issues a zero-length read to every upstream and reports
//! the count and errors; it never fills the caller's buffer. Callers that
//! need the data coming back from a backend should keep a direct connection
//! to it.
//!
//! ## Concurrency
//!
//! Every call walks the upstreams one after the other on the calling thread.
//! A hung upstream stalls the call unless a deadline was set on it first. An
//! adapter is meant to be used by one owner at a time.

#![warn(missing_docs)]

mod connection;
mod dial;
mod error;
mod multi_conn;
mod report;

pub use connection::*;
pub use dial::*;
pub use error::*;
pub use multi_conn::*;
pub use report::*;
