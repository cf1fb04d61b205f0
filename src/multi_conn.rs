use std::fmt;
use std::io::{self, Result as IoResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::connection::Connection;
use crate::dial::{Dialer, NetDialer};
use crate::error::{FanOutError, Operation};
use crate::report::{Diagnostic, LogReporter, Reporter};

/// A connection that replicates every operation to a fixed set of upstreams.
///
/// `MultiConnection` looks like one connection to its caller, but each call
/// is issued to every upstream in dial order, one after the other, and the
/// per-upstream results are folded into one. Failures never stop the
/// iteration: the remaining upstreams are always attempted.
///
/// How much failure a call tolerates depends on the operation:
///
/// - **write** is best-effort. It only fails when every upstream failed; a
///   partial failure is handed to the [`Reporter`] and the call succeeds.
/// - **deadlines** and **close** are strict. Any failing upstream fails the
///   call.
/// - **read** fails if any upstream read failed.
///
/// Aggregated errors list the message of every failing upstream, joined with
/// `"; "`.
///
/// The upstream set never changes after construction. A dead upstream stays
/// in the set and keeps being called. The set may be empty when every dial
/// failed; construction still succeeds, so callers that need a guarantee
/// must check [`len`](Self::len) themselves.
///
/// An adapter is meant for a single owner. The `&mut self` receivers enforce
/// that for reads, writes and close.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use multi_conn::MultiConnection;
///
/// let mut conn = MultiConnection::dial_timeout(
///     "udp",
///     &["10.0.0.1:8125", "10.0.0.2:8125"],
///     Duration::from_secs(1),
/// );
/// if conn.is_empty() {
///     eprintln!("no collector reachable");
/// }
/// conn.write(b"requests:1|c\n")?;
/// # Ok::<(), multi_conn::FanOutError>(())
/// ```
pub struct MultiConnection {
    id: Uuid,
    upstreams: Vec<Box<dyn Connection>>,
    reporter: Arc<dyn Reporter>,
}

impl MultiConnection {
    /// Dials every address over the system network, logging failures.
    pub fn dial_timeout<S: AsRef<str>>(
        protocol: &str,
        addresses: &[S],
        timeout: Duration,
    ) -> MultiConnection {
        Self::dial_with(&NetDialer, Arc::new(LogReporter), protocol, addresses, timeout)
    }

    /// Dials every address with `dialer`, in order, reporting to `reporter`.
    ///
    /// Addresses that fail to dial are reported and skipped. Never fails,
    /// even when nothing connected.
    pub fn dial_with<D, S>(
        dialer: &D,
        reporter: Arc<dyn Reporter>,
        protocol: &str,
        addresses: &[S],
        timeout: Duration,
    ) -> MultiConnection
    where
        D: Dialer + ?Sized,
        S: AsRef<str>,
    {
        let id = Uuid::new_v4();
        let mut upstreams = Vec::with_capacity(addresses.len());
        for address in addresses {
            let address = address.as_ref();
            match dialer.dial(protocol, address, timeout) {
                Ok(conn) => {
                    log::debug!("[{id}] Connected upstream {address}");
                    upstreams.push(conn);
                }
                Err(e) => reporter.report(
                    id,
                    &Diagnostic::DialFailed { address: address.to_string(), error: e.to_string() },
                ),
            }
        }

        if upstreams.len() != addresses.len() {
            reporter.report(
                id,
                &Diagnostic::Degraded { connected: upstreams.len(), requested: addresses.len() },
            );
        }

        MultiConnection { id, upstreams, reporter }
    }

    /// Assembles an adapter from connections that are already established.
    pub fn from_upstreams(
        upstreams: Vec<Box<dyn Connection>>,
        reporter: Arc<dyn Reporter>,
    ) -> MultiConnection {
        MultiConnection { id: Uuid::new_v4(), upstreams, reporter }
    }

    /// Identifier used to tag this adapter's log lines and diagnostics.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of upstreams in the set.
    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    /// `true` when no upstream connected.
    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    /// Issues a read to every upstream.
    ///
    /// Each upstream is read into a zero-length scratch buffer, so `_buf` is
    /// never filled. The count is the one returned by the last upstream that
    /// did not fail. With no upstreams this is `Ok(0)`.
    pub fn read(&mut self, _buf: &mut [u8]) -> Result<usize, FanOutError> {
        let mut count = 0;
        let mut errs = Vec::new();
        for conn in self.upstreams.iter_mut() {
            let mut scratch = [0u8; 0];
            match conn.read(&mut scratch) {
                Ok(n) => count = n,
                Err(e) => errs.push(e.to_string()),
            }
        }
        log::debug!("[{}] Read {count} bytes, {} upstream errors", self.id, errs.len());

        if errs.is_empty() {
            Ok(count)
        } else {
            Err(FanOutError::new(Operation::Read, count, errs))
        }
    }

    /// Writes all of `buf` to every upstream.
    ///
    /// Returns the byte count summed over every upstream, including partial
    /// counts from failing ones. Fails only when every upstream failed,
    /// which includes having no upstream at all.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, FanOutError> {
        if self.upstreams.is_empty() {
            let msg = "no upstream connections".to_string();
            return Err(FanOutError::new(Operation::Write, 0, vec![msg]));
        }
        let mut written = 0;
        let mut errs = Vec::new();
        for conn in self.upstreams.iter_mut() {
            let (n, err) = write_full(conn.as_mut(), buf);
            written += n;
            if let Some(e) = err {
                errs.push(e.to_string());
            }
        }
        log::debug!("[{}] Wrote {written} bytes to {} upstreams", self.id, self.upstreams.len());

        if errs.is_empty() {
            Ok(written)
        } else if errs.len() == self.upstreams.len() {
            Err(FanOutError::new(Operation::Write, written, errs))
        } else {
            self.reporter.report(
                self.id,
                &Diagnostic::PartialWriteFailure {
                    failed: errs.len(),
                    total: self.upstreams.len(),
                    messages: errs,
                },
            );
            Ok(written)
        }
    }

    /// Local address of the first upstream.
    pub fn local_addr(&self) -> IoResult<SocketAddr> {
        self.first()?.local_addr()
    }

    /// Remote address of the first upstream.
    pub fn remote_addr(&self) -> IoResult<SocketAddr> {
        self.first()?.remote_addr()
    }

    /// Sets read and write deadlines on every upstream.
    pub fn set_deadline(&self, deadline: Option<Instant>) -> Result<(), FanOutError> {
        self.apply(Operation::SetDeadline, |c| c.set_deadline(deadline))
    }

    /// Sets the read deadline on every upstream.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<(), FanOutError> {
        self.apply(Operation::SetReadDeadline, |c| c.set_read_deadline(deadline))
    }

    /// Sets the write deadline on every upstream.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<(), FanOutError> {
        self.apply(Operation::SetWriteDeadline, |c| c.set_write_deadline(deadline))
    }

    /// Closes every upstream.
    ///
    /// Not idempotent: a second call closes every upstream again and returns
    /// whatever each of them reports for that.
    pub fn close(&mut self) -> Result<(), FanOutError> {
        log::debug!("[{}] Closing {} upstreams", self.id, self.upstreams.len());
        let errs: Vec<String> = self
            .upstreams
            .iter_mut()
            .filter_map(|c| c.close().err())
            .map(|e| e.to_string())
            .collect();
        combine(Operation::Close, errs)
    }

    fn first(&self) -> IoResult<&dyn Connection> {
        self.upstreams
            .first()
            .map(|c| c.as_ref())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no upstream connections"))
    }

    fn apply<F>(&self, op: Operation, f: F) -> Result<(), FanOutError>
    where
        F: Fn(&dyn Connection) -> IoResult<()>,
    {
        let errs: Vec<String> = self
            .upstreams
            .iter()
            .filter_map(|c| f(c.as_ref()).err())
            .map(|e| e.to_string())
            .collect();
        combine(op, errs)
    }
}

fn combine(op: Operation, errs: Vec<String>) -> Result<(), FanOutError> {
    if errs.is_empty() { Ok(()) } else { Err(FanOutError::new(op, 0, errs)) }
}

// Keeps writing until the whole buffer went out or the upstream failed.
// Returns the bytes accepted either way. An empty buffer is still written
// once, so datagram upstreams send an empty packet.
fn write_full(conn: &mut dyn Connection, buf: &[u8]) -> (usize, Option<io::Error>) {
    if buf.is_empty() {
        return match conn.write(buf) {
            Ok(_) => (0, None),
            Err(e) => (0, Some(e)),
        };
    }
    let mut index = 0;
    while index < buf.len() {
        match conn.write(&buf[index..]) {
            Ok(0) => {
                return (index, Some(io::Error::from(io::ErrorKind::WriteZero)));
            }
            Ok(n) => index += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (index, Some(e)),
        }
    }
    (index, None)
}

impl fmt::Debug for MultiConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiConnection")
            .field("id", &self.id)
            .field("upstreams", &self.upstreams.len())
            .finish()
    }
}

impl Connection for MultiConnection {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        Ok(MultiConnection::read(self, buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        Ok(MultiConnection::write(self, buf)?)
    }

    fn local_addr(&self) -> IoResult<SocketAddr> {
        MultiConnection::local_addr(self)
    }

    fn remote_addr(&self) -> IoResult<SocketAddr> {
        MultiConnection::remote_addr(self)
    }

    fn set_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        Ok(MultiConnection::set_deadline(self, deadline)?)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        Ok(MultiConnection::set_read_deadline(self, deadline)?)
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        Ok(MultiConnection::set_write_deadline(self, deadline)?)
    }

    fn close(&mut self) -> IoResult<()> {
        Ok(MultiConnection::close(self)?)
    }
}
