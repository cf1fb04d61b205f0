use std::io::{self, Read, Result as IoResult, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::time::{Duration, Instant};

/// The capability set of a single bidirectional network connection.
///
/// This is what the dialer hands back for every upstream and, since
/// [`MultiConnection`](crate::MultiConnection) implements it as well, what an
/// adapter offers to its callers.
///
/// Deadlines are given as points in time, but the socket implementations
/// turn them into relative timeouts when they are set: every later blocking
/// operation gets the time that was left at that moment, instead of stopping
/// at the original instant. Set the deadline again before each operation
/// that must end at a fixed time. `None` clears a previously set deadline. A
/// deadline that has already passed makes the next blocking operation time
/// out immediately.
///
/// Reading into an empty buffer returns `Ok(0)` at once, without touching
/// the socket.
pub trait Connection: Send {
    /// Reads available bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize>;

    /// Writes bytes from `buf`, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> IoResult<usize>;

    /// Returns the local address of the connection.
    fn local_addr(&self) -> IoResult<SocketAddr>;

    /// Returns the address of the remote peer.
    fn remote_addr(&self) -> IoResult<SocketAddr>;

    /// Sets both the read and the write deadline.
    fn set_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }

    /// Sets the deadline for future reads.
    fn set_read_deadline(&self, deadline: Option<Instant>) -> IoResult<()>;

    /// Sets the deadline for future writes.
    fn set_write_deadline(&self, deadline: Option<Instant>) -> IoResult<()>;

    /// Closes the connection.
    fn close(&mut self) -> IoResult<()>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        (**self).write(buf)
    }

    fn local_addr(&self) -> IoResult<SocketAddr> {
        (**self).local_addr()
    }

    fn remote_addr(&self) -> IoResult<SocketAddr> {
        (**self).remote_addr()
    }

    fn set_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        (**self).set_deadline(deadline)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        (**self).set_read_deadline(deadline)
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        (**self).set_write_deadline(deadline)
    }

    fn close(&mut self) -> IoResult<()> {
        (**self).close()
    }
}

// Socket timeouts are relative; zero is rejected by the OS layer, so an
// elapsed deadline becomes the smallest timeout we can ask for.
fn deadline_to_timeout(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| {
        let left = d.saturating_duration_since(Instant::now());
        if left.is_zero() { Duration::from_nanos(1) } else { left }
    })
}

impl Connection for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        Write::write(self, buf)
    }

    fn local_addr(&self) -> IoResult<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn remote_addr(&self) -> IoResult<SocketAddr> {
        self.peer_addr()
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        self.set_read_timeout(deadline_to_timeout(deadline))
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        self.set_write_timeout(deadline_to_timeout(deadline))
    }

    /// Shuts down both halves. The OS reports an error on a second close.
    fn close(&mut self) -> IoResult<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// A connected UDP socket.
///
/// UDP sockets have no shutdown, so the closed state is tracked here: once
/// closed, every further operation fails.
#[derive(Debug)]
pub struct UdpConnection {
    socket: UdpSocket,
    closed: bool,
}

impl UdpConnection {
    /// Wraps a socket that has already been `connect`ed to its peer.
    pub fn new(socket: UdpSocket) -> Self {
        UdpConnection { socket, closed: false }
    }

    fn ensure_open(&self) -> IoResult<()> {
        if self.closed {
            Err(io::Error::new(io::ErrorKind::NotConnected, "use of closed connection"))
        } else {
            Ok(())
        }
    }
}

impl Connection for UdpConnection {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.ensure_open()?;
        // a zero-length recv blocks for a datagram and then drops it
        if buf.is_empty() {
            return Ok(0);
        }
        self.socket.recv(buf)
    }

    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.ensure_open()?;
        self.socket.send(buf)
    }

    fn local_addr(&self) -> IoResult<SocketAddr> {
        self.socket.local_addr()
    }

    fn remote_addr(&self) -> IoResult<SocketAddr> {
        self.socket.peer_addr()
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        self.ensure_open()?;
        self.socket.set_read_timeout(deadline_to_timeout(deadline))
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> IoResult<()> {
        self.ensure_open()?;
        self.socket.set_write_timeout(deadline_to_timeout(deadline))
    }

    fn close(&mut self) -> IoResult<()> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_deadline_becomes_minimal_timeout() {
        let past = Instant::now() - Duration::from_secs(1);
        assert_eq!(deadline_to_timeout(Some(past)), Some(Duration::from_nanos(1)));
        assert_eq!(deadline_to_timeout(None), None);
    }

    #[test]
    fn future_deadline_is_relative() {
        let t = deadline_to_timeout(Some(Instant::now() + Duration::from_secs(10))).unwrap();
        assert!(t > Duration::from_secs(9) && t <= Duration::from_secs(10));
    }

    #[test]
    fn udp_double_close_fails() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.connect(peer.local_addr().unwrap()).unwrap();
        let mut conn = UdpConnection::new(socket);

        conn.close().unwrap();
        let err = conn.close().unwrap_err();
        assert_eq!(err.to_string(), "use of closed connection");
        assert!(conn.write(b"x").is_err());
        assert!(conn.read(&mut []).is_err());
    }

    #[test]
    fn udp_empty_read_keeps_queued_datagram() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.connect(peer.local_addr().unwrap()).unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        peer.connect(socket.local_addr().unwrap()).unwrap();
        let mut conn = UdpConnection::new(socket);

        peer.send(b"queued").unwrap();
        assert_eq!(conn.read(&mut []).unwrap(), 0);

        let mut buf = [0u8; 16];
        let n = conn.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"queued");
    }

    #[test]
    fn udp_empty_write_sends_empty_datagram() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.connect(peer.local_addr().unwrap()).unwrap();
        let mut conn = UdpConnection::new(socket);

        assert_eq!(conn.write(&[]).unwrap(), 0);
        let mut buf = [0u8; 4];
        assert_eq!(peer.recv(&mut buf).unwrap(), 0);
    }
}
