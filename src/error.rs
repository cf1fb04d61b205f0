use std::fmt;
use std::io;

/// The fan-out operation an aggregated error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `read`
    Read,
    /// `write`, only reported when every upstream failed.
    Write,
    /// `set_deadline`
    SetDeadline,
    /// `set_read_deadline`
    SetReadDeadline,
    /// `set_write_deadline`
    SetWriteDeadline,
    /// `close`
    Close,
}

impl Operation {
    fn context(self) -> &'static str {
        match self {
            Operation::Read => "error reading from upstreams",
            Operation::Write => "error writing to all upstreams",
            Operation::SetDeadline => "error setting deadline on upstreams",
            Operation::SetReadDeadline => "error setting read deadline on upstreams",
            Operation::SetWriteDeadline => "error setting write deadline on upstreams",
            Operation::Close => "error closing upstreams",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.context())
    }
}

/// Combined error of one fan-out call.
///
/// Holds the message of every upstream that failed, in upstream order, and
/// the byte count the call produced alongside the failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op}: {}", .messages.join("; "))]
pub struct FanOutError {
    op: Operation,
    transferred: usize,
    messages: Vec<String>,
}

impl FanOutError {
    pub(crate) fn new(op: Operation, transferred: usize, messages: Vec<String>) -> Self {
        FanOutError { op, transferred, messages }
    }

    /// The operation that failed.
    pub fn operation(&self) -> Operation {
        self.op
    }

    /// Bytes read or written before the error was synthesized.
    pub fn transferred(&self) -> usize {
        self.transferred
    }

    /// One message per failing upstream.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl From<FanOutError> for io::Error {
    fn from(err: FanOutError) -> io::Error {
        io::Error::other(err)
    }
}
