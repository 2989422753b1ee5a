//! Networking errors.
use std::io;

use crossbeam_channel as chan;
use thiserror::Error;

/// An error occuring in the transport layer.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The connection was already closed.
    #[error("connection closed")]
    Closed,
    /// The owner of the connection is gone.
    #[error("channel disconnected")]
    Channel,
}

impl<T> From<chan::SendError<T>> for Error {
    fn from(_: chan::SendError<T>) -> Self {
        Self::Channel
    }
}
