//! Peer-to-peer errors.
use std::io;

use crossbeam_channel as chan;
use thiserror::Error;

use crate::group::Command;

/// An error occuring in the peer group or one of its handles.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// An error coming from the networking sub-system.
    #[error(transparent)]
    Net(#[from] lightsync_net::Error),
    /// The peer group was started already.
    #[error("peer group was already started")]
    AlreadyStarted,
    /// The peer group isn't running, or was closed.
    #[error("peer group is not running")]
    NotRunning,
    /// The peer group thread panicked.
    #[error("peer group thread panicked")]
    Panicked,
    /// A request timed out.
    #[error("request timed out")]
    Timeout,
}

impl From<chan::SendError<Command>> for Error {
    fn from(_: chan::SendError<Command>) -> Self {
        Self::NotRunning
    }
}

impl From<chan::RecvError> for Error {
    fn from(_: chan::RecvError) -> Self {
        Self::NotRunning
    }
}

impl From<chan::RecvTimeoutError> for Error {
    fn from(err: chan::RecvTimeoutError) -> Self {
        match err {
            chan::RecvTimeoutError::Timeout => Self::Timeout,
            chan::RecvTimeoutError::Disconnected => Self::NotRunning,
        }
    }
}
