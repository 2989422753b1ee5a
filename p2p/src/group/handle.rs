//! Handles are used to communicate with a running peer group, from any thread.
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time;

use crossbeam_channel as chan;

use lightsync_common::block::{BlockHash, Transaction};
use lightsync_common::message::Locators;
use lightsync_net::PeerId;

use crate::error::Error;
use crate::group::Status;
use crate::peer::State;

/// A command sent to the peer group.
pub enum Command {
    /// Request headers from any connected peer.
    RequestHeaders(Locators),
    /// Request filtered blocks, optionally from a specific peer.
    RequestMerkleBlocks(Vec<BlockHash>, Option<PeerId>),
    /// Relay a transaction to all connected peers.
    Relay(Transaction),
    /// Add peer addresses to the pool.
    ImportAddresses(Vec<PeerId>),
    /// Get information on all peers.
    GetPeers(chan::Sender<Vec<PeerInfo>>),
    /// Disconnect all peers and stop. Acknowledged once teardown completes.
    Close(chan::Sender<()>),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestHeaders((locators, stop)) => {
                write!(f, "RequestHeaders({:?}, {})", locators, stop)
            }
            Self::RequestMerkleBlocks(hashes, peer) => {
                write!(f, "RequestMerkleBlocks({} block(s), {:?})", hashes.len(), peer)
            }
            Self::Relay(tx) => write!(f, "Relay({})", tx.txid()),
            Self::ImportAddresses(addrs) => write!(f, "ImportAddresses({:?})", addrs),
            Self::GetPeers(_) => write!(f, "GetPeers"),
            Self::Close(_) => write!(f, "Close"),
        }
    }
}

/// Information about a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Peer address.
    pub addr: PeerId,
    /// Connection state.
    pub state: State,
    /// Whether the peer has no outstanding filtered block requests.
    pub free: bool,
    /// Number of outstanding filtered block requests.
    pub pending: usize,
    /// User agent, once the handshake is done.
    pub user_agent: Option<String>,
    /// Start height, once the handshake is done.
    pub height: Option<i32>,
}

/// A handle to a running peer group.
///
/// Requests don't wait for the peer group to act on them, so they may be issued
/// from within [`crate::group::Syncer`] callbacks. Queries and [`Handle::close`]
/// block, and must not be used from those callbacks.
#[derive(Debug, Clone)]
pub struct Handle {
    commands: chan::Sender<Command>,
    status: Arc<Mutex<Status>>,
    timeout: time::Duration,
}

impl Handle {
    pub(crate) fn new(commands: chan::Sender<Command>, status: Arc<Mutex<Status>>) -> Self {
        Self {
            commands,
            status,
            timeout: time::Duration::from_secs(60),
        }
    }

    /// Current status of the peer group.
    pub fn status(&self) -> Status {
        super::status(&self.status)
    }

    /// Set the timeout for queries.
    pub fn set_timeout(&mut self, timeout: time::Duration) {
        self.timeout = timeout;
    }

    /// Request block headers from a connected peer.
    pub fn request_headers(&self, locators: Locators) -> Result<(), Error> {
        self.command(Command::RequestHeaders(locators))
    }

    /// Request filtered blocks. The request is handed to a free peer, or buffered
    /// until one is available.
    pub fn request_merkle_blocks(&self, hashes: Vec<BlockHash>) -> Result<(), Error> {
        if hashes.is_empty() {
            return Ok(());
        }
        self.command(Command::RequestMerkleBlocks(hashes, None))
    }

    /// Request filtered blocks from a specific peer. If that peer isn't connected
    /// and free, the request is routed like [`Handle::request_merkle_blocks`].
    pub fn request_merkle_blocks_from(
        &self,
        peer: PeerId,
        hashes: Vec<BlockHash>,
    ) -> Result<(), Error> {
        if hashes.is_empty() {
            return Ok(());
        }
        self.command(Command::RequestMerkleBlocks(hashes, Some(peer)))
    }

    /// Relay a transaction to all connected peers.
    pub fn relay(&self, tx: Transaction) -> Result<(), Error> {
        self.command(Command::Relay(tx))
    }

    /// Add peer addresses to the pool.
    pub fn import_addresses(&self, addrs: Vec<PeerId>) -> Result<(), Error> {
        self.command(Command::ImportAddresses(addrs))
    }

    /// Get information on all peers, connecting or connected.
    pub fn peers(&self) -> Result<Vec<PeerInfo>, Error> {
        let (tx, rx) = chan::bounded(1);

        self.command(Command::GetPeers(tx))?;

        Ok(rx.recv_timeout(self.timeout)?)
    }

    /// Disconnect all peers and stop the peer group. Blocks until teardown is
    /// complete. Closing a peer group that isn't running, ie. that was not
    /// started yet or is already closed, has no effect.
    pub fn close(&self) -> Result<(), Error> {
        // Nobody would acknowledge.
        if matches!(self.status(), Status::Idle | Status::Closed) {
            return Ok(());
        }
        let (tx, rx) = chan::bounded(1);

        if self.commands.send(Command::Close(tx)).is_err() {
            return Ok(());
        }
        // The sender is dropped without an acknowledgement if the group stopped
        // in the meantime.
        rx.recv().ok();

        Ok(())
    }

    fn command(&self, cmd: Command) -> Result<(), Error> {
        self.commands.send(cmd)?;

        Ok(())
    }
}
