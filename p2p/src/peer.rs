//! A single remote peer.
//!
//! A [`Peer`] is a state machine wrapping one connection. It performs the version
//! handshake, answers keep-alives, turns inventory announcements into data requests,
//! assembles filtered blocks out of the `merkleblock` and `tx` messages that make
//! them up, and reports everything of interest to its [`Listener`].
//!
//! The steps for an *outbound* handshake are:
//!
//!   1. Send `version` message.
//!   2. Expect `version` message from remote, and acknowledge it with `verack`.
//!   3. Expect `verack` message from remote.
//!
//! Steps 2 and 3 may happen in any order. Once both are done, the peer is
//! *connected*. A peer that doesn't complete the handshake within
//! [`HANDSHAKE_TIMEOUT`], or stops answering our pings, is dropped. Deadlines are
//! only checked when the owner calls [`Peer::received_timeout`].
//!
//! A peer never performs I/O other than sending on its connection. Incoming traffic
//! is handed to it by its owner, one message at a time, via [`Peer::received`].
use std::collections::HashMap;
use std::sync::Arc;
use std::{fmt, io, net};

use log::*;

use lightsync_common::bitcoin::network::constants::ServiceFlags;
use lightsync_common::block::{BlockHash, BlockHeader, MerkleBlock, Transaction, Txid};
use lightsync_common::message::{InventoryItem, Locators, Message, Version};
use lightsync_net::{Clock, Connection, LocalDuration, LocalTime, PeerId, SystemClock};

pub mod assembly;
pub use assembly::MerkleBlockAssembly;

#[cfg(test)]
mod tests;

/// Protocol version advertised to peers.
pub const PROTOCOL_VERSION: u32 = 70015;
/// Minimum supported peer protocol version. Peers below this version don't
/// support bloom filtering.
pub const MIN_PROTOCOL_VERSION: u32 = 70001;
/// User agent advertised to peers.
pub const USER_AGENT: &str = "/lightsync:0.1.0/";
/// Services a peer is required to offer.
pub const REQUIRED_SERVICES: ServiceFlags = ServiceFlags::NETWORK;
/// How long transactions we relayed are kept around, to answer `getdata` requests.
pub const RELAY_CACHE_TIMEOUT: LocalDuration = LocalDuration::from_mins(5);
/// Time to wait for the handshake to complete.
pub const HANDSHAKE_TIMEOUT: LocalDuration = LocalDuration::from_secs(10);
/// Time interval to wait between sent pings.
pub const PING_INTERVAL: LocalDuration = LocalDuration::from_mins(2);
/// Time to wait to receive a pong when sending a ping.
pub const PING_TIMEOUT: LocalDuration = LocalDuration::from_secs(30);

/// Reason why a peer was disconnected.
#[derive(Debug, Clone)]
pub enum DisconnectReason {
    /// Peer protocol version is too old.
    PeerProtocolVersion(u32),
    /// Peer doesn't have the required services.
    PeerServices(ServiceFlags),
    /// Peer has no usable chain.
    PeerHeight(i32),
    /// Peer is misbehaving.
    PeerMisbehaving(&'static str),
    /// Peer didn't answer in time.
    PeerTimeout(&'static str),
    /// The connection failed.
    ConnectionError(Arc<io::Error>),
}

impl DisconnectReason {
    /// Whether the reason is specific to the remote's configuration, as opposed to
    /// the connection itself.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::ConnectionError(_) | Self::PeerTimeout(_))
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerProtocolVersion(v) => write!(f, "peer protocol version {} is too old", v),
            Self::PeerServices(s) => write!(f, "peer doesn't have the required services ({})", s),
            Self::PeerHeight(h) => write!(f, "peer height {} is too low", h),
            Self::PeerMisbehaving(reason) => write!(f, "peer misbehaving: {}", reason),
            Self::PeerTimeout(what) => write!(f, "peer timed out: {}", what),
            Self::ConnectionError(err) => write!(f, "connection error: {}", err),
        }
    }
}

impl std::error::Error for DisconnectReason {}

/// Peer connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Handshake in progress.
    Connecting,
    /// Handshake complete.
    Connected,
    /// Connection is gone. Terminal.
    Disconnected,
}

/// Receives notifications from a [`Peer`].
///
/// All methods are called synchronously from the thread that drives the peer.
pub trait Listener {
    /// Whether an announced item should be requested from the peer.
    fn should_request(&self, item: &InventoryItem) -> bool;
    /// The handshake completed.
    fn connected(&mut self, peer: PeerId, version: &Version);
    /// Block headers were received.
    fn on_receive_headers(&mut self, peer: PeerId, headers: Vec<BlockHeader>);
    /// A requested filtered block was received, with all its matched transactions.
    fn on_receive_merkle_block(&mut self, peer: PeerId, block: MerkleBlock);
    /// A transaction unrelated to any pending filtered block was received.
    fn on_receive_transaction(&mut self, peer: PeerId, tx: Transaction);
    /// Peer addresses were received.
    fn on_receive_addresses(&mut self, _peer: PeerId, _addrs: Vec<net::SocketAddr>) {}
    /// The peer disconnected. `outstanding` holds the filtered blocks that were
    /// requested but not delivered, in request order. A `None` reason means the
    /// connection was closed cleanly.
    fn disconnected(
        &mut self,
        peer: PeerId,
        reason: Option<DisconnectReason>,
        outstanding: Vec<BlockHash>,
    );
}

/// Local parameters of the handshake, and peer deadlines.
#[derive(Debug, Clone)]
pub struct Config {
    /// Protocol version to advertise.
    pub protocol_version: u32,
    /// Services to advertise.
    pub services: ServiceFlags,
    /// User agent to advertise.
    pub user_agent: String,
    /// Height of our best chain.
    pub start_height: i32,
    /// Whether we want transactions relayed to us before a filter is loaded.
    pub relay: bool,
    /// Time to wait for the handshake to complete.
    pub handshake_timeout: LocalDuration,
    /// Time to wait between pings.
    pub ping_interval: LocalDuration,
    /// Time to wait for a pong.
    pub ping_timeout: LocalDuration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            services: ServiceFlags::NONE,
            user_agent: USER_AGENT.to_owned(),
            start_height: 0,
            relay: false,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            ping_interval: PING_INTERVAL,
            ping_timeout: PING_TIMEOUT,
        }
    }
}

/// Keep-alive state.
#[derive(Debug, Clone, Copy)]
enum Ping {
    Idle { since: LocalTime },
    AwaitingPong { nonce: u64, since: LocalTime },
}

/// A remote peer.
pub struct Peer<C, L, K = SystemClock> {
    /// Remote address.
    pub addr: PeerId,

    state: State,
    config: Config,
    conn: C,
    listener: L,
    clock: K,
    /// The remote's accepted `version` message.
    version: Option<Version>,
    /// Whether the remote acknowledged our `version`.
    verack: bool,
    /// When the handshake started.
    since: LocalTime,
    ping: Ping,
    /// The last header request that wasn't answered yet.
    headers: Option<Locators>,
    /// Filtered blocks requested and not yet delivered, in request order.
    pending: Vec<BlockHash>,
    /// Filtered blocks waiting for their transactions.
    assemblies: HashMap<BlockHash, MerkleBlockAssembly>,
    /// Transactions we relayed, along with the time they were relayed.
    relayed: HashMap<Txid, (Transaction, LocalTime)>,
}

impl<C, L, K> fmt::Debug for Peer<C, L, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("addr", &self.addr)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("assemblies", &self.assemblies.len())
            .finish()
    }
}

impl<C: Connection<Message>, L: Listener> Peer<C, L> {
    /// Create a new peer over an established connection.
    pub fn new(addr: PeerId, conn: C, listener: L, config: Config) -> Self {
        Self::with_clock(addr, conn, listener, config, SystemClock)
    }
}

impl<C: Connection<Message>, L: Listener, K: Clock> Peer<C, L, K> {
    /// Create a new peer, with a custom clock.
    pub fn with_clock(addr: PeerId, conn: C, listener: L, config: Config, clock: K) -> Self {
        let since = clock.local_time();

        Self {
            addr,
            state: State::Connecting,
            config,
            conn,
            listener,
            clock,
            version: None,
            verack: false,
            since,
            ping: Ping::Idle { since },
            headers: None,
            pending: Vec::new(),
            assemblies: HashMap::new(),
            relayed: HashMap::new(),
        }
    }

    /// Start the handshake by sending our `version`.
    pub fn initialize(&mut self) {
        self.since = self.clock.local_time();

        let version = Version {
            version: self.config.protocol_version,
            services: self.config.services,
            timestamp: self.since.as_secs() as i64,
            nonce: fastrand::u64(..),
            user_agent: self.config.user_agent.clone(),
            start_height: self.config.start_height,
            relay: self.config.relay,
        };
        self.send(Message::Version(version));
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the handshake completed and the connection is still up.
    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    /// Whether no filtered block requests are outstanding. Header requests are not
    /// taken into account.
    pub fn is_free(&self) -> bool {
        self.pending.is_empty()
    }

    /// The remote's `version`, once received and accepted.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Filtered blocks requested and not yet delivered.
    pub fn pending(&self) -> &[BlockHash] {
        &self.pending
    }

    /// Whether a header request is awaiting its answer.
    pub fn is_syncing_headers(&self) -> bool {
        self.headers.is_some()
    }

    /// Request block headers. Does nothing unless connected.
    pub fn request_headers(&mut self, locators: Locators) {
        if !self.is_connected() {
            debug!(target: "p2p", "{}: Not connected, ignoring header request", self.addr);
            return;
        }
        self.headers = Some(locators.clone());
        self.send(Message::GetHeaders(locators));
    }

    /// Request filtered blocks. Requests accumulate: hashes already pending are
    /// not requested twice. Does nothing unless connected.
    pub fn request_merkle_blocks(&mut self, hashes: Vec<BlockHash>) {
        if !self.is_connected() {
            debug!(target: "p2p", "{}: Not connected, ignoring block request", self.addr);
            return;
        }
        let mut items = Vec::with_capacity(hashes.len());

        for hash in hashes {
            if self.pending.contains(&hash) {
                continue;
            }
            self.pending.push(hash);
            items.push(InventoryItem::FilteredBlock(hash));
        }
        if items.is_empty() {
            return;
        }
        debug!(
            target: "p2p",
            "{}: Requesting {} filtered block(s) ({} pending)",
            self.addr,
            items.len(),
            self.pending.len()
        );
        self.send(Message::GetData(items));
    }

    /// Announce a transaction to the remote, and keep it around to answer the
    /// remote's `getdata`.
    pub fn relay(&mut self, tx: Transaction) {
        let now = self.clock.local_time();
        let txid = tx.txid();

        self.prune_relayed(now);
        self.relayed.insert(txid, (tx, now));
        self.send(Message::Inv(vec![InventoryItem::Tx(txid)]));
    }

    /// Process a message received from the remote.
    pub fn received(&mut self, msg: Message) {
        if self.state == State::Disconnected {
            return;
        }
        trace!(target: "p2p", "{}: Received {:?}", self.addr, msg);

        match msg {
            Message::Version(version) => self.received_version(version),
            Message::Verack => self.received_verack(),
            // Nothing but the handshake is processed until the handshake is done.
            msg if !self.is_connected() => {
                debug!(
                    target: "p2p",
                    "{}: Ignoring `{}` received during handshake",
                    self.addr,
                    msg.cmd()
                );
            }
            Message::Ping(nonce) => self.send(Message::Pong(nonce)),
            Message::Pong(nonce) => self.received_pong(nonce),
            Message::Addr(addrs) => self.listener.on_receive_addresses(self.addr, addrs),
            Message::Headers(headers) => {
                self.headers = None;
                self.listener.on_receive_headers(self.addr, headers);
            }
            Message::Inv(items) => self.received_inv(items),
            Message::GetData(items) => self.received_getdata(items),
            Message::MerkleBlock(block) => self.received_merkle_block(block),
            Message::Transaction(tx) => self.received_tx(tx),
            Message::GetHeaders(_) => {
                debug!(target: "p2p", "{}: Ignoring `getheaders` request", self.addr);
            }
        }
    }

    /// The connection is gone. Reports the outstanding filtered block requests to
    /// the listener and moves to the terminal state. Idempotent.
    pub fn disconnected(&mut self, reason: Option<DisconnectReason>) {
        if self.state == State::Disconnected {
            return;
        }
        match &reason {
            Some(reason) => debug!(target: "p2p", "{}: Disconnected: {}", self.addr, reason),
            None => debug!(target: "p2p", "{}: Disconnected", self.addr),
        }
        self.state = State::Disconnected;
        self.headers = None;
        self.assemblies.clear();

        let outstanding = std::mem::take(&mut self.pending);

        self.listener.disconnected(self.addr, reason, outstanding);
    }

    /// Check deadlines. Drops the peer if the handshake takes too long, or if a
    /// ping goes unanswered. Sends a ping when one is due.
    pub fn received_timeout(&mut self) {
        let now = self.clock.local_time();

        match self.state {
            State::Connecting => {
                if now - self.since >= self.config.handshake_timeout {
                    self.reject(DisconnectReason::PeerTimeout("handshake"));
                }
            }
            State::Connected => match self.ping {
                Ping::AwaitingPong { since, .. } => {
                    if now - since >= self.config.ping_timeout {
                        self.reject(DisconnectReason::PeerTimeout("ping"));
                    }
                }
                Ping::Idle { since } => {
                    if now - since >= self.config.ping_interval {
                        let nonce = fastrand::u64(..);

                        self.ping = Ping::AwaitingPong { nonce, since: now };
                        self.send(Message::Ping(nonce));
                    }
                }
            },
            State::Disconnected => {}
        }
    }

    /// Close the connection without notifying the listener. Outstanding requests
    /// are dropped.
    pub fn close(&mut self) {
        self.conn.close();
        self.state = State::Disconnected;
        self.pending.clear();
        self.assemblies.clear();
    }

    fn received_version(&mut self, version: Version) {
        if self.state != State::Connecting || self.version.is_some() {
            return self.reject(DisconnectReason::PeerMisbehaving("duplicate `version`"));
        }
        debug!(
            target: "p2p",
            "{}: Peer version = {}, height = {}, agent = {}, services = {}",
            self.addr,
            version.version,
            version.start_height,
            version.user_agent,
            version.services
        );

        if version.start_height <= 0 {
            return self.reject(DisconnectReason::PeerHeight(version.start_height));
        }
        if !version.services.has(REQUIRED_SERVICES) {
            return self.reject(DisconnectReason::PeerServices(version.services));
        }
        if version.version < MIN_PROTOCOL_VERSION {
            return self.reject(DisconnectReason::PeerProtocolVersion(version.version));
        }
        self.version = Some(version);
        self.send(Message::Verack);
        self.negotiated();
    }

    fn received_verack(&mut self) {
        if self.state != State::Connecting || self.verack {
            return self.reject(DisconnectReason::PeerMisbehaving("duplicate `verack`"));
        }
        self.verack = true;
        self.negotiated();
    }

    fn negotiated(&mut self) {
        if !self.verack {
            return;
        }
        if let Some(version) = &self.version {
            self.state = State::Connected;
            self.ping = Ping::Idle {
                since: self.clock.local_time(),
            };

            info!(target: "p2p", "{}: Peer negotiated ({})", self.addr, version.user_agent);

            self.listener.connected(self.addr, version);
        }
    }

    fn received_pong(&mut self, nonce: u64) {
        match self.ping {
            Ping::AwaitingPong { nonce: expected, .. } if nonce == expected => {
                self.ping = Ping::Idle {
                    since: self.clock.local_time(),
                };
            }
            // Unsolicited or redundant `pong`.
            _ => {}
        }
    }

    fn received_inv(&mut self, items: Vec<InventoryItem>) {
        let mut wanted = Vec::new();

        for item in items {
            if !self.listener.should_request(&item) {
                continue;
            }
            let item = item.filtered();

            // Filtered blocks we ask for are expected, like the ones requested
            // explicitly.
            if let InventoryItem::FilteredBlock(hash) = item {
                if self.pending.contains(&hash) {
                    continue;
                }
                self.pending.push(hash);
            }
            wanted.push(item);
        }
        if !wanted.is_empty() {
            self.send(Message::GetData(wanted));
        }
    }

    fn received_getdata(&mut self, items: Vec<InventoryItem>) {
        let now = self.clock.local_time();

        self.prune_relayed(now);

        for item in items {
            if let InventoryItem::Tx(txid) = item {
                if let Some((tx, _)) = self.relayed.get(&txid) {
                    let tx = tx.clone();
                    self.send(Message::Transaction(tx));
                    continue;
                }
            }
            debug!(target: "p2p", "{}: Unable to serve {}", self.addr, item);
        }
    }

    fn received_merkle_block(&mut self, block: MerkleBlock) {
        let hash = block.block_hash();

        if !self.pending.contains(&hash) {
            debug!(target: "p2p", "{}: Ignoring unsolicited merkle block {}", self.addr, hash);
            return;
        }
        if block.associated.is_empty() && !self.assemblies.contains_key(&hash) {
            return self.complete(block);
        }
        self.assemblies
            .entry(hash)
            .and_modify(|a| a.merge(block.clone()))
            .or_insert_with(|| MerkleBlockAssembly::new(block));
    }

    fn received_tx(&mut self, tx: Transaction) {
        let txid = tx.txid();
        let hash = self
            .assemblies
            .iter()
            .find(|(_, a)| a.expects(&txid))
            .map(|(hash, _)| *hash);

        let Some(hash) = hash else {
            return self.listener.on_receive_transaction(self.addr, tx);
        };
        let complete = self
            .assemblies
            .get_mut(&hash)
            .map(|a| a.add(tx) && a.is_complete())
            .unwrap_or(false);

        if complete {
            if let Some(assembly) = self.assemblies.remove(&hash) {
                self.complete(assembly.finish());
            }
        }
    }

    fn complete(&mut self, block: MerkleBlock) {
        let hash = block.block_hash();

        self.pending.retain(|h| *h != hash);

        debug!(
            target: "p2p",
            "{}: Received merkle block {} with {} transaction(s)",
            self.addr,
            hash,
            block.transactions.len()
        );
        self.listener.on_receive_merkle_block(self.addr, block);
    }

    fn reject(&mut self, reason: DisconnectReason) {
        warn!(target: "p2p", "{}: Dropping peer: {}", self.addr, reason);

        self.conn.close();
        self.disconnected(Some(reason));
    }

    fn prune_relayed(&mut self, now: LocalTime) {
        self.relayed
            .retain(|_, (_, time)| now - *time < RELAY_CACHE_TIMEOUT);
    }

    fn send(&mut self, msg: Message) {
        trace!(target: "p2p", "{}: Sending {:?}", self.addr, msg);

        if let Err(err) = self.conn.send(msg) {
            // The transport reports the disconnection separately.
            debug!(target: "p2p", "{}: Send failed: {}", self.addr, err);
        }
    }
}
