//! Peer group.
//!
//! Maintains a set of peer connections, keeping it at a target size, and routes
//! requests from the [`Syncer`] to the peers. Filtered block requests are handed to
//! *free* peers, ie. peers with no outstanding filtered block requests. When a peer
//! disconnects before delivering, its outstanding requests are handed to another
//! free peer, or buffered until one becomes available.
//!
//! All peer state is owned by a single coordinator thread. Transports deliver
//! incoming traffic to it over a channel, dial attempts run on short-lived threads
//! and report back over another, and [`Handle`]s send it commands over a third.
//! Peers report to the coordinator through a listener that forwards the syncer's
//! notifications immediately, and queues connection events to be processed once
//! the peer is done handling its input.
//!
//! Peers that stall, during the handshake or after it, are dropped when their
//! deadlines pass. Deadlines are checked after every input, and at least once per
//! second.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::{fmt, io, net, thread, time};

use crossbeam_channel as chan;
use log::*;

use lightsync_common::bitcoin::network::constants::ServiceFlags;
use lightsync_common::block::{BlockHash, BlockHeader, MerkleBlock, Transaction};
use lightsync_common::collections::AddressBook;
use lightsync_common::message::{InventoryItem, Locators, Message, Version};
use lightsync_common::network::Network;
use lightsync_common::p2p::peer::Source;
use lightsync_net::{
    Connection, Delivery, Inbox, LinkId, LocalDuration, LocalTime, PeerId, Transport,
};

use crate::error::Error;
use crate::peer::{self, DisconnectReason, Peer};
use crate::pool::{AddressPool, NoAddressAvailable};

pub mod handle;
pub use handle::{Command, Handle, PeerInfo};


/// Target number of connected peers.
pub const TARGET_PEER_COUNT: usize = 8;
/// Time after which connections are maintained again, even if nothing happened.
pub const IDLE_TIMEOUT: LocalDuration = LocalDuration::from_secs(30);
/// Longest time the coordinator waits before checking peer deadlines.
const TIMER_RESOLUTION: time::Duration = time::Duration::from_secs(1);

/// Receives data and readiness notifications from the peer group.
///
/// Callbacks are invoked from the peer group's thread, one at a time. They may
/// issue requests through a [`Handle`], but must not block on it.
pub trait Syncer: Send + Sync + 'static {
    /// At least one peer is connected, where none was before.
    fn on_ready(&self);
    /// Whether an item announced by a peer should be requested.
    fn should_request(&self, item: &InventoryItem) -> bool;
    /// Block headers were received.
    fn on_receive_headers(&self, peer: PeerId, headers: Vec<BlockHeader>);
    /// A requested filtered block was received, with its matched transactions.
    fn on_receive_merkle_block(&self, peer: PeerId, block: MerkleBlock);
    /// A transaction that isn't part of a filtered block was received.
    fn on_receive_transaction(&self, peer: PeerId, tx: Transaction);
    /// A peer disconnected. Its outstanding requests were already handed to
    /// other peers, or buffered.
    fn on_peer_disconnected(&self, _peer: PeerId, _reason: Option<&DisconnectReason>) {}
}

/// Peer group configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bitcoin network.
    pub network: Network,
    /// Number of peers to keep connected.
    pub target_peer_count: usize,
    /// Addresses to add to the pool on start.
    pub connect: Vec<net::SocketAddr>,
    /// Protocol version advertised to peers.
    pub protocol_version: u32,
    /// Services advertised to peers.
    pub services: ServiceFlags,
    /// User agent advertised to peers.
    pub user_agent: String,
    /// Height of our best chain, advertised to peers.
    pub start_height: i32,
    /// Whether peers should relay transactions to us before a filter is loaded.
    pub relay: bool,
    /// Time after which connections are maintained again if nothing happened.
    pub idle_timeout: LocalDuration,
    /// Time peers are given to complete the handshake.
    pub handshake_timeout: LocalDuration,
    /// Time between pings sent to each peer.
    pub ping_interval: LocalDuration,
    /// Time peers are given to answer a ping.
    pub ping_timeout: LocalDuration,
    /// Peer group name. Used for logging and thread names only.
    pub name: &'static str,
}

impl Default for Config {
    fn default() -> Self {
        let peer = peer::Config::default();

        Self {
            network: Network::default(),
            target_peer_count: TARGET_PEER_COUNT,
            connect: Vec::new(),
            protocol_version: peer.protocol_version,
            services: peer.services,
            user_agent: peer.user_agent,
            start_height: peer.start_height,
            relay: peer.relay,
            idle_timeout: IDLE_TIMEOUT,
            handshake_timeout: peer.handshake_timeout,
            ping_interval: peer.ping_interval,
            ping_timeout: peer.ping_timeout,
            name: "self",
        }
    }
}

impl Config {
    /// Add seeds to connect to.
    pub fn seed<T: net::ToSocketAddrs + fmt::Debug>(&mut self, seeds: &[T]) -> io::Result<()> {
        let connect = seeds
            .iter()
            .flat_map(|seed| match seed.to_socket_addrs() {
                Ok(addrs) => addrs.map(Ok).collect(),
                Err(err) => vec![Err(err)],
            })
            .collect::<io::Result<Vec<_>>>()?;

        self.connect.extend(connect);

        Ok(())
    }

    fn peer(&self) -> peer::Config {
        peer::Config {
            protocol_version: self.protocol_version,
            services: self.services,
            user_agent: self.user_agent.clone(),
            start_height: self.start_height,
            relay: self.relay,
            handshake_timeout: self.handshake_timeout,
            ping_interval: self.ping_interval,
            ping_timeout: self.ping_timeout,
        }
    }
}

/// Peer group lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Created, not started.
    Idle,
    /// Starting up.
    Starting,
    /// Maintaining connections.
    Running,
    /// Disconnecting peers.
    Closing,
    /// Stopped. Terminal.
    Closed,
}

/// A group of peers.
pub struct PeerGroup<T: Transport<Message>, S: Syncer> {
    config: Config,
    transport: Arc<T>,
    syncer: Arc<S>,
    pool: Option<AddressPool>,
    status: Arc<Mutex<Status>>,
    commands: chan::Sender<Command>,
    receiver: Option<chan::Receiver<Command>>,
    thread: Option<thread::JoinHandle<AddressPool>>,
}

impl<T: Transport<Message>, S: Syncer> PeerGroup<T, S> {
    /// Create a new peer group. Peers are dialed from the given pool, to which the
    /// configured addresses are added on start.
    pub fn new(config: Config, pool: AddressPool, transport: T, syncer: Arc<S>) -> Self {
        let (commands, receiver) = chan::unbounded();

        Self {
            config,
            transport: Arc::new(transport),
            syncer,
            pool: Some(pool),
            status: Arc::new(Mutex::new(Status::Idle)),
            commands,
            receiver: Some(receiver),
            thread: None,
        }
    }

    /// Get a handle to the peer group. Commands sent before the group is started
    /// are processed once it starts.
    pub fn handle(&self) -> Handle {
        Handle::new(self.commands.clone(), self.status.clone())
    }

    /// Current status.
    pub fn status(&self) -> Status {
        status(&self.status)
    }

    /// Start connecting to peers, on a separate thread.
    pub fn start(&mut self) -> Result<Handle, Error> {
        let (Some(pool), Some(commands)) = (self.pool.take(), self.receiver.take()) else {
            return Err(Error::AlreadyStarted);
        };
        set_status(&self.status, Status::Starting);

        let coordinator = Coordinator::new(
            self.config.clone(),
            pool,
            self.transport.clone(),
            self.syncer.clone(),
            commands,
            self.status.clone(),
        );
        let thread = thread::Builder::new()
            .name(format!("{}/group", self.config.name))
            .spawn(move || coordinator.run());

        match thread {
            Ok(thread) => self.thread = Some(thread),
            Err(err) => {
                set_status(&self.status, Status::Closed);
                return Err(err.into());
            }
        }
        Ok(self.handle())
    }

    /// Request block headers. See [`Handle::request_headers`].
    pub fn request_headers(&self, locators: Locators) -> Result<(), Error> {
        self.handle().request_headers(locators)
    }

    /// Request filtered blocks. See [`Handle::request_merkle_blocks`].
    pub fn request_merkle_blocks(&self, hashes: Vec<BlockHash>) -> Result<(), Error> {
        self.handle().request_merkle_blocks(hashes)
    }

    /// Relay a transaction. See [`Handle::relay`].
    pub fn relay(&self, tx: Transaction) -> Result<(), Error> {
        self.handle().relay(tx)
    }

    /// Disconnect all peers and stop. Blocks until teardown is complete, and
    /// returns the address pool, with the connection history of this session.
    pub fn close(&mut self) -> Result<Option<AddressPool>, Error> {
        if self.thread.is_none() {
            // Never started, nothing to tear down. Queued commands are dropped.
            self.receiver = None;
            set_status(&self.status, Status::Closing);
            set_status(&self.status, Status::Closed);

            return Ok(self.pool.take());
        }
        self.handle().close()?;
        self.join()
    }

    /// Wait for the peer group to stop, and return its address pool.
    pub fn join(&mut self) -> Result<Option<AddressPool>, Error> {
        match self.thread.take() {
            Some(thread) => thread.join().map(Some).map_err(|_| Error::Panicked),
            None => Ok(self.pool.take()),
        }
    }
}

fn status(status: &Mutex<Status>) -> Status {
    match status.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn set_status(status: &Mutex<Status>, value: Status) {
    match status.lock() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

/// Connection events queued by peers for the coordinator.
#[derive(Debug)]
enum PeerEvent {
    Connected(PeerId),
    Addresses(PeerId, Vec<net::SocketAddr>),
    Disconnected(PeerId, Option<DisconnectReason>, Vec<BlockHash>),
}

/// Peer listener used by the coordinator.
struct Upstream<S> {
    syncer: Arc<S>,
    events: chan::Sender<PeerEvent>,
}

impl<S: Syncer> peer::Listener for Upstream<S> {
    fn should_request(&self, item: &InventoryItem) -> bool {
        self.syncer.should_request(item)
    }

    fn connected(&mut self, peer: PeerId, _version: &Version) {
        self.events.send(PeerEvent::Connected(peer)).ok();
    }

    fn on_receive_headers(&mut self, peer: PeerId, headers: Vec<BlockHeader>) {
        self.syncer.on_receive_headers(peer, headers);
    }

    fn on_receive_merkle_block(&mut self, peer: PeerId, block: MerkleBlock) {
        self.syncer.on_receive_merkle_block(peer, block);
    }

    fn on_receive_transaction(&mut self, peer: PeerId, tx: Transaction) {
        self.syncer.on_receive_transaction(peer, tx);
    }

    fn on_receive_addresses(&mut self, peer: PeerId, addrs: Vec<net::SocketAddr>) {
        self.events.send(PeerEvent::Addresses(peer, addrs)).ok();
    }

    fn disconnected(
        &mut self,
        peer: PeerId,
        reason: Option<DisconnectReason>,
        outstanding: Vec<BlockHash>,
    ) {
        self.events
            .send(PeerEvent::Disconnected(peer, reason, outstanding))
            .ok();
    }
}

/// Stack size of dialing threads, in bytes.
const DIAL_STACK_SIZE: usize = 256 * 1024;

/// Result of a dial attempt.
type Dialed<C> = (PeerId, LinkId, io::Result<C>);

/// A peer, along with the connection it runs on.
struct Slot<C, S> {
    link: LinkId,
    peer: Peer<C, Upstream<S>>,
    /// Whether the handshake completed.
    negotiated: bool,
}

/// A dial attempt in progress.
struct Dial {
    link: LinkId,
    /// Deliveries that arrived before the dial attempt reported back.
    early: Vec<Delivery<Message>>,
}

/// Outcome of a coordinator step.
enum Control {
    Continue,
    Stop(Option<chan::Sender<()>>),
}

/// Owns all peers, and drives them from a single thread.
struct Coordinator<T: Transport<Message>, S: Syncer> {
    config: Config,
    pool: AddressPool,
    transport: Arc<T>,
    syncer: Arc<S>,
    peers: AddressBook<PeerId, Slot<T::Connection, S>>,
    dialing: HashMap<PeerId, Dial>,
    dials: Vec<thread::JoinHandle<()>>,
    /// Filtered blocks waiting for a free peer.
    buffered: Vec<BlockHash>,
    /// Header request waiting for a connected peer.
    headers: Option<Locators>,
    /// Whether the syncer was told we're ready, since the last time we had no
    /// connected peers.
    ready: bool,
    last_link: LinkId,
    last_idle: LocalTime,
    status: Arc<Mutex<Status>>,

    commands: chan::Receiver<Command>,
    inbox: chan::Sender<Delivery<Message>>,
    deliveries: chan::Receiver<Delivery<Message>>,
    dialer: chan::Sender<Dialed<T::Connection>>,
    dialed: chan::Receiver<Dialed<T::Connection>>,
    upstream: chan::Sender<PeerEvent>,
    events: chan::Receiver<PeerEvent>,
}

impl<T: Transport<Message>, S: Syncer> Coordinator<T, S> {
    fn new(
        config: Config,
        mut pool: AddressPool,
        transport: Arc<T>,
        syncer: Arc<S>,
        commands: chan::Receiver<Command>,
        status: Arc<Mutex<Status>>,
    ) -> Self {
        let (inbox, deliveries) = chan::unbounded();
        let (dialer, dialed) = chan::unbounded();
        let (upstream, events) = chan::unbounded();

        pool.extend(config.connect.iter().cloned(), Source::Imported);

        Self {
            config,
            pool,
            transport,
            syncer,
            peers: AddressBook::new(fastrand::Rng::new()),
            dialing: HashMap::new(),
            dials: Vec::new(),
            buffered: Vec::new(),
            headers: None,
            ready: false,
            last_link: LinkId::new(0),
            last_idle: LocalTime::now(),
            status,
            commands,
            inbox,
            deliveries,
            dialer,
            dialed,
            upstream,
            events,
        }
    }

    fn run(mut self) -> AddressPool {
        info!(
            target: "p2p",
            "Starting peer group on {} with {} known address(es)..",
            self.config.network.as_str(),
            self.pool.len()
        );
        set_status(&self.status, Status::Running);

        self.maintain_connections();

        let ack = loop {
            if let Control::Stop(ack) = self.step() {
                break ack;
            }
        };
        self.close();

        if let Some(ack) = ack {
            ack.send(()).ok();
        }
        self.pool
    }

    /// Wait for and process one input, or until connections are due for
    /// maintenance.
    fn step(&mut self) -> Control {
        let commands = self.commands.clone();
        let deliveries = self.deliveries.clone();
        let dialed = self.dialed.clone();
        let timeout = self.idle_remaining().min(TIMER_RESOLUTION);

        chan::select! {
            recv(commands) -> cmd => match cmd {
                Ok(cmd) => {
                    if let Control::Stop(ack) = self.command(cmd) {
                        return Control::Stop(ack);
                    }
                }
                // All handles are gone.
                Err(chan::RecvError) => return Control::Stop(None),
            },
            recv(deliveries) -> delivery => {
                if let Ok(delivery) = delivery {
                    self.delivered(delivery);
                }
            }
            recv(dialed) -> result => {
                if let Ok((addr, link, result)) = result {
                    self.dialed(addr, link, result);
                }
            }
            default(timeout) => {}
        }
        self.timeouts();
        self.process_events();
        self.flush_buffered();

        let now = LocalTime::now();
        if now - self.last_idle >= self.config.idle_timeout {
            self.last_idle = now;
            self.maintain_connections();
        }
        Control::Continue
    }

    fn idle_remaining(&self) -> time::Duration {
        let elapsed = LocalTime::now() - self.last_idle;
        let remaining = self
            .config
            .idle_timeout
            .as_millis()
            .saturating_sub(elapsed.as_millis());

        time::Duration::from_millis(remaining as u64)
    }

    fn command(&mut self, cmd: Command) -> Control {
        debug!(target: "p2p", "Received command: {:?}", cmd);

        match cmd {
            Command::RequestHeaders(locators) => self.request_headers(locators),
            Command::RequestMerkleBlocks(hashes, peer) => self.request_merkle_blocks(hashes, peer),
            Command::Relay(tx) => self.relay(tx),
            Command::ImportAddresses(addrs) => {
                let count = self.pool.extend(addrs, Source::Imported);

                debug!(target: "p2p", "Imported {} new address(es)", count);

                self.maintain_connections();
            }
            Command::GetPeers(reply) => {
                reply.send(self.peer_info()).ok();
            }
            Command::Close(ack) => return Control::Stop(Some(ack)),
        }
        Control::Continue
    }

    fn delivered(&mut self, delivery: Delivery<Message>) {
        let addr = delivery.addr();
        let link = delivery.link();

        if let Some(dial) = self.dialing.get_mut(&addr) {
            if dial.link == link {
                dial.early.push(delivery);
                return;
            }
        }
        let slot = match self.peers.get_mut(&addr) {
            Some(slot) if slot.link == link => slot,
            _ => {
                trace!(target: "p2p", "{}: Ignoring delivery from stale link {}", addr, link);
                return;
            }
        };
        match delivery {
            Delivery::Received(_, _, msg) => slot.peer.received(msg),
            Delivery::Disconnected(_, _, err) => slot
                .peer
                .disconnected(err.map(DisconnectReason::ConnectionError)),
        }
    }

    fn dialed(&mut self, addr: PeerId, link: LinkId, result: io::Result<T::Connection>) {
        if self.dialing.get(&addr).map(|d| d.link) != Some(link) {
            debug!(target: "p2p", "{}: Ignoring result of stale dial {}", addr, link);
            return;
        }
        let Some(dial) = self.dialing.remove(&addr) else {
            return;
        };
        match result {
            Ok(conn) => {
                debug!(target: "p2p", "{}: Connected ({})", addr, link);

                let listener = Upstream {
                    syncer: self.syncer.clone(),
                    events: self.upstream.clone(),
                };
                let mut peer = Peer::new(addr, conn, listener, self.config.peer());

                peer.initialize();
                self.peers.insert(
                    addr,
                    Slot {
                        link,
                        peer,
                        negotiated: false,
                    },
                );
                for delivery in dial.early {
                    self.delivered(delivery);
                }
            }
            Err(err) => {
                debug!(target: "p2p", "{}: Dial failed: {}", addr, err);

                self.pool.mark_failure(&addr);
            }
        }
    }

    /// Let peers check their deadlines. Peers that time out report their
    /// disconnection through the usual event queue.
    fn timeouts(&mut self) {
        for slot in self.peers.values_mut() {
            slot.peer.received_timeout();
        }
    }

    fn process_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                PeerEvent::Connected(addr) => self.connected(addr),
                PeerEvent::Addresses(addr, addrs) => {
                    let count = self.pool.extend(addrs, Source::Peer(addr));

                    debug!(target: "p2p", "{}: Received {} new address(es)", addr, count);
                }
                PeerEvent::Disconnected(addr, reason, outstanding) => {
                    self.disconnected(addr, reason, outstanding)
                }
            }
        }
    }

    fn connected(&mut self, addr: PeerId) {
        let Some(slot) = self.peers.get_mut(&addr) else {
            return;
        };
        slot.negotiated = true;

        if let Some(locators) = self.headers.take() {
            slot.peer.request_headers(locators);
        }
        self.pool.mark_success(&addr);

        if !self.ready {
            self.ready = true;

            info!(target: "p2p", "Peer group is ready ({} connected)", addr);

            self.syncer.on_ready();
        }
    }

    fn disconnected(
        &mut self,
        addr: PeerId,
        reason: Option<DisconnectReason>,
        outstanding: Vec<BlockHash>,
    ) {
        let Some(mut slot) = self.peers.remove(&addr) else {
            return;
        };
        slot.peer.close();

        match &reason {
            None if slot.negotiated => {
                self.pool.mark_success(&addr);
                self.pool.release(&addr);
            }
            _ => self.pool.mark_failure(&addr),
        }
        if self.ready && self.connected_count() == 0 {
            info!(target: "p2p", "No peers connected");

            self.ready = false;
        }
        self.syncer.on_peer_disconnected(addr, reason.as_ref());

        if !outstanding.is_empty() {
            info!(
                target: "p2p",
                "{}: Re-requesting {} outstanding block(s)",
                addr,
                outstanding.len()
            );
            self.request_merkle_blocks(outstanding, None);
        }
        // Replace peers we were actually connected to right away. Others are
        // replaced on the next maintenance, to avoid hammering bad addresses.
        if slot.negotiated {
            self.maintain_connections();
        }
    }

    fn request_headers(&mut self, locators: Locators) {
        let addr = self.free_peer().or_else(|| {
            self.peers
                .sample_with(|_, s| s.peer.is_connected())
                .map(|(addr, _)| *addr)
        });
        match addr.and_then(|addr| self.peers.get_mut(&addr)) {
            Some(slot) => slot.peer.request_headers(locators),
            None => {
                debug!(target: "p2p", "No peer connected, deferring header request");

                self.headers = Some(locators);
            }
        }
    }

    fn request_merkle_blocks(&mut self, hashes: Vec<BlockHash>, target: Option<PeerId>) {
        let addr = target
            .filter(|addr| {
                self.peers
                    .get(addr)
                    .map_or(false, |s| s.peer.is_connected() && s.peer.is_free())
            })
            .or_else(|| self.free_peer());

        match addr.and_then(|addr| self.peers.get_mut(&addr)) {
            Some(slot) => slot.peer.request_merkle_blocks(hashes),
            None => {
                debug!(
                    target: "p2p",
                    "No free peer, buffering {} block request(s)",
                    hashes.len()
                );
                for hash in hashes {
                    if !self.buffered.contains(&hash) {
                        self.buffered.push(hash);
                    }
                }
            }
        }
    }

    fn flush_buffered(&mut self) {
        if self.buffered.is_empty() {
            return;
        }
        if let Some(addr) = self.free_peer() {
            let hashes = std::mem::take(&mut self.buffered);

            debug!(
                target: "p2p",
                "{}: Requesting {} buffered block(s)",
                addr,
                hashes.len()
            );
            if let Some(slot) = self.peers.get_mut(&addr) {
                slot.peer.request_merkle_blocks(hashes);
            }
        }
    }

    fn relay(&mut self, tx: Transaction) {
        let mut count = 0;

        for slot in self.peers.values_mut() {
            if slot.peer.is_connected() {
                slot.peer.relay(tx.clone());
                count += 1;
            }
        }
        if count == 0 {
            warn!(target: "p2p", "No peer connected, transaction {} was not relayed", tx.txid());
        } else {
            debug!(target: "p2p", "Relayed transaction {} to {} peer(s)", tx.txid(), count);
        }
    }

    fn maintain_connections(&mut self) {
        let current = self.peers.len() + self.dialing.len();

        for _ in current..self.config.target_peer_count {
            match self.pool.next_address() {
                Ok(addr) => self.dial(addr),
                Err(NoAddressAvailable) => {
                    debug!(
                        target: "p2p",
                        "Address pool exhausted, {} peer(s) connecting or connected",
                        self.peers.len() + self.dialing.len()
                    );
                    break;
                }
            }
        }
        self.dials.retain(|d| !d.is_finished());
    }

    fn dial(&mut self, addr: PeerId) {
        self.last_link = self.last_link.next();

        let link = self.last_link;
        let inbox = Inbox::new(addr, link, self.inbox.clone());
        let transport = self.transport.clone();
        let dialer = self.dialer.clone();

        debug!(target: "p2p", "{}: Dialing ({})..", addr, link);

        let spawned = thread::Builder::new()
            .name(format!("{}/dial", self.config.name))
            .stack_size(DIAL_STACK_SIZE)
            .spawn(move || {
                let result = transport.connect(&addr, inbox);
                // If nobody receives the connection anymore, it is dropped here.
                dialer.send((addr, link, result)).ok();
            });

        match spawned {
            Ok(handle) => {
                self.dials.push(handle);
                self.dialing.insert(
                    addr,
                    Dial {
                        link,
                        early: Vec::new(),
                    },
                );
            }
            Err(err) => {
                error!(target: "p2p", "{}: Failed to spawn dialing thread: {}", addr, err);

                self.pool.mark_failure(&addr);
            }
        }
    }

    fn free_peer(&self) -> Option<PeerId> {
        self.peers
            .sample_with(|_, s| s.peer.is_connected() && s.peer.is_free())
            .map(|(addr, _)| *addr)
    }

    fn connected_count(&self) -> usize {
        self.peers
            .values()
            .filter(|s| s.peer.is_connected())
            .count()
    }

    fn peer_info(&self) -> Vec<PeerInfo> {
        let mut peers = self
            .peers
            .iter()
            .map(|(addr, slot)| PeerInfo {
                addr: *addr,
                state: slot.peer.state(),
                free: slot.peer.is_free(),
                pending: slot.peer.pending().len(),
                user_agent: slot.peer.version().map(|v| v.user_agent.clone()),
                height: slot.peer.version().map(|v| v.start_height),
            })
            .collect::<Vec<_>>();

        peers.sort_by_key(|p| p.addr);
        peers
    }

    fn close(&mut self) {
        set_status(&self.status, Status::Closing);

        info!(target: "p2p", "Closing peer group with {} peer(s)..", self.peers.len());

        for (addr, mut slot) in self.peers.drain() {
            slot.peer.close();
            self.pool.release(&addr);
        }
        // Wait for dial attempts to report back, and drop what they connected.
        for dial in self.dials.drain(..) {
            dial.join().ok();
        }
        for (addr, _, result) in self.dialed.try_iter() {
            if let Ok(mut conn) = result {
                conn.close();
            }
            self.pool.release(&addr);
        }
        self.dialing.clear();
        self.buffered.clear();
        self.headers = None;

        set_status(&self.status, Status::Closed);

        info!(target: "p2p", "Peer group closed");
    }
}
