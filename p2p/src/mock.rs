//! Test doubles for connections, transports and listeners.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{io, net};

use crossbeam_channel as chan;

use lightsync_common::bitcoin::network::constants::ServiceFlags;
use lightsync_common::block::{BlockHash, BlockHeader, MerkleBlock, Transaction};
use lightsync_common::message::{InventoryItem, Message, Version};
use lightsync_net::{Connection, Inbox, PeerId, Transport};

use crate::peer::{self, DisconnectReason};

/// A `version` message a peer would accept.
pub fn version(start_height: i32) -> Version {
    Version {
        version: peer::PROTOCOL_VERSION,
        services: ServiceFlags::NETWORK,
        timestamp: 1_600_000_000,
        nonce: 42,
        user_agent: "/Satoshi:0.21.0/".to_owned(),
        start_height,
        relay: false,
    }
}

/// A notification received by a [`Recorder`].
#[derive(Debug, Clone)]
pub enum Event {
    Connected(PeerId, Version),
    Headers(PeerId, Vec<BlockHeader>),
    MerkleBlock(PeerId, MerkleBlock),
    Transaction(PeerId, Transaction),
    Addresses(PeerId, Vec<net::SocketAddr>),
    Disconnected(PeerId, Option<DisconnectReason>, Vec<BlockHash>),
}

/// Connection that records what is sent over it.
#[derive(Debug, Clone)]
pub struct MockConnection {
    pub addr: PeerId,
    pub outbox: chan::Sender<(PeerId, Message)>,
    pub closed: Arc<AtomicBool>,
}

impl MockConnection {
    pub fn new(addr: PeerId) -> (Self, chan::Receiver<(PeerId, Message)>) {
        let (outbox, sent) = chan::unbounded();

        (
            Self {
                addr,
                outbox,
                closed: Arc::new(AtomicBool::new(false)),
            },
            sent,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Connection<Message> for MockConnection {
    fn send(&mut self, msg: Message) -> Result<(), lightsync_net::Error> {
        if self.is_closed() {
            return Err(lightsync_net::Error::Closed);
        }
        self.outbox.send((self.addr, msg)).ok();

        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Listener that forwards every notification over a channel.
#[derive(Debug)]
pub struct Recorder {
    events: chan::Sender<Event>,
    wanted: Option<HashSet<InventoryItem>>,
}

impl Recorder {
    /// Record everything, and request every announced item.
    pub fn new() -> (Self, chan::Receiver<Event>) {
        let (events, rx) = chan::unbounded();

        (
            Self {
                events,
                wanted: None,
            },
            rx,
        )
    }

    /// Only request the given items.
    pub fn only(mut self, items: impl IntoIterator<Item = InventoryItem>) -> Self {
        self.wanted = Some(items.into_iter().collect());
        self
    }
}

impl peer::Listener for Recorder {
    fn should_request(&self, item: &InventoryItem) -> bool {
        self.wanted.as_ref().map_or(true, |w| w.contains(item))
    }

    fn connected(&mut self, peer: PeerId, version: &Version) {
        self.events.send(Event::Connected(peer, version.clone())).ok();
    }

    fn on_receive_headers(&mut self, peer: PeerId, headers: Vec<BlockHeader>) {
        self.events.send(Event::Headers(peer, headers)).ok();
    }

    fn on_receive_merkle_block(&mut self, peer: PeerId, block: MerkleBlock) {
        self.events.send(Event::MerkleBlock(peer, block)).ok();
    }

    fn on_receive_transaction(&mut self, peer: PeerId, tx: Transaction) {
        self.events.send(Event::Transaction(peer, tx)).ok();
    }

    fn on_receive_addresses(&mut self, peer: PeerId, addrs: Vec<net::SocketAddr>) {
        self.events.send(Event::Addresses(peer, addrs)).ok();
    }

    fn disconnected(
        &mut self,
        peer: PeerId,
        reason: Option<DisconnectReason>,
        outstanding: Vec<BlockHash>,
    ) {
        self.events
            .send(Event::Disconnected(peer, reason, outstanding))
            .ok();
    }
}

/// The remote end of a mock connection.
#[derive(Debug, Clone)]
pub struct Remote {
    pub inbox: Inbox<Message>,
    pub closed: Arc<AtomicBool>,
}

impl Remote {
    /// Send a message to the local peer.
    pub fn send(&self, msg: Message) {
        self.inbox.received(msg).ok();
    }

    /// Hang up, with an optional error.
    pub fn hangup(&self, err: Option<io::ErrorKind>) {
        self.inbox.disconnected(err.map(io::Error::from));
    }
}

/// Transport connecting to simulated remotes.
#[derive(Debug, Clone)]
pub struct MockTransport {
    pub outbox: chan::Sender<(PeerId, Message)>,
    pub remotes: Arc<Mutex<HashMap<PeerId, Remote>>>,
    pub attempts: Arc<Mutex<Vec<PeerId>>>,
    /// Addresses that refuse connections.
    pub refuse: Arc<Mutex<HashSet<PeerId>>>,
    /// Whether remotes perform their side of the handshake as soon as we connect.
    pub handshake: Option<Version>,
}

impl MockTransport {
    pub fn new() -> (Self, chan::Receiver<(PeerId, Message)>) {
        let (outbox, sent) = chan::unbounded();

        (
            Self {
                outbox,
                remotes: Arc::default(),
                attempts: Arc::default(),
                refuse: Arc::default(),
                handshake: Some(version(100)),
            },
            sent,
        )
    }

    pub fn remote(&self, addr: &PeerId) -> Option<Remote> {
        self.remotes.lock().unwrap().get(addr).cloned()
    }

    pub fn attempts(&self) -> Vec<PeerId> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn refuse(&self, addr: PeerId) {
        self.refuse.lock().unwrap().insert(addr);
    }
}

impl Transport<Message> for MockTransport {
    type Connection = MockConnection;

    fn connect(&self, addr: &PeerId, inbox: Inbox<Message>) -> io::Result<MockConnection> {
        self.attempts.lock().unwrap().push(*addr);

        if self.refuse.lock().unwrap().contains(addr) {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        let closed = Arc::new(AtomicBool::new(false));
        let remote = Remote {
            inbox,
            closed: closed.clone(),
        };
        if let Some(version) = &self.handshake {
            remote.send(Message::Version(version.clone()));
            remote.send(Message::Verack);
        }
        self.remotes.lock().unwrap().insert(*addr, remote);

        Ok(MockConnection {
            addr: *addr,
            outbox: self.outbox.clone(),
            closed,
        })
    }
}
