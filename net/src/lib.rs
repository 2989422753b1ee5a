//! Transport boundary of the lightsync peer-to-peer stack.
//!
//! Connections are established by a [`Transport`] and carry already-decoded
//! protocol messages. Framing, encoding and the socket itself stay behind the
//! [`Connection`] trait. Incoming traffic is delivered through an [`Inbox`],
//! which funnels every connection into a single channel owned by whoever
//! dialed it, so that all protocol state can be mutated from one thread.
#![allow(clippy::type_complexity)]
#![deny(missing_docs, unsafe_code)]
use std::sync::Arc;
use std::{fmt, io, net};

use crossbeam_channel as chan;
use log::*;

pub mod error;
pub mod time;

pub use error::Error;
pub use time::{Clock, LocalDuration, LocalTime, ManualClock, SystemClock};

/// Identifies a peer.
pub type PeerId = net::SocketAddr;

/// Identifies a single connection.
///
/// The same peer address may be dialed more than once over the lifetime of a
/// process. Deliveries from a connection that was already dropped carry a stale
/// link id and can be told apart from the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    /// Create a link id from a raw counter value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Return the next link id.
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something that happened on a connection.
#[derive(Debug)]
pub enum Delivery<M> {
    /// A message was received from the remote.
    Received(PeerId, LinkId, M),
    /// The connection is gone. A `None` error means the connection was closed
    /// cleanly, eg. the remote hung up gracefully.
    Disconnected(PeerId, LinkId, Option<Arc<io::Error>>),
}

impl<M> Delivery<M> {
    /// The peer this delivery pertains to.
    pub fn addr(&self) -> PeerId {
        match self {
            Self::Received(addr, _, _) => *addr,
            Self::Disconnected(addr, _, _) => *addr,
        }
    }

    /// The connection this delivery pertains to.
    pub fn link(&self) -> LinkId {
        match self {
            Self::Received(_, link, _) => *link,
            Self::Disconnected(_, link, _) => *link,
        }
    }
}

/// Receiving end of a connection, handed to the transport when dialing.
///
/// Transports call [`Inbox::received`] for every decoded message, in the order
/// the messages arrived on the wire, and [`Inbox::disconnected`] exactly once
/// when the connection ends.
#[derive(Debug)]
pub struct Inbox<M> {
    addr: PeerId,
    link: LinkId,
    deliveries: chan::Sender<Delivery<M>>,
}

impl<M> Clone for Inbox<M> {
    fn clone(&self) -> Self {
        Self {
            addr: self.addr,
            link: self.link,
            deliveries: self.deliveries.clone(),
        }
    }
}

impl<M> Inbox<M> {
    /// Create a new inbox for the given connection.
    pub fn new(addr: PeerId, link: LinkId, deliveries: chan::Sender<Delivery<M>>) -> Self {
        Self {
            addr,
            link,
            deliveries,
        }
    }

    /// Remote address of the connection.
    pub fn addr(&self) -> PeerId {
        self.addr
    }

    /// Link id of the connection.
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Deliver a received message. Returns an error if the owner of the
    /// connection is no longer listening, in which case the transport should
    /// stop reading.
    pub fn received(&self, msg: M) -> Result<(), Error> {
        self.deliveries
            .send(Delivery::Received(self.addr, self.link, msg))
            .map_err(Error::from)
    }

    /// Signal that the connection ended.
    pub fn disconnected(&self, err: Option<io::Error>) {
        let delivery = Delivery::Disconnected(self.addr, self.link, err.map(Arc::new));

        if self.deliveries.send(delivery).is_err() {
            debug!(
                target: "net",
                "{}: Disconnection of link {} not delivered, nobody is listening",
                self.addr,
                self.link
            );
        }
    }
}

/// An established connection to a remote peer.
pub trait Connection<M>: Send + 'static {
    /// Send a message to the remote.
    fn send(&mut self, msg: M) -> Result<(), Error>;
    /// Close the connection. Idempotent.
    fn close(&mut self);
}

/// Ability to establish connections.
pub trait Transport<M>: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection<M>;

    /// Connect to the given address. This may block on network I/O.
    ///
    /// On success, all traffic from the remote is delivered to `inbox`.
    fn connect(&self, addr: &PeerId, inbox: Inbox<M>) -> io::Result<Self::Connection>;
}
