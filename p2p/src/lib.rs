//! Peer-to-peer synchronization for Bitcoin SPV light-clients.
//!
//! The crate is organized around three pieces:
//!
//! * [`AddressPool`][pool]: candidate peer addresses and their connection history
//! * [`Peer`][peer]: the protocol state machine of a single connection
//! * [`PeerGroup`][group]: a set of peers kept at a target size, which routes
//!   requests from a [`Syncer`][syncer] to free peers
//!
//! [pool]: crate::pool::AddressPool
//! [peer]: crate::peer::Peer
//! [group]: crate::group::PeerGroup
//! [syncer]: crate::group::Syncer
//!
//! Peers don't perform I/O other than sending on their connection. Incoming
//! traffic is delivered to the peer group's thread by the [transport][tcp], which
//! hands it to the right peer, one message at a time. This keeps all protocol
//! state on one thread, and lets the peer group be tested deterministically
//! against simulated transports.
//!
//! To illustrate, lets trace what happens when a filtered block that was asked
//! for arrives:
//!
//! 1. The transport's reader thread decodes a `merkleblock` message, verifies its
//!    partial merkle tree, and delivers it to the peer group.
//! 2. The peer group hands the message to the peer it came from, which starts
//!    assembling the block.
//! 3. As each matched `tx` message arrives, the peer adds it to the assembly.
//! 4. Once all transactions are in, the peer hands the complete block to the
//!    [`Syncer`][syncer], and becomes free if nothing else is outstanding.
//! 5. The peer group hands any buffered block requests to the now free peer.
//!
//! [tcp]: crate::tcp::TcpTransport
//!
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]
#![deny(missing_docs, unsafe_code)]
pub mod error;
pub mod group;
pub mod peer;
pub mod pool;
pub mod tcp;
pub mod wire;

#[cfg(test)]
mod mock;

pub use error::Error;
pub use group::{Config, Handle, PeerGroup, Status, Syncer};
pub use lightsync_common::{bitcoin, message};
pub use lightsync_net::{LocalDuration, LocalTime, PeerId};
pub use peer::{DisconnectReason, Peer};
pub use pool::{AddressPool, NoAddressAvailable};
pub use tcp::TcpTransport;
