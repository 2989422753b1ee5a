//! Types shared by all lightsync crates.
//!
//! Block, transaction and hash types are those of the [`bitcoin`] crate. On top of
//! these, this crate defines the filtered [`block::MerkleBlock`], inventory
//! items, and the closed set of protocol [`message::Message`]s exchanged with peers.
#![allow(clippy::type_complexity)]
#![warn(missing_docs)]
pub mod block;
pub mod collections;
pub mod message;
pub mod network;
pub mod p2p;

pub use bitcoin;
pub use lightsync_net::{LocalDuration, LocalTime};
