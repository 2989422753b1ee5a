//! Protocol messages exchanged with peers.
//!
//! These are the messages as seen by the protocol state machine, after decoding.
//! The set is closed: every message kind a peer can send or receive is a variant of
//! [`Message`], and handlers match on it exhaustively.
use std::fmt;
use std::net;

use bitcoin::network::constants::ServiceFlags;

use crate::block::{BlockHash, BlockHeader, MerkleBlock, Transaction, Txid};

/// Block locators. Consists of starting hashes and a stop hash.
pub type Locators = (Vec<BlockHash>, BlockHash);

/// Kind of an inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryKind {
    /// A transaction.
    Tx,
    /// A full block.
    Block,
    /// A filtered block, ie. a merkle block.
    FilteredBlock,
}

impl InventoryKind {
    /// Type code used on the wire.
    pub const fn code(&self) -> u32 {
        match self {
            Self::Tx => 1,
            Self::Block => 2,
            Self::FilteredBlock => 3,
        }
    }
}

/// An advertisement of an object, by type and hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryItem {
    /// A transaction.
    Tx(Txid),
    /// A full block.
    Block(BlockHash),
    /// A filtered block.
    FilteredBlock(BlockHash),
}

impl InventoryItem {
    /// Kind of inventory.
    pub fn kind(&self) -> InventoryKind {
        match self {
            Self::Tx(_) => InventoryKind::Tx,
            Self::Block(_) => InventoryKind::Block,
            Self::FilteredBlock(_) => InventoryKind::FilteredBlock,
        }
    }

    /// Light clients never fetch full blocks: block inventories are turned into
    /// filtered block inventories. Other items are returned as-is.
    pub fn filtered(self) -> Self {
        match self {
            Self::Block(hash) => Self::FilteredBlock(hash),
            other => other,
        }
    }
}

impl fmt::Display for InventoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tx(txid) => write!(f, "tx:{}", txid),
            Self::Block(hash) => write!(f, "block:{}", hash),
            Self::FilteredBlock(hash) => write!(f, "merkleblock:{}", hash),
        }
    }
}

/// Contents of a `version` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Protocol version.
    pub version: u32,
    /// Services offered by the sender.
    pub services: ServiceFlags,
    /// Sender's time, in seconds since Epoch.
    pub timestamp: i64,
    /// Random nonce, used to detect connections to self.
    pub nonce: u64,
    /// User agent string.
    pub user_agent: String,
    /// Height of the sender's best chain.
    pub start_height: i32,
    /// Whether the sender wants transactions relayed before a filter is loaded.
    pub relay: bool,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Handshake: version announcement.
    Version(Version),
    /// Handshake: version acknowledgement.
    Verack,
    /// Keep-alive request.
    Ping(u64),
    /// Keep-alive response.
    Pong(u64),
    /// Peer addresses.
    Addr(Vec<net::SocketAddr>),
    /// Request for block headers following the locators.
    GetHeaders(Locators),
    /// Block headers.
    Headers(Vec<BlockHeader>),
    /// Inventory announcement.
    Inv(Vec<InventoryItem>),
    /// Request for objects by inventory.
    GetData(Vec<InventoryItem>),
    /// A filtered block. Its matched transactions follow as separate messages.
    MerkleBlock(MerkleBlock),
    /// A transaction.
    Transaction(Transaction),
}

impl Message {
    /// Message command, as used on the wire.
    pub fn cmd(&self) -> &'static str {
        match self {
            Self::Version(_) => "version",
            Self::Verack => "verack",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Addr(_) => "addr",
            Self::GetHeaders(_) => "getheaders",
            Self::Headers(_) => "headers",
            Self::Inv(_) => "inv",
            Self::GetData(_) => "getdata",
            Self::MerkleBlock(_) => "merkleblock",
            Self::Transaction(_) => "tx",
        }
    }
}
