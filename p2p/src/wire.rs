//! Conversion between protocol messages and the Bitcoin wire format.
use std::net;

use thiserror::Error;

use lightsync_common::bitcoin::consensus::encode;
use lightsync_common::bitcoin::hashes::Hash as _;
use lightsync_common::bitcoin::network::address::Address;
use lightsync_common::bitcoin::network::constants::ServiceFlags;
use lightsync_common::bitcoin::network::message::{NetworkMessage, RawNetworkMessage};
use lightsync_common::bitcoin::network::message_blockdata::{GetHeadersMessage, Inventory};
use lightsync_common::bitcoin::network::message_network::VersionMessage;
use lightsync_common::bitcoin::util::merkleblock;
use lightsync_common::block::{BlockHash, MerkleBlock};
use lightsync_common::message::{InventoryItem, InventoryKind, Message, Version};
use lightsync_common::network::Network;
use lightsync_net::LocalTime;

/// A wire decoding error.
#[derive(Error, Debug)]
pub enum Error {
    /// An encoding/decoding error.
    #[error("encode/decode error: {0}")]
    Encode(#[from] encode::Error),
    /// Message with the wrong network magic.
    #[error("received message with invalid magic: {0:#x}")]
    Magic(u32),
    /// The partial merkle tree of a merkle block is malformed.
    #[error("invalid partial merkle tree in block {0}: {1:?}")]
    PartialMerkleTree(BlockHash, merkleblock::MerkleBlockError),
    /// The partial merkle tree of a merkle block doesn't commit to its header.
    #[error("merkle root mismatch in block {0}")]
    MerkleRoot(BlockHash),
}

/// Message codec for one connection.
#[derive(Debug, Clone)]
pub struct Codec {
    magic: u32,
    local: net::SocketAddr,
    remote: net::SocketAddr,
}

impl Codec {
    /// Create a codec for a connection between the given addresses.
    pub fn new(network: Network, local: net::SocketAddr, remote: net::SocketAddr) -> Self {
        Self {
            magic: network.magic(),
            local,
            remote,
        }
    }

    /// Serialize a message for sending. Returns `None` for messages we never send.
    pub fn encode(&self, msg: Message) -> Option<Vec<u8>> {
        let payload = self.to_network(msg)?;
        let raw = RawNetworkMessage {
            magic: self.magic,
            payload,
        };
        Some(encode::serialize(&raw))
    }

    /// Check and convert a message read off the wire. Returns `None` for messages
    /// we don't handle.
    pub fn decode(&self, raw: RawNetworkMessage) -> Result<Option<Message>, Error> {
        if raw.magic != self.magic {
            return Err(Error::Magic(raw.magic));
        }
        self.from_network(raw.payload)
    }

    /// Convert a message to its wire representation.
    pub fn to_network(&self, msg: Message) -> Option<NetworkMessage> {
        let msg = match msg {
            Message::Version(v) => NetworkMessage::Version(VersionMessage {
                version: v.version,
                services: v.services,
                timestamp: v.timestamp,
                receiver: Address::new(&self.remote, ServiceFlags::NONE),
                sender: Address::new(&self.local, v.services),
                nonce: v.nonce,
                user_agent: v.user_agent,
                start_height: v.start_height,
                relay: v.relay,
            }),
            Message::Verack => NetworkMessage::Verack,
            Message::Ping(nonce) => NetworkMessage::Ping(nonce),
            Message::Pong(nonce) => NetworkMessage::Pong(nonce),
            Message::Addr(addrs) => {
                let time = LocalTime::now().as_secs() as u32;

                NetworkMessage::Addr(
                    addrs
                        .iter()
                        .map(|a| (time, Address::new(a, ServiceFlags::NETWORK)))
                        .collect(),
                )
            }
            Message::GetHeaders((locators, stop)) => {
                NetworkMessage::GetHeaders(GetHeadersMessage::new(locators, stop))
            }
            Message::Headers(headers) => NetworkMessage::Headers(headers),
            Message::Inv(items) => NetworkMessage::Inv(items.into_iter().map(inventory).collect()),
            Message::GetData(items) => {
                NetworkMessage::GetData(items.into_iter().map(inventory).collect())
            }
            Message::Transaction(tx) => NetworkMessage::Tx(tx),
            Message::MerkleBlock(_) => return None,
        };
        Some(msg)
    }

    /// Convert a message from its wire representation.
    pub fn from_network(&self, msg: NetworkMessage) -> Result<Option<Message>, Error> {
        let msg = match msg {
            NetworkMessage::Version(v) => Message::Version(Version {
                version: v.version,
                services: v.services,
                timestamp: v.timestamp,
                nonce: v.nonce,
                user_agent: v.user_agent,
                start_height: v.start_height,
                relay: v.relay,
            }),
            NetworkMessage::Verack => Message::Verack,
            NetworkMessage::Ping(nonce) => Message::Ping(nonce),
            NetworkMessage::Pong(nonce) => Message::Pong(nonce),
            NetworkMessage::Addr(addrs) => Message::Addr(
                addrs
                    .into_iter()
                    .filter_map(|(_, a)| a.socket_addr().ok())
                    .collect(),
            ),
            NetworkMessage::GetHeaders(msg) => {
                Message::GetHeaders((msg.locator_hashes, msg.stop_hash))
            }
            NetworkMessage::Headers(headers) => Message::Headers(headers),
            NetworkMessage::Inv(items) => {
                Message::Inv(items.into_iter().filter_map(inventory_item).collect())
            }
            NetworkMessage::GetData(items) => {
                Message::GetData(items.into_iter().filter_map(inventory_item).collect())
            }
            NetworkMessage::MerkleBlock(block) => Message::MerkleBlock(merkle_block(block)?),
            NetworkMessage::Tx(tx) => Message::Transaction(tx),
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }
}

/// Verify a merkle block and extract its matched transaction hashes.
pub fn merkle_block(block: merkleblock::MerkleBlock) -> Result<MerkleBlock, Error> {
    let hash = block.header.block_hash();
    let mut matches = Vec::new();
    let mut indexes = Vec::new();
    let root = block
        .txn
        .extract_matches(&mut matches, &mut indexes)
        .map_err(|e| Error::PartialMerkleTree(hash, e))?;

    if root != block.header.merkle_root {
        return Err(Error::MerkleRoot(hash));
    }
    Ok(MerkleBlock::new(block.header, matches))
}

fn inventory(item: InventoryItem) -> Inventory {
    match item {
        InventoryItem::Tx(txid) => Inventory::Transaction(txid),
        InventoryItem::Block(hash) => Inventory::Block(hash),
        InventoryItem::FilteredBlock(hash) => Inventory::Unknown {
            inv_type: InventoryKind::FilteredBlock.code(),
            hash: hash.into_inner(),
        },
    }
}

fn inventory_item(inv: Inventory) -> Option<InventoryItem> {
    match inv {
        Inventory::Transaction(txid) | Inventory::WitnessTransaction(txid) => {
            Some(InventoryItem::Tx(txid))
        }
        Inventory::Block(hash) | Inventory::WitnessBlock(hash) => Some(InventoryItem::Block(hash)),
        Inventory::Unknown { inv_type, hash } if inv_type == InventoryKind::FilteredBlock.code() => {
            Some(InventoryItem::FilteredBlock(BlockHash::from_inner(hash)))
        }
        _ => None,
    }
}
