//! Header sync node.
//!
//! Connects to the network, follows the best header chain from genesis until no
//! more headers are announced, then disconnects and saves the address pool.
use std::net;
use std::path::PathBuf;
use std::sync::Arc;
use std::time;

use crossbeam_channel as chan;
use log::*;

use lightsync_common::bitcoin::hashes::Hash as _;
use lightsync_common::block::{BlockHash, BlockHeader, MerkleBlock, Transaction};
use lightsync_common::message::InventoryItem;
use lightsync_common::network::Network;
use lightsync_p2p::group;
use lightsync_p2p::{
    AddressPool, DisconnectReason, Error, Handle, PeerGroup, PeerId, Syncer, TcpTransport,
};

/// Maximum number of headers sent by a peer in one message.
const MAX_HEADERS: usize = 2000;
/// Time to wait for headers before asking again.
const HEADERS_TIMEOUT: time::Duration = time::Duration::from_secs(30);

/// Node configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub network: Network,
    pub connect: Vec<net::SocketAddr>,
    pub target_peer_count: usize,
    pub addresses: Option<PathBuf>,
}

#[derive(Debug)]
enum Event {
    Ready,
    Headers(PeerId, Vec<BlockHeader>),
}

/// Forwards peer group notifications to the node's thread.
struct Notifier {
    events: chan::Sender<Event>,
}

impl Syncer for Notifier {
    fn on_ready(&self) {
        self.events.send(Event::Ready).ok();
    }

    fn should_request(&self, _item: &InventoryItem) -> bool {
        false
    }

    fn on_receive_headers(&self, peer: PeerId, headers: Vec<BlockHeader>) {
        self.events.send(Event::Headers(peer, headers)).ok();
    }

    fn on_receive_merkle_block(&self, peer: PeerId, block: MerkleBlock) {
        info!(
            target: "node",
            "{}: Received block {} with {} transaction(s)",
            peer,
            block.block_hash(),
            block.transactions.len()
        );
    }

    fn on_receive_transaction(&self, peer: PeerId, tx: Transaction) {
        info!(target: "node", "{}: Received transaction {}", peer, tx.txid());
    }

    fn on_peer_disconnected(&self, peer: PeerId, reason: Option<&DisconnectReason>) {
        match reason {
            Some(reason) => debug!(target: "node", "{}: Disconnected: {}", peer, reason),
            None => debug!(target: "node", "{}: Disconnected", peer),
        }
    }
}

/// Best header chain known to the node.
struct Chain {
    tip: BlockHash,
    height: u64,
}

impl Chain {
    fn new(network: Network) -> Self {
        Self {
            tip: network.genesis_hash(),
            height: 0,
        }
    }

    /// Extend the chain with headers. Returns `false` if the headers don't connect
    /// to the tip.
    fn extend(&mut self, headers: &[BlockHeader]) -> bool {
        let mut tip = self.tip;

        for header in headers {
            if header.prev_blockhash != tip {
                return false;
            }
            tip = header.block_hash();
        }
        self.tip = tip;
        self.height += headers.len() as u64;

        true
    }

    fn request(&self, handle: &Handle) -> Result<(), Error> {
        handle.request_headers((vec![self.tip], BlockHash::all_zeros()))
    }
}

/// Run the node until the header chain is synced.
pub fn run(cfg: Config) -> Result<(), Error> {
    let mut pool = AddressPool::default();

    if let Some(path) = &cfg.addresses {
        let n = pool.load(path)?;
        info!(target: "node", "Loaded {} address(es) from {:?}", n, path);
    }
    if cfg.connect.is_empty() && pool.is_empty() {
        let port = cfg.network.port();
        let seeds = cfg.network.seeds().iter().map(|host| (*host, port));

        info!(target: "node", "Resolving {} seed(s)..", cfg.network.seeds().len());
        pool.seed(seeds)?;
    }

    let (events, receiver) = chan::unbounded();
    let config = group::Config {
        network: cfg.network,
        target_peer_count: cfg.target_peer_count,
        connect: cfg.connect,
        ..group::Config::default()
    };
    let mut group = PeerGroup::new(
        config,
        pool,
        TcpTransport::new(cfg.network),
        Arc::new(Notifier { events }),
    );
    let handle = group.start()?;
    let mut chain = Chain::new(cfg.network);

    info!(target: "node", "Syncing headers on {}..", cfg.network.as_str());

    loop {
        match receiver.recv_timeout(HEADERS_TIMEOUT) {
            Ok(Event::Ready) => {
                chain.request(&handle)?;
            }
            Ok(Event::Headers(peer, headers)) => {
                if headers.is_empty() {
                    info!(target: "node", "Headers synced at height {}", chain.height);
                    break;
                }
                if !chain.extend(&headers) {
                    warn!(target: "node", "{}: Received headers that don't connect to our tip", peer);
                    chain.request(&handle)?;

                    continue;
                }
                info!(
                    target: "node",
                    "{}: Imported {} header(s), height = {}, tip = {}",
                    peer,
                    headers.len(),
                    chain.height,
                    chain.tip
                );
                if headers.len() < MAX_HEADERS {
                    info!(target: "node", "Headers synced at height {}", chain.height);
                    break;
                }
                chain.request(&handle)?;
            }
            Err(chan::RecvTimeoutError::Timeout) => {
                debug!(target: "node", "Timed out waiting for headers, asking again..");
                chain.request(&handle)?;
            }
            Err(chan::RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(pool) = group.close()? {
        if let Some(path) = &cfg.addresses {
            pool.save(path)?;
            info!(target: "node", "Saved {} address(es) to {:?}", pool.len(), path);
        }
    }
    Ok(())
}
