use std::io;
use std::sync::Arc;

use crossbeam_channel as chan;

use lightsync_common::bitcoin::hashes::Hash as _;
use lightsync_common::bitcoin::network::constants::ServiceFlags;
use lightsync_common::block::BlockHash;
use lightsync_net::{LocalDuration, LocalTime, ManualClock};
use lightsync_test::block::gen;

use super::*;
use crate::mock::{self, Event, MockConnection, Recorder};

struct Harness {
    peer: Peer<MockConnection, Recorder, ManualClock>,
    conn: MockConnection,
    sent: chan::Receiver<(PeerId, Message)>,
    events: chan::Receiver<Event>,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        let (recorder, events) = Recorder::new();
        Self::with(recorder, events)
    }

    fn with(recorder: Recorder, events: chan::Receiver<Event>) -> Self {
        let addr: PeerId = ([8, 8, 8, 8], 8333).into();
        let (conn, sent) = MockConnection::new(addr);
        let clock = ManualClock::new(LocalTime::from_secs(1_600_000_000));
        let mut peer = Peer::with_clock(
            addr,
            conn.clone(),
            recorder,
            Config::default(),
            clock.clone(),
        );
        peer.initialize();

        Self {
            peer,
            conn,
            sent,
            events,
            clock,
        }
    }

    /// A peer that completed its handshake. Sent messages and events are drained.
    fn connected() -> Self {
        let mut h = Self::new();

        h.peer.received(Message::Version(mock::version(100)));
        h.peer.received(Message::Verack);
        h.sent();
        h.events();

        assert!(h.peer.is_connected());

        h
    }

    fn sent(&self) -> Vec<Message> {
        self.sent.try_iter().map(|(_, msg)| msg).collect()
    }

    fn events(&self) -> Vec<Event> {
        self.events.try_iter().collect()
    }
}

fn hash(n: u8) -> BlockHash {
    BlockHash::hash(&[n])
}

#[test]
fn test_handshake() {
    let mut h = Harness::new();

    assert!(matches!(h.sent()[..], [Message::Version(ref v)] if v.version == PROTOCOL_VERSION));
    assert_eq!(h.peer.state(), State::Connecting);

    h.peer.received(Message::Version(mock::version(100)));

    assert_eq!(h.sent(), vec![Message::Verack]);
    assert_eq!(h.peer.state(), State::Connecting, "still waiting for `verack`");

    h.peer.received(Message::Verack);

    assert_eq!(h.peer.state(), State::Connected);
    assert!(h.peer.is_free());
    assert!(matches!(h.events()[..], [Event::Connected(addr, _)] if addr == h.peer.addr));
}

#[test]
fn test_handshake_verack_first() {
    let mut h = Harness::new();

    h.peer.received(Message::Verack);
    assert!(!h.peer.is_connected());

    h.peer.received(Message::Version(mock::version(1)));
    assert!(h.peer.is_connected());
}

#[test]
fn test_handshake_protocol_version() {
    let mut h = Harness::new();
    let mut version = mock::version(100);

    version.version = 69000;
    h.peer.received(Message::Version(version));

    assert_eq!(h.peer.state(), State::Disconnected);
    assert!(h.conn.is_closed());
    assert!(matches!(
        h.events()[..],
        [Event::Disconnected(_, Some(DisconnectReason::PeerProtocolVersion(69000)), _)]
    ));

    let mut h = Harness::new();
    let mut version = mock::version(100);

    version.version = 70015;
    h.peer.received(Message::Version(version));

    assert_eq!(h.peer.state(), State::Connecting);
    assert!(!h.conn.is_closed());
}

#[test]
fn test_handshake_services() {
    let mut h = Harness::new();
    let mut version = mock::version(100);

    version.services = ServiceFlags::NONE;
    h.peer.received(Message::Version(version));

    assert!(h.conn.is_closed());
    assert!(matches!(
        h.events()[..],
        [Event::Disconnected(_, Some(DisconnectReason::PeerServices(_)), _)]
    ));
}

#[test]
fn test_handshake_height() {
    let mut h = Harness::new();

    h.peer.received(Message::Version(mock::version(0)));

    assert!(h.conn.is_closed());
    assert!(matches!(
        h.events()[..],
        [Event::Disconnected(_, Some(DisconnectReason::PeerHeight(0)), _)]
    ));
}

#[test]
fn test_messages_ignored_during_handshake() {
    let mut h = Harness::new();
    let headers = gen::headers(1, &mut fastrand::Rng::with_seed(1));

    h.sent();
    h.peer.received(Message::Ping(7));
    h.peer.received(Message::Headers(headers));

    assert!(h.sent().is_empty());
    assert!(h.events().is_empty());
}

#[test]
fn test_requests_ignored_unless_connected() {
    let mut h = Harness::new();

    h.sent();
    h.peer.request_merkle_blocks(vec![hash(1)]);
    h.peer.request_headers((vec![hash(1)], BlockHash::all_zeros()));

    assert!(h.sent().is_empty());
    assert!(h.peer.is_free());
}

#[test]
fn test_ping() {
    let mut h = Harness::connected();

    h.peer.received(Message::Ping(42));

    assert_eq!(h.sent(), vec![Message::Pong(42)]);
}

#[test]
fn test_headers() {
    let mut h = Harness::connected();
    let headers = gen::headers(3, &mut fastrand::Rng::with_seed(1));
    let locators = (vec![hash(9)], BlockHash::all_zeros());

    h.peer.request_headers(locators.clone());

    assert_eq!(h.sent(), vec![Message::GetHeaders(locators)]);
    assert!(h.peer.is_free(), "header requests don't make a peer busy");
    assert!(h.peer.is_syncing_headers());

    h.peer.received(Message::Headers(headers.clone()));

    assert!(!h.peer.is_syncing_headers());
    assert!(matches!(&h.events()[..], [Event::Headers(_, hs)] if *hs == headers));
}

#[test]
fn test_headers_unsolicited() {
    let mut h = Harness::connected();
    let headers = gen::headers(1, &mut fastrand::Rng::with_seed(2));

    h.peer.received(Message::Headers(headers));

    assert_eq!(h.events().len(), 1);
}

#[test]
fn test_request_merkle_blocks() {
    let mut h = Harness::connected();

    h.peer.request_merkle_blocks(vec![hash(1), hash(2)]);

    assert!(!h.peer.is_free());
    assert_eq!(
        h.sent(),
        vec![Message::GetData(vec![
            InventoryItem::FilteredBlock(hash(1)),
            InventoryItem::FilteredBlock(hash(2)),
        ])]
    );

    // Requests accumulate.
    h.peer.request_merkle_blocks(vec![hash(2), hash(3)]);

    assert_eq!(
        h.sent(),
        vec![Message::GetData(vec![InventoryItem::FilteredBlock(hash(3))])]
    );
    assert_eq!(h.peer.pending(), &[hash(1), hash(2), hash(3)]);
}

#[test]
fn test_outstanding_on_disconnect() {
    let mut h = Harness::connected();
    let mut rng = fastrand::Rng::with_seed(1);
    let (a, _) = gen::merkle_block(0, &mut rng);
    let (b, _) = gen::merkle_block(0, &mut rng);

    h.peer
        .request_merkle_blocks(vec![a.block_hash(), b.block_hash()]);
    h.peer.received(Message::MerkleBlock(a.clone()));

    assert!(matches!(&h.events()[..], [Event::MerkleBlock(_, blk)] if *blk == a));
    assert!(!h.peer.is_free());

    let err = Arc::new(io::Error::from(io::ErrorKind::TimedOut));
    h.peer
        .disconnected(Some(DisconnectReason::ConnectionError(err)));

    assert_eq!(h.peer.state(), State::Disconnected);
    assert!(matches!(
        &h.events()[..],
        [Event::Disconnected(_, Some(DisconnectReason::ConnectionError(_)), outstanding)]
            if *outstanding == vec![b.block_hash()]
    ));

    // Disconnecting twice has no effect.
    h.peer.disconnected(None);
    assert!(h.events().is_empty());
}

#[test]
fn test_outstanding_mid_assembly() {
    let mut h = Harness::connected();
    let mut rng = fastrand::Rng::with_seed(5);
    let (a, a_txs) = gen::merkle_block(2, &mut rng);
    let (b, _) = gen::merkle_block(1, &mut rng);

    h.peer
        .request_merkle_blocks(vec![a.block_hash(), b.block_hash()]);
    h.peer.received(Message::MerkleBlock(a.clone()));
    h.peer.received(Message::MerkleBlock(b.clone()));
    h.peer.received(Message::Transaction(a_txs[1].clone()));
    h.peer.received(Message::Transaction(a_txs[0].clone()));

    assert!(matches!(
        &h.events()[..],
        [Event::MerkleBlock(_, blk)] if blk.block_hash() == a.block_hash() && blk.transactions == a_txs
    ));
    assert_eq!(h.peer.pending(), &[b.block_hash()]);

    // The transaction of `b` never arrives.
    h.peer.disconnected(None);

    assert!(matches!(
        &h.events()[..],
        [Event::Disconnected(_, None, outstanding)] if *outstanding == vec![b.block_hash()]
    ));
}

#[test]
fn test_handshake_timeout() {
    let mut h = Harness::new();

    assert_eq!(HANDSHAKE_TIMEOUT, LocalDuration::from_secs(10));

    h.peer.received(Message::Version(mock::version(100)));
    h.clock.elapse(LocalDuration::from_secs(9));
    h.peer.received_timeout();

    assert_eq!(h.peer.state(), State::Connecting);

    h.clock.elapse(LocalDuration::from_secs(1));
    h.peer.received_timeout();

    assert_eq!(h.peer.state(), State::Disconnected);
    assert!(h.conn.is_closed());
    assert!(matches!(
        h.events()[..],
        [Event::Disconnected(_, Some(DisconnectReason::PeerTimeout("handshake")), _)]
    ));
}

#[test]
fn test_ping_timeout() {
    let mut h = Harness::connected();
    let (block, _) = gen::merkle_block(1, &mut fastrand::Rng::with_seed(6));

    h.peer.request_merkle_blocks(vec![block.block_hash()]);
    h.sent();

    h.clock.elapse(PING_INTERVAL);
    h.peer.received_timeout();

    let nonce = match h.sent()[..] {
        [Message::Ping(nonce)] => nonce,
        ref other => panic!("expected a ping, got {:?}", other),
    };
    h.clock.elapse(LocalDuration::from_secs(1));
    h.peer.received(Message::Pong(nonce));
    h.peer.received_timeout();

    assert!(h.peer.is_connected());
    assert!(h.sent().is_empty(), "next ping isn't due yet");

    // The next ping goes unanswered.
    h.clock.elapse(PING_INTERVAL);
    h.peer.received_timeout();
    assert!(matches!(h.sent()[..], [Message::Ping(_)]));

    h.clock.elapse(PING_TIMEOUT);
    h.peer.received_timeout();

    assert_eq!(h.peer.state(), State::Disconnected);
    assert!(h.conn.is_closed());
    assert!(matches!(
        &h.events()[..],
        [Event::Disconnected(_, Some(DisconnectReason::PeerTimeout("ping")), outstanding)]
            if *outstanding == vec![block.block_hash()]
    ));
}

#[test]
fn test_all_completed() {
    let mut h = Harness::connected();
    let mut rng = fastrand::Rng::with_seed(2);
    let (a, _) = gen::merkle_block(0, &mut rng);
    let (b, _) = gen::merkle_block(0, &mut rng);

    h.peer
        .request_merkle_blocks(vec![a.block_hash(), b.block_hash()]);
    h.peer.received(Message::MerkleBlock(b));
    h.peer.received(Message::MerkleBlock(a));

    assert!(h.peer.is_free());
    assert_eq!(h.events().len(), 2);

    h.peer.disconnected(None);

    assert!(matches!(
        &h.events()[..],
        [Event::Disconnected(_, None, outstanding)] if outstanding.is_empty()
    ));
}

#[test]
fn test_transactions_out_of_order() {
    let mut h = Harness::connected();
    let mut rng = fastrand::Rng::with_seed(3);
    let (block, txs) = gen::merkle_block(2, &mut rng);

    h.peer.request_merkle_blocks(vec![block.block_hash()]);
    h.peer.received(Message::MerkleBlock(block.clone()));

    assert!(h.events().is_empty(), "block isn't complete yet");
    assert!(!h.peer.is_free());

    h.peer.received(Message::Transaction(txs[1].clone()));
    assert!(h.events().is_empty());

    h.peer.received(Message::Transaction(txs[0].clone()));

    assert!(h.peer.is_free());
    assert!(matches!(
        &h.events()[..],
        [Event::MerkleBlock(_, blk)]
            if blk.block_hash() == block.block_hash() && blk.transactions == txs
    ));
}

#[test]
fn test_unsolicited_merkle_block() {
    let mut h = Harness::connected();
    let (block, txs) = gen::merkle_block(1, &mut fastrand::Rng::with_seed(4));

    h.peer.received(Message::MerkleBlock(block));
    assert!(h.events().is_empty());

    // Its transaction isn't matched against anything.
    h.peer.received(Message::Transaction(txs[0].clone()));
    assert!(matches!(&h.events()[..], [Event::Transaction(_, tx)] if *tx == txs[0]));
    assert!(h.peer.is_free());
}

#[test]
fn test_unmatched_transaction() {
    let mut h = Harness::connected();
    let mut rng = fastrand::Rng::with_seed(5);
    let (block, _) = gen::merkle_block(1, &mut rng);
    let tx = gen::transaction(&mut rng);

    h.peer.request_merkle_blocks(vec![block.block_hash()]);
    h.peer.received(Message::MerkleBlock(block));
    h.peer.received(Message::Transaction(tx.clone()));

    assert!(matches!(&h.events()[..], [Event::Transaction(_, t)] if *t == tx));
    assert!(!h.peer.is_free());
}

#[test]
fn test_inv_filtering() {
    let txid = gen::transaction(&mut fastrand::Rng::with_seed(6)).txid();
    let (recorder, events) = Recorder::new();
    let recorder = recorder.only([InventoryItem::Block(hash(1))]);
    let mut h = Harness::with(recorder, events);

    h.peer.received(Message::Version(mock::version(100)));
    h.peer.received(Message::Verack);
    h.sent();

    h.peer.received(Message::Inv(vec![
        InventoryItem::Block(hash(1)),
        InventoryItem::Tx(txid),
        InventoryItem::Block(hash(2)),
    ]));

    assert_eq!(
        h.sent(),
        vec![Message::GetData(vec![InventoryItem::FilteredBlock(hash(1))])]
    );
    assert_eq!(h.peer.pending(), &[hash(1)]);
}

#[test]
fn test_inv_nothing_wanted() {
    let (recorder, events) = Recorder::new();
    let mut h = Harness::with(recorder.only([]), events);

    h.peer.received(Message::Version(mock::version(100)));
    h.peer.received(Message::Verack);
    h.sent();
    h.peer.received(Message::Inv(vec![InventoryItem::Block(hash(1))]));

    assert!(h.sent().is_empty());
}

#[test]
fn test_relay() {
    let mut h = Harness::connected();
    let tx = gen::transaction(&mut fastrand::Rng::with_seed(7));
    let txid = tx.txid();

    h.peer.relay(tx.clone());

    assert_eq!(h.sent(), vec![Message::Inv(vec![InventoryItem::Tx(txid)])]);

    h.peer.received(Message::GetData(vec![InventoryItem::Tx(txid)]));

    assert_eq!(h.sent(), vec![Message::Transaction(tx)]);

    h.clock.elapse(RELAY_CACHE_TIMEOUT);
    h.peer.received(Message::GetData(vec![InventoryItem::Tx(txid)]));

    assert!(h.sent().is_empty(), "relayed transactions expire");
}

#[test]
fn test_addresses() {
    let mut h = Harness::connected();
    let addrs = vec![([1, 2, 3, 4], 8333).into()];

    h.peer.received(Message::Addr(addrs.clone()));

    assert!(matches!(&h.events()[..], [Event::Addresses(_, a)] if *a == addrs));
}

#[test]
fn test_close() {
    let mut h = Harness::connected();

    h.peer.request_merkle_blocks(vec![hash(1)]);
    h.peer.close();

    assert!(h.conn.is_closed());
    assert_eq!(h.peer.state(), State::Disconnected);
    assert!(h.events().is_empty());

    h.peer.disconnected(None);
    assert!(h.events().is_empty());
}
