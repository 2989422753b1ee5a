//! Block and transaction fixtures.
pub use lightsync_common::block::*;

pub mod gen {
    //! Random generators.
    use lightsync_common::bitcoin::consensus::encode;
    use lightsync_common::bitcoin::hashes::Hash as _;
    use lightsync_common::block::*;
    use lightsync_common::network::Network;

    fn bytes(len: usize, rng: &mut fastrand::Rng) -> Vec<u8> {
        std::iter::repeat_with(|| rng.u8(..)).take(len).collect()
    }

    /// Generate a random transaction, with one input spending a random outpoint
    /// and one output with a random value.
    pub fn transaction(rng: &mut fastrand::Rng) -> Transaction {
        let mut raw = Vec::with_capacity(64);

        raw.extend_from_slice(&1u32.to_le_bytes()); // Version.
        raw.push(1); // Input count.
        raw.extend(bytes(32, rng)); // Previous txid.
        raw.extend_from_slice(&rng.u32(0..16).to_le_bytes()); // Previous vout.
        raw.push(0); // Script length.
        raw.extend_from_slice(&u32::MAX.to_le_bytes()); // Sequence.
        raw.push(1); // Output count.
        raw.extend_from_slice(&rng.u64(1..100_000_000).to_le_bytes()); // Value.
        raw.push(0); // Script length.
        raw.extend_from_slice(&0u32.to_le_bytes()); // Lock-time.

        encode::deserialize(&raw).expect("transaction encoding is valid")
    }

    /// Generate a random header on top of the given block.
    pub fn header(prev_blockhash: &BlockHash, rng: &mut fastrand::Rng) -> BlockHeader {
        let mut raw = Vec::with_capacity(80);

        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(&prev_blockhash.into_inner());
        raw.extend(bytes(32, rng)); // Merkle root.
        raw.extend_from_slice(&rng.u32(1_231_006_505..1_700_000_000).to_le_bytes());
        raw.extend_from_slice(&0x207fffffu32.to_le_bytes());
        raw.extend_from_slice(&rng.u32(..).to_le_bytes());

        encode::deserialize(&raw).expect("header encoding is valid")
    }

    /// Generate a chain of `count` headers on top of the genesis.
    pub fn headers(count: usize, rng: &mut fastrand::Rng) -> Vec<BlockHeader> {
        let mut tip = Network::Regtest.genesis_hash();
        let mut headers = Vec::with_capacity(count);

        for _ in 0..count {
            let header = header(&tip, rng);

            tip = header.block_hash();
            headers.push(header);
        }
        headers
    }

    /// Generate a filtered block with `count` matched transactions. The transactions
    /// are returned separately, in block order.
    pub fn merkle_block(count: usize, rng: &mut fastrand::Rng) -> (MerkleBlock, Vec<Transaction>) {
        let header = header(&Network::Regtest.genesis_hash(), rng);
        let txs = (0..count).map(|_| transaction(rng)).collect::<Vec<_>>();
        let block = MerkleBlock::new(header, txs.iter().map(|tx| tx.txid()).collect());

        (block, txs)
    }
}
