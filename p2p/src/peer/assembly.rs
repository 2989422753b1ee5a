//! Assembly of filtered blocks.
//!
//! A remote answers a request for a filtered block with a `merkleblock` message,
//! followed by one `tx` message for each matched transaction. An assembly holds
//! the block until all of them have arrived.
use std::collections::HashSet;

use lightsync_common::block::{BlockHash, MerkleBlock, Transaction, Txid};

/// A filtered block waiting for its matched transactions.
#[derive(Debug, Clone)]
pub struct MerkleBlockAssembly {
    block: MerkleBlock,
    expected: HashSet<Txid>,
    collected: Vec<Transaction>,
}

impl MerkleBlockAssembly {
    /// Start assembling the given block.
    pub fn new(block: MerkleBlock) -> Self {
        let expected = block.associated.iter().cloned().collect();

        Self {
            block,
            expected,
            collected: Vec::new(),
        }
    }

    /// Hash of the block being assembled.
    pub fn block_hash(&self) -> BlockHash {
        self.block.block_hash()
    }

    /// Whether the given transaction belongs to this block and wasn't received yet.
    pub fn expects(&self, txid: &Txid) -> bool {
        self.expected.contains(txid) && !self.collected.iter().any(|tx| tx.txid() == *txid)
    }

    /// Merge another announcement of the same block. Transactions announced by
    /// either are expected.
    pub fn merge(&mut self, block: MerkleBlock) {
        debug_assert_eq!(block.block_hash(), self.block_hash());

        for txid in block.associated {
            if self.expected.insert(txid) {
                self.block.associated.push(txid);
            }
        }
    }

    /// Add a transaction. Returns `false` if the transaction wasn't expected.
    pub fn add(&mut self, tx: Transaction) -> bool {
        if !self.expects(&tx.txid()) {
            return false;
        }
        self.collected.push(tx);

        true
    }

    /// Whether all expected transactions were collected.
    pub fn is_complete(&self) -> bool {
        self.collected.len() == self.expected.len()
    }

    /// Number of transactions still missing.
    pub fn missing(&self) -> usize {
        self.expected.len() - self.collected.len()
    }

    /// Finish the assembly, returning the block with its transactions added in
    /// block order, regardless of the order they arrived in.
    pub fn finish(self) -> MerkleBlock {
        let Self {
            mut block,
            mut collected,
            ..
        } = self;

        for txid in block.associated.clone() {
            if let Some(ix) = collected.iter().position(|tx| tx.txid() == txid) {
                block.add_transaction(collected.swap_remove(ix));
            }
        }
        block
    }
}
