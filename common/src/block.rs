//! Block-related types.
pub use bitcoin::blockdata::block::{Block, BlockHeader};
pub use bitcoin::blockdata::transaction::Transaction;
pub use bitcoin::hash_types::{BlockHash, Txid};

/// Height of a block.
pub type Height = u64;

/// A filtered block: a block header along with the transactions it contains that
/// are of interest to us.
///
/// The list of associated transaction hashes is extracted from the partial merkle
/// tree sent by the remote, after the tree was verified against the header's merkle
/// root. The transactions themselves are sent separately by the remote, and added
/// as they arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlock {
    /// Block header.
    pub header: BlockHeader,
    /// Hashes of the matched transactions, in block order.
    pub associated: Vec<Txid>,
    /// Matched transactions received so far.
    pub transactions: Vec<Transaction>,
}

impl MerkleBlock {
    /// Create a new merkle block with no transactions.
    pub fn new(header: BlockHeader, associated: Vec<Txid>) -> Self {
        Self {
            header,
            associated,
            transactions: Vec::new(),
        }
    }

    /// Hash of the block.
    pub fn block_hash(&self) -> BlockHash {
        self.header.block_hash()
    }

    /// Add a matched transaction to this block.
    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// Check whether every associated transaction was added.
    pub fn is_complete(&self) -> bool {
        self.associated
            .iter()
            .all(|txid| self.transactions.iter().any(|tx| tx.txid() == *txid))
    }
}
