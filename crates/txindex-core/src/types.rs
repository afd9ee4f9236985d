//! Shared types for the indexing pipeline.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

// ─── BlockHeader ─────────────────────────────────────────────────────────────

/// A minimal block header — enough for lineage verification and progress
/// tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`, 32 bytes).
    pub hash: String,
    /// Parent block hash (`0x…`, 32 bytes).
    pub parent_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
}

impl BlockHeader {
    /// Returns `true` if this block's parent hash equals `hash` — the
    /// lineage check driving reorg detection.
    pub fn is_child_of(&self, hash: &str) -> bool {
        self.parent_hash == hash
    }
}

// ─── TxRecord ────────────────────────────────────────────────────────────────

/// The canonical validated transaction shape. Only records that passed
/// [`crate::validate`] carry this type; persistence accepts nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    /// Block number the transaction was included in.
    pub block_number: u64,
    /// Hash of the including block (`0x…`, 32 bytes).
    pub block_hash: String,
    /// Transaction hash (`0x…`, 32 bytes).
    pub transaction_hash: String,
    /// Position of the transaction within its block.
    pub transaction_index: u32,
    /// Sender address (`0x…`, 20 bytes).
    pub from_address: String,
    /// Recipient address; `None` for contract creation.
    pub to_address: Option<String>,
    /// Transferred value in wei. Exact — never a float.
    pub amount: BigDecimal,
    /// `true` when the record was captured from an internal call trace.
    pub is_internal_call: bool,
}

// ─── RawTxRecord ─────────────────────────────────────────────────────────────

/// The pre-validation transaction shape as assembled from RPC JSON.
///
/// Every field is optional so the validator can report exactly which ones
/// are missing or malformed; `amount` travels as a decimal string until the
/// validator admits it into an exact type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTxRecord {
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub transaction_hash: Option<String>,
    pub transaction_index: Option<u32>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub amount: Option<String>,
    pub is_internal_call: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64, hash: &str, parent: &str) -> BlockHeader {
        BlockHeader {
            number,
            hash: hash.into(),
            parent_hash: parent.into(),
            timestamp: (number * 12) as i64,
        }
    }

    #[test]
    fn lineage_check_matches_parent() {
        let child = header(101, "0xb", "0xa");
        assert!(child.is_child_of("0xa"));
        assert!(!child.is_child_of("0xdead"));
    }
}
