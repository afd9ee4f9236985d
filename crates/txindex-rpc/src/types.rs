//! EVM node response shapes and hex conversion helpers.

use num_bigint::BigUint;
use serde::Deserialize;

use txindex_core::types::{BlockHeader, RawTxRecord};

use crate::error::TransportError;

/// A block as returned by `eth_getBlockByNumber`. With `full = false` the
/// `transactions` array holds hashes and deserializes away to empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: String,
    #[serde(default, deserialize_with = "full_transactions_only")]
    pub transactions: Vec<RpcTransaction>,
}

/// A transaction object as returned inside a full block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: Option<String>,
    pub block_number: Option<String>,
    pub block_hash: Option<String>,
    pub transaction_index: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
}

impl RpcBlock {
    /// Parse the header fields into the domain type.
    pub fn header(&self) -> Result<BlockHeader, TransportError> {
        Ok(BlockHeader {
            number: parse_hex_u64(&self.number).ok_or_else(|| {
                TransportError::InvalidResponse(format!("bad block number: {:?}", self.number))
            })?,
            hash: self.hash.clone(),
            parent_hash: self.parent_hash.clone(),
            timestamp: parse_hex_u64(&self.timestamp).unwrap_or(0) as i64,
        })
    }
}

impl RpcTransaction {
    /// Convert to the pre-validation record shape. Numeric fields that fail
    /// to parse become `None` so the validator reports them instead of the
    /// transport guessing.
    pub fn to_raw_record(&self) -> RawTxRecord {
        RawTxRecord {
            block_number: self.block_number.as_deref().and_then(parse_hex_u64),
            block_hash: self.block_hash.clone(),
            transaction_hash: self.hash.clone(),
            transaction_index: self
                .transaction_index
                .as_deref()
                .and_then(parse_hex_u64)
                .map(|i| i as u32),
            from_address: self.from.clone(),
            to_address: self.to.clone(),
            amount: self.value.as_deref().and_then(hex_to_decimal),
            is_internal_call: None,
        }
    }
}

/// When `full = false` the array holds hash strings; keep only objects.
fn full_transactions_only<'de, D>(deserializer: D) -> Result<Vec<RpcTransaction>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HashOrObject {
        Hash(String),
        Object(RpcTransaction),
    }

    let mixed = Vec::<HashOrObject>::deserialize(deserializer)?;
    Ok(mixed
        .into_iter()
        .filter_map(|e| match e {
            HashOrObject::Object(tx) => Some(tx),
            HashOrObject::Hash(_) => None,
        })
        .collect())
}

/// Parse a `0x`-prefixed hex quantity to u64.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Convert a hex quantity of arbitrary width to its decimal string form —
/// wei values exceed u64, so this goes through a big integer.
pub fn hex_to_decimal(s: &str) -> Option<String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Some("0".to_string());
    }
    BigUint::parse_bytes(digits.as_bytes(), 16).map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_quantities() {
        assert_eq!(parse_hex_u64("0x1"), Some(1));
        assert_eq!(parse_hex_u64("0xff"), Some(255));
        assert_eq!(parse_hex_u64("0x"), None);
        assert_eq!(parse_hex_u64("0xzz"), None);
    }

    #[test]
    fn wei_values_exceed_u64() {
        // 1,000 ETH in wei.
        assert_eq!(
            hex_to_decimal("0x3635c9adc5dea00000").as_deref(),
            Some("1000000000000000000000")
        );
        assert_eq!(hex_to_decimal("0x0").as_deref(), Some("0"));
    }

    #[test]
    fn block_with_full_transactions_decodes() {
        let json = r#"{
            "number": "0x64",
            "hash": "0xaaa",
            "parentHash": "0x999",
            "timestamp": "0x5f5e100",
            "transactions": [{
                "hash": "0xt1",
                "blockNumber": "0x64",
                "blockHash": "0xaaa",
                "transactionIndex": "0x0",
                "from": "0xf1",
                "to": null,
                "value": "0xde0b6b3a7640000"
            }]
        }"#;
        let block: RpcBlock = serde_json::from_str(json).unwrap();
        let header = block.header().unwrap();
        assert_eq!(header.number, 100);
        assert_eq!(header.parent_hash, "0x999");

        let raw = block.transactions[0].to_raw_record();
        assert_eq!(raw.block_number, Some(100));
        assert_eq!(raw.amount.as_deref(), Some("1000000000000000000"));
        assert!(raw.to_address.is_none(), "contract creation carries no to");
    }

    #[test]
    fn hash_only_transaction_list_is_dropped() {
        let json = r#"{
            "number": "0x64",
            "hash": "0xaaa",
            "parentHash": "0x999",
            "timestamp": "0x0",
            "transactions": ["0xt1", "0xt2"]
        }"#;
        let block: RpcBlock = serde_json::from_str(json).unwrap();
        assert!(block.transactions.is_empty());
    }
}
