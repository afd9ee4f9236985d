//! Schema validation — the gate every record passes before persistence.
//!
//! Validation is total: every field is checked, every reason is collected,
//! and the function never panics. Records that fail are diverted to a
//! [`FailureReport`] and skipped; they never abort a batch.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::types::{RawTxRecord, TxRecord};

/// Validate a single raw record into the canonical shape.
///
/// Returns every reason the record is unacceptable, not just the first.
pub fn validate(raw: &RawTxRecord) -> Result<TxRecord, Vec<String>> {
    let mut reasons = Vec::new();

    let block_number = match raw.block_number {
        Some(n) => n,
        None => {
            reasons.push("missing block_number".to_string());
            0
        }
    };

    check_hash(&mut reasons, "block_hash", raw.block_hash.as_deref());
    check_hash(&mut reasons, "transaction_hash", raw.transaction_hash.as_deref());

    if raw.transaction_index.is_none() {
        reasons.push("missing transaction_index".to_string());
    }

    check_address(&mut reasons, "from_address", raw.from_address.as_deref());

    // Contract creation is represented by an absent to_address; an empty
    // string is a malformed record, not a creation.
    if let Some(to) = raw.to_address.as_deref() {
        if !is_hex_address(to) {
            reasons.push(format!("to_address is not a 20-byte hex address: {to:?}"));
        }
    }

    let amount = match raw.amount.as_deref() {
        None => {
            reasons.push("missing amount".to_string());
            None
        }
        Some(s) if !is_decimal_integer(s) => {
            reasons.push(format!("amount is not a non-negative integer: {s:?}"));
            None
        }
        Some(s) => match BigDecimal::from_str(s) {
            Ok(v) => Some(v),
            Err(e) => {
                reasons.push(format!("amount failed to parse: {e}"));
                None
            }
        },
    };

    if !reasons.is_empty() {
        return Err(reasons);
    }

    Ok(TxRecord {
        block_number,
        block_hash: raw.block_hash.clone().unwrap_or_default(),
        transaction_hash: raw.transaction_hash.clone().unwrap_or_default(),
        transaction_index: raw.transaction_index.unwrap_or_default(),
        from_address: raw.from_address.clone().unwrap_or_default(),
        to_address: raw.to_address.clone(),
        amount: amount.unwrap_or_default(),
        is_internal_call: raw.is_internal_call.unwrap_or(false),
    })
}

/// Validate a whole block's worth of raw records.
///
/// Valid records come back in input order; failures land in the report
/// keyed by `block_number` (the block being processed, so entries for
/// records missing their own number still identify the block).
pub fn validate_batch(raws: &[RawTxRecord], block_number: u64) -> (Vec<TxRecord>, FailureReport) {
    let mut records = Vec::with_capacity(raws.len());
    let mut report = FailureReport::default();
    for raw in raws {
        match validate(raw) {
            Ok(record) => records.push(record),
            Err(reasons) => {
                for reason in reasons {
                    report.record(raw.block_number.unwrap_or(block_number), reason);
                }
            }
        }
    }
    (records, report)
}

fn check_hash(reasons: &mut Vec<String>, field: &str, value: Option<&str>) {
    match value {
        None => reasons.push(format!("missing {field}")),
        Some(s) if !is_hex_hash(s) => {
            reasons.push(format!("{field} is not a 32-byte hex hash: {s:?}"));
        }
        Some(_) => {}
    }
}

fn check_address(reasons: &mut Vec<String>, field: &str, value: Option<&str>) {
    match value {
        None => reasons.push(format!("missing {field}")),
        Some(s) if !is_hex_address(s) => {
            reasons.push(format!("{field} is not a 20-byte hex address: {s:?}"));
        }
        Some(_) => {}
    }
}

/// `0x` + 64 hex digits (66 chars total).
fn is_hex_hash(s: &str) -> bool {
    is_prefixed_hex(s, 66)
}

/// `0x` + 40 hex digits (42 chars total).
fn is_hex_address(s: &str) -> bool {
    is_prefixed_hex(s, 42)
}

fn is_prefixed_hex(s: &str, len: usize) -> bool {
    s.len() == len
        && s.starts_with("0x")
        && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Digits only — no sign, no fractional part, no exponent.
fn is_decimal_integer(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// ─── FailureReport ───────────────────────────────────────────────────────────

/// One rejected record (or field) and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub block_number: u64,
    pub reason: String,
}

/// Flat sequence of validation failures accumulated over a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureReport {
    entries: Vec<FailureEntry>,
}

impl FailureReport {
    pub fn record(&mut self, block_number: u64, reason: impl Into<String>) {
        self.entries.push(FailureEntry {
            block_number,
            reason: reason.into(),
        });
    }

    pub fn extend(&mut self, other: FailureReport) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[FailureEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawTxRecord {
        RawTxRecord {
            block_number: Some(100),
            block_hash: Some(format!("0x{}", "a".repeat(64))),
            transaction_hash: Some(format!("0x{}", "b".repeat(64))),
            transaction_index: Some(0),
            from_address: Some(format!("0x{}", "1".repeat(40))),
            to_address: Some(format!("0x{}", "2".repeat(40))),
            amount: Some("1000000000000000000".to_string()),
            is_internal_call: None,
        }
    }

    #[test]
    fn valid_record_passes() {
        let record = validate(&raw()).expect("should validate");
        assert_eq!(record.block_number, 100);
        assert_eq!(record.transaction_index, 0);
        assert!(!record.is_internal_call);
    }

    #[test]
    fn genesis_block_accepted() {
        let mut r = raw();
        r.block_number = Some(0);
        assert!(validate(&r).is_ok());
    }

    #[test]
    fn zero_amount_accepted() {
        let mut r = raw();
        r.amount = Some("0".to_string());
        let record = validate(&r).unwrap();
        assert_eq!(record.amount, BigDecimal::from(0u32));
    }

    #[test]
    fn negative_amount_rejected() {
        let mut r = raw();
        r.amount = Some("-1".to_string());
        let reasons = validate(&r).unwrap_err();
        assert!(reasons.iter().any(|m| m.contains("amount")));
    }

    #[test]
    fn fractional_amount_rejected() {
        let mut r = raw();
        r.amount = Some("1.5".to_string());
        assert!(validate(&r).is_err());
    }

    #[test]
    fn absent_to_address_is_contract_creation() {
        let mut r = raw();
        r.to_address = None;
        let record = validate(&r).unwrap();
        assert!(record.to_address.is_none());
    }

    #[test]
    fn empty_to_address_rejected() {
        let mut r = raw();
        r.to_address = Some(String::new());
        let reasons = validate(&r).unwrap_err();
        assert!(reasons.iter().any(|m| m.contains("to_address")));
    }

    #[test]
    fn malformed_hashes_rejected() {
        let mut r = raw();
        r.block_hash = Some("0x123".to_string());
        r.transaction_hash = Some("not-hex".to_string());
        let reasons = validate(&r).unwrap_err();
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn all_reasons_collected() {
        let empty = RawTxRecord::default();
        let reasons = validate(&empty).unwrap_err();
        // block_number, block_hash, transaction_hash, transaction_index,
        // from_address, amount — to_address may legitimately be absent.
        assert_eq!(reasons.len(), 6);
    }

    #[test]
    fn batch_splits_valid_from_invalid() {
        let mut bad = raw();
        bad.amount = Some("nope".to_string());
        let (records, report) = validate_batch(&[raw(), bad], 100);
        assert_eq!(records.len(), 1);
        assert_eq!(report.len(), 1);
        assert_eq!(report.entries()[0].block_number, 100);
    }
}
