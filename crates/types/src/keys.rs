// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Encoding of table keys.
//!
//! Every row and index entry of a table lives under the table prefix: the byte `t` followed by the
//! memory-comparable encoding of the [`TableId`]. Because the encoding preserves the ordering of
//! ids, the key span of the ids `a..=b` is exactly `prefix(a)..prefix(b + 1)`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::identifiers::TableId;

pub const TABLE_PREFIX: u8 = b't';
pub const TABLE_PREFIX_LEN: usize = 1 + size_of::<u64>();

const SIGN_MASK: u64 = 0x8000_0000_0000_0000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyDecodeError {
    #[error("key of length {0} is too short to contain a table prefix")]
    TooShort(usize),
    #[error("key does not start with the table prefix byte")]
    NotATableKey,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid key range: start key {start:?} must be smaller than end key {end:?}")]
pub struct InvalidKeyRange {
    start: Bytes,
    end: Bytes,
}

pub fn encode_table_prefix(table_id: TableId) -> Bytes {
    let mut buf = BytesMut::with_capacity(TABLE_PREFIX_LEN);
    buf.put_u8(TABLE_PREFIX);
    buf.put_u64(table_id.as_i64() as u64 ^ SIGN_MASK);
    buf.freeze()
}

/// Decodes the table id of any key that lives under a table prefix.
pub fn decode_table_id(key: &[u8]) -> Result<TableId, KeyDecodeError> {
    if key.len() < TABLE_PREFIX_LEN {
        return Err(KeyDecodeError::TooShort(key.len()));
    }
    if key[0] != TABLE_PREFIX {
        return Err(KeyDecodeError::NotATableKey);
    }

    let mut encoded = [0u8; 8];
    encoded.copy_from_slice(&key[1..TABLE_PREFIX_LEN]);
    Ok(TableId::new((u64::from_be_bytes(encoded) ^ SIGN_MASK) as i64))
}

/// Exclusive end of the key span owned by `table_id`.
pub fn table_prefix_end(table_id: TableId) -> Bytes {
    match table_id.checked_next() {
        Some(next) => encode_table_prefix(next),
        None => prefix_next(&encode_table_prefix(table_id)),
    }
}

/// Smallest key that is larger than every key starting with `prefix`.
fn prefix_next(prefix: &[u8]) -> Bytes {
    let mut next = prefix.to_vec();
    while let Some(last) = next.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return Bytes::from(next);
        }
        next.pop();
    }
    // prefix consisted only of 0xff bytes, append to make it larger
    let mut next = prefix.to_vec();
    next.push(0);
    Bytes::from(next)
}

/// A span of keys `[start, end)`. The start key is always smaller than the end key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct KeyRange {
    start: Bytes,
    end: Bytes,
}

impl KeyRange {
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Result<Self, InvalidKeyRange> {
        let (start, end) = (start.into(), end.into());
        if start >= end {
            return Err(InvalidKeyRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The key span owned by the consecutive table ids `first..=last`.
    pub fn for_tables(first: TableId, last: TableId) -> Result<Self, InvalidKeyRange> {
        Self::new(encode_table_prefix(first), table_prefix_end(last))
    }

    pub fn start(&self) -> &Bytes {
        &self.start
    }

    pub fn end(&self) -> &Bytes {
        &self.end
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.start.as_ref() <= key && key < self.end.as_ref()
    }

    pub fn overlaps(&self, other: &KeyRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Debug for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // table keys are printed by id, anything else in hex
        fn key(f: &mut fmt::Formatter<'_>, key: &[u8]) -> fmt::Result {
            match decode_table_id(key) {
                Ok(id) if key.len() == TABLE_PREFIX_LEN => write!(f, "t{id}"),
                _ => {
                    for byte in key {
                        write!(f, "{byte:02x}")?;
                    }
                    Ok(())
                }
            }
        }

        f.write_str("[")?;
        key(f, &self.start)?;
        f.write_str(", ")?;
        key(f, &self.end)?;
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn prefix_order_follows_id_order() {
        let ids = [i64::MIN, -42, -1, 0, 1, 20, 63, i64::MAX];
        for pair in ids.windows(2) {
            let lower = encode_table_prefix(TableId::new(pair[0]));
            let upper = encode_table_prefix(TableId::new(pair[1]));
            assert!(lower < upper, "{} must sort before {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn decode_prefix_and_row_keys() -> googletest::Result<()> {
        let prefix = encode_table_prefix(TableId::new(61));
        assert_that!(decode_table_id(&prefix)?, eq(TableId::new(61)));

        let mut row_key = prefix.to_vec();
        row_key.extend_from_slice(b"_r\x00\x01");
        assert_that!(decode_table_id(&row_key)?, eq(TableId::new(61)));

        assert_that!(decode_table_id(b"t\x00"), err(eq(KeyDecodeError::TooShort(2))));
        assert_that!(
            decode_table_id(b"m\x00\x00\x00\x00\x00\x00\x00\x01"),
            err(eq(KeyDecodeError::NotATableKey))
        );
        Ok(())
    }

    #[test]
    fn prefix_end_of_last_id() {
        let end = table_prefix_end(TableId::MAX);
        assert!(end > encode_table_prefix(TableId::MAX));
        assert_that!(end.as_ref(), eq(b"u".as_slice()));

        assert_that!(
            table_prefix_end(TableId::new(62)),
            eq(encode_table_prefix(TableId::new(63)))
        );
    }

    #[test]
    fn key_range_rejects_empty_spans() {
        let prefix = encode_table_prefix(TableId::new(1));
        assert!(KeyRange::new(prefix.clone(), prefix.clone()).is_err());
        assert!(KeyRange::new(table_prefix_end(TableId::new(1)), prefix).is_err());
    }

    #[test]
    fn key_range_for_tables() -> googletest::Result<()> {
        let range = KeyRange::for_tables(TableId::new(60), TableId::new(62))?;
        assert_that!(range.start(), eq(&encode_table_prefix(TableId::new(60))));
        assert_that!(range.end(), eq(&encode_table_prefix(TableId::new(63))));
        assert!(range.contains(&encode_table_prefix(TableId::new(62))));
        assert!(!range.contains(&encode_table_prefix(TableId::new(63))));
        assert_that!(format!("{range:?}"), eq("[t60, t63)"));
        Ok(())
    }
}
