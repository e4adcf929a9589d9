// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::str::FromStr;

/// Identifies a logical table or a single partition of a partitioned table.
///
/// Ids are allocated monotonically over the lifetime of the cluster, hence the id space is sparse.
/// Two ids are adjacent if they differ by exactly one, regardless of whether anything was ever
/// allocated in between.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct TableId(i64);

impl TableId {
    pub const MIN: TableId = TableId(i64::MIN);
    pub const MAX: TableId = TableId(i64::MAX);

    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns the directly adjacent id, or `None` if this is [`TableId::MAX`].
    pub fn checked_next(self) -> Option<TableId> {
        self.0.checked_add(1).map(TableId)
    }

    pub fn is_adjacent_to(self, other: TableId) -> bool {
        self.checked_next() == Some(other)
    }
}

impl FromStr for TableId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(TableId)
    }
}

/// Identifies a single flashback job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}
