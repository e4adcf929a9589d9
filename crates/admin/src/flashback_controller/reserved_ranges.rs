// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::trace;

use flashback_types::TableId;
use flashback_types::schema::{QualifiedTableName, SchemaSnapshot};

/// A contiguous block of table ids `[first, last]` whose data is never flashed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReservedCluster {
    first: TableId,
    last: TableId,
}

impl ReservedCluster {
    /// Cluster spanning `first..=last`.
    pub fn new(first: TableId, last: TableId) -> Self {
        debug_assert!(first <= last);
        Self { first, last }
    }

    pub fn first(&self) -> TableId {
        self.first
    }

    /// Inclusive, so that a cluster can end at [`TableId::MAX`].
    pub fn last(&self) -> TableId {
        self.last
    }

    pub fn contains(&self, table_id: TableId) -> bool {
        self.first <= table_id && table_id <= self.last
    }
}

/// Knows which table ids must never be included in a flashback.
pub trait ReservedRangeCatalog {
    /// Reserved clusters sorted ascending and pairwise disjoint.
    fn reserved_clusters(&self) -> &[ReservedCluster];

    fn is_reserved(&self, table_id: TableId) -> bool {
        let clusters = self.reserved_clusters();
        let idx = clusters.partition_point(|cluster| cluster.last < table_id);
        clusters
            .get(idx)
            .is_some_and(|cluster| cluster.contains(table_id))
    }
}

/// Reserved clusters built from a fixed set of ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservedRanges {
    clusters: Vec<ReservedCluster>,
}

impl ReservedRanges {
    /// Groups the given ids into maximal runs of consecutive ids.
    pub fn from_table_ids(table_ids: impl IntoIterator<Item = TableId>) -> Self {
        let ids: BTreeSet<_> = table_ids.into_iter().collect();
        let clusters = ids
            .into_iter()
            .map(|id| (id, id))
            .coalesce(|(first, last), (next, next_last)| {
                if last.is_adjacent_to(next) {
                    Ok((first, next_last))
                } else {
                    Err(((first, last), (next, next_last)))
                }
            })
            .map(|(first, last)| ReservedCluster::new(first, last))
            .collect();

        Self { clusters }
    }

    /// Resolves reserved tables by name against `schema`. Tables that don't exist in the schema
    /// are ignored. Because the ids are looked up on every call, a reserved table that got a new
    /// id (e.g. after a truncate) stays reserved.
    pub fn resolve(reserved_tables: &[QualifiedTableName], schema: &SchemaSnapshot) -> Self {
        let ids = reserved_tables.iter().flat_map(|name| {
            let table = schema.table(name);
            if table.is_none() {
                trace!("Reserved table '{name}' does not exist in schema version {}", schema.version);
            }
            table.into_iter().flat_map(|table| table.physical_ids())
        });

        Self::from_table_ids(ids)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

impl ReservedRangeCatalog for ReservedRanges {
    fn reserved_clusters(&self) -> &[ReservedCluster] {
        &self.clusters
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use flashback_types::config::FlashbackOptions;

    use super::*;
    use crate::flashback_controller::test_util::bootstrap_schema;

    fn id(id: i64) -> TableId {
        TableId::new(id)
    }

    #[test]
    fn group_consecutive_ids() {
        let reserved = ReservedRanges::from_table_ids([id(25), id(23), id(24), id(31), id(50), id(49)]);

        assert_that!(
            reserved.reserved_clusters(),
            eq(&[
                ReservedCluster::new(id(23), id(25)),
                ReservedCluster::new(id(31), id(31)),
                ReservedCluster::new(id(49), id(50)),
            ])
        );
    }

    #[test]
    fn membership() {
        let reserved = ReservedRanges::from_table_ids([id(23), id(24), id(25), id(31)]);

        for table_id in [23, 24, 25, 31] {
            assert!(reserved.is_reserved(id(table_id)), "{table_id} is reserved");
        }
        for table_id in [0, 22, 26, 30, 32, i64::MAX] {
            assert!(!reserved.is_reserved(id(table_id)), "{table_id} is not reserved");
        }
    }

    #[test]
    fn largest_table_id_can_be_reserved() {
        let reserved = ReservedRanges::from_table_ids([id(i64::MAX - 1), id(i64::MAX)]);

        assert_that!(
            reserved.reserved_clusters(),
            eq(&[ReservedCluster::new(id(i64::MAX - 1), TableId::MAX)])
        );
        assert!(reserved.is_reserved(TableId::MAX));
        assert!(reserved.is_reserved(id(i64::MAX - 1)));
        assert!(!reserved.is_reserved(id(i64::MAX - 2)));
    }

    #[test]
    fn resolve_statistics_tables_of_bootstrap_schema() {
        let reserved = ReservedRanges::resolve(
            &FlashbackOptions::default().reserved_tables,
            &bootstrap_schema(),
        );

        assert_that!(
            reserved.reserved_clusters(),
            eq(&[
                ReservedCluster::new(id(23), id(25)),
                ReservedCluster::new(id(31), id(31)),
                ReservedCluster::new(id(41), id(42)),
                ReservedCluster::new(id(46), id(46)),
                ReservedCluster::new(id(49), id(50)),
            ])
        );
    }

    #[test]
    fn unknown_reserved_tables_are_ignored() {
        let reserved = ReservedRanges::resolve(
            &[QualifiedTableName::new("nope", "nothing")],
            &bootstrap_schema(),
        );
        assert!(reserved.is_empty());
    }
}
