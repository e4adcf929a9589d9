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

use bytes::Bytes;
use itertools::Itertools;
use tracing::debug;

use flashback_types::keys::{encode_table_prefix, table_prefix_end};
use flashback_types::schema::QualifiedTableName;
use flashback_types::{KeyRange, TableId};

use crate::flashback_controller::catalog::{CatalogError, SchemaCatalog};
use crate::flashback_controller::reserved_ranges::{ReservedRangeCatalog, ReservedRanges};

/// Computes the key ranges a flashback has to revert: every table key at or above a lower bound,
/// except for the keys of reserved tables.
pub struct KeyRangeComputer<'a, C> {
    catalog: &'a C,
    reserved_tables: &'a [QualifiedTableName],
}

impl<'a, C: SchemaCatalog> KeyRangeComputer<'a, C> {
    pub fn new(catalog: &'a C, reserved_tables: &'a [QualifiedTableName]) -> Self {
        Self {
            catalog,
            reserved_tables,
        }
    }

    pub async fn compute_flashback_ranges(
        &self,
        lower_bound: &[u8],
    ) -> Result<Vec<KeyRange>, CatalogError> {
        let schema = self.catalog.snapshot().await?;
        let reserved = ReservedRanges::resolve(self.reserved_tables, &schema);

        let ranges = flashback_key_ranges(schema.physical_table_ids(), &reserved, lower_bound);
        debug!(
            "Computed {} flashback key ranges from schema version {} excluding {} reserved clusters",
            ranges.len(),
            schema.version,
            reserved.len()
        );

        Ok(ranges)
    }
}

/// Merges the existing `table_ids` which are not reserved into maximal runs of consecutive ids
/// and returns the key span of each run. Keys below `lower_bound` are never part of the result:
/// a run that starts below the bound is clipped to start at the bound.
///
/// Ids that were never allocated hold no data, but they still break a run. The result is sorted
/// ascending and pairwise disjoint.
pub fn flashback_key_ranges(
    table_ids: impl IntoIterator<Item = TableId>,
    reserved: &impl ReservedRangeCatalog,
    lower_bound: &[u8],
) -> Vec<KeyRange> {
    let table_ids: BTreeSet<_> = table_ids
        .into_iter()
        .filter(|table_id| table_prefix_end(*table_id).as_ref() > lower_bound)
        .filter(|table_id| !reserved.is_reserved(*table_id))
        .collect();

    table_ids
        .into_iter()
        .map(|table_id| (table_id, table_id))
        .coalesce(|(first, last), (next, next_last)| {
            if last.is_adjacent_to(next) {
                Ok((first, next_last))
            } else {
                Err(((first, last), (next, next_last)))
            }
        })
        .map(|(first, last)| run_key_range(first, last, lower_bound))
        .collect()
}

fn run_key_range(first: TableId, last: TableId, lower_bound: &[u8]) -> KeyRange {
    let mut start = encode_table_prefix(first);
    if start.as_ref() < lower_bound {
        start = Bytes::copy_from_slice(lower_bound);
    }
    let end = table_prefix_end(last);

    // the run was only kept because its end lies above the lower bound, so start < end holds
    KeyRange::new(start, end).unwrap_or_else(|err| unreachable!("{err}"))
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use flashback_types::config::FlashbackOptions;
    use flashback_types::keys::{decode_table_id, encode_table_prefix};
    use flashback_types::schema::{DatabaseInfo, TableInfo};
    use test_log::test;

    use super::*;
    use crate::flashback_controller::test_util::{MockCatalog, bootstrap_schema};

    fn id(id: i64) -> TableId {
        TableId::new(id)
    }

    fn prefix(table_id: i64) -> Bytes {
        encode_table_prefix(id(table_id))
    }

    fn table_spans(ranges: &[KeyRange]) -> Vec<(i64, i64)> {
        ranges
            .iter()
            .map(|range| {
                (
                    decode_table_id(range.start()).expect("table key").as_i64(),
                    decode_table_id(range.end()).expect("table key").as_i64(),
                )
            })
            .collect()
    }

    async fn compute(
        catalog: &MockCatalog,
        lower_bound: i64,
    ) -> std::result::Result<Vec<KeyRange>, CatalogError> {
        let reserved_tables = FlashbackOptions::default().reserved_tables;
        KeyRangeComputer::new(catalog, &reserved_tables)
            .compute_flashback_ranges(&prefix(lower_bound))
            .await
    }

    #[test(tokio::test)]
    async fn bootstrap_schema_yields_six_ranges() -> googletest::Result<()> {
        let catalog = MockCatalog::new(bootstrap_schema());

        let ranges = compute(&catalog, 0).await?;

        assert_that!(ranges.len(), eq(6));
        assert_that!(ranges[0].start(), eq(&prefix(20)));
        assert_that!(ranges[1].start(), eq(&prefix(30)));
        assert_that!(ranges[5].end(), eq(&prefix(62 + 1)));
        assert_that!(
            table_spans(&ranges),
            eq(vec![(20, 23), (30, 31), (40, 41), (45, 46), (48, 49), (60, 63)])
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn lower_bound_inside_run_clips_start() -> googletest::Result<()> {
        let catalog = MockCatalog::new(bootstrap_schema());

        // the run is [60, 63), starting at 61 only returns [61, 63)
        let ranges = compute(&catalog, 61).await?;

        assert_that!(ranges.len(), eq(1));
        assert_that!(ranges[0].start(), eq(&prefix(61)));
        assert_that!(ranges[0].end(), eq(&prefix(63)));
        Ok(())
    }

    #[test(tokio::test)]
    async fn runs_below_lower_bound_are_skipped() -> googletest::Result<()> {
        let catalog = MockCatalog::new(bootstrap_schema());

        // the runs are [48, 49), [60, 63), starting at 59 only returns [60, 63)
        let ranges = compute(&catalog, 59).await?;

        assert_that!(table_spans(&ranges), eq(vec![(60, 63)]));
        Ok(())
    }

    #[test(tokio::test)]
    async fn partitions_count_as_tables() -> googletest::Result<()> {
        let catalog = MockCatalog::new(bootstrap_schema());
        catalog.create_table(
            "test",
            TableInfo::base(id(63), "employees")
                .with_partitions((64..68).map(|p| (id(p), format!("p{}", p - 64)))),
        );

        let ranges = compute(&catalog, 63).await?;

        assert_that!(ranges.len(), eq(1));
        let span = decode_table_id(ranges[0].end())?.as_i64()
            - decode_table_id(ranges[0].start())?.as_i64();
        assert_that!(span, eq(5));
        Ok(())
    }

    #[test(tokio::test)]
    async fn truncated_reserved_tables_stay_excluded() -> googletest::Result<()> {
        let catalog = MockCatalog::new(bootstrap_schema());
        for table in ["stats_meta", "stats_histograms", "stats_buckets"] {
            catalog.truncate_table("mysql", table);
        }

        let ranges = compute(&catalog, 0).await?;

        // the tables moved from 23..=25 to 63..=65 and are still excluded
        assert_that!(
            table_spans(&ranges),
            eq(vec![(20, 23), (30, 31), (40, 41), (45, 46), (48, 49), (60, 63)])
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn empty_result_is_not_an_error() -> googletest::Result<()> {
        let catalog = MockCatalog::new(bootstrap_schema());

        assert!(compute(&catalog, 63).await?.is_empty());
        Ok(())
    }

    #[test(tokio::test)]
    async fn catalog_failures_are_propagated() {
        let catalog = MockCatalog::new(bootstrap_schema());
        catalog.fail_reads(true);

        assert!(compute(&catalog, 0).await.is_err());
    }

    #[test]
    fn only_reserved_tables_above_bound() {
        let reserved = ReservedRanges::from_table_ids([id(10), id(11)]);

        let ranges = flashback_key_ranges([id(5), id(10), id(11)], &reserved, &prefix(6));

        assert!(ranges.is_empty());
    }

    #[test]
    fn reserved_largest_table_id_is_excluded() {
        let reserved = ReservedRanges::from_table_ids([TableId::MAX]);

        let ranges = flashback_key_ranges([id(5), TableId::MAX], &reserved, &prefix(0));

        assert_that!(table_spans(&ranges), eq(vec![(5, 6)]));
        assert!(ranges.iter().all(|range| !range.contains(&encode_table_prefix(TableId::MAX))));
    }

    #[test]
    fn views_do_not_extend_runs() {
        let mut db = DatabaseInfo::new("test");
        db.tables.push(TableInfo::base(id(1), "a"));
        db.tables.push(TableInfo::view(id(2), "v"));
        db.tables.push(TableInfo::base(id(3), "b"));
        let ids: Vec<_> = db.tables.iter().flat_map(TableInfo::physical_ids).collect();

        let ranges = flashback_key_ranges(ids, &ReservedRanges::default(), &prefix(0));

        assert_that!(table_spans(&ranges), eq(vec![(1, 2), (3, 4)]));
    }

    #[test]
    fn lower_bound_within_table_keys() {
        let mut lower_bound = prefix(61).to_vec();
        lower_bound.extend_from_slice(b"_r\x00\x00\x00\x07");

        let ranges = flashback_key_ranges(
            [id(60), id(61), id(62)],
            &ReservedRanges::default(),
            &lower_bound,
        );

        assert_that!(ranges.len(), eq(1));
        assert_that!(ranges[0].start().as_ref(), eq(lower_bound.as_slice()));
        assert_that!(ranges[0].end(), eq(&prefix(63)));
    }

    #[test]
    fn ranges_are_sorted_disjoint_and_maximal() {
        let reserved = ReservedRanges::from_table_ids([id(4), id(9), id(10)]);
        let table_ids = [1, 2, 3, 4, 5, 6, 8, 9, 10, 11, 12, 20, -3, -2].map(id);

        for bound in -5..25 {
            let lower_bound = prefix(bound);
            let ranges = flashback_key_ranges(table_ids, &reserved, &lower_bound);

            for range in &ranges {
                assert!(range.start().as_ref() >= lower_bound.as_ref());
                let (first, end) = (
                    decode_table_id(range.start()).expect("table key"),
                    decode_table_id(range.end()).expect("table key"),
                );
                for table_id in first.as_i64()..end.as_i64() {
                    assert!(!reserved.is_reserved(id(table_id)));
                    assert!(table_ids.contains(&id(table_id)));
                }
            }
            for pair in ranges.windows(2) {
                assert!(pair[0].end() < pair[1].start(), "{:?} and {:?}", pair[0], pair[1]);
            }
            assert_that!(
                flashback_key_ranges(table_ids, &reserved, &lower_bound),
                eq(ranges)
            );
        }
    }
}
