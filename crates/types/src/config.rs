// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde_with::{DisplayFromStr, serde_as};
use strum::IntoEnumIterator;

use crate::identifiers::TableId;
use crate::scheduler_config::ScheduleLimit;
use crate::schema::QualifiedTableName;

/// Statistics tables must survive a flashback to keep the optimizer's view of the data consistent
/// with the statistics collected after the target timestamp.
pub const DEFAULT_RESERVED_TABLES: [&str; 9] = [
    "stats_meta",
    "stats_histograms",
    "stats_buckets",
    "stats_feedback",
    "stats_top_n",
    "stats_extended",
    "stats_fm_sketch",
    "stats_history",
    "stats_meta_history",
];

/// # Flashback options
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FlashbackOptions {
    /// # Reserved tables
    ///
    /// Tables, written as `database.table`, whose data is never flashed back.
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub reserved_tables: Vec<QualifiedTableName>,

    /// # Suspended schedule limits
    ///
    /// Scheduler limits that are set to zero while a flashback job runs.
    pub suspended_schedule_limits: Vec<ScheduleLimit>,

    /// # Lower bound table id
    ///
    /// Tables with a smaller id are not flashed back.
    pub lower_bound_table_id: TableId,
}

impl Default for FlashbackOptions {
    fn default() -> Self {
        Self {
            reserved_tables: DEFAULT_RESERVED_TABLES
                .into_iter()
                .map(QualifiedTableName::system)
                .collect(),
            suspended_schedule_limits: ScheduleLimit::iter().collect(),
            lower_bound_table_id: TableId::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn defaults() {
        let options = FlashbackOptions::default();
        assert_that!(options.reserved_tables.len(), eq(9));
        assert_that!(
            options.reserved_tables.first(),
            some(eq(&QualifiedTableName::system("stats_meta")))
        );
        assert_that!(options.suspended_schedule_limits.len(), eq(5));
    }

    #[test]
    fn parse_from_toml() -> googletest::Result<()> {
        let options: FlashbackOptions = toml::from_str(
            r#"
            reserved-tables = ["mysql.stats_meta", "audit.events"]
            suspended-schedule-limits = ["hot-region-schedule-limit"]
            "#,
        )?;

        assert_that!(
            options.reserved_tables,
            eq(vec![
                QualifiedTableName::system("stats_meta"),
                QualifiedTableName::new("audit", "events"),
            ])
        );
        assert_that!(
            options.suspended_schedule_limits,
            eq(vec![ScheduleLimit::HotRegionScheduleLimit])
        );
        assert_that!(options.lower_bound_table_id, eq(TableId::new(0)));
        Ok(())
    }

    #[test]
    fn reject_unqualified_reserved_table() {
        let result = toml::from_str::<FlashbackOptions>(r#"reserved-tables = ["stats_meta"]"#);
        assert!(result.is_err());
    }
}
