// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Configuration of the cluster scheduler which moves data between storage nodes.
//!
//! The scheduler exposes its configuration as an open set of named options. Only the scheduling
//! limits are interpreted here, every other option is carried along untouched.

use std::collections::BTreeMap;

use serde_json::Value;

/// Scheduling limits which, when set to zero, stop the scheduler from moving data around.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::EnumIter,
    strum::AsRefStr,
    strum::Display,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleLimit {
    LeaderScheduleLimit,
    RegionScheduleLimit,
    ReplicaScheduleLimit,
    MergeScheduleLimit,
    HotRegionScheduleLimit,
}

/// Snapshot of the scheduler's configuration options.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SchedulerConfig(BTreeMap<String, Value>);

impl SchedulerConfig {
    pub fn new(options: BTreeMap<String, Value>) -> Self {
        Self(options)
    }

    pub fn get(&self, option: &str) -> Option<&Value> {
        self.0.get(option)
    }

    pub fn set(&mut self, option: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(option.into(), value.into());
    }

    pub fn schedule_limit(&self, limit: ScheduleLimit) -> Option<u64> {
        self.0.get(limit.as_ref()).and_then(Value::as_u64)
    }

    pub fn set_schedule_limit(&mut self, limit: ScheduleLimit, value: u64) {
        self.set(limit.as_ref(), value);
    }

    pub fn contains(&self, option: &str) -> bool {
        self.0.contains_key(option)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrites every option present in `other`; options only known to `self` are kept.
    pub fn merge(&mut self, other: &SchedulerConfig) {
        for (option, value) in other.iter() {
            self.0.insert(option.clone(), value.clone());
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl FromIterator<(String, Value)> for SchedulerConfig {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn limit_option_names() {
        let names: Vec<_> = ScheduleLimit::iter().map(|l| l.to_string()).collect();
        assert_that!(
            names,
            eq(vec![
                "leader-schedule-limit",
                "region-schedule-limit",
                "replica-schedule-limit",
                "merge-schedule-limit",
                "hot-region-schedule-limit",
            ])
        );
    }

    #[test]
    fn typed_limits_over_open_options() {
        let mut config: SchedulerConfig = serde_json::from_value(json!({
            "hot-region-schedule-limit": 4,
            "max-snapshot-count": 64,
            "enable-location-replacement": "true",
        }))
        .expect("valid config");

        assert_that!(
            config.schedule_limit(ScheduleLimit::HotRegionScheduleLimit),
            some(eq(4))
        );
        assert_that!(config.schedule_limit(ScheduleLimit::LeaderScheduleLimit), none());

        config.set_schedule_limit(ScheduleLimit::HotRegionScheduleLimit, 0);
        assert_that!(
            serde_json::to_value(&config).expect("serializable"),
            eq(json!({
                "hot-region-schedule-limit": 0,
                "max-snapshot-count": 64,
                "enable-location-replacement": "true",
            }))
        );
    }

    #[test]
    fn merge_overwrites_known_options() {
        let mut current: SchedulerConfig = [
            ("a".to_owned(), json!(1)),
            ("b".to_owned(), json!(2)),
        ]
        .into_iter()
        .collect();
        let update: SchedulerConfig = [("b".to_owned(), json!(0))].into_iter().collect();

        current.merge(&update);
        assert_that!(current.get("a"), some(eq(&json!(1))));
        assert_that!(current.get("b"), some(eq(&json!(0))));
    }
}
