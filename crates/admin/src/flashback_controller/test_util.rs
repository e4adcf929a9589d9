// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! In-memory collaborators for testing flashback jobs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::anyhow;
use parking_lot::Mutex;
use serde_json::json;

use flashback_types::schema::{DatabaseInfo, SYSTEM_DATABASE, SchemaSnapshot, TableInfo};
use flashback_types::scheduler_config::SchedulerConfig;
use flashback_types::{KeyRange, TableId, Timestamp};

use crate::flashback_controller::catalog::{CatalogError, SchemaCatalog};
use crate::flashback_controller::scheduler_gate::{SchedulerConfigClient, SchedulerError};
use crate::flashback_controller::storage::{FlashbackStorage, StorageError};

/// System tables of a freshly bootstrapped cluster. The statistics tables sit between the other
/// system tables, so that excluding them splits the table id space into six runs.
pub fn bootstrap_schema() -> SchemaSnapshot {
    let system_tables = [
        (20, "user"),
        (21, "db"),
        (22, "tables_priv"),
        (23, "stats_meta"),
        (24, "stats_histograms"),
        (25, "stats_buckets"),
        (30, "bind_info"),
        (31, "stats_feedback"),
        (40, "global_grants"),
        (41, "stats_top_n"),
        (42, "stats_extended"),
        (45, "table_cache_meta"),
        (46, "stats_fm_sketch"),
        (48, "analyze_options"),
        (49, "stats_history"),
        (50, "stats_meta_history"),
        (60, "analyze_jobs"),
        (61, "advisory_locks"),
        (62, "plan_replayer_status"),
    ];

    let mut mysql = DatabaseInfo::new(SYSTEM_DATABASE);
    mysql.tables = system_tables
        .into_iter()
        .map(|(id, name)| TableInfo::base(TableId::new(id), name))
        .collect();

    SchemaSnapshot {
        version: 1,
        databases: vec![mysql, DatabaseInfo::new("test")],
    }
}

#[derive(Debug)]
pub struct MockCatalog {
    schema: Mutex<SchemaSnapshot>,
    fail_reads: AtomicBool,
}

impl MockCatalog {
    pub fn new(schema: SchemaSnapshot) -> Self {
        Self {
            schema: Mutex::new(schema),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn create_table(&self, database: &str, table: TableInfo) {
        let mut schema = self.schema.lock();
        schema.version += 1;
        schema
            .database_mut(database)
            .unwrap_or_else(|| panic!("unknown database '{database}'"))
            .tables
            .push(table);
    }

    /// Truncating a table moves its data to a newly allocated table id.
    pub fn truncate_table(&self, database: &str, table: &str) {
        let mut schema = self.schema.lock();
        let new_id = schema
            .max_table_id()
            .and_then(TableId::checked_next)
            .expect("table id space exhausted");
        schema.version += 1;

        let table = schema
            .database_mut(database)
            .and_then(|db| db.tables.iter_mut().find(|t| t.name == table))
            .unwrap_or_else(|| panic!("unknown table '{database}.{table}'"));
        table.id = new_id;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }
}

impl SchemaCatalog for MockCatalog {
    async fn snapshot(&self) -> Result<SchemaSnapshot, CatalogError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(CatalogError::new(anyhow!("schema catalog unavailable")));
        }
        Ok(self.schema.lock().clone())
    }
}

#[derive(Debug)]
pub struct MockScheduler {
    config: Mutex<SchedulerConfig>,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    set_calls: AtomicUsize,
}

impl Default for MockScheduler {
    fn default() -> Self {
        Self::with_config(
            [
                ("leader-schedule-limit", json!(4)),
                ("region-schedule-limit", json!(2048)),
                ("replica-schedule-limit", json!(64)),
                ("merge-schedule-limit", json!(8)),
                ("hot-region-schedule-limit", json!(4)),
                ("max-snapshot-count", json!(64)),
            ]
            .into_iter()
            .map(|(option, value)| (option.to_owned(), value))
            .collect(),
        )
    }
}

impl MockScheduler {
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config: Mutex::new(config),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            set_calls: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config.lock().clone()
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::Relaxed);
    }

    pub fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::Relaxed);
    }

    /// Number of configuration updates, including failed ones.
    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::Relaxed)
    }
}

impl SchedulerConfigClient for MockScheduler {
    async fn get_config(&self) -> Result<SchedulerConfig, SchedulerError> {
        if self.fail_get.load(Ordering::Relaxed) {
            return Err(SchedulerError::Unavailable(anyhow!("connection refused")));
        }
        Ok(self.config())
    }

    async fn set_config(&self, config: &SchedulerConfig) -> Result<(), SchedulerError> {
        self.set_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_set.load(Ordering::Relaxed) {
            return Err(SchedulerError::Unavailable(anyhow!("connection refused")));
        }
        self.config.lock().merge(config);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockStorage {
    now: Timestamp,
    safe_point: Timestamp,
    applied: Mutex<Vec<(Vec<KeyRange>, Timestamp)>>,
    fail_flashback: AtomicBool,
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new(
            Timestamp::from_unix_millis(1_700_000_000_000),
            Timestamp::from_unix_millis(1_699_999_000_000),
        )
    }
}

impl MockStorage {
    pub fn new(now: Timestamp, safe_point: Timestamp) -> Self {
        Self {
            now,
            safe_point,
            applied: Mutex::new(Vec::new()),
            fail_flashback: AtomicBool::new(false),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn safe_point(&self) -> Timestamp {
        self.safe_point
    }

    /// Every successful flashback in the order it was applied.
    pub fn applied(&self) -> Vec<(Vec<KeyRange>, Timestamp)> {
        self.applied.lock().clone()
    }

    pub fn fail_flashback(&self, fail: bool) {
        self.fail_flashback.store(fail, Ordering::Relaxed);
    }
}

impl FlashbackStorage for MockStorage {
    async fn current_timestamp(&self) -> Result<Timestamp, StorageError> {
        Ok(self.now)
    }

    async fn gc_safe_point(&self) -> Result<Timestamp, StorageError> {
        Ok(self.safe_point)
    }

    async fn flashback_to_version(
        &self,
        ranges: &[KeyRange],
        version: Timestamp,
    ) -> Result<(), StorageError> {
        if self.fail_flashback.load(Ordering::Relaxed) {
            return Err(StorageError::Generic(anyhow!("region unavailable")));
        }
        self.applied.lock().push((ranges.to_vec(), version));
        Ok(())
    }
}
