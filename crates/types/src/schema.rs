// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A point-in-time view of the schema catalog.

use std::fmt;
use std::str::FromStr;

use crate::identifiers::TableId;

/// Name of the database holding the cluster's internal tables.
pub const SYSTEM_DATABASE: &str = "mysql";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableKind {
    Base,
    View,
    Sequence,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartitionInfo {
    pub id: TableId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TableInfo {
    pub id: TableId,
    pub name: String,
    pub kind: TableKind,
    /// Empty unless the table is partitioned.
    pub partitions: Vec<PartitionInfo>,
}

impl TableInfo {
    pub fn base(id: TableId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: TableKind::Base,
            partitions: Vec::new(),
        }
    }

    pub fn view(id: TableId, name: impl Into<String>) -> Self {
        Self {
            kind: TableKind::View,
            ..Self::base(id, name)
        }
    }

    pub fn with_partitions(
        mut self,
        partitions: impl IntoIterator<Item = (TableId, String)>,
    ) -> Self {
        self.partitions = partitions
            .into_iter()
            .map(|(id, name)| PartitionInfo { id, name })
            .collect();
        self
    }

    /// Ids under which this table stores data. A partitioned table owns its own id as well as the
    /// id of every partition. Views and sequences store no data.
    pub fn physical_ids(&self) -> impl Iterator<Item = TableId> + '_ {
        let owns_data = self.kind == TableKind::Base;
        owns_data
            .then(|| std::iter::once(self.id).chain(self.partitions.iter().map(|p| p.id)))
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub tables: Vec<TableInfo>,
}

impl DatabaseInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|table| table.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchemaSnapshot {
    pub version: i64,
    pub databases: Vec<DatabaseInfo>,
}

impl SchemaSnapshot {
    pub fn database(&self, name: &str) -> Option<&DatabaseInfo> {
        self.databases.iter().find(|db| db.name == name)
    }

    pub fn database_mut(&mut self, name: &str) -> Option<&mut DatabaseInfo> {
        self.databases.iter_mut().find(|db| db.name == name)
    }

    pub fn table(&self, name: &QualifiedTableName) -> Option<&TableInfo> {
        self.database(&name.database)
            .and_then(|db| db.table(&name.table))
    }

    /// All ids that currently hold table data, in no particular order.
    pub fn physical_table_ids(&self) -> impl Iterator<Item = TableId> + '_ {
        self.databases
            .iter()
            .flat_map(|db| db.tables.iter())
            .flat_map(TableInfo::physical_ids)
    }

    /// Largest id used by any table or partition.
    pub fn max_table_id(&self) -> Option<TableId> {
        self.databases
            .iter()
            .flat_map(|db| db.tables.iter())
            .flat_map(|table| std::iter::once(table.id).chain(table.partitions.iter().map(|p| p.id)))
            .max()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid table name '{0}', expected '<database>.<table>'")]
pub struct InvalidTableName(String);

/// A table name qualified with its database, written as `database.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedTableName {
    pub database: String,
    pub table: String,
}

impl QualifiedTableName {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    pub fn system(table: impl Into<String>) -> Self {
        Self::new(SYSTEM_DATABASE, table)
    }
}

impl fmt::Display for QualifiedTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

impl FromStr for QualifiedTableName {
    type Err = InvalidTableName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((database, table))
                if !database.is_empty() && !table.is_empty() && !table.contains('.') =>
            {
                Ok(Self::new(database, table))
            }
            _ => Err(InvalidTableName(s.to_owned())),
        }
    }
}
