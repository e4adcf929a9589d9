// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::future::Future;

use flashback_types::schema::SchemaSnapshot;

#[derive(Debug, thiserror::Error)]
#[error("failed reading schema catalog: {0}")]
pub struct CatalogError(#[source] anyhow::Error);

impl CatalogError {
    pub fn new(cause: impl Into<anyhow::Error>) -> Self {
        Self(cause.into())
    }
}

/// Read access to the schema catalog.
pub trait SchemaCatalog: Send + Sync + 'static {
    /// Returns the latest schema including every database, table and partition.
    fn snapshot(&self) -> impl Future<Output = Result<SchemaSnapshot, CatalogError>> + Send;
}
