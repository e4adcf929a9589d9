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

use flashback_types::{KeyRange, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Generic(anyhow::Error),
}

/// The storage layer's multi-version rollback primitive.
pub trait FlashbackStorage: Send + Sync + 'static {
    /// Latest timestamp issued by the cluster's timestamp oracle.
    fn current_timestamp(&self) -> impl Future<Output = Result<Timestamp, StorageError>> + Send;

    /// Versions older than the safe point may already have been garbage collected.
    fn gc_safe_point(&self) -> impl Future<Output = Result<Timestamp, StorageError>> + Send;

    /// Reverts every key in `ranges` to the value it had at `version`. Not reversible.
    fn flashback_to_version(
        &self,
        ranges: &[KeyRange],
        version: Timestamp,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}
