// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Flashback of the whole cluster to a past timestamp.
//!
//! A flashback runs as a job that moves through the schema states
//! `None -> DeleteOnly -> WriteOnly -> WriteReorganization -> Done`:
//!
//! * `None`: the target timestamp is validated and the cluster scheduler is suspended.
//! * `DeleteOnly`: the key ranges to revert are computed.
//! * `WriteOnly`: makes the pending flashback visible before anything gets reverted.
//! * `WriteReorganization`: the key ranges are reverted. From here on the job can no longer be
//!   cancelled.
//!
//! Whatever the outcome, the scheduler configuration captured in `None` is restored once the job
//! finished.

pub mod catalog;
mod controller;
pub mod job_store;
pub mod key_ranges;
pub mod observer;
pub mod reserved_ranges;
pub mod scheduler_gate;
pub mod service;
pub mod storage;
#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

use flashback_types::errors::{ErrorCode, JobError};
use flashback_types::job::SchemaState;
use flashback_types::{JobId, Timestamp};

pub use catalog::{CatalogError, SchemaCatalog};
pub use controller::JobOutcome;
pub use job_store::{InMemoryJobStore, JobStore, JobStoreError};
pub use key_ranges::KeyRangeComputer;
pub use observer::{JobObserver, NoopObserver};
pub use reserved_ranges::{ReservedCluster, ReservedRangeCatalog, ReservedRanges};
pub use scheduler_gate::{SchedulerConfigClient, SchedulerError, SchedulerGate, SuspendedScheduling};
pub use service::{FlashbackService, FlashbackServiceBuilder, JobCompletion, JobHandle};
pub use storage::{FlashbackStorage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum FlashbackError {
    #[error("flashback job {0} was cancelled")]
    Cancelled(JobId),
    #[error("flashback job {job_id} was aborted: {error}")]
    Aborted { job_id: JobId, error: JobError },
    #[error("flashback timestamp {as_of} is not older than the current timestamp {current}")]
    TimestampInFuture { as_of: Timestamp, current: Timestamp },
    #[error("flashback timestamp {as_of} is older than the GC safe point {safe_point}")]
    TimestampBeforeSafePoint {
        as_of: Timestamp,
        safe_point: Timestamp,
    },
    #[error("failed reading the schema catalog in schema state '{state}': {source}")]
    Catalog {
        state: SchemaState,
        #[source]
        source: CatalogError,
    },
    #[error("failed suspending cluster scheduling in schema state '{state}': {source}")]
    SchedulerSuspend {
        state: SchemaState,
        #[source]
        source: SchedulerError,
    },
    #[error("storage operation failed in schema state '{state}': {source}")]
    Storage {
        state: SchemaState,
        #[source]
        source: StorageError,
    },
    #[error("failed persisting the job in schema state '{state}': {source}")]
    JobStore {
        state: SchemaState,
        #[source]
        source: JobStoreError,
    },
    #[error("flashback job {0} is already running")]
    JobAlreadyRunning(JobId),
    #[error("flashback worker stopped before the job finished")]
    WorkerStopped,
}

impl FlashbackError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FlashbackError::Cancelled(_) => ErrorCode::CancelledDdlJob,
            FlashbackError::Aborted { error, .. } => error.code,
            FlashbackError::TimestampInFuture { .. } => ErrorCode::WrongValue,
            FlashbackError::TimestampBeforeSafePoint { .. } => ErrorCode::GcTooEarly,
            FlashbackError::Catalog { .. }
            | FlashbackError::SchedulerSuspend { .. }
            | FlashbackError::Storage { .. }
            | FlashbackError::JobStore { .. }
            | FlashbackError::JobAlreadyRunning(_)
            | FlashbackError::WorkerStopped => ErrorCode::Unknown,
        }
    }

    pub fn to_job_error(&self) -> JobError {
        match self {
            FlashbackError::Aborted { error, .. } => error.clone(),
            _ => JobError::new(self.code(), self.to_string()),
        }
    }
}

/// Negative answer to a request to cancel or abort a job. Not a failure of the job itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    #[error("flashback job {job_id} cannot be cancelled in schema state '{state}'")]
    NotRollbackable { job_id: JobId, state: SchemaState },
    #[error("flashback job {0} has already finished")]
    AlreadyFinished(JobId),
    #[error("flashback job {0} is not running")]
    NotFound(JobId),
}

impl CancelError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CancelError::NotRollbackable { .. } => ErrorCode::CannotCancelDdlJob,
            CancelError::AlreadyFinished(_) => ErrorCode::CancelFinishedDdlJob,
            CancelError::NotFound(_) => ErrorCode::Unknown,
        }
    }
}
