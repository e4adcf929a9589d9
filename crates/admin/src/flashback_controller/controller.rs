// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use flashback_types::config::FlashbackOptions;
use flashback_types::errors::{ErrorCode, JobError};
use flashback_types::job::{FlashbackJob, JobState, SchemaState};
use flashback_types::keys::encode_table_prefix;

use crate::flashback_controller::catalog::SchemaCatalog;
use crate::flashback_controller::job_store::JobStore;
use crate::flashback_controller::key_ranges::KeyRangeComputer;
use crate::flashback_controller::observer::JobObserver;
use crate::flashback_controller::scheduler_gate::{
    SchedulerConfigClient, SchedulerError, SchedulerGate, SuspendedScheduling,
};
use crate::flashback_controller::service::JobHandle;
use crate::flashback_controller::storage::FlashbackStorage;
use crate::flashback_controller::{CancelError, FlashbackError};
use crate::metric_definitions::{
    FLASHBACK_JOB_DURATION, FLASHBACK_JOB_FINISHED, FLASHBACK_KEY_RANGES,
    FLASHBACK_SCHEMA_STATE_ENTERED,
};

/// Final result of a flashback job.
#[derive(Debug)]
pub struct JobOutcome {
    /// The job in its terminal state
    pub job: FlashbackJob,
    pub result: Result<(), FlashbackError>,
    /// Set if the scheduler configuration could not be restored. Does not change the outcome of
    /// the job.
    pub restore_error: Option<SchedulerError>,
}

impl JobOutcome {
    pub fn into_result(self) -> Result<FlashbackJob, FlashbackError> {
        self.result.map(|()| self.job)
    }
}

/// Drives a single job through its schema states.
pub(crate) struct FlashbackController<C, S, K> {
    options: FlashbackOptions,
    catalog: Arc<C>,
    gate: SchedulerGate<S>,
    storage: Arc<K>,
    observer: Arc<dyn JobObserver>,
    job_store: Arc<dyn JobStore>,
}

impl<C, S, K> FlashbackController<C, S, K>
where
    C: SchemaCatalog,
    S: SchedulerConfigClient,
    K: FlashbackStorage,
{
    pub fn new(
        options: FlashbackOptions,
        catalog: Arc<C>,
        scheduler: Arc<S>,
        storage: Arc<K>,
        observer: Arc<dyn JobObserver>,
        job_store: Arc<dyn JobStore>,
    ) -> Self {
        let gate = SchedulerGate::new(scheduler, options.suspended_schedule_limits.clone());
        Self {
            options,
            catalog,
            gate,
            storage,
            observer,
            job_store,
        }
    }

    pub fn storage(&self) -> &K {
        &self.storage
    }

    pub fn job_store(&self) -> &dyn JobStore {
        self.job_store.as_ref()
    }

    /// Runs the job until it reached a terminal state. Never returns early: every path that
    /// suspended the scheduler also restores it.
    pub async fn run(&self, handle: &JobHandle) -> JobOutcome {
        let started_at = Instant::now();
        let mut suspension = None;

        let result = match self.persist(handle, FlashbackJob::start_running) {
            Ok(()) => self.drive(handle, &mut suspension).await,
            Err(err) => Err(err),
        };

        let restore_error = match suspension {
            Some(suspension) => suspension.restore().await.err(),
            None => None,
        };

        let (state, error) = match &result {
            Ok(()) => (JobState::Synced, None),
            Err(err @ FlashbackError::Cancelled(_)) => {
                (JobState::Cancelled, Some(err.to_job_error()))
            }
            Err(err) => (JobState::Failed, Some(err.to_job_error())),
        };

        let ((), job) = handle.update(|job| {
            job.finish(state, error);
            if let Some(err) = &restore_error {
                job.set_secondary_error(JobError::new(
                    ErrorCode::Unknown,
                    format!("failed restoring the scheduler configuration: {err}"),
                ));
            }
        });

        if let Err(err) = self.job_store.archive(&job) {
            warn!("Failed to archive flashback job {}: {err}", job.id());
        }

        let state: &'static str = job.state().into();
        counter!(FLASHBACK_JOB_FINISHED, "state" => state).increment(1);
        histogram!(FLASHBACK_JOB_DURATION).record(started_at.elapsed().as_secs_f64());

        match &result {
            Ok(()) => info!("Flashback job {} finished", job.id()),
            Err(FlashbackError::Cancelled(_)) => info!("Flashback job {} was cancelled", job.id()),
            Err(err) => warn!("Flashback job {} failed: {err}", job.id()),
        }
        if let Some(err) = &restore_error {
            warn!(
                "Flashback job {} could not restore the scheduler configuration: {err}",
                job.id()
            );
        }

        JobOutcome {
            job,
            result,
            restore_error,
        }
    }

    async fn drive(
        &self,
        handle: &JobHandle,
        suspension: &mut Option<SuspendedScheduling<S>>,
    ) -> Result<(), FlashbackError> {
        loop {
            let job = handle.snapshot();
            let state = job.schema_state();
            if state == SchemaState::Done {
                return Ok(());
            }

            let label: &'static str = state.into();
            counter!(FLASHBACK_SCHEMA_STATE_ENTERED, "state" => label).increment(1);
            debug!("Flashback job {} entered schema state '{state}'", job.id());

            // the observer may cancel the job through the handle, so the job must not be locked
            self.observer.on_schema_state_entered(&job, handle);
            if let (Some(err), _) = handle.update(|job| interruption(job)) {
                return Err(err);
            }

            self.run_stage(handle, &job, suspension).await?;

            // checking for interruptions and advancing happen under one lock, so a cancellation
            // is either observed here or rejected by the cancellation policy
            self.persist(handle, |job| {
                if let Some(err) = interruption(job) {
                    return Err(err);
                }
                job.advance_schema_state();
                Ok(())
            })??;
        }
    }

    async fn run_stage(
        &self,
        handle: &JobHandle,
        job: &FlashbackJob,
        suspension: &mut Option<SuspendedScheduling<S>>,
    ) -> Result<(), FlashbackError> {
        let state = job.schema_state();
        match state {
            SchemaState::None => {
                self.check_timestamp(job).await?;
                let suspended = self
                    .gate
                    .suspend()
                    .await
                    .map_err(|source| FlashbackError::SchedulerSuspend { state, source })?;
                let snapshot = suspended.snapshot().clone();
                *suspension = Some(suspended);
                self.persist(handle, |job| job.set_scheduler_snapshot(snapshot))?;
            }
            SchemaState::DeleteOnly => {
                let lower_bound = encode_table_prefix(self.options.lower_bound_table_id);
                let ranges =
                    KeyRangeComputer::new(self.catalog.as_ref(), &self.options.reserved_tables)
                        .compute_flashback_ranges(&lower_bound)
                        .await
                        .map_err(|source| FlashbackError::Catalog { state, source })?;
                histogram!(FLASHBACK_KEY_RANGES).record(ranges.len() as f64);
                self.persist(handle, |job| {
                    job.set_key_ranges(ranges);
                })?;
            }
            SchemaState::WriteReorganization => {
                let ranges = job.key_ranges().unwrap_or_default();
                if ranges.is_empty() {
                    debug!("Flashback job {} has no key ranges to revert", job.id());
                } else {
                    self.storage
                        .flashback_to_version(ranges, job.as_of())
                        .await
                        .map_err(|source| FlashbackError::Storage { state, source })?;
                    info!(
                        "Flashback job {} reverted {} key ranges to {}",
                        job.id(),
                        ranges.len(),
                        job.as_of()
                    );
                }
            }
            // no stage work
            SchemaState::WriteOnly | SchemaState::Done => {}
        }
        Ok(())
    }

    async fn check_timestamp(&self, job: &FlashbackJob) -> Result<(), FlashbackError> {
        if job.as_of() >= job.start_ts() {
            return Err(FlashbackError::TimestampInFuture {
                as_of: job.as_of(),
                current: job.start_ts(),
            });
        }

        let safe_point =
            self.storage
                .gc_safe_point()
                .await
                .map_err(|source| FlashbackError::Storage {
                    state: job.schema_state(),
                    source,
                })?;
        if job.as_of() < safe_point {
            return Err(FlashbackError::TimestampBeforeSafePoint {
                as_of: job.as_of(),
                safe_point,
            });
        }

        Ok(())
    }

    /// Applies `f` to the job and persists the result.
    fn persist<R>(
        &self,
        handle: &JobHandle,
        f: impl FnOnce(&mut FlashbackJob) -> R,
    ) -> Result<R, FlashbackError> {
        let (result, job) = handle.update(f);
        self.job_store
            .save(&job)
            .map_err(|source| FlashbackError::JobStore {
                state: job.schema_state(),
                source,
            })?;
        Ok(result)
    }
}

/// Cancellation or abort requested for the job, cancellation taking precedence.
fn interruption(job: &FlashbackJob) -> Option<FlashbackError> {
    if job.is_cancel_requested() {
        return Some(FlashbackError::Cancelled(job.id()));
    }
    job.abort_error().map(|error| FlashbackError::Aborted {
        job_id: job.id(),
        error: error.clone(),
    })
}

/// A job can be interrupted as long as no data has been reverted.
fn ensure_interruptible(job: &FlashbackJob) -> Result<(), CancelError> {
    if job.state().is_terminal() {
        return Err(CancelError::AlreadyFinished(job.id()));
    }
    if !job.schema_state().is_rollbackable() {
        return Err(CancelError::NotRollbackable {
            job_id: job.id(),
            state: job.schema_state(),
        });
    }
    Ok(())
}

/// Cancellation policy.
pub(crate) fn request_cancel(job: &mut FlashbackJob) -> Result<(), CancelError> {
    ensure_interruptible(job)?;
    job.request_cancel();
    Ok(())
}

/// Fails the job with `error` under the same rules as a cancellation.
pub(crate) fn request_abort(job: &mut FlashbackJob, error: JobError) -> Result<(), CancelError> {
    ensure_interruptible(job)?;
    job.request_abort(error);
    Ok(())
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use flashback_types::{JobId, Timestamp};

    use super::*;

    fn job() -> FlashbackJob {
        FlashbackJob::new(JobId::new(1), Timestamp::new(100), Timestamp::new(50))
    }

    #[test]
    fn cancel_while_rollbackable() {
        let mut job = job();
        for _ in 0..2 {
            assert_that!(request_cancel(&mut job), ok(eq(())));
            assert!(job.is_cancel_requested());
            job.advance_schema_state();
        }

        job.advance_schema_state();
        assert_that!(job.schema_state(), eq(SchemaState::WriteReorganization));
        assert_that!(
            request_cancel(&mut job),
            err(eq(CancelError::NotRollbackable {
                job_id: JobId::new(1),
                state: SchemaState::WriteReorganization
            }))
        );
    }

    #[test]
    fn repeated_cancel_is_accepted() {
        let mut job = job();
        assert_that!(request_cancel(&mut job), ok(eq(())));
        assert_that!(request_cancel(&mut job), ok(eq(())));
    }

    #[test]
    fn cancel_finished_job() {
        let mut job = job();
        job.start_running();
        job.finish(JobState::Synced, None);

        assert_that!(
            request_cancel(&mut job),
            err(eq(CancelError::AlreadyFinished(JobId::new(1))))
        );
        assert!(!job.is_cancel_requested());
    }

    #[test]
    fn abort_follows_cancellation_rules() {
        let mut job = job();
        let error = JobError::new(ErrorCode::Unknown, "injected");
        assert_that!(request_abort(&mut job, error.clone()), ok(eq(())));
        assert_that!(
            interruption(&job).map(|err| err.to_job_error()),
            some(eq(error.clone()))
        );

        for _ in 0..3 {
            job.advance_schema_state();
        }
        assert!(request_abort(&mut job, error).is_err());
    }

    #[test]
    fn cancellation_takes_precedence_over_abort() {
        let mut job = job();
        job.request_abort(JobError::new(ErrorCode::Unknown, "injected"));
        job.request_cancel();

        assert!(matches!(interruption(&job), Some(FlashbackError::Cancelled(_))));
    }

    #[test]
    fn cancelled_job_reports_error_code() {
        let err = FlashbackError::Cancelled(JobId::new(7));
        assert_that!(err.code(), eq(ErrorCode::CancelledDdlJob));
        assert_that!(err.to_job_error().code.code(), eq(8214));
    }
}
