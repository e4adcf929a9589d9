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
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{Instrument, info, info_span, warn};

use flashback_types::config::FlashbackOptions;
use flashback_types::errors::JobError;
use flashback_types::job::{FlashbackJob, SchemaState};
use flashback_types::{JobId, Timestamp};

use crate::flashback_controller::catalog::SchemaCatalog;
use crate::flashback_controller::controller::{
    FlashbackController, JobOutcome, request_abort, request_cancel,
};
use crate::flashback_controller::job_store::{InMemoryJobStore, JobStore};
use crate::flashback_controller::observer::{JobObserver, NoopObserver};
use crate::flashback_controller::scheduler_gate::SchedulerConfigClient;
use crate::flashback_controller::storage::FlashbackStorage;
use crate::flashback_controller::{CancelError, FlashbackError};
use crate::metric_definitions::{
    FLASHBACK_CANCEL_REQUESTS, FLASHBACK_JOB_SUBMITTED, describe_metrics,
};

/// Shared access to a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    job: Arc<Mutex<FlashbackJob>>,
}

impl JobHandle {
    fn new(job: FlashbackJob) -> Self {
        Self {
            id: job.id(),
            job: Arc::new(Mutex::new(job)),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn snapshot(&self) -> FlashbackJob {
        self.job.lock().clone()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.job.lock().is_cancel_requested()
    }

    /// Requests the cancellation of the job. Succeeds as long as the job has not started
    /// reverting data; the job then finishes as cancelled at its next state boundary.
    pub fn cancel(&self) -> Result<(), CancelError> {
        let result = request_cancel(&mut self.job.lock());

        let label = match &result {
            Ok(()) => {
                info!("Cancellation of flashback job {} requested", self.id);
                "accepted"
            }
            Err(err) => {
                info!("Rejected cancellation of flashback job {}: {err}", self.id);
                "rejected"
            }
        };
        counter!(FLASHBACK_CANCEL_REQUESTS, "result" => label).increment(1);

        result
    }

    /// Attaches `error` to the job, which then finishes as failed with that error at its next
    /// state boundary. Follows the same rules as [`JobHandle::cancel`].
    pub fn fail(&self, error: JobError) -> Result<(), CancelError> {
        let result = request_abort(&mut self.job.lock(), error);
        match &result {
            Ok(()) => info!("Abort of flashback job {} requested", self.id),
            Err(err) => info!("Rejected abort of flashback job {}: {err}", self.id),
        }
        result
    }

    /// Applies `f` to the job and returns its result together with a copy of the updated job.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut FlashbackJob) -> R) -> (R, FlashbackJob) {
        let mut job = self.job.lock();
        let result = f(&mut job);
        (result, job.clone())
    }
}

/// Resolves once the job reached its terminal state.
#[derive(Debug)]
pub struct JobCompletion {
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobCompletion {
    pub async fn wait(self) -> Result<JobOutcome, FlashbackError> {
        self.rx.await.map_err(|_| FlashbackError::WorkerStopped)
    }
}

pub struct FlashbackServiceBuilder<C, S, K> {
    options: FlashbackOptions,
    catalog: Arc<C>,
    scheduler: Arc<S>,
    storage: Arc<K>,
    observer: Arc<dyn JobObserver>,
    job_store: Arc<dyn JobStore>,
}

impl<C, S, K> FlashbackServiceBuilder<C, S, K>
where
    C: SchemaCatalog,
    S: SchedulerConfigClient,
    K: FlashbackStorage,
{
    pub fn observer(mut self, observer: impl JobObserver) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn job_store(mut self, job_store: Arc<dyn JobStore>) -> Self {
        self.job_store = job_store;
        self
    }

    pub fn build(self) -> FlashbackService<C, S, K> {
        describe_metrics();

        FlashbackService {
            controller: Arc::new(FlashbackController::new(
                self.options,
                self.catalog,
                self.scheduler,
                self.storage,
                self.observer,
                self.job_store,
            )),
            running: Arc::new(Mutex::new(None)),
            next_job_id: AtomicU64::new(1),
        }
    }
}

/// Entry point for flashing back the cluster. At most one flashback job runs at a time.
pub struct FlashbackService<C, S, K> {
    controller: Arc<FlashbackController<C, S, K>>,
    running: Arc<Mutex<Option<JobHandle>>>,
    next_job_id: AtomicU64,
}

impl<C, S, K> FlashbackService<C, S, K>
where
    C: SchemaCatalog,
    S: SchedulerConfigClient,
    K: FlashbackStorage,
{
    pub fn builder(
        options: FlashbackOptions,
        catalog: Arc<C>,
        scheduler: Arc<S>,
        storage: Arc<K>,
    ) -> FlashbackServiceBuilder<C, S, K> {
        FlashbackServiceBuilder {
            options,
            catalog,
            scheduler,
            storage,
            observer: Arc::new(NoopObserver),
            job_store: Arc::new(InMemoryJobStore::default()),
        }
    }

    /// Submits a job flashing the cluster back to `as_of` and starts running it in the
    /// background.
    pub async fn submit(
        &self,
        as_of: Timestamp,
    ) -> Result<(JobHandle, JobCompletion), FlashbackError> {
        let start_ts = self
            .controller
            .storage()
            .current_timestamp()
            .await
            .map_err(|source| FlashbackError::Storage {
                state: SchemaState::None,
                source,
            })?;

        let handle = {
            let mut running = self.running.lock();
            if let Some(running) = running.as_ref() {
                return Err(FlashbackError::JobAlreadyRunning(running.id()));
            }

            let job_id = JobId::new(self.next_job_id.fetch_add(1, Ordering::Relaxed));
            let job = FlashbackJob::new(job_id, start_ts, as_of);
            self.controller
                .job_store()
                .save(&job)
                .map_err(|source| FlashbackError::JobStore {
                    state: SchemaState::None,
                    source,
                })?;

            let handle = JobHandle::new(job);
            *running = Some(handle.clone());
            handle
        };

        counter!(FLASHBACK_JOB_SUBMITTED).increment(1);
        info!(
            "Submitted flashback job {} to timestamp {as_of} at {start_ts}",
            handle.id()
        );

        let (tx, rx) = oneshot::channel();
        let controller = Arc::clone(&self.controller);
        let slot = RunningSlot(Arc::clone(&self.running));
        let task_handle = handle.clone();
        let span = info_span!("flashback-job", job_id = %handle.id());

        tokio::spawn(
            async move {
                let outcome = controller.run(&task_handle).await;
                // free the slot before the submitter learns about the outcome
                drop(slot);
                let _ = tx.send(outcome);
            }
            .instrument(span),
        );

        Ok((handle, JobCompletion { rx }))
    }

    /// Flashes the cluster back to `as_of` and waits for the job to finish.
    pub async fn flashback_cluster(&self, as_of: Timestamp) -> Result<FlashbackJob, FlashbackError> {
        let (_, completion) = self.submit(as_of).await?;
        let outcome = completion.wait().await?;

        if let Some(err) = &outcome.restore_error {
            warn!(
                "Flashback job {} finished but the scheduler configuration was not restored: {err}",
                outcome.job.id()
            );
        }
        outcome.into_result()
    }

    pub fn cancel_job(&self, job_id: JobId) -> Result<(), CancelError> {
        let handle = self
            .running
            .lock()
            .as_ref()
            .filter(|handle| handle.id() == job_id)
            .cloned();

        handle.ok_or(CancelError::NotFound(job_id))?.cancel()
    }

    pub fn running_job(&self) -> Option<JobHandle> {
        self.running.lock().clone()
    }
}

/// Marks the running job's slot as free once the job's task ends, even if it panicked.
struct RunningSlot(Arc<Mutex<Option<JobHandle>>>);

impl Drop for RunningSlot {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}
