// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;

use flashback_types::JobId;
use flashback_types::job::FlashbackJob;

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("failed encoding job record: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed decoding job record: {0}")]
    Decode(#[source] serde_json::Error),
    #[error(transparent)]
    Generic(anyhow::Error),
}

/// Durable storage for job records.
pub trait JobStore: Send + Sync + 'static {
    /// Persists the current state of a running job.
    fn save(&self, job: &FlashbackJob) -> Result<(), JobStoreError>;

    /// Persists a job that reached its terminal state and removes it from the active jobs.
    fn archive(&self, job: &FlashbackJob) -> Result<(), JobStoreError>;
}

/// Keeps encoded job records in memory.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    active: HashMap<JobId, Bytes>,
    history: Vec<Bytes>,
}

impl InMemoryJobStore {
    pub fn get(&self, job_id: JobId) -> Result<Option<FlashbackJob>, JobStoreError> {
        let encoded = self.inner.lock().active.get(&job_id).cloned();
        encoded.map(|bytes| decode(&bytes)).transpose()
    }

    /// Archived jobs in the order they finished.
    pub fn history(&self) -> Result<Vec<FlashbackJob>, JobStoreError> {
        let history = self.inner.lock().history.clone();
        history.iter().map(|bytes| decode(bytes)).collect()
    }

    pub fn active_jobs(&self) -> usize {
        self.inner.lock().active.len()
    }
}

impl JobStore for InMemoryJobStore {
    fn save(&self, job: &FlashbackJob) -> Result<(), JobStoreError> {
        let encoded = encode(job)?;
        self.inner.lock().active.insert(job.id(), encoded);
        Ok(())
    }

    fn archive(&self, job: &FlashbackJob) -> Result<(), JobStoreError> {
        let encoded = encode(job)?;
        let mut inner = self.inner.lock();
        inner.active.remove(&job.id());
        inner.history.push(encoded);
        Ok(())
    }
}

fn encode(job: &FlashbackJob) -> Result<Bytes, JobStoreError> {
    serde_json::to_vec(job)
        .map(Bytes::from)
        .map_err(JobStoreError::Encode)
}

fn decode(bytes: &[u8]) -> Result<FlashbackJob, JobStoreError> {
    serde_json::from_slice(bytes).map_err(JobStoreError::Decode)
}
