// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use flashback_types::job::FlashbackJob;

use crate::flashback_controller::service::JobHandle;

/// Notified by the job controller each time a job enters a new schema state, before the work of
/// that state begins. The controller waits for the observer to return, so implementations must
/// not block for long.
///
/// The observer receives a snapshot of the job and a handle to it, which allows cancelling the
/// job or failing it with an error of the observer's choice.
///
/// The observer is called on entering `None`, `DeleteOnly`, `WriteOnly` and
/// `WriteReorganization`. Entering `Done` is not observed: the job has no work left at that
/// point and can no longer be interrupted.
pub trait JobObserver: Send + Sync + 'static {
    fn on_schema_state_entered(&self, job: &FlashbackJob, handle: &JobHandle);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {
    fn on_schema_state_entered(&self, _job: &FlashbackJob, _handle: &JobHandle) {}
}

impl<F> JobObserver for F
where
    F: Fn(&FlashbackJob, &JobHandle) + Send + Sync + 'static,
{
    fn on_schema_state_entered(&self, job: &FlashbackJob, handle: &JobHandle) {
        self(job, handle)
    }
}
