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
use std::sync::Arc;

use tracing::{debug, info, warn};

use flashback_types::scheduler_config::{ScheduleLimit, SchedulerConfig};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler is unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
    #[error("scheduler rejected the configuration: {0}")]
    Rejected(String),
    #[error("scheduler reports none of the schedule limits {0:?}, scheduling cannot be suspended")]
    NoScheduleLimits(Vec<ScheduleLimit>),
}

/// Client of the cluster scheduler's configuration API.
pub trait SchedulerConfigClient: Send + Sync + 'static {
    fn get_config(&self) -> impl Future<Output = Result<SchedulerConfig, SchedulerError>> + Send;

    /// Updates the options contained in `config`, options not contained are left untouched.
    fn set_config(
        &self,
        config: &SchedulerConfig,
    ) -> impl Future<Output = Result<(), SchedulerError>> + Send;
}

/// Suspends automatic data movement of the cluster scheduler and hands out a
/// [`SuspendedScheduling`] which restores the previous configuration.
pub struct SchedulerGate<S> {
    client: Arc<S>,
    suspended_limits: Vec<ScheduleLimit>,
}

impl<S: SchedulerConfigClient> SchedulerGate<S> {
    pub fn new(client: Arc<S>, suspended_limits: Vec<ScheduleLimit>) -> Self {
        Self {
            client,
            suspended_limits,
        }
    }

    pub async fn suspend(&self) -> Result<SuspendedScheduling<S>, SchedulerError> {
        let snapshot = self.client.get_config().await?;

        let mut suspended = SchedulerConfig::default();
        for limit in &self.suspended_limits {
            if snapshot.contains(limit.as_ref()) {
                suspended.set_schedule_limit(*limit, 0);
            } else {
                debug!("Scheduler has no option '{limit}', leaving it untouched");
            }
        }

        if suspended.is_empty() {
            return Err(SchedulerError::NoScheduleLimits(
                self.suspended_limits.clone(),
            ));
        }

        self.client.set_config(&suspended).await?;
        info!(
            "Suspended cluster scheduling, {} schedule limits set to 0",
            suspended.len()
        );

        Ok(SuspendedScheduling {
            client: Arc::clone(&self.client),
            snapshot,
            armed: true,
        })
    }
}

/// Scheduler configuration captured before suspending. Restoring consumes the value so that the
/// configuration is written back at most once. If it is dropped without being restored, a restore
/// is spawned on the current runtime.
#[must_use = "the scheduler stays suspended unless restored"]
pub struct SuspendedScheduling<S: SchedulerConfigClient> {
    client: Arc<S>,
    snapshot: SchedulerConfig,
    armed: bool,
}

impl<S: SchedulerConfigClient> SuspendedScheduling<S> {
    pub fn snapshot(&self) -> &SchedulerConfig {
        &self.snapshot
    }

    pub async fn restore(mut self) -> Result<(), SchedulerError> {
        self.armed = false;
        let snapshot = std::mem::take(&mut self.snapshot);
        let client = Arc::clone(&self.client);

        client.set_config(&snapshot).await?;
        info!("Restored cluster scheduling configuration");
        Ok(())
    }
}

impl<S: SchedulerConfigClient> Drop for SuspendedScheduling<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Scheduler suspension dropped outside of a runtime, scheduling stays suspended");
            return;
        };

        warn!("Scheduler suspension dropped without restore, restoring in the background");
        let client = Arc::clone(&self.client);
        let snapshot = std::mem::take(&mut self.snapshot);
        runtime.spawn(async move {
            if let Err(err) = client.set_config(&snapshot).await {
                warn!("Failed to restore the scheduler configuration: {err}");
            }
        });
    }
}
