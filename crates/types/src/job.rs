// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The persisted record of a flashback job.

use crate::errors::JobError;
use crate::identifiers::JobId;
use crate::keys::KeyRange;
use crate::scheduler_config::SchedulerConfig;
use crate::timestamp::Timestamp;

/// Progress marker of a job. Other users of the schema observe the flashback moving through these
/// states one by one rather than switching atomically.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SchemaState {
    None,
    DeleteOnly,
    WriteOnly,
    WriteReorganization,
    Done,
}

impl SchemaState {
    pub const fn next(self) -> Option<SchemaState> {
        match self {
            SchemaState::None => Some(SchemaState::DeleteOnly),
            SchemaState::DeleteOnly => Some(SchemaState::WriteOnly),
            SchemaState::WriteOnly => Some(SchemaState::WriteReorganization),
            SchemaState::WriteReorganization => Some(SchemaState::Done),
            SchemaState::Done => None,
        }
    }

    /// Whether the job can still be abandoned without leaving changes behind. Once the job
    /// reached [`SchemaState::WriteReorganization`] the flashback is being applied to storage and
    /// can no longer be undone.
    pub const fn is_rollbackable(self) -> bool {
        matches!(
            self,
            SchemaState::None | SchemaState::DeleteOnly | SchemaState::WriteOnly
        )
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queueing,
    Running,
    /// Finished successfully
    Synced,
    Cancelled,
    Failed,
}

impl JobState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, JobState::Synced | JobState::Cancelled | JobState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FlashbackJob {
    id: JobId,
    /// Cluster timestamp at the time the job was submitted
    start_ts: Timestamp,
    /// Timestamp the cluster is flashed back to
    as_of: Timestamp,
    schema_state: SchemaState,
    state: JobState,
    cancel_requested: bool,
    /// Error attached while the job was running, fails the job at its next state boundary
    #[serde(default)]
    abort_error: Option<JobError>,
    key_ranges: Option<Vec<KeyRange>>,
    scheduler_snapshot: Option<SchedulerConfig>,
    error: Option<JobError>,
    secondary_error: Option<JobError>,
}

impl FlashbackJob {
    pub fn new(id: JobId, start_ts: Timestamp, as_of: Timestamp) -> Self {
        Self {
            id,
            start_ts,
            as_of,
            schema_state: SchemaState::None,
            state: JobState::Queueing,
            cancel_requested: false,
            abort_error: None,
            key_ranges: None,
            scheduler_snapshot: None,
            error: None,
            secondary_error: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn start_ts(&self) -> Timestamp {
        self.start_ts
    }

    pub fn as_of(&self) -> Timestamp {
        self.as_of
    }

    pub fn schema_state(&self) -> SchemaState {
        self.schema_state
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn abort_error(&self) -> Option<&JobError> {
        self.abort_error.as_ref()
    }

    pub fn key_ranges(&self) -> Option<&[KeyRange]> {
        self.key_ranges.as_deref()
    }

    pub fn scheduler_snapshot(&self) -> Option<&SchedulerConfig> {
        self.scheduler_snapshot.as_ref()
    }

    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    pub fn secondary_error(&self) -> Option<&JobError> {
        self.secondary_error.as_ref()
    }

    pub fn start_running(&mut self) {
        debug_assert_eq!(self.state, JobState::Queueing);
        self.state = JobState::Running;
    }

    /// Moves the job to the next schema state. Returns the entered state, or `None` if the job
    /// already reached [`SchemaState::Done`].
    pub fn advance_schema_state(&mut self) -> Option<SchemaState> {
        let next = self.schema_state.next()?;
        self.schema_state = next;
        Some(next)
    }

    /// Records the key ranges of the job. The ranges are computed once; later calls are ignored
    /// and return `false`.
    pub fn set_key_ranges(&mut self, key_ranges: Vec<KeyRange>) -> bool {
        if self.key_ranges.is_some() {
            return false;
        }
        self.key_ranges = Some(key_ranges);
        true
    }

    pub fn set_scheduler_snapshot(&mut self, snapshot: SchedulerConfig) {
        self.scheduler_snapshot = Some(snapshot);
    }

    pub fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    /// Attaches an error that fails the job. The first attached error wins.
    pub fn request_abort(&mut self, error: JobError) {
        if self.abort_error.is_none() {
            self.abort_error = Some(error);
        }
    }

    /// Moves the job into a terminal state. A job that is already terminal is left untouched.
    pub fn finish(&mut self, state: JobState, error: Option<JobError>) {
        debug_assert!(state.is_terminal());
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        self.error = error;
    }

    pub fn set_secondary_error(&mut self, error: JobError) {
        self.secondary_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::errors::ErrorCode;
    use crate::identifiers::TableId;

    fn job() -> FlashbackJob {
        FlashbackJob::new(
            JobId::new(1),
            Timestamp::from_unix_millis(2_000),
            Timestamp::from_unix_millis(1_000),
        )
    }

    #[test]
    fn schema_states_advance_in_order() {
        let mut job = job();
        let entered: Vec<_> = std::iter::from_fn(|| job.advance_schema_state()).collect();

        assert_that!(
            entered,
            eq(SchemaState::iter().skip(1).collect::<Vec<_>>())
        );
        assert_that!(job.schema_state(), eq(SchemaState::Done));
        assert_that!(job.advance_schema_state(), none());
    }

    #[test]
    fn rollback_window() {
        let rollbackable: Vec<_> = SchemaState::iter().filter(|s| s.is_rollbackable()).collect();
        assert_that!(
            rollbackable,
            eq(vec![
                SchemaState::None,
                SchemaState::DeleteOnly,
                SchemaState::WriteOnly
            ])
        );
    }

    #[test]
    fn key_ranges_are_set_once() -> googletest::Result<()> {
        let mut job = job();
        let first = vec![KeyRange::for_tables(TableId::new(1), TableId::new(2))?];
        let second = vec![KeyRange::for_tables(TableId::new(5), TableId::new(6))?];

        assert!(job.set_key_ranges(first.clone()));
        assert!(!job.set_key_ranges(second));
        assert_that!(job.key_ranges(), some(eq(first.as_slice())));
        Ok(())
    }

    #[test]
    fn terminal_state_is_final() {
        let mut job = job();
        job.start_running();
        job.finish(
            JobState::Cancelled,
            Some(JobError::new(ErrorCode::CancelledDdlJob, "cancelled")),
        );
        job.finish(JobState::Synced, None);

        assert_that!(job.state(), eq(JobState::Cancelled));
        assert_that!(
            job.error().map(|e| e.code),
            some(eq(ErrorCode::CancelledDdlJob))
        );
    }

    #[test]
    fn first_abort_error_wins() {
        let mut job = job();
        job.request_abort(JobError::new(ErrorCode::Unknown, "first"));
        job.request_abort(JobError::new(ErrorCode::WrongValue, "second"));

        assert_that!(job.abort_error().map(|e| e.message.as_str()), some(eq("first")));
    }

    #[test]
    fn job_record_serde() -> googletest::Result<()> {
        let mut job = job();
        job.start_running();
        job.advance_schema_state();
        job.set_key_ranges(vec![KeyRange::for_tables(TableId::new(60), TableId::new(62))?]);

        let encoded = serde_json::to_vec(&job)?;
        let decoded: FlashbackJob = serde_json::from_slice(&encoded)?;
        assert_that!(decoded, eq(job));
        Ok(())
    }
}
