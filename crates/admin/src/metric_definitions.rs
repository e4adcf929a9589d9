// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};

pub(crate) const FLASHBACK_JOB_SUBMITTED: &str = "flashback.job.submitted.total";
pub(crate) const FLASHBACK_JOB_FINISHED: &str = "flashback.job.finished.total";
pub(crate) const FLASHBACK_JOB_DURATION: &str = "flashback.job.duration.seconds";
pub(crate) const FLASHBACK_SCHEMA_STATE_ENTERED: &str = "flashback.job.schema_state_entered.total";
pub(crate) const FLASHBACK_CANCEL_REQUESTS: &str = "flashback.job.cancel_requests.total";
pub(crate) const FLASHBACK_KEY_RANGES: &str = "flashback.job.key_ranges";

pub(crate) fn describe_metrics() {
    static DESCRIBED: Once = Once::new();
    DESCRIBED.call_once(|| {
        describe_counter!(
            FLASHBACK_JOB_SUBMITTED,
            Unit::Count,
            "Number of submitted flashback jobs"
        );

        describe_counter!(
            FLASHBACK_JOB_FINISHED,
            Unit::Count,
            "Number of finished flashback jobs, labeled by the terminal job state"
        );

        describe_histogram!(
            FLASHBACK_JOB_DURATION,
            Unit::Seconds,
            "Time from starting a flashback job until it reached its terminal state"
        );

        describe_counter!(
            FLASHBACK_SCHEMA_STATE_ENTERED,
            Unit::Count,
            "Number of schema states entered by flashback jobs, labeled by state"
        );

        describe_counter!(
            FLASHBACK_CANCEL_REQUESTS,
            Unit::Count,
            "Number of cancellation requests for flashback jobs, labeled by result"
        );

        describe_histogram!(
            FLASHBACK_KEY_RANGES,
            Unit::Count,
            "Number of key ranges reverted by a flashback job"
        );
    });
}
