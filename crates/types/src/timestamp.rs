// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A hybrid cluster timestamp: the physical time in milliseconds since the unix epoch shifted
/// left by [`Timestamp::LOGICAL_BITS`], combined with a logical counter in the lower bits.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const LOGICAL_BITS: u32 = 18;
    const LOGICAL_MASK: u64 = (1 << Self::LOGICAL_BITS) - 1;

    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn compose(physical_millis: u64, logical: u64) -> Self {
        Self((physical_millis << Self::LOGICAL_BITS) | (logical & Self::LOGICAL_MASK))
    }

    pub const fn from_unix_millis(physical_millis: u64) -> Self {
        Self::compose(physical_millis, 0)
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self::from_unix_millis(u64::try_from(millis).unwrap_or(u64::MAX >> Self::LOGICAL_BITS))
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn physical_millis(self) -> u64 {
        self.0 >> Self::LOGICAL_BITS
    }

    pub const fn logical(self) -> u64 {
        self.0 & Self::LOGICAL_MASK
    }

    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.physical_millis())
    }
}
