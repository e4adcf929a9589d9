// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! This crate contains the core types shared by the flashback components.

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod job;
pub mod keys;
pub mod scheduler_config;
pub mod schema;
pub mod timestamp;

pub use identifiers::{JobId, TableId};
pub use keys::KeyRange;
pub use timestamp::Timestamp;
