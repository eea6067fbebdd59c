// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! ## rate-stack-tracker
//! Adaptive call-stack sampling for a single hot call site.
//!
//! A tracker is told about every traversal of a hot code path through
//! [`TrackCall::track_call`]. It measures the call rate, and while the rate
//! is above a threshold it samples the caller's stack and periodically emits
//! a report of the hottest stacks. Below the threshold a call costs an
//! atomic increment.
//!
//! ### Usage
//!
//! Two trackers implement the same contract:
//!
//! - [`Tracker`](tracker::Tracker), for call sites reached from many
//!   threads. The rate is checked on a Tokio task and reports are written
//!   by a [`Reporter`](reporter::Reporter) on background tasks, so the hot
//!   path never blocks on a report.
//! - [`SyncTracker`](sync::SyncTracker), for single-threaded call sites.
//!   Everything happens inline in `track_call`, with no background tasks
//!   and no internal synchronization.
//!
//! ```no_run
//! # use rate_stack_tracker::{config::TrackerConfig, tracker::TrackerBuilder};
//! # use std::time::{Duration, Instant};
//! # #[tokio::main]
//! # async fn main() -> Result<(), rate_stack_tracker::config::ConfigError> {
//! let config = TrackerConfig::builder()
//!     .with_start_rate(5000.0)
//!     .with_stop_rate(4000.0)
//!     .with_report_interval(Duration::from_secs(15))
//!     .with_capture_modulus(1000)
//!     .build()?;
//!
//! // reports go to stdout unless another reporter is set
//! let tracker = TrackerBuilder::default().with_config(config).build().spawn();
//!
//! fn hot_path(tracker: &rate_stack_tracker::tracker::TrackerHandle) {
//!     tracker.track_call(Instant::now());
//!     // ...
//! }
//! # hot_path(&tracker);
//! # Ok(())
//! # }
//! ```
//!
//! ### Hysteresis
//!
//! Tracking starts when the rate measured over a check interval exceeds the
//! start rate, and stops only once it falls below the lower stop rate, so a
//! rate hovering near one threshold does not toggle tracking.
//!
//! ### Reports
//!
//! A report lists each distinct stack with its share of the captures in the
//! window, hottest first, one `file:line` per frame:
//!
//! ```text
//! Calls 30/45
//!    src/server.rs:120
//!    src/main.rs:8
//! ```

use std::{io::Write, time::Instant};

pub mod aggregate;
pub mod capture;
pub mod config;
pub mod metadata;
pub mod rate;
pub mod report;
pub mod reporter;
pub mod symbol;
pub mod sync;
pub mod tracker;

/// The call-site entry point shared by both trackers.
pub trait TrackCall {
    /// Record one traversal of the hot path at time `now`.
    fn track_call(&mut self, now: Instant);
}

impl TrackCall for tracker::TrackerHandle {
    fn track_call(&mut self, now: Instant) {
        tracker::TrackerHandle::track_call(self, now)
    }
}

impl<W: Write, R: symbol::SymbolResolver> TrackCall for sync::SyncTracker<W, R> {
    fn track_call(&mut self, now: Instant) {
        sync::SyncTracker::track_call(self, now)
    }
}
