// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Metadata handed to reporters alongside each report.

pub use std::time::Duration;

/// Why a report was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReportReason {
    /// The report interval elapsed while tracking.
    Periodic,
    /// Tracking stopped (or was flushed) and the window closed.
    Final,
}

/// Describes the window a report covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMetadata {
    /// Window start, since the Unix epoch.
    pub start: Duration,
    /// Window end, since the Unix epoch.
    pub end: Duration,
    /// What closed the window.
    pub reason: ReportReason,
    /// Sum of trace counts in the window.
    pub total_calls: u64,
    /// Number of distinct traces in the window.
    pub distinct_traces: usize,
}

#[cfg(test)]
pub(crate) const DUMMY_METADATA: ReportMetadata = ReportMetadata {
    start: Duration::from_secs(1),
    end: Duration::from_secs(2),
    reason: ReportReason::Periodic,
    total_calls: 0,
    distinct_traces: 0,
};
