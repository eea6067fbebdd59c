// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Output sinks for the concurrent tracker.

use std::fmt;

use async_trait::async_trait;

use crate::metadata::ReportMetadata;

pub mod local;
pub mod multi;
pub mod writer;

/// Abstraction around emitting a rendered report.
///
/// At most one report is in flight per tracker at any time.
#[async_trait]
pub trait Reporter: fmt::Debug {
    /// Emit one rendered report.
    async fn report(
        &self,
        report: Vec<u8>,
        metadata: &ReportMetadata,
    ) -> Result<(), Box<dyn std::error::Error + Send>>;
}
