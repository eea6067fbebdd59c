// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A reporter that fans out to several reporters.

use async_trait::async_trait;
use thiserror::Error;

use crate::metadata::ReportMetadata;

use super::Reporter;

/// Returned when one or more destinations of a [`MultiReporter`] failed.
#[derive(Debug, Error)]
#[error("{} of {attempted} reporters failed, first: {}", .errors.len(), .errors[0])]
pub struct MultiReporterError {
    attempted: usize,
    errors: Vec<Box<dyn std::error::Error + Send>>,
}

impl MultiReporterError {
    /// The individual failures, in reporter order.
    pub fn errors(&self) -> &[Box<dyn std::error::Error + Send>] {
        &self.errors
    }
}

#[derive(Debug)]
/// A reporter that sends each report to several destinations concurrently.
///
/// A failing destination does not prevent delivery to the others; all
/// failures are collected into a [`MultiReporterError`].
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter + Send + Sync>>,
}

impl MultiReporter {
    /// Create a new MultiReporter from a set of reporters
    pub fn new(reporters: Vec<Box<dyn Reporter + Send + Sync>>) -> Self {
        MultiReporter { reporters }
    }
}

#[async_trait]
impl Reporter for MultiReporter {
    async fn report(
        &self,
        report: Vec<u8>,
        metadata: &ReportMetadata,
    ) -> Result<(), Box<dyn std::error::Error + Send>> {
        let results = futures::future::join_all(
            self.reporters
                .iter()
                .map(|reporter| reporter.report(report.clone(), metadata)),
        )
        .await;
        let errors: Vec<_> = results.into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Box::new(MultiReporterError {
                attempted: self.reporters.len(),
                errors,
            }))
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;

    use crate::{
        metadata::{ReportMetadata, DUMMY_METADATA},
        reporter::Reporter,
    };

    use super::MultiReporter;

    #[derive(Debug, Default)]
    struct RecordingReporter(Arc<Mutex<Vec<Vec<u8>>>>);
    #[async_trait]
    impl Reporter for RecordingReporter {
        async fn report(
            &self,
            report: Vec<u8>,
            _metadata: &ReportMetadata,
        ) -> Result<(), Box<dyn std::error::Error + Send>> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.0.lock().unwrap().push(report);
            Ok(())
        }
    }

    #[derive(Debug, thiserror::Error)]
    enum Error {
        #[error("failed")]
        Failed,
    }

    #[derive(Debug)]
    struct ErrReporter;
    #[async_trait]
    impl Reporter for ErrReporter {
        async fn report(
            &self,
            _report: Vec<u8>,
            _metadata: &ReportMetadata,
        ) -> Result<(), Box<dyn std::error::Error + Send>> {
            Err(Box::new(Error::Failed))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_reporter_fans_out_concurrently() {
        let sinks: Vec<_> = (0..5).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();
        let reporter = MultiReporter::new(
            sinks
                .iter()
                .map(|sink| {
                    Box::new(RecordingReporter(sink.clone())) as Box<dyn Reporter + Send + Sync>
                })
                .collect(),
        );
        // all five sleep concurrently
        tokio::time::timeout(
            Duration::from_secs(2),
            reporter.report(b"Calls 1/1\n".to_vec(), &DUMMY_METADATA),
        )
        .await
        .unwrap()
        .unwrap();
        for sink in sinks {
            assert_eq!(*sink.lock().unwrap(), vec![b"Calls 1/1\n".to_vec()]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_reporter_collects_errors() {
        let before = Arc::new(Mutex::new(Vec::new()));
        let after = Arc::new(Mutex::new(Vec::new()));
        let reporter = MultiReporter::new(vec![
            Box::new(RecordingReporter(before.clone())) as Box<dyn Reporter + Send + Sync>,
            Box::new(ErrReporter) as Box<dyn Reporter + Send + Sync>,
            Box::new(ErrReporter) as Box<dyn Reporter + Send + Sync>,
            Box::new(RecordingReporter(after.clone())) as Box<dyn Reporter + Send + Sync>,
        ]);
        let err = reporter.report(vec![], &DUMMY_METADATA).await.unwrap_err();
        assert_eq!(err.to_string(), "2 of 4 reporters failed, first: failed");
        // delivery continued past the failures
        assert_eq!(before.lock().unwrap().len(), 1);
        assert_eq!(after.lock().unwrap().len(), 1);
    }
}
