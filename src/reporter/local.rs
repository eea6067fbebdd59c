// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A reporter that reports into a directory.

use async_trait::async_trait;
use chrono::SecondsFormat;
use std::path::PathBuf;
use std::sync::atomic::{self, AtomicU64};
use std::time::UNIX_EPOCH;
use thiserror::Error;

use crate::metadata::ReportMetadata;

use super::Reporter;

#[derive(Error, Debug)]
enum LocalReporterError {
    #[error("{0}")]
    IoError(#[from] std::io::Error),
}

/// A reporter that reports into a directory.
///
/// The files are reported with the filename `yyyy-mm-ddTHH-MM-SSZ-<n>.txt`,
/// where the timestamp is the end of the reported window and `<n>` counts
/// the reports written by this reporter.
#[derive(Debug)]
pub struct LocalReporter {
    directory: PathBuf,
    seq: AtomicU64,
}

impl LocalReporter {
    /// Instantiate a new LocalReporter writing into the provided directory.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        LocalReporter {
            directory: directory.into(),
            seq: AtomicU64::new(0),
        }
    }

    /// Writes the report file to disk.
    async fn report_trace_data(
        &self,
        report: Vec<u8>,
        metadata: &ReportMetadata,
    ) -> Result<(), std::io::Error> {
        let time: chrono::DateTime<chrono::Utc> = (UNIX_EPOCH + metadata.end).into();
        let time = time
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .replace(":", "-");
        let seq = self.seq.fetch_add(1, atomic::Ordering::Relaxed);
        let file_name = format!("{time}-{seq}.txt");
        tracing::debug!("reporting {file_name}");
        tokio::fs::write(self.directory.join(file_name), report).await?;
        Ok(())
    }
}

#[async_trait]
impl Reporter for LocalReporter {
    async fn report(
        &self,
        report: Vec<u8>,
        metadata: &ReportMetadata,
    ) -> Result<(), Box<dyn std::error::Error + Send>> {
        self.report_trace_data(report, metadata)
            .await
            .map_err(|e| Box::new(LocalReporterError::IoError(e)) as _)
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use crate::{
        metadata::DUMMY_METADATA,
        reporter::{local::LocalReporter, Reporter},
    };

    #[tokio::test]
    async fn test_local_reporter() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = LocalReporter::new(dir.path());
        reporter
            .report(b"Calls 1/1\n".into(), &DUMMY_METADATA)
            .await
            .unwrap();
        reporter
            .report(b"Calls 2/2\n".into(), &DUMMY_METADATA)
            .await
            .unwrap();
        let mut files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flat_map(|f| f.ok())
            .filter(|f| {
                Path::new(&f.file_name())
                    .extension()
                    .is_some_and(|e| e == "txt")
            })
            .map(|f| f.path())
            .collect();
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("1970-01-01T00-00-02Z"));
        assert_eq!(tokio::fs::read(&files[0]).await.unwrap(), b"Calls 1/1\n");
        assert_eq!(tokio::fs::read(&files[1]).await.unwrap(), b"Calls 2/2\n");
    }

    #[tokio::test]
    async fn test_missing_directory_errors() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = LocalReporter::new(dir.path().join("missing"));
        reporter
            .report(b"Calls 1/1\n".into(), &DUMMY_METADATA)
            .await
            .unwrap_err();
    }
}
