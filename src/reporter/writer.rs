// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A reporter that writes into any [`std::io::Write`].

use std::{
    fmt,
    io::{self, Write},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::metadata::ReportMetadata;

use super::Reporter;

/// A reporter writing each report to a byte stream with a single
/// `write_all`.
pub struct WriterReporter<W> {
    writer: Mutex<W>,
}

impl WriterReporter<io::Stdout> {
    /// Write reports to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> WriterReporter<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        WriterReporter {
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn write_report(&self, report: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_all(report)?;
        writer.flush()
    }
}

impl<W> fmt::Debug for WriterReporter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterReporter").finish_non_exhaustive()
    }
}

#[async_trait]
impl<W: Write + Send> Reporter for WriterReporter<W> {
    async fn report(
        &self,
        report: Vec<u8>,
        _metadata: &ReportMetadata,
    ) -> Result<(), Box<dyn std::error::Error + Send>> {
        self.write_report(&report)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send>)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        metadata::DUMMY_METADATA,
        reporter::{writer::WriterReporter, Reporter},
    };

    #[tokio::test]
    async fn test_writer_reporter() {
        let reporter = WriterReporter::new(Vec::new());
        reporter
            .report(b"Calls 1/1\n".to_vec(), &DUMMY_METADATA)
            .await
            .unwrap();
        reporter
            .report(b"Calls 2/2\n".to_vec(), &DUMMY_METADATA)
            .await
            .unwrap();
        assert_eq!(reporter.into_inner(), b"Calls 1/1\nCalls 2/2\n");
    }
}
