// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Text rendering of an aggregate.
//!
//! A report holds one block per distinct trace, hottest first:
//!
//! ```text
//! Calls 30/45
//!    src/server.rs:120
//!    src/main.rs:8
//! Calls 10/45
//!    ...
//! ```

use std::io::{self, Write};

use crate::{aggregate::TraceAggregate, symbol::SymbolResolver};

const UNKNOWN_FRAME: &str = "<unknown>:0";

/// Render `aggregate` into a single buffer.
///
/// Blocks are ordered by count descending, then by trace key. Frames are
/// listed in capture order; frames the resolver cannot place are rendered
/// as `<unknown>:0`.
pub fn render(aggregate: &TraceAggregate, resolver: &dyn SymbolResolver) -> Vec<u8> {
    let total = aggregate.total();
    let mut buffer = Vec::new();
    for (key, count) in aggregate.sorted() {
        // writes into a Vec cannot fail
        let _ = writeln!(buffer, "Calls {count}/{total}");
        for &pc in key.frames() {
            let _ = match resolver.resolve(pc) {
                Some(location) => writeln!(buffer, "   {location}"),
                None => writeln!(buffer, "   {UNKNOWN_FRAME}"),
            };
        }
    }
    buffer
}

/// Render `aggregate` and write it to `sink` with a single write.
pub fn write_report<W: Write + ?Sized>(
    aggregate: &TraceAggregate,
    resolver: &dyn SymbolResolver,
    sink: &mut W,
) -> io::Result<()> {
    let report = render(aggregate, resolver);
    tracing::debug!(
        traces = aggregate.len(),
        total = aggregate.total(),
        bytes = report.len(),
        "writing report"
    );
    sink.write_all(&report)?;
    sink.flush()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{capture::TraceKey, symbol::Location};

    /// Resolves `pc` to `f<pc>.rs:<pc>`, leaving addresses >= 0x1000 unknown.
    #[derive(Debug, Default)]
    pub(crate) struct FakeResolver;

    impl SymbolResolver for FakeResolver {
        fn resolve(&self, pc: usize) -> Option<Location> {
            (pc < 0x1000).then(|| Location {
                file: format!("f{pc}.rs"),
                line: pc as u32,
            })
        }
    }

    fn key(pcs: &[usize]) -> TraceKey {
        TraceKey::new(pcs.to_vec())
    }

    #[test]
    fn test_report_order_and_totals() {
        let aggregate: TraceAggregate = [(key(&[1]), 10), (key(&[2, 3]), 30), (key(&[4]), 5)]
            .into_iter()
            .collect();
        let report = String::from_utf8(render(&aggregate, &FakeResolver)).unwrap();
        assert_eq!(
            report,
            "Calls 30/45\n   f2.rs:2\n   f3.rs:3\n\
             Calls 10/45\n   f1.rs:1\n\
             Calls 5/45\n   f4.rs:4\n"
        );
    }

    #[test]
    fn test_ties_break_on_key() {
        let aggregate: TraceAggregate = [(key(&[9]), 2), (key(&[7]), 2)].into_iter().collect();
        let report = String::from_utf8(render(&aggregate, &FakeResolver)).unwrap();
        assert_eq!(report, "Calls 2/4\n   f7.rs:7\nCalls 2/4\n   f9.rs:9\n");
    }

    #[test]
    fn test_unknown_frames_do_not_abort() {
        let aggregate: TraceAggregate = [(key(&[0x5000, 1]), 1)].into_iter().collect();
        let report = String::from_utf8(render(&aggregate, &FakeResolver)).unwrap();
        assert_eq!(report, "Calls 1/1\n   <unknown>:0\n   f1.rs:1\n");
    }

    #[test]
    fn test_empty_trace_has_header_only() {
        let aggregate: TraceAggregate = [(TraceKey::default(), 3)].into_iter().collect();
        let report = String::from_utf8(render(&aggregate, &FakeResolver)).unwrap();
        assert_eq!(report, "Calls 3/3\n");
    }

    struct FailingSink;
    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("sink closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_errors_are_returned() {
        let aggregate: TraceAggregate = [(key(&[1]), 1)].into_iter().collect();
        let err = write_report(&aggregate, &FakeResolver, &mut FailingSink).unwrap_err();
        assert_eq!(err.to_string(), "sink closed");
    }

    #[test]
    fn test_write_report_to_vec() {
        let aggregate: TraceAggregate = [(key(&[1]), 1)].into_iter().collect();
        let mut sink = Vec::new();
        write_report(&aggregate, &FakeResolver, &mut sink).unwrap();
        assert_eq!(sink, b"Calls 1/1\n   f1.rs:1\n");
    }
}
