// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The synchronous tracker: capture, aggregation and reporting all happen
//! inline in `track_call`.

use std::{
    fmt,
    io::Write,
    time::{Duration, Instant},
};

use crate::{
    aggregate::TraceAggregate,
    capture::{StackWalker, TraceSource},
    config::{SamplingPolicy, TrackerConfig},
    rate::{RateDecision, RateMonitor},
    report,
    symbol::{BacktraceResolver, SymbolResolver},
};

/// Frames between the caller of `track_call` and the trace source.
const TRACKER_FRAMES: usize = 1;

struct Window {
    aggregate: TraceAggregate,
    start_count: u64,
    last_report: Instant,
}

/// Adaptive stack tracker for a single-threaded call site.
///
/// There are no background tasks: the rate is evaluated on the first call
/// after each check interval, and reports are written to the sink from
/// inside `track_call`. `track_call` takes `&mut self`; callers on several
/// threads must serialize access themselves, and should prefer
/// [`Tracker`](crate::tracker::Tracker) instead.
///
/// A window still open when the tracker is dropped is not reported.
pub struct SyncTracker<W, R = BacktraceResolver> {
    config: TrackerConfig,
    sink: W,
    resolver: R,
    source: Box<dyn TraceSource>,
    count: u64,
    monitor: Option<RateMonitor>,
    window: Option<Window>,
    last_capture: Option<Instant>,
}

impl<W: Write> SyncTracker<W> {
    /// A tracker writing reports to `sink`.
    pub fn new(config: TrackerConfig, sink: W) -> Self {
        Self::with_resolver(config, sink, BacktraceResolver)
    }
}

impl<W: Write, R: SymbolResolver> SyncTracker<W, R> {
    /// A tracker writing reports to `sink`, symbolizing with `resolver`.
    pub fn with_resolver(config: TrackerConfig, sink: W, resolver: R) -> Self {
        Self::with_source(config, sink, resolver, StackWalker)
    }

    pub(crate) fn with_source(
        config: TrackerConfig,
        sink: W,
        resolver: R,
        source: impl TraceSource,
    ) -> Self {
        SyncTracker {
            config,
            sink,
            resolver,
            source: Box::new(source),
            count: 0,
            monitor: None,
            window: None,
            last_capture: None,
        }
    }

    /// Record one traversal of the hot path at time `now`.
    #[inline(never)]
    pub fn track_call(&mut self, now: Instant) {
        // the first call opens the first rate window
        if self.monitor.is_none() {
            self.monitor = Some(RateMonitor::from_config(&self.config, now, self.count));
        }
        self.count += 1;

        if self.window.is_some() && self.should_capture(now) {
            let key = self.source.capture(TRACKER_FRAMES, self.config.max_depth);
            if let Some(window) = self.window.as_mut() {
                window.aggregate.record(key);
            }
        }

        let tracking = self.window.is_some();
        let decision = match self.monitor.as_mut() {
            Some(monitor) => monitor.poll(now, self.count, tracking),
            None => RateDecision::Unchanged,
        };
        match decision {
            RateDecision::StartTracking => {
                tracing::info!("started tracking");
                self.window = Some(Window {
                    aggregate: TraceAggregate::new(),
                    start_count: self.count,
                    last_report: now,
                });
            }
            RateDecision::StopTracking => {
                if let Some(window) = self.window.take() {
                    self.write(&window.aggregate);
                }
                tracing::info!("stopped tracking");
            }
            RateDecision::Unchanged => self.maybe_report(now),
        }
    }

    /// Total calls recorded so far.
    pub fn call_count(&self) -> u64 {
        self.count
    }

    /// Whether stacks are currently being sampled.
    pub fn is_tracking(&self) -> bool {
        self.window.is_some()
    }

    /// Consume the tracker and return the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn should_capture(&mut self, now: Instant) -> bool {
        match self.config.sampling {
            SamplingPolicy::Modulus(n) => {
                let start = self.window.as_ref().map_or(0, |w| w.start_count);
                (self.count - start) % n == 0
            }
            SamplingPolicy::Interval(interval) => match self.last_capture {
                Some(last) if now.saturating_duration_since(last) <= interval => false,
                _ => {
                    self.last_capture = Some(now);
                    true
                }
            },
        }
    }

    fn maybe_report(&mut self, now: Instant) {
        let report_interval: Duration = self.config.report_interval;
        let Some(window) = self.window.as_mut() else {
            return;
        };
        if now.saturating_duration_since(window.last_report) < report_interval {
            return;
        }
        window.last_report = now;
        let aggregate = std::mem::take(&mut window.aggregate);
        self.write(&aggregate);
    }

    fn write(&mut self, aggregate: &TraceAggregate) {
        if aggregate.is_empty() {
            tracing::debug!("nothing captured in window, skipping report");
            return;
        }
        if let Err(err) = report::write_report(aggregate, &self.resolver, &mut self.sink) {
            // the window is lost, tracking goes on
            tracing::warn!(?err, "error writing report, continuing");
        }
    }
}

impl<W, R> fmt::Debug for SyncTracker<W, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTracker")
            .field("config", &self.config)
            .field("count", &self.count)
            .field("tracking", &self.window.is_some())
            .finish_non_exhaustive()
    }
}
