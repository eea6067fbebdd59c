// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The concurrent tracker: callers on any thread, aggregation and reporting
//! on Tokio tasks.

use crate::{
    aggregate::{TraceAggregate, TraceAggregator},
    capture::{StackWalker, TraceKey, TraceSource},
    config::{SamplingPolicy, TrackerConfig},
    metadata::{ReportMetadata, ReportReason},
    rate::{RateDecision, RateMonitor},
    report,
    reporter::{writer::WriterReporter, Reporter},
    symbol::{BacktraceResolver, SymbolResolver},
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, RwLock,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

/// Frames between the caller of `track_call` and the trace source.
const TRACKER_FRAMES: usize = 2;

/// Closed windows waiting for the report task.
const WINDOW_QUEUE_CAPACITY: usize = 2;

/// Builds a [`Tracker`].
///
/// Defaults to [`TrackerConfig::default`], reporting to standard output and
/// resolving symbols with [`BacktraceResolver`].
#[derive(Debug, Default)]
pub struct TrackerBuilder {
    config: Option<TrackerConfig>,
    reporter: Option<Box<dyn Reporter + Send + Sync>>,
    resolver: Option<Arc<dyn SymbolResolver>>,
}

impl TrackerBuilder {
    /// Sets the configuration.
    pub fn with_config(mut self, config: TrackerConfig) -> TrackerBuilder {
        self.config = Some(config);
        self
    }

    /// Sets the reporter.
    pub fn with_reporter(mut self, r: impl Reporter + Send + Sync + 'static) -> TrackerBuilder {
        self.reporter = Some(Box::new(r));
        self
    }

    /// Sets the symbol resolver used when rendering reports.
    pub fn with_symbol_resolver(mut self, r: impl SymbolResolver + 'static) -> TrackerBuilder {
        self.resolver = Some(Arc::new(r));
        self
    }

    /// Turn this builder into a tracker!
    pub fn build(self) -> Tracker {
        let reporter: Arc<dyn Reporter + Send + Sync> = match self.reporter {
            Some(reporter) => Arc::from(reporter),
            None => Arc::new(WriterReporter::stdout()),
        };
        let resolver: Arc<dyn SymbolResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(BacktraceResolver),
        };
        Tracker {
            config: self.config.unwrap_or_default(),
            reporter,
            resolver,
        }
    }
}

/// Adaptive stack tracker for a single call site, safe to call from any
/// number of threads.
///
/// The rate monitor runs on its own Tokio task. While tracking, sampled
/// stacks go through a bounded queue to an aggregation task, and finished
/// windows go to a reporting task, so the hot path never waits on a report.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    reporter: Arc<dyn Reporter + Send + Sync>,
    resolver: Arc<dyn SymbolResolver>,
}

impl Tracker {
    /// Start monitoring on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(self) -> TrackerHandle {
        self.spawn_inner(StackWalker)
    }

    pub(crate) fn spawn_inner<S: TraceSource>(self, source: S) -> TrackerHandle {
        let shared = Arc::new(Shared {
            epoch: Instant::now(),
            count: AtomicU64::new(0),
            tracking: AtomicBool::new(false),
            tracking_start_count: AtomicU64::new(0),
            last_capture: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            queue: RwLock::new(None),
            session: tokio::sync::Mutex::new(None),
            monitor: Mutex::new(None),
            source: Box::new(source),
            config: self.config,
            reporter: self.reporter,
            resolver: self.resolver,
        });

        // the baseline is taken now so calls made before the task first runs
        // count towards the first window
        let monitor = RateMonitor::from_config(
            &shared.config,
            tokio::time::Instant::now().into_std(),
            0,
        );
        let task = tokio::spawn(monitor_rate(shared.clone(), monitor));
        *shared.monitor.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        tracing::debug!(config = ?shared.config, "spawned call rate monitor");

        TrackerHandle { shared }
    }
}

/// Handle to a running [`Tracker`]. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    shared: Arc<Shared>,
}

impl TrackerHandle {
    /// Record one traversal of the hot path.
    ///
    /// When idle this is a single atomic increment and load. While tracking,
    /// sampled calls walk the stack and enqueue the trace without blocking;
    /// traces are dropped if the queue is full.
    #[inline(never)]
    pub fn track_call(&self, now: Instant) {
        let shared = &*self.shared;
        let count = shared.count.fetch_add(1, Ordering::Relaxed) + 1;
        if !shared.tracking.load(Ordering::Acquire) {
            return;
        }
        if shared.should_capture(now, count) {
            shared.capture_trace();
        }
    }

    /// Total calls recorded so far.
    pub fn call_count(&self) -> u64 {
        self.shared.count.load(Ordering::Relaxed)
    }

    /// Whether stacks are currently being sampled.
    pub fn is_tracking(&self) -> bool {
        self.shared.tracking.load(Ordering::Acquire)
    }

    /// Captures dropped because the trace queue was full.
    pub fn dropped_traces(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Close the current window, if any, and wait for its final report.
    ///
    /// Meant for shutdown hooks. Returns whether a window was open. The rate
    /// monitor keeps running and may start tracking again.
    pub async fn flush(&self) -> bool {
        self.shared.stop_tracking().await
    }

    /// Stop the rate monitor, then [`flush`](Self::flush).
    ///
    /// A start or stop the monitor is already running completes first, so a
    /// final report it was writing has been written when this returns.
    pub async fn shutdown(&self) -> bool {
        {
            // the monitor only starts or stops while holding this lock
            let _session = self.shared.session.lock().await;
            let monitor = self
                .shared
                .monitor
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(monitor) = monitor {
                monitor.abort();
                let _ = monitor.await;
            }
        }
        self.flush().await
    }
}

struct Session {
    aggregation: JoinHandle<()>,
    reporting: JoinHandle<()>,
}

struct Shared {
    config: TrackerConfig,
    source: Box<dyn TraceSource>,
    reporter: Arc<dyn Reporter + Send + Sync>,
    resolver: Arc<dyn SymbolResolver>,

    count: AtomicU64,
    tracking: AtomicBool,
    tracking_start_count: AtomicU64,
    // nanos since `epoch`, plus one; zero means never
    last_capture: AtomicU64,
    epoch: Instant,
    dropped: AtomicU64,

    // only held to swap the sender or to try_send on it
    queue: RwLock<Option<mpsc::Sender<TraceKey>>>,
    // serializes start and stop
    session: tokio::sync::Mutex<Option<Session>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("config", &self.config)
            .field("count", &self.count)
            .field("tracking", &self.tracking)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn should_capture(&self, now: Instant, count: u64) -> bool {
        match self.config.sampling {
            SamplingPolicy::Modulus(n) => {
                let since_start =
                    count.wrapping_sub(self.tracking_start_count.load(Ordering::Relaxed));
                since_start % n == 0
            }
            SamplingPolicy::Interval(interval) => self.claim_interval_capture(now, interval),
        }
    }

    /// Only one of several callers racing for the same slot wins it.
    fn claim_interval_capture(&self, now: Instant, interval: Duration) -> bool {
        let now = now.saturating_duration_since(self.epoch).as_nanos() as u64 + 1;
        let last = self.last_capture.load(Ordering::Relaxed);
        if last != 0 && now.saturating_sub(last) <= interval.as_nanos() as u64 {
            return false;
        }
        self.last_capture
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    #[inline(never)]
    fn capture_trace(&self) {
        let key = self.source.capture(TRACKER_FRAMES, self.config.max_depth);
        let queue = self.queue.read().unwrap_or_else(|e| e.into_inner());
        let Some(queue) = queue.as_ref() else {
            return;
        };
        match queue.try_send(key) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("trace queue full, dropping capture");
            }
            // tracking stopped under us
            Err(TrySendError::Closed(_)) => {}
        }
    }

    async fn start_tracking(&self) {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return;
        }

        let (trace_tx, trace_rx) = mpsc::channel(self.config.queue_capacity);
        let (window_tx, window_rx) = mpsc::channel(WINDOW_QUEUE_CAPACITY);
        let reporting = tokio::spawn(report_windows(
            window_rx,
            self.reporter.clone(),
            self.resolver.clone(),
        ));
        let aggregation = tokio::spawn(aggregate_traces(
            trace_rx,
            window_tx,
            self.config.report_interval,
        ));

        {
            let mut queue = self.queue.write().unwrap_or_else(|e| e.into_inner());
            self.tracking_start_count
                .store(self.count.load(Ordering::Relaxed), Ordering::Relaxed);
            *queue = Some(trace_tx);
            self.tracking.store(true, Ordering::Release);
        }
        *session = Some(Session {
            aggregation,
            reporting,
        });
        tracing::info!("started tracking");
    }

    /// Closes the trace queue, then waits until every queued trace has been
    /// aggregated and the final report written.
    async fn stop_tracking(&self) -> bool {
        let mut session = self.session.lock().await;
        let Some(Session {
            aggregation,
            reporting,
        }) = session.take()
        else {
            return false;
        };

        {
            let mut queue = self.queue.write().unwrap_or_else(|e| e.into_inner());
            // dropping the only sender closes the queue
            *queue = None;
            self.tracking.store(false, Ordering::Release);
        }
        if let Err(err) = aggregation.await {
            tracing::error!(?err, "trace aggregation task failed");
        }
        if let Err(err) = reporting.await {
            tracing::error!(?err, "report task failed");
        }
        tracing::info!("stopped tracking");
        true
    }
}

async fn monitor_rate(shared: Arc<Shared>, mut monitor: RateMonitor) {
    let period = shared.config.check_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        tracing::trace!("rate monitor woke up");
        let now = tokio::time::Instant::now().into_std();
        let count = shared.count.load(Ordering::Relaxed);
        match monitor.evaluate(now, count, shared.tracking.load(Ordering::Acquire)) {
            RateDecision::StartTracking => shared.start_tracking().await,
            RateDecision::StopTracking => {
                shared.stop_tracking().await;
            }
            RateDecision::Unchanged => {}
        }
    }
}

/// One closed reporting window.
struct Window {
    aggregate: TraceAggregate,
    start: SystemTime,
    end: SystemTime,
    reason: ReportReason,
}

impl Window {
    fn metadata(&self) -> ReportMetadata {
        let since_epoch = |t: SystemTime| t.duration_since(UNIX_EPOCH).unwrap_or_default();
        ReportMetadata {
            start: since_epoch(self.start),
            end: since_epoch(self.end),
            reason: self.reason,
            total_calls: self.aggregate.total(),
            distinct_traces: self.aggregate.len(),
        }
    }
}

/// Counts traces until the queue is closed and empty, handing a window to
/// the report task every `report_interval` and once more at the end.
///
/// While the report task is behind, handing over a window waits, and the
/// trace queue fills up and drops captures meanwhile.
async fn aggregate_traces(
    mut traces: mpsc::Receiver<TraceKey>,
    windows: mpsc::Sender<Window>,
    report_interval: Duration,
) {
    let aggregator = TraceAggregator::new();
    let mut window_start = SystemTime::now();
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + report_interval,
        report_interval,
    );
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            key = traces.recv() => match key {
                Some(key) => aggregator.record(key),
                None => break,
            },
            _ = ticker.tick() => {
                close_window(&aggregator, &mut window_start, ReportReason::Periodic, &windows).await
            }
        }
    }
    close_window(&aggregator, &mut window_start, ReportReason::Final, &windows).await;
}

async fn close_window(
    aggregator: &TraceAggregator,
    window_start: &mut SystemTime,
    reason: ReportReason,
    windows: &mpsc::Sender<Window>,
) {
    let (aggregate, _) = aggregator.drain_and_reset();
    let end = SystemTime::now();
    let window = Window {
        aggregate,
        start: std::mem::replace(window_start, end),
        end,
        reason,
    };
    // the report task only exits once the sender is gone
    let _ = windows.send(window).await;
}

/// Writes windows one at a time, in order.
async fn report_windows(
    mut windows: mpsc::Receiver<Window>,
    reporter: Arc<dyn Reporter + Send + Sync>,
    resolver: Arc<dyn SymbolResolver>,
) {
    while let Some(window) = windows.recv().await {
        if window.aggregate.is_empty() {
            tracing::debug!(reason = ?window.reason, "nothing captured in window, skipping report");
            continue;
        }
        let metadata = window.metadata();
        let report = report::render(&window.aggregate, &*resolver);
        tracing::debug!(
            reason = ?metadata.reason,
            traces = metadata.distinct_traces,
            total = metadata.total_calls,
            "writing report"
        );
        if let Err(err) = reporter.report(report, &metadata).await {
            // the window is lost, tracking goes on
            tracing::error!(?err, "error writing report, continuing");
        }
    }
}
