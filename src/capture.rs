// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Stack capture into comparable trace keys.

use std::{fmt, num::ParseIntError, sync::Arc};

/// An ordered sequence of return addresses, innermost frame first.
///
/// Keys compare by exact frame sequence, and order lexicographically on it.
/// Symbolization is deferred until a report is written.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceKey(Arc<[usize]>);

impl Default for TraceKey {
    fn default() -> Self {
        TraceKey::new(Vec::new())
    }
}

impl TraceKey {
    /// Build a key from program counters.
    pub fn new(frames: impl Into<Arc<[usize]>>) -> Self {
        TraceKey(frames.into())
    }

    /// The captured program counters.
    pub fn frames(&self) -> &[usize] {
        &self.0
    }

    /// Whether the walk produced no frames.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the space-separated hex form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self, ParseIntError> {
        s.split_whitespace()
            .map(|pc| usize::from_str_radix(pc, 16))
            .collect::<Result<Vec<_>, _>>()
            .map(TraceKey::new)
    }
}

impl fmt::Display for TraceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pc) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{pc:X}")?;
        }
        Ok(())
    }
}

/// Walks the current thread's stack.
///
/// Frames with a null instruction pointer are ignored, then the first `skip`
/// frames are dropped and at most `max_depth` frames are kept. This never
/// fails: a walk that runs out of frames yields an empty key.
#[inline(never)]
pub fn capture(skip: usize, max_depth: usize) -> TraceKey {
    let mut frames = Vec::with_capacity(max_depth.min(64));
    // this function's own frame
    let mut skip = skip + 1;
    backtrace::trace(|frame| {
        let ip = frame.ip() as usize;
        if ip == 0 {
            return true;
        }
        if skip > 0 {
            skip -= 1;
            return true;
        }
        if frames.len() >= max_depth {
            return false;
        }
        frames.push(ip);
        true
    });
    TraceKey::new(frames)
}

/// Source of trace keys for the trackers.
pub(crate) trait TraceSource: Send + Sync + 'static {
    /// Capture the caller's stack, skipping `skip` tracker frames.
    fn capture(&self, skip: usize, max_depth: usize) -> TraceKey;
}

/// Captures real stacks with [`capture`].
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct StackWalker;

impl TraceSource for StackWalker {
    #[inline(never)]
    fn capture(&self, skip: usize, max_depth: usize) -> TraceKey {
        capture(skip + 1, max_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn capture_here() -> TraceKey {
        capture(0, 64)
    }

    #[test]
    fn test_identical_paths_give_equal_keys() {
        let keys: Vec<_> = (0..2).map(|_| capture_here()).collect();
        assert!(!keys[0].is_empty());
        assert_eq!(keys[0], keys[1]);
    }

    #[test]
    fn test_max_depth_bounds_frames() {
        assert!(capture(0, 2).frames().len() <= 2);
    }

    #[test]
    fn test_excessive_skip_yields_empty_key() {
        let key = capture(100_000, 64);
        assert!(key.is_empty());
        assert_eq!(key.to_string(), "");
    }

    #[test]
    fn test_display_and_parse() {
        let key = TraceKey::new(vec![0xdead, 0x1, 0xBEEF0]);
        assert_eq!(key.to_string(), "DEAD 1 BEEF0");
        assert_eq!(TraceKey::parse(&key.to_string()).unwrap(), key);
        assert!(TraceKey::parse("xyz").is_err());
        assert_eq!(TraceKey::parse("").unwrap(), TraceKey::default());
    }

    #[test]
    fn test_ordering_is_lexicographic_on_frames() {
        let a = TraceKey::new(vec![1, 5]);
        let b = TraceKey::new(vec![1, 6]);
        let c = TraceKey::new(vec![2]);
        let mut keys = vec![c.clone(), b.clone(), a.clone()];
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
    }
}
