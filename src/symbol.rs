// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Program counter to source location resolution.

use std::fmt;

/// A resolved source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Source file path.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Resolves program counters captured in a trace to source locations.
pub trait SymbolResolver: fmt::Debug + Send + Sync {
    /// Returns `None` when `pc` cannot be resolved.
    fn resolve(&self, pc: usize) -> Option<Location>;
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for std::sync::Arc<R> {
    fn resolve(&self, pc: usize) -> Option<Location> {
        (**self).resolve(pc)
    }
}

/// Resolves addresses of the current process using its debug info.
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktraceResolver;

impl SymbolResolver for BacktraceResolver {
    fn resolve(&self, pc: usize) -> Option<Location> {
        let mut location = None;
        // return addresses point past the call; step back into it
        let addr = pc.saturating_sub(1) as *mut std::ffi::c_void;
        backtrace::resolve(addr, |symbol| {
            if location.is_some() {
                return;
            }
            if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                location = Some(Location {
                    file: file.display().to_string(),
                    line,
                });
            }
        });
        location
    }
}
