// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-flight requirement probes.

use crate::error::RequirementError;
use std::fmt;
use std::sync::Arc;

/// A labelled, no-argument probe registered on a command, typically a
/// version check on one of its executables.
///
/// Probes are invoked by the scheduler before a command runs, never by the
/// command itself. Clones share the same underlying probe.
#[derive(Clone)]
pub struct Requirement {
    inner: Arc<Inner>,
}

struct Inner {
    label: String,
    probe: Box<dyn Fn() -> Result<(), String> + Send + Sync>,
}

impl Requirement {
    pub fn new<F>(label: impl Into<String>, probe: F) -> Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        Requirement {
            inner: Arc::new(Inner {
                label: label.into(),
                probe: Box::new(probe),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Invoke the probe.
    pub fn check(&self) -> Result<(), RequirementError> {
        (self.inner.probe)().map_err(|message| RequirementError {
            label: self.inner.label.clone(),
            message,
        })
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requirement")
            .field("label", &self.inner.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "requirement_tests.rs"]
mod tests;
