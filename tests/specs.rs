// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Behavioral specifications for the flowcell atomic command core.
//!
//! These are black-box against the public API: they drive real processes
//! (`sh`, `seq`, `wc`, `sleep`) through the run → join → commit lifecycle
//! and verify the filesystem effects.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/atomic.rs"]
mod atomic;
#[path = "specs/pipeline.rs"]
mod pipeline;
#[path = "specs/terminate.rs"]
mod terminate;
