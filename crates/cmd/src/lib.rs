// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! flowcell-cmd: temp-directory-isolated subprocess execution with
//! all-or-nothing promotion of outputs.
//!
//! An [`AtomicCmd`] stages everything it produces in a caller-supplied temp
//! directory; outputs only appear at their declared destinations once the
//! command has been reaped and [`commit`](AtomicCmd::commit)ted. Commands can
//! be composed into [`ParallelCmds`] (children linked by live pipes) or
//! [`SequentialCmds`], and every running child is tracked by a process-wide
//! registry that cascades SIGTERM to child process groups.

pub mod argspec;
pub mod command;
pub mod error;
mod kill;
mod render;
pub mod requirement;
pub mod sets;
mod template;

pub use argspec::{ArgSpec, CmdBuilder, Sink, Source};
pub use command::{AtomicCmd, ExitStatus};
pub use error::{CommandError, RequirementError, SpecError, TemplateError};
pub use requirement::Requirement;
pub use sets::{ParallelCmds, SequentialCmds};
