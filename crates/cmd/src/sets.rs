// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition of atomic commands under a shared temp dir and lifecycle.

use crate::argspec::{Sink, Source};
use crate::command::{AtomicCmd, ExitStatus};
use crate::error::{CommandError, SpecError};
use crate::requirement::Requirement;
use flowcell_core::fileops;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Commands that run concurrently, optionally linked stdout-to-stdin by
/// live pipes.
///
/// Construction validates the pipe graph: every upstream producer must be a
/// member, every piped stdout must be consumed by exactly one member, and
/// the graph must be acyclic. Members are held in producer-before-consumer
/// order, which `run`, `join` and `commit` all follow.
#[derive(Debug)]
pub struct ParallelCmds {
    cmds: Vec<AtomicCmd>,
}

impl ParallelCmds {
    pub fn new(cmds: Vec<AtomicCmd>) -> Result<Self, SpecError> {
        validate_members(&cmds)?;

        // Edges from each consumer back to its producer's index.
        let mut consumers = vec![0usize; cmds.len()];
        let mut producer_of: Vec<Option<usize>> = Vec::with_capacity(cmds.len());
        for cmd in &cmds {
            let producer = match cmd.spec().stdin() {
                Some(Source::Upstream(upstream)) => {
                    let Some(index) = cmds.iter().position(|member| member.same(upstream)) else {
                        return Err(SpecError::UpstreamOutsideSet {
                            cmd: cmd.to_string(),
                        });
                    };
                    consumers[index] += 1;
                    Some(index)
                }
                _ => None,
            };
            producer_of.push(producer);
        }

        for (index, cmd) in cmds.iter().enumerate() {
            let piped = matches!(cmd.spec().stdout(), Sink::Pipe);
            if piped && consumers[index] != 1 {
                return Err(SpecError::UnconsumedPipe {
                    cmd: cmd.to_string(),
                });
            }
            if !piped && consumers[index] != 0 {
                let Some(consumer) = producer_of
                    .iter()
                    .position(|producer| *producer == Some(index))
                else {
                    continue;
                };
                return Err(SpecError::UpstreamNotPiped {
                    cmd: cmds[consumer].to_string(),
                });
            }
        }

        // Producers before consumers; a pass that places nothing means the
        // remaining members form a cycle.
        let mut order = Vec::with_capacity(cmds.len());
        let mut placed = vec![false; cmds.len()];
        while order.len() < cmds.len() {
            let before = order.len();
            for index in 0..cmds.len() {
                let placeable = !placed[index]
                    && producer_of[index].is_none_or(|producer| placed[producer]);
                if placeable {
                    placed[index] = true;
                    order.push(index);
                }
            }
            if order.len() == before {
                return Err(SpecError::PipeCycle);
            }
        }

        Ok(ParallelCmds {
            cmds: order.into_iter().map(|index| cmds[index].clone()).collect(),
        })
    }

    /// Spawn every member, producers before consumers, so downstream stdin
    /// handles exist when their consumers start.
    pub fn run(&self, temp: &Path) -> Result<(), CommandError> {
        for (index, cmd) in self.cmds.iter().enumerate() {
            if let Err(error) = cmd.run(temp) {
                // Reap anything already started before surfacing the error.
                for started in &self.cmds[..index] {
                    started.terminate();
                    if let Err(join_error) = started.join() {
                        tracing::warn!(
                            error = %join_error,
                            "failed to reap command after aborted set spawn"
                        );
                    }
                }
                return Err(error);
            }
        }
        Ok(())
    }

    /// Whether every member has run to completion.
    pub fn ready(&self) -> bool {
        self.cmds.iter().all(AtomicCmd::ready)
    }

    /// Reap every member, concatenating statuses in spawn order.
    pub fn join(&self) -> Result<Vec<ExitStatus>, CommandError> {
        let mut statuses = Vec::with_capacity(self.cmds.len());
        for cmd in &self.cmds {
            statuses.extend(cmd.join()?);
        }
        Ok(statuses)
    }

    /// Send SIGTERM to every member still running.
    pub fn terminate(&self) {
        for cmd in &self.cmds {
            cmd.terminate();
        }
    }

    /// Commit every member; a member's failure removes what earlier members
    /// already promoted before the error propagates.
    pub fn commit(&self, temp: &Path) -> Result<(), CommandError> {
        commit_all(&self.cmds, temp)
    }

    pub fn executables(&self) -> BTreeSet<PathBuf> {
        union_paths(&self.cmds, AtomicCmd::executables)
    }

    pub fn input_files(&self) -> BTreeSet<PathBuf> {
        union_paths(&self.cmds, AtomicCmd::input_files)
    }

    pub fn output_files(&self) -> BTreeSet<PathBuf> {
        union_paths(&self.cmds, AtomicCmd::output_files)
    }

    pub fn auxiliary_files(&self) -> BTreeSet<PathBuf> {
        union_paths(&self.cmds, AtomicCmd::auxiliary_files)
    }

    pub fn requirements(&self) -> Vec<Requirement> {
        union_requirements(&self.cmds)
    }

    pub fn expected_temp_files(&self) -> BTreeSet<String> {
        union_names(&self.cmds, AtomicCmd::expected_temp_files)
    }

    pub fn optional_temp_files(&self) -> BTreeSet<String> {
        union_names(&self.cmds, AtomicCmd::optional_temp_files)
    }
}

/// Commands that run one after another in the shared temp dir.
///
/// `run` returns once every member has been spawned and reaped; statuses are
/// recorded for `join`. Live pipes cannot span members that never overlap in
/// time, so piped members are rejected at construction.
#[derive(Debug)]
pub struct SequentialCmds {
    cmds: Vec<AtomicCmd>,
    statuses: Mutex<Option<Vec<ExitStatus>>>,
}

impl SequentialCmds {
    pub fn new(cmds: Vec<AtomicCmd>) -> Result<Self, SpecError> {
        validate_members(&cmds)?;
        for cmd in &cmds {
            let piped = matches!(cmd.spec().stdout(), Sink::Pipe)
                || matches!(cmd.spec().stdin(), Some(Source::Upstream(_)));
            if piped {
                return Err(SpecError::PipeInSequence {
                    cmd: cmd.to_string(),
                });
            }
        }
        Ok(SequentialCmds {
            cmds,
            statuses: Mutex::new(None),
        })
    }

    /// Run and reap each member in turn; returns once all have completed.
    pub fn run(&self, temp: &Path) -> Result<(), CommandError> {
        let mut statuses = Vec::with_capacity(self.cmds.len());
        for cmd in &self.cmds {
            cmd.run(temp)?;
            statuses.extend(cmd.join()?);
        }
        *self.statuses.lock() = Some(statuses);
        Ok(())
    }

    /// Whether every member has run to completion.
    pub fn ready(&self) -> bool {
        self.statuses.lock().is_some()
    }

    /// Statuses of all members, in execution order.
    pub fn join(&self) -> Result<Vec<ExitStatus>, CommandError> {
        self.statuses.lock().clone().ok_or(CommandError::State {
            op: "join",
            state: "built",
        })
    }

    /// Send SIGTERM to any member still running.
    pub fn terminate(&self) {
        for cmd in &self.cmds {
            cmd.terminate();
        }
    }

    /// Commit every member; a member's failure removes what earlier members
    /// already promoted before the error propagates.
    pub fn commit(&self, temp: &Path) -> Result<(), CommandError> {
        commit_all(&self.cmds, temp)
    }

    pub fn executables(&self) -> BTreeSet<PathBuf> {
        union_paths(&self.cmds, AtomicCmd::executables)
    }

    pub fn input_files(&self) -> BTreeSet<PathBuf> {
        union_paths(&self.cmds, AtomicCmd::input_files)
    }

    pub fn output_files(&self) -> BTreeSet<PathBuf> {
        union_paths(&self.cmds, AtomicCmd::output_files)
    }

    pub fn auxiliary_files(&self) -> BTreeSet<PathBuf> {
        union_paths(&self.cmds, AtomicCmd::auxiliary_files)
    }

    pub fn requirements(&self) -> Vec<Requirement> {
        union_requirements(&self.cmds)
    }

    pub fn expected_temp_files(&self) -> BTreeSet<String> {
        union_names(&self.cmds, AtomicCmd::expected_temp_files)
    }

    pub fn optional_temp_files(&self) -> BTreeSet<String> {
        union_names(&self.cmds, AtomicCmd::optional_temp_files)
    }
}

fn validate_members(cmds: &[AtomicCmd]) -> Result<(), SpecError> {
    if cmds.is_empty() {
        return Err(SpecError::EmptySet);
    }
    for (index, cmd) in cmds.iter().enumerate() {
        if cmds[..index].iter().any(|other| other.same(cmd)) {
            return Err(SpecError::DuplicateMember);
        }
    }
    Ok(())
}

fn commit_all(cmds: &[AtomicCmd], temp: &Path) -> Result<(), CommandError> {
    for (index, cmd) in cmds.iter().enumerate() {
        if let Err(error) = cmd.commit(temp) {
            for committed in &cmds[..index] {
                for path in committed.output_files() {
                    if let Err(remove_error) = fileops::try_remove(path) {
                        tracing::warn!(
                            path = %path.display(),
                            error = %remove_error,
                            "failed to remove output while unwinding set commit"
                        );
                    }
                }
            }
            return Err(error);
        }
    }
    Ok(())
}

fn union_paths<'a, F>(cmds: &'a [AtomicCmd], get: F) -> BTreeSet<PathBuf>
where
    F: Fn(&'a AtomicCmd) -> &'a BTreeSet<PathBuf>,
{
    cmds.iter().flat_map(|cmd| get(cmd).iter().cloned()).collect()
}

fn union_names<'a, F>(cmds: &'a [AtomicCmd], get: F) -> BTreeSet<String>
where
    F: Fn(&'a AtomicCmd) -> &'a BTreeSet<String>,
{
    cmds.iter().flat_map(|cmd| get(cmd).iter().cloned()).collect()
}

fn union_requirements(cmds: &[AtomicCmd]) -> Vec<Requirement> {
    cmds.iter()
        .flat_map(|cmd| cmd.requirements().iter().cloned())
        .collect()
}

#[cfg(test)]
#[path = "sets_tests.rs"]
mod tests;
