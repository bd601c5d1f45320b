// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single atomic command: spawned with its outputs staged in a temp dir,
//! reaped, and then either committed (outputs promoted to their declared
//! destinations) or abandoned (the caller discards the temp dir).

use crate::argspec::{ArgSpec, CmdBuilder, Sink, Source};
use crate::error::CommandError;
use crate::kill::{self, ChildGuard};
use crate::render;
use crate::requirement::Requirement;
use crate::template;
use flowcell_core::{fileops, signals};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;

/// Exit status of a reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with the given code.
    Exited(i32),
    /// Killed by the given signal.
    Signaled(i32),
}

impl ExitStatus {
    pub fn success(self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    fn from_std(status: std::process::ExitStatus) -> Self {
        match status.signal() {
            Some(signum) => ExitStatus::Signaled(signum),
            None => ExitStatus::Exited(status.code().unwrap_or(-1)),
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "{}", code),
            ExitStatus::Signaled(signum) => f.write_str(&signals::name(*signum)),
        }
    }
}

/// One-shot lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Built,
    Running,
    Joined,
    Committed,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Built => "built",
            Stage::Running => "running",
            Stage::Joined => "joined",
            Stage::Committed => "committed",
        }
    }
}

#[derive(Debug)]
struct CmdState {
    stage: Stage,
    child: Option<Child>,
    guard: Option<Arc<ChildGuard>>,
    temp: Option<PathBuf>,
    terminated: bool,
}

/// A subprocess whose outputs only appear at their destinations if it ran to
/// completion and produced every expected file.
///
/// `AtomicCmd` is a shared handle: clones refer to the same underlying
/// command. That is how a downstream command holds its upstream producer
/// ([`Source::Upstream`]) while a [`ParallelCmds`](crate::ParallelCmds)
/// holds both.
#[derive(Debug, Clone)]
pub struct AtomicCmd {
    spec: Arc<ArgSpec>,
    state: Arc<Mutex<CmdState>>,
}

impl AtomicCmd {
    /// Start building a command from its argv template.
    pub fn builder<I, S>(argv: I) -> CmdBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CmdBuilder::new(argv)
    }

    pub(crate) fn from_spec(spec: ArgSpec) -> Self {
        AtomicCmd {
            spec: Arc::new(spec),
            state: Arc::new(Mutex::new(CmdState {
                stage: Stage::Built,
                child: None,
                guard: None,
                temp: None,
                terminated: false,
            })),
        }
    }

    /// The validated specification behind this command.
    pub fn spec(&self) -> &ArgSpec {
        &self.spec
    }

    pub fn executables(&self) -> &BTreeSet<PathBuf> {
        self.spec.executables()
    }

    pub fn input_files(&self) -> &BTreeSet<PathBuf> {
        self.spec.input_files()
    }

    pub fn output_files(&self) -> &BTreeSet<PathBuf> {
        self.spec.output_files()
    }

    pub fn auxiliary_files(&self) -> &BTreeSet<PathBuf> {
        self.spec.auxiliary_files()
    }

    pub fn requirements(&self) -> &[Requirement] {
        self.spec.requirements()
    }

    pub fn expected_temp_files(&self) -> &BTreeSet<String> {
        self.spec.expected_temp_files()
    }

    pub fn optional_temp_files(&self) -> &BTreeSet<String> {
        self.spec.optional_temp_files()
    }

    /// Whether two handles refer to the same underlying command.
    pub(crate) fn same(&self, other: &AtomicCmd) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Spawn the command with its outputs staged in `temp`.
    ///
    /// The child runs in its own session, so
    /// [`terminate`](AtomicCmd::terminate) can signal the whole process
    /// group, grandchildren included. A failure at any point leaves the
    /// command in the built state.
    pub fn run(&self, temp: &Path) -> Result<(), CommandError> {
        let mut state = self.state.lock();
        if state.stage != Stage::Built {
            return Err(CommandError::State {
                op: "run",
                state: state.stage.name(),
            });
        }

        let child = self.spawn(temp)?;
        let guard = kill::register(child.id());
        tracing::debug!(pid = child.id(), cmd = %self, temp = %temp.display(), "command started");

        state.child = Some(child);
        state.guard = Some(guard);
        state.temp = Some(temp.to_path_buf());
        state.stage = Stage::Running;
        Ok(())
    }

    fn spawn(&self, temp: &Path) -> Result<Child, CommandError> {
        let spec = &*self.spec;
        let spawn_err =
            |source: io::Error| CommandError::Spawn {
                argv: spec.argv().to_vec(),
                source,
            };

        // Stream handles are opened before any cwd change, so temp-relative
        // paths must be resolved here.
        let stdin = match spec.stdin() {
            None => Stdio::inherit(),
            Some(Source::File(path)) => Stdio::from(File::open(path).map_err(spawn_err)?),
            Some(Source::TempFile(name)) => {
                Stdio::from(File::open(temp.join(name)).map_err(spawn_err)?)
            }
            Some(Source::Upstream(upstream)) => Stdio::from(
                upstream
                    .take_stdout()
                    .ok_or(CommandError::UpstreamNotRunning)?,
            ),
        };

        // stdout and stderr bound to the same destination share one handle,
        // duplicated onto both descriptors.
        let (stdout, stderr) = if spec.stdout() == spec.stderr() {
            let file = open_sink(spec.stdout(), temp).map_err(spawn_err)?;
            match file {
                Some(file) => {
                    let dup = file.try_clone().map_err(spawn_err)?;
                    (Stdio::from(file), Stdio::from(dup))
                }
                None => (Stdio::piped(), Stdio::piped()),
            }
        } else {
            let stdout = match open_sink(spec.stdout(), temp).map_err(spawn_err)? {
                Some(file) => Stdio::from(file),
                None => Stdio::piped(),
            };
            let stderr = match open_sink(spec.stderr(), temp).map_err(spawn_err)? {
                Some(file) => Stdio::from(file),
                None => Stdio::piped(),
            };
            (stdout, stderr)
        };

        let root = if spec.set_cwd() {
            PathBuf::new()
        } else {
            std::path::absolute(temp).map_err(spawn_err)?
        };
        let kwords = template::resolve(spec, &root);
        let argv = template::substitute(spec.argv(), &kwords)?;

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr);
        if spec.set_cwd() {
            command.current_dir(temp);
        }

        // SAFETY: setsid is async-signal-safe and allocation-free; it runs
        // between fork and exec in the child.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        command.spawn().map_err(|source| {
            tracing::error!(argv = ?argv, error = %source, "failed to spawn command");
            CommandError::Spawn { argv, source }
        })
    }

    /// Whether the child has run to completion, successfully or not.
    pub fn ready(&self) -> bool {
        let mut state = self.state.lock();
        match state.stage {
            Stage::Built => false,
            Stage::Running => state
                .child
                .as_mut()
                .and_then(|child| child.try_wait().ok())
                .is_some_and(|status| status.is_some()),
            Stage::Joined | Stage::Committed => true,
        }
    }

    /// Wait for the child and collect its exit status.
    ///
    /// One element per command; [`ParallelCmds`](crate::ParallelCmds)
    /// concatenates these across members.
    pub fn join(&self) -> Result<Vec<ExitStatus>, CommandError> {
        Ok(vec![self.reap()?])
    }

    /// [`join`](AtomicCmd::join) for contexts holding a single command.
    pub fn wait(&self) -> Result<ExitStatus, CommandError> {
        self.reap()
    }

    fn reap(&self) -> Result<ExitStatus, CommandError> {
        let mut state = self.state.lock();
        if state.stage != Stage::Running {
            return Err(CommandError::State {
                op: "join",
                state: state.stage.name(),
            });
        }
        let mut child = state.child.take().ok_or(CommandError::State {
            op: "join",
            state: "running",
        })?;
        // The wait blocks; release the lock so a watchdog can still call
        // terminate() on this command.
        drop(state);

        let result = child.wait();
        // Dropping the child closes any parent-side handles still held, so
        // pipe peers observe EOF.
        drop(child);

        let mut state = self.state.lock();
        state.guard = None;
        state.stage = Stage::Joined;
        drop(state);

        let status = ExitStatus::from_std(result.map_err(CommandError::Wait)?);
        tracing::debug!(cmd = %self, status = %status, "command joined");
        Ok(status)
    }

    /// Send SIGTERM to the child's process group if it is still running.
    ///
    /// A no-op in every other state, and on repeated calls.
    pub fn terminate(&self) {
        let mut state = self.state.lock();
        if state.stage != Stage::Running || state.terminated {
            return;
        }
        state.terminated = true;

        let running = state
            .child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)));
        if running {
            if let Some(guard) = &state.guard {
                tracing::debug!(cmd = %self, "terminating process group");
                guard.terminate_group();
            }
        }
        state.guard = None;
    }

    /// Promote outputs to their destinations and discard temp-only files.
    ///
    /// Requires the command to be joined and `temp` to be the directory it
    /// ran in. Either every output is promoted, or none remain promoted.
    pub fn commit(&self, temp: &Path) -> Result<(), CommandError> {
        let mut state = self.state.lock();
        if state.stage != Stage::Joined {
            return Err(CommandError::State {
                op: "commit",
                state: state.stage.name(),
            });
        }
        let run_temp = state.temp.clone().ok_or(CommandError::State {
            op: "commit",
            state: "built",
        })?;
        if !fileops::same_file(&run_temp, temp).unwrap_or(false) {
            return Err(CommandError::TempDirMismatch {
                run: run_temp,
                commit: temp.to_path_buf(),
            });
        }

        let present = list_basenames(temp).map_err(|source| CommandError::Promote {
            path: temp.to_path_buf(),
            source,
        })?;
        let missing: Vec<&str> = self
            .spec
            .expected_temp_files()
            .iter()
            .filter(|name| !present.contains(*name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CommandError::MissingOutputs {
                names: missing.join(", "),
            });
        }

        let mut promoted: Vec<&Path> = Vec::new();
        for dst in self.spec.output_files() {
            let staged = fileops::reroot(temp, dst);
            if let Err(source) = fileops::move_file(&staged, dst) {
                // Unwind everything this call promoted before reporting.
                for path in promoted {
                    if let Err(error) = fileops::try_remove(path) {
                        tracing::warn!(
                            path = %path.display(),
                            error = %error,
                            "failed to remove output while unwinding commit"
                        );
                    }
                }
                return Err(CommandError::Promote {
                    path: dst.clone(),
                    source,
                });
            }
            promoted.push(dst);
        }

        for name in self.spec.optional_temp_files() {
            let path = temp.join(name);
            if let Err(error) = fileops::try_remove(&path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "failed to remove temporary output"
                );
            }
        }

        state.child = None;
        state.guard = None;
        state.temp = None;
        state.stage = Stage::Committed;
        tracing::debug!(cmd = %self, temp = %temp.display(), "outputs committed");
        Ok(())
    }

    /// Hand the live stdout pipe to a downstream consumer's spawn.
    pub(crate) fn take_stdout(&self) -> Option<ChildStdout> {
        self.state
            .lock()
            .child
            .as_mut()
            .and_then(|child| child.stdout.take())
    }
}

impl fmt::Display for AtomicCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render::pformat(&self.spec))
    }
}

/// Open the file behind a sink, staged under `temp`; `None` for live pipes.
fn open_sink(sink: &Sink, temp: &Path) -> io::Result<Option<File>> {
    match sink {
        Sink::Pipe => Ok(None),
        Sink::File(path) => File::create(fileops::reroot(temp, path)).map(Some),
        Sink::TempFile(name) => File::create(temp.join(name)).map(Some),
    }
}

fn list_basenames(dir: &Path) -> io::Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        names.insert(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
