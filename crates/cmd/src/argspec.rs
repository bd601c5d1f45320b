// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative argument specification for atomic commands.
//!
//! A command's argv is a template: fields may contain `%(KEY)s` placeholders
//! that are substituted with concrete paths when the command is launched into
//! a temp directory. Keys are synthesized from the role of each binding:
//! `IN_`/`TEMP_IN_` inputs, `OUT_`/`TEMP_OUT_` outputs, `EXEC_` executables
//! and `AUX_` auxiliary files. The standard streams use the fixed keys
//! `IN_STDIN`, `OUT_STDOUT`/`TEMP_OUT_STDOUT` and the `STDERR` equivalents.
//!
//! Everything is validated up front, including a dry-run substitution of the
//! argv, so a malformed declaration fails at build time rather than when the
//! pipeline finally schedules the command.

use crate::command::AtomicCmd;
use crate::error::SpecError;
use crate::requirement::Requirement;
use crate::template;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Ids for synthesized stream sink names; unique for the process lifetime.
static NEXT_SPEC_ID: AtomicU64 = AtomicU64::new(1);

/// Where a command's stdin comes from.
#[derive(Debug, Clone)]
pub enum Source {
    /// An existing file outside the temp dir.
    File(PathBuf),
    /// A file expected inside the temp dir.
    TempFile(String),
    /// The live stdout pipe of another command.
    Upstream(AtomicCmd),
}

/// Where a command's stdout or stderr goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// Staged in the temp dir, promoted to this destination on commit.
    File(PathBuf),
    /// Kept inside the temp dir and discarded on commit.
    TempFile(String),
    /// A live pipe consumed by a downstream command (stdout only).
    Pipe,
}

/// A keyword binding's role and value.
#[derive(Debug, Clone)]
pub(crate) enum Binding {
    Input(PathBuf),
    TempInput(String),
    Output(PathBuf),
    TempOutput(String),
    Executable(PathBuf),
    Auxiliary(PathBuf),
}

impl Binding {
    fn prefix(&self) -> &'static str {
        match self {
            Binding::Input(_) => "IN_",
            Binding::TempInput(_) => "TEMP_IN_",
            Binding::Output(_) => "OUT_",
            Binding::TempOutput(_) => "TEMP_OUT_",
            Binding::Executable(_) => "EXEC_",
            Binding::Auxiliary(_) => "AUX_",
        }
    }
}

/// An immutable, validated command specification.
///
/// Exposes the frozen file-set views schedulers consume for dependency-graph
/// construction and pre-flight checks. `TEMP_` bindings are internal to the
/// temp dir and never appear in the externally visible sets.
#[derive(Debug)]
pub struct ArgSpec {
    argv: Vec<String>,
    bindings: Vec<(String, Binding)>,
    stdin: Option<Source>,
    stdout: Sink,
    stderr: Sink,
    stdout_default: bool,
    stderr_default: bool,
    checks: Vec<Requirement>,
    set_cwd: bool,

    executables: BTreeSet<PathBuf>,
    input_files: BTreeSet<PathBuf>,
    output_files: BTreeSet<PathBuf>,
    auxiliary_files: BTreeSet<PathBuf>,
    expected_temp_files: BTreeSet<String>,
    optional_temp_files: BTreeSet<String>,
}

impl ArgSpec {
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Whether the child runs with the temp dir as its working directory.
    pub fn set_cwd(&self) -> bool {
        self.set_cwd
    }

    pub fn stdin(&self) -> Option<&Source> {
        self.stdin.as_ref()
    }

    pub fn stdout(&self) -> &Sink {
        &self.stdout
    }

    pub fn stderr(&self) -> &Sink {
        &self.stderr
    }

    /// The stdout sink, unless it is a synthesized default.
    pub(crate) fn stdout_explicit(&self) -> Option<&Sink> {
        (!self.stdout_default).then_some(&self.stdout)
    }

    /// The stderr sink, unless it is a synthesized default.
    pub(crate) fn stderr_explicit(&self) -> Option<&Sink> {
        (!self.stderr_default).then_some(&self.stderr)
    }

    pub(crate) fn bindings(&self) -> &[(String, Binding)] {
        &self.bindings
    }

    /// Executables the command depends on: `argv[0]` plus `EXEC_` bindings.
    pub fn executables(&self) -> &BTreeSet<PathBuf> {
        &self.executables
    }

    /// Files read from outside the temp dir.
    pub fn input_files(&self) -> &BTreeSet<PathBuf> {
        &self.input_files
    }

    /// Destinations that receive outputs on commit.
    pub fn output_files(&self) -> &BTreeSet<PathBuf> {
        &self.output_files
    }

    /// Non-executable dependencies (scripts, indices, databases).
    pub fn auxiliary_files(&self) -> &BTreeSet<PathBuf> {
        &self.auxiliary_files
    }

    /// Pre-flight probes registered on the command.
    pub fn requirements(&self) -> &[Requirement] {
        &self.checks
    }

    /// Basenames that must exist in the temp dir for commit to succeed.
    pub fn expected_temp_files(&self) -> &BTreeSet<String> {
        &self.expected_temp_files
    }

    /// Basenames of temp-only outputs, removed on commit when present.
    pub fn optional_temp_files(&self) -> &BTreeSet<String> {
        &self.optional_temp_files
    }
}

/// Builder for [`AtomicCmd`], obtained via [`AtomicCmd::builder`].
///
/// Binding methods take a key suffix (uppercase letters, digits and `_`) and
/// a value; the full key is the role prefix plus the suffix, and argv fields
/// reference it as `%(KEY)s`:
///
/// ```no_run
/// # use flowcell_cmd::AtomicCmd;
/// let cmd = AtomicCmd::builder(["gzip", "--stdout", "%(IN_SEQ)s"])
///     .input("SEQ", "/data/reads.fastq")
///     .stdout(flowcell_cmd::Sink::File("/data/reads.fastq.gz".into()))
///     .build()?;
/// # Ok::<(), flowcell_cmd::SpecError>(())
/// ```
#[derive(Debug)]
pub struct CmdBuilder {
    argv: Vec<String>,
    entries: Vec<(String, Binding)>,
    stdin: Vec<Source>,
    stdout: Vec<Sink>,
    stderr: Vec<Sink>,
    checks: Vec<Requirement>,
    set_cwd: bool,
}

impl CmdBuilder {
    pub(crate) fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CmdBuilder {
            argv: argv.into_iter().map(Into::into).collect(),
            entries: Vec::new(),
            stdin: Vec::new(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            checks: Vec::new(),
            set_cwd: false,
        }
    }

    /// Bind `IN_<suffix>` to an input file outside the temp dir.
    pub fn input(mut self, suffix: &str, path: impl Into<PathBuf>) -> Self {
        let key = format!("IN_{}", suffix);
        self.entries.push((key, Binding::Input(path.into())));
        self
    }

    /// Bind `TEMP_IN_<suffix>` to a file expected inside the temp dir.
    pub fn temp_input(mut self, suffix: &str, name: impl Into<String>) -> Self {
        let key = format!("TEMP_IN_{}", suffix);
        self.entries.push((key, Binding::TempInput(name.into())));
        self
    }

    /// Bind `OUT_<suffix>` to an output destination; the file is staged in
    /// the temp dir under its basename and promoted on commit.
    pub fn output(mut self, suffix: &str, path: impl Into<PathBuf>) -> Self {
        let key = format!("OUT_{}", suffix);
        self.entries.push((key, Binding::Output(path.into())));
        self
    }

    /// Bind `TEMP_OUT_<suffix>` to a transient output, removed on commit.
    pub fn temp_output(mut self, suffix: &str, name: impl Into<String>) -> Self {
        let key = format!("TEMP_OUT_{}", suffix);
        self.entries.push((key, Binding::TempOutput(name.into())));
        self
    }

    /// Bind `EXEC_<suffix>` to an additional executable dependency.
    pub fn executable(mut self, suffix: &str, path: impl Into<PathBuf>) -> Self {
        let key = format!("EXEC_{}", suffix);
        self.entries.push((key, Binding::Executable(path.into())));
        self
    }

    /// Bind `AUX_<suffix>` to a non-executable dependency.
    pub fn auxiliary(mut self, suffix: &str, path: impl Into<PathBuf>) -> Self {
        let key = format!("AUX_{}", suffix);
        self.entries.push((key, Binding::Auxiliary(path.into())));
        self
    }

    /// Register a pre-flight requirement probe.
    pub fn check(mut self, requirement: Requirement) -> Self {
        self.checks.push(requirement);
        self
    }

    /// Wire the child's stdin.
    pub fn stdin(mut self, source: Source) -> Self {
        self.stdin.push(source);
        self
    }

    /// Wire the child's stdout.
    pub fn stdout(mut self, sink: Sink) -> Self {
        self.stdout.push(sink);
        self
    }

    /// Wire the child's stderr.
    pub fn stderr(mut self, sink: Sink) -> Self {
        self.stderr.push(sink);
        self
    }

    /// Run the child with the temp dir as its working directory; input and
    /// auxiliary paths are resolved to absolute paths up front.
    pub fn set_cwd(mut self) -> Self {
        self.set_cwd = true;
        self
    }

    /// Validate the declaration and produce the command.
    pub fn build(self) -> Result<AtomicCmd, SpecError> {
        Ok(AtomicCmd::from_spec(self.into_spec()?))
    }

    fn into_spec(mut self) -> Result<ArgSpec, SpecError> {
        if self.argv.is_empty() || self.argv[0].is_empty() {
            return Err(SpecError::EmptyArgv);
        }

        let mut seen = BTreeSet::new();
        for (key, binding) in &self.entries {
            let suffix = key.strip_prefix(binding.prefix()).unwrap_or(key.as_str());
            validate_suffix(key, suffix)?;
            if !seen.insert(key.as_str()) {
                return Err(SpecError::DuplicateKey { key: key.clone() });
            }
            match binding {
                Binding::TempInput(name) | Binding::TempOutput(name) => {
                    validate_temp_name(key, name)?;
                }
                Binding::Output(path) => validate_output_path(key, path)?,
                _ => {}
            }
        }

        if self.stdin.len() > 1 {
            return Err(SpecError::DuplicateKey {
                key: "IN_STDIN".to_string(),
            });
        }
        if self.stdout.len() > 1 {
            return Err(SpecError::DuplicateKey {
                key: "OUT_STDOUT".to_string(),
            });
        }
        if self.stderr.len() > 1 {
            return Err(SpecError::DuplicateKey {
                key: "OUT_STDERR".to_string(),
            });
        }

        let mut stdin = self.stdin.pop();
        let stdout = self.stdout.pop();
        let stderr = self.stderr.pop();

        if matches!(stderr, Some(Sink::Pipe)) {
            return Err(SpecError::PipeNotAllowed {
                key: "OUT_STDERR".to_string(),
            });
        }

        if let Some(Source::TempFile(name)) = &stdin {
            validate_temp_name("TEMP_IN_STDIN", name)?;
        }
        for (key, sink) in [("STDOUT", &stdout), ("STDERR", &stderr)] {
            match sink {
                Some(Sink::TempFile(name)) => {
                    validate_temp_name(&format!("TEMP_OUT_{}", key), name)?;
                }
                Some(Sink::File(path)) => {
                    validate_output_path(&format!("OUT_{}", key), path)?;
                }
                _ => {}
            }
        }

        // The child may chdir into the temp dir, so external paths must be
        // resolved before templating.
        if self.set_cwd {
            for (_, binding) in &mut self.entries {
                if let Binding::Input(path) | Binding::Auxiliary(path) = binding {
                    *path = absolutize(path)?;
                }
            }
            if let Some(Source::File(path)) = &mut stdin {
                *path = absolutize(path)?;
            }
        }

        // Unbound stdout/stderr default to temp files so child output is
        // never silently interleaved with the supervisor's streams.
        let spec_id = NEXT_SPEC_ID.fetch_add(1, Ordering::Relaxed);
        let executable = Path::new(&self.argv[0])
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.argv[0].clone());
        let stdout_default = stdout.is_none();
        let stderr_default = stderr.is_none();
        let stdout = match stdout {
            Some(sink) => sink,
            None => Sink::TempFile(format!("pipe_{}_{}.stdout", executable, spec_id)),
        };
        let stderr = match stderr {
            Some(sink) => sink,
            None => Sink::TempFile(format!("pipe_{}_{}.stderr", executable, spec_id)),
        };

        validate_output_names(&self.entries, &stdout, &stderr)?;

        // Frozen file-set views.
        let mut executables = BTreeSet::new();
        executables.insert(PathBuf::from(&self.argv[0]));
        let mut input_files = BTreeSet::new();
        let mut output_files = BTreeSet::new();
        let mut auxiliary_files = BTreeSet::new();
        let mut optional_temp_files = BTreeSet::new();

        for (_, binding) in &self.entries {
            match binding {
                Binding::Input(path) => {
                    input_files.insert(path.clone());
                }
                Binding::Output(path) => {
                    output_files.insert(path.clone());
                }
                Binding::TempOutput(name) => {
                    optional_temp_files.insert(name.clone());
                }
                Binding::Executable(path) => {
                    executables.insert(path.clone());
                }
                Binding::Auxiliary(path) => {
                    auxiliary_files.insert(path.clone());
                }
                Binding::TempInput(_) => {}
            }
        }
        if let Some(Source::File(path)) = &stdin {
            input_files.insert(path.clone());
        }
        for sink in [&stdout, &stderr] {
            match sink {
                Sink::File(path) => {
                    output_files.insert(path.clone());
                }
                Sink::TempFile(name) => {
                    optional_temp_files.insert(name.clone());
                }
                Sink::Pipe => {}
            }
        }
        let expected_temp_files = output_files
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        let spec = ArgSpec {
            argv: self.argv,
            bindings: self.entries,
            stdin,
            stdout,
            stderr,
            stdout_default,
            stderr_default,
            checks: self.checks,
            set_cwd: self.set_cwd,
            executables,
            input_files,
            output_files,
            auxiliary_files,
            expected_temp_files,
            optional_temp_files,
        };

        // Dry-run substitution, so missing placeholder values surface here
        // rather than at spawn time.
        let kwords = template::resolve(&spec, Path::new("/tmp"));
        template::substitute(spec.argv(), &kwords)?;

        Ok(spec)
    }
}

fn validate_suffix(key: &str, suffix: &str) -> Result<(), SpecError> {
    let valid = !suffix.is_empty()
        && suffix
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
    if !valid {
        return Err(SpecError::InvalidKey {
            suffix: suffix.to_string(),
        });
    }
    if matches!(suffix, "STDIN" | "STDOUT" | "STDERR") {
        return Err(SpecError::ReservedKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn validate_temp_name(key: &str, name: &str) -> Result<(), SpecError> {
    let plain = !name.is_empty() && Path::new(name).file_name() == Some(name.as_ref());
    if !plain {
        return Err(SpecError::DirComponent {
            key: key.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

fn validate_output_path(key: &str, path: &Path) -> Result<(), SpecError> {
    if path.file_name().is_none() {
        return Err(SpecError::InvalidPath {
            key: key.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// No two output bindings may share a basename, since they would collide in
/// the temp dir. Exception: stdout and stderr bound to the identical sink
/// share one file handle instead.
fn validate_output_names(
    entries: &[(String, Binding)],
    stdout: &Sink,
    stderr: &Sink,
) -> Result<(), SpecError> {
    let mut names: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, binding) in entries {
        match binding {
            Binding::Output(path) => {
                if let Some(name) = path.file_name() {
                    names
                        .entry(name.to_string_lossy().into_owned())
                        .or_default()
                        .push(key.clone());
                }
            }
            Binding::TempOutput(name) => {
                names.entry(name.clone()).or_default().push(key.clone());
            }
            _ => {}
        }
    }

    let merged = stdout == stderr;
    for (stream, sink) in [("STDOUT", stdout), ("STDERR", stderr)] {
        if merged && stream == "STDERR" {
            continue;
        }
        match sink {
            Sink::File(path) => {
                if let Some(name) = path.file_name() {
                    names
                        .entry(name.to_string_lossy().into_owned())
                        .or_default()
                        .push(format!("OUT_{}", stream));
                }
            }
            Sink::TempFile(name) => {
                names
                    .entry(name.clone())
                    .or_default()
                    .push(format!("TEMP_OUT_{}", stream));
            }
            Sink::Pipe => {}
        }
    }

    for (name, keys) in &names {
        if keys.len() > 1 {
            return Err(SpecError::DuplicateOutput {
                name: name.clone(),
                keys: keys.join(", "),
            });
        }
    }
    Ok(())
}

fn absolutize(path: &Path) -> Result<PathBuf, SpecError> {
    std::path::absolute(path).map_err(|source| SpecError::Absolutize {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[path = "argspec_tests.rs"]
mod tests;
