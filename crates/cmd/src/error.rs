// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the command layer.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a command or a command set.
///
/// These always indicate a bad declaration; the fix is in the caller's spec,
/// not in retrying.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("empty argv")]
    EmptyArgv,
    #[error("invalid key suffix {suffix:?}: expected uppercase letters, digits or '_'")]
    InvalidKey { suffix: String },
    #[error("{key} is reserved for standard-stream wiring")]
    ReservedKey { key: String },
    #[error("{key} is bound more than once")]
    DuplicateKey { key: String },
    #[error("{key} requires a path with a filename, got {path:?}")]
    InvalidPath { key: String, path: PathBuf },
    #[error("{key} must be a plain filename without directory components: {name:?}")]
    DirComponent { key: String, name: String },
    #[error("output filename {name:?} is bound by multiple keys: {keys}")]
    DuplicateOutput { name: String, keys: String },
    #[error("a live pipe is only allowed on stdout, not {key}")]
    PipeNotAllowed { key: String },
    #[error("cannot resolve {path:?} to an absolute path: {source}")]
    Absolutize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),

    // command-set construction
    #[error("a command set must contain at least one command")]
    EmptySet,
    #[error("the same command appears more than once in the set")]
    DuplicateMember,
    #[error("{cmd} reads its stdin from a command outside the set")]
    UpstreamOutsideSet { cmd: String },
    #[error("{cmd} reads its stdin from a member whose stdout is not a live pipe")]
    UpstreamNotPiped { cmd: String },
    #[error("the piped stdout of {cmd} must be consumed by exactly one command in the set")]
    UnconsumedPipe { cmd: String },
    #[error("the commands in the set form a pipe cycle")]
    PipeCycle,
    #[error("{cmd} is piped and cannot be part of a sequential set")]
    PipeInSequence { cmd: String },
}

/// A placeholder that could not be substituted at render time.
#[derive(Debug, Error)]
#[error("no value for placeholder %({key})s in {field:?}")]
pub struct TemplateError {
    pub key: String,
    pub field: String,
}

/// Errors raised over a command's runtime lifecycle.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("cannot {op} a command in the {state} state")]
    State {
        op: &'static str,
        state: &'static str,
    },
    #[error("failed to spawn {argv:?}: {source}")]
    Spawn {
        argv: Vec<String>,
        #[source]
        source: io::Error,
    },
    #[error("stdin is piped from a command that is not running")]
    UpstreamNotRunning,
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("failed to wait for child: {0}")]
    Wait(#[source] io::Error),
    #[error("expected output files were not created in the temp dir: {names}")]
    MissingOutputs { names: String },
    #[error("commit was given a different temp dir than run: {run:?} vs {commit:?}")]
    TempDirMismatch { run: PathBuf, commit: PathBuf },
    #[error("failed to promote {path:?}: {source}")]
    Promote {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A pre-flight requirement probe that was not met.
#[derive(Debug, Error)]
#[error("requirement {label:?} not met: {message}")]
pub struct RequirementError {
    pub label: String,
    pub message: String,
}
