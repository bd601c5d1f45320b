// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Diagnostic rendering of commands.

use crate::argspec::{ArgSpec, Sink, Source};
use crate::template;
use std::path::Path;

/// Symbolic stand-in for the temp dir in rendered paths.
const TEMP_ROOT: &str = "${TEMP}";

/// Render a spec as a shell-like diagnostic line, e.g.
/// `<wc -l < [upstream] > /data/n.txt>`.
///
/// Not re-parseable. Temp-staged paths render under `${TEMP}`, a live pipe
/// as `[pipe]`, an upstream stdin as `[upstream]`; synthesized default sinks
/// are omitted, and stdout/stderr sharing a destination collapse to `&>`.
pub(crate) fn pformat(spec: &ArgSpec) -> String {
    let kwords = template::resolve(spec, Path::new(TEMP_ROOT));
    let argv = match template::substitute(spec.argv(), &kwords) {
        Ok(argv) => argv,
        // construction dry-runs make this unreachable; degrade to the template
        Err(_) => spec.argv().to_vec(),
    };

    let mut out = String::new();
    out.push('<');
    out.push_str(&argv.join(" "));

    match spec.stdin() {
        Some(Source::File(path)) => {
            out.push_str(&format!(" < {}", path.display()));
        }
        Some(Source::TempFile(name)) => {
            out.push_str(&format!(" < {}/{}", TEMP_ROOT, name));
        }
        Some(Source::Upstream(_)) => out.push_str(" < [upstream]"),
        None => {}
    }

    match (spec.stdout_explicit(), spec.stderr_explicit()) {
        (Some(stdout), Some(stderr)) if stdout == stderr => {
            out.push_str(&format!(" &> {}", sink_path(stdout)));
        }
        (stdout, stderr) => {
            if let Some(sink) = stdout {
                out.push_str(&format!(" > {}", sink_path(sink)));
            }
            if let Some(sink) = stderr {
                out.push_str(&format!(" 2> {}", sink_path(sink)));
            }
        }
    }

    out.push('>');
    out
}

fn sink_path(sink: &Sink) -> String {
    match sink {
        Sink::File(path) => path.display().to_string(),
        Sink::TempFile(name) => format!("{}/{}", TEMP_ROOT, name),
        Sink::Pipe => "[pipe]".to_string(),
    }
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
