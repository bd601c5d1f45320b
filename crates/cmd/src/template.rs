// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Placeholder resolution and substitution for argv templates.

use crate::argspec::{ArgSpec, Binding, Sink, Source};
use crate::error::TemplateError;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// `%(KEY)s` placeholders in argv template fields.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\(([A-Z0-9_]+)\)s").expect("constant regex pattern is valid"));

/// Map every path-valued key to its location relative to `root`.
///
/// `TEMP_` and `OUT_` keys resolve into `root` under their basename; input,
/// auxiliary and executable keys pass through unchanged (set_cwd specs have
/// already absolutized their external paths). `TEMP_DIR` always maps to
/// `root` itself. Live pipes and upstream commands produce no entry, so an
/// argv field cannot reference them.
pub(crate) fn resolve(spec: &ArgSpec, root: &Path) -> BTreeMap<String, PathBuf> {
    let mut kwords = BTreeMap::new();
    kwords.insert("TEMP_DIR".to_string(), root.to_path_buf());

    for (key, binding) in spec.bindings() {
        let path = match binding {
            Binding::Input(path) | Binding::Executable(path) | Binding::Auxiliary(path) => {
                path.clone()
            }
            Binding::Output(path) => flowcell_core::fileops::reroot(root, path),
            Binding::TempInput(name) | Binding::TempOutput(name) => root.join(name),
        };
        kwords.insert(key.clone(), path);
    }

    match spec.stdin() {
        Some(Source::File(path)) => {
            kwords.insert("IN_STDIN".to_string(), path.clone());
        }
        Some(Source::TempFile(name)) => {
            kwords.insert("TEMP_IN_STDIN".to_string(), root.join(name));
        }
        Some(Source::Upstream(_)) | None => {}
    }
    for (stream, sink) in [("STDOUT", spec.stdout()), ("STDERR", spec.stderr())] {
        match sink {
            Sink::File(path) => {
                kwords.insert(
                    format!("OUT_{}", stream),
                    flowcell_core::fileops::reroot(root, path),
                );
            }
            Sink::TempFile(name) => {
                kwords.insert(format!("TEMP_OUT_{}", stream), root.join(name));
            }
            Sink::Pipe => {}
        }
    }

    kwords
}

/// Substitute every placeholder in every argv field.
pub(crate) fn substitute(
    argv: &[String],
    kwords: &BTreeMap<String, PathBuf>,
) -> Result<Vec<String>, TemplateError> {
    argv.iter()
        .map(|field| substitute_field(field, kwords))
        .collect()
}

fn substitute_field(
    field: &str,
    kwords: &BTreeMap<String, PathBuf>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(field.len());
    let mut tail = 0;
    for caps in PLACEHOLDER.captures_iter(field) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = kwords.get(key.as_str()).ok_or_else(|| TemplateError {
            key: key.as_str().to_string(),
            field: field.to_string(),
        })?;
        out.push_str(&field[tail..whole.start()]);
        out.push_str(&value.to_string_lossy());
        tail = whole.end();
    }
    out.push_str(&field[tail..]);
    Ok(out)
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
