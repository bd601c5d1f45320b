// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the behavioral specs.

use flowcell_cmd::{AtomicCmd, CmdBuilder};
use std::path::Path;
use std::time::Duration;

/// Build a `sh -c` command from a script with `%(KEY)s` placeholders.
pub fn sh(script: &str) -> CmdBuilder {
    AtomicCmd::builder(["sh", "-c", script])
}

/// Poll `probe` for up to two seconds.
pub fn eventually(mut probe: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if probe() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
