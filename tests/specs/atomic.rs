// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-command lifecycle: staging, promotion, and commit atomicity.

use crate::prelude::{read, sh};
use flowcell_cmd::{CommandError, ExitStatus};
use std::fs;

#[test]
fn staged_output_is_promoted_on_commit() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("out.txt");

    let cmd = sh("echo hi > %(OUT_F)s").output("F", &dst).build().unwrap();
    cmd.run(temp.path()).unwrap();
    assert_eq!(cmd.wait().unwrap(), ExitStatus::Exited(0));

    // Staged inside the temp dir, not yet visible at the destination.
    assert_eq!(read(&temp.path().join("out.txt")), "hi\n");
    assert!(!dst.exists());

    cmd.commit(temp.path()).unwrap();
    assert_eq!(read(&dst), "hi\n");
    assert!(!temp.path().join("out.txt").exists());
}

#[test]
fn set_cwd_stages_outputs_by_basename() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("out.txt");

    let cmd = sh("echo hi > %(OUT_F)s")
        .output("F", &dst)
        .set_cwd()
        .build()
        .unwrap();
    cmd.run(temp.path()).unwrap();
    cmd.wait().unwrap();
    cmd.commit(temp.path()).unwrap();

    assert_eq!(read(&dst), "hi\n");
}

#[test]
fn missing_output_fails_commit_and_creates_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("out.txt");

    let cmd = flowcell_cmd::AtomicCmd::builder(["true"])
        .output("F", &dst)
        .build()
        .unwrap();
    cmd.run(temp.path()).unwrap();
    assert_eq!(cmd.wait().unwrap(), ExitStatus::Exited(0));

    let error = cmd.commit(temp.path()).unwrap_err();
    assert!(matches!(
        &error,
        CommandError::MissingOutputs { names } if names.contains("out.txt")
    ));
    assert!(!dst.exists());
}

#[test]
fn commit_with_any_output_missing_promotes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let created = out.path().join("created.txt");
    let skipped = out.path().join("skipped.txt");

    let cmd = sh("echo data > %(OUT_A)s")
        .output("A", &created)
        .output("B", &skipped)
        .build()
        .unwrap();
    cmd.run(temp.path()).unwrap();
    cmd.wait().unwrap();

    assert!(cmd.commit(temp.path()).is_err());
    assert!(!created.exists());
    assert!(!skipped.exists());
}

#[test]
fn promoted_outputs_are_byte_identical() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("blob.bin");

    let cmd = sh("printf 'a\\0b\\0c' > %(OUT_BLOB)s")
        .output("BLOB", &dst)
        .build()
        .unwrap();
    cmd.run(temp.path()).unwrap();
    cmd.wait().unwrap();
    let staged = fs::read(temp.path().join("blob.bin")).unwrap();

    cmd.commit(temp.path()).unwrap();
    assert_eq!(fs::read(&dst).unwrap(), staged);
}

#[test]
fn temp_only_outputs_never_reach_the_destination_dir() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("kept.txt");

    let cmd = sh("echo kept > %(OUT_KEEP)s; echo gone > %(TEMP_OUT_SCRATCH)s")
        .output("KEEP", &dst)
        .temp_output("SCRATCH", "scratch.txt")
        .build()
        .unwrap();
    cmd.run(temp.path()).unwrap();
    cmd.wait().unwrap();
    cmd.commit(temp.path()).unwrap();

    // Only the declared output was promoted; the scratch file is gone.
    let promoted: Vec<_> = fs::read_dir(out.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(promoted, ["kept.txt"]);
    assert!(!temp.path().join("scratch.txt").exists());
}

#[test]
fn temp_inputs_are_read_from_the_temp_dir() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("n.txt");
    fs::write(temp.path().join("list.txt"), "1\n2\n").unwrap();

    let cmd = sh("wc -l < %(TEMP_IN_LIST)s > %(OUT_N)s")
        .temp_input("LIST", "list.txt")
        .output("N", &dst)
        .build()
        .unwrap();
    cmd.run(temp.path()).unwrap();
    cmd.wait().unwrap();
    cmd.commit(temp.path()).unwrap();

    assert_eq!(read(&dst).trim(), "2");
}
