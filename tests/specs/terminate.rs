// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal-driven cleanup: process-group termination and status rendering.

use crate::prelude::{eventually, read, sh};
use flowcell_cmd::ExitStatus;

/// Whether a process is still running (zombies count as gone).
fn process_running(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Err(_) => false,
        Ok(stat) => stat
            .rsplit_once(") ")
            .map(|(_, rest)| !rest.starts_with('Z'))
            .unwrap_or(false),
    }
}

#[test]
fn terminate_kills_grandchildren_via_the_process_group() {
    let temp = tempfile::tempdir().unwrap();
    let cmd = sh("sleep 30 & echo $! > %(TEMP_OUT_PID)s; wait")
        .temp_output("PID", "pid.txt")
        .build()
        .unwrap();
    cmd.run(temp.path()).unwrap();

    // Wait for the shell to report the grandchild's pid.
    let pid_path = temp.path().join("pid.txt");
    assert!(eventually(|| pid_path.exists() && !read(&pid_path).trim().is_empty()));
    let grandchild: i32 = read(&pid_path).trim().parse().unwrap();
    assert!(process_running(grandchild));

    cmd.terminate();
    let status = cmd.wait().unwrap();
    assert_eq!(status, ExitStatus::Signaled(libc::SIGTERM));
    assert_eq!(status.to_string(), "SIGTERM");

    assert!(eventually(|| !process_running(grandchild)));
}

#[test]
fn terminated_command_leaves_no_destination_outputs() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("partial.txt");

    // Writes its output early, then blocks: a termination target with a
    // staged but unpromoted file.
    let cmd = sh("echo partial > %(OUT_F)s; sleep 30")
        .output("F", &dst)
        .build()
        .unwrap();
    cmd.run(temp.path()).unwrap();
    assert!(eventually(|| temp.path().join("partial.txt").exists()));

    cmd.terminate();
    let status = cmd.wait().unwrap();
    assert!(!status.success());

    // The staged file stays in the temp dir for the caller to discard.
    assert!(!dst.exists());
    assert!(temp.path().join("partial.txt").exists());
}

#[test]
fn terminate_propagates_across_a_set() {
    let temp = tempfile::tempdir().unwrap();
    let first = sh("sleep 30").build().unwrap();
    let second = sh("sleep 30").build().unwrap();

    let cmds = flowcell_cmd::ParallelCmds::new(vec![first, second]).unwrap();
    cmds.run(temp.path()).unwrap();
    cmds.terminate();

    let statuses = cmds.join().unwrap();
    assert_eq!(
        statuses,
        vec![
            ExitStatus::Signaled(libc::SIGTERM),
            ExitStatus::Signaled(libc::SIGTERM),
        ]
    );
}

#[test]
fn absolute_temp_paths_reach_children_that_change_directory() {
    // A child that chdirs away still writes to the right temp dir because
    // templated paths are absolute unless set_cwd is requested.
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("where.txt");

    let cmd = sh("cd / && echo here > %(OUT_F)s")
        .output("F", &dst)
        .build()
        .unwrap();
    cmd.run(temp.path()).unwrap();
    cmd.wait().unwrap();
    cmd.commit(temp.path()).unwrap();

    assert_eq!(read(&dst), "here\n");
}
