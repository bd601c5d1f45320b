// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composed commands: live pipes, ordering, and all-or-nothing set commits.

use crate::prelude::{read, sh};
use flowcell_cmd::{AtomicCmd, ExitStatus, ParallelCmds, SequentialCmds, Sink, Source};

#[test]
fn piped_pair_counts_lines() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("n.txt");

    let producer = AtomicCmd::builder(["seq", "1", "3"])
        .stdout(Sink::Pipe)
        .build()
        .unwrap();
    let consumer = AtomicCmd::builder(["wc", "-l"])
        .stdin(Source::Upstream(producer.clone()))
        .stdout(Sink::File(dst.clone()))
        .build()
        .unwrap();

    let cmds = ParallelCmds::new(vec![producer, consumer]).unwrap();
    cmds.run(temp.path()).unwrap();

    let statuses = cmds.join().unwrap();
    assert_eq!(statuses, vec![ExitStatus::Exited(0), ExitStatus::Exited(0)]);
    assert!(cmds.ready());

    cmds.commit(temp.path()).unwrap();
    assert_eq!(read(&dst).trim(), "3");
}

#[test]
fn three_stage_pipeline() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("n.txt");

    let generate = AtomicCmd::builder(["seq", "1", "5"])
        .stdout(Sink::Pipe)
        .build()
        .unwrap();
    let filter = AtomicCmd::builder(["grep", "3"])
        .stdin(Source::Upstream(generate.clone()))
        .stdout(Sink::Pipe)
        .build()
        .unwrap();
    let count = AtomicCmd::builder(["wc", "-l"])
        .stdin(Source::Upstream(filter.clone()))
        .stdout(Sink::File(dst.clone()))
        .build()
        .unwrap();

    let cmds = ParallelCmds::new(vec![generate, filter, count]).unwrap();
    cmds.run(temp.path()).unwrap();
    cmds.join().unwrap();
    cmds.commit(temp.path()).unwrap();

    assert_eq!(read(&dst).trim(), "1");
}

#[test]
fn sequential_members_hand_off_through_temp_files() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("n.txt");

    let write = sh("printf '1\\n2\\n' > %(TEMP_OUT_LIST)s")
        .temp_output("LIST", "list.txt")
        .build()
        .unwrap();
    let count = sh("wc -l < %(TEMP_IN_LIST)s > %(OUT_N)s")
        .temp_input("LIST", "list.txt")
        .output("N", &dst)
        .build()
        .unwrap();

    let cmds = SequentialCmds::new(vec![write, count]).unwrap();
    cmds.run(temp.path()).unwrap();
    assert_eq!(
        cmds.join().unwrap(),
        vec![ExitStatus::Exited(0), ExitStatus::Exited(0)]
    );

    cmds.commit(temp.path()).unwrap();
    assert_eq!(read(&dst).trim(), "2");
    // The handoff file was temp-only and is gone after commit.
    assert!(!temp.path().join("list.txt").exists());
}

#[test]
fn failed_member_commit_unwinds_the_whole_set() {
    let temp = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let good_dst = out.path().join("good.txt");
    let bad_dst = out.path().join("bad.txt");

    let good = sh("echo ok > %(OUT_F)s").output("F", &good_dst).build().unwrap();
    // Exits cleanly without creating its declared output.
    let bad = AtomicCmd::builder(["true"])
        .output("F", &bad_dst)
        .build()
        .unwrap();

    let cmds = ParallelCmds::new(vec![good, bad]).unwrap();
    cmds.run(temp.path()).unwrap();
    cmds.join().unwrap();

    assert!(cmds.commit(temp.path()).is_err());
    assert!(!good_dst.exists());
    assert!(!bad_dst.exists());
}

#[test]
fn set_views_skip_internal_pipes() {
    let out = tempfile::tempdir().unwrap();
    let dst = out.path().join("n.txt");

    let producer = AtomicCmd::builder(["seq", "1", "3"])
        .stdout(Sink::Pipe)
        .build()
        .unwrap();
    let consumer = AtomicCmd::builder(["wc", "-l"])
        .stdin(Source::Upstream(producer.clone()))
        .stdout(Sink::File(dst.clone()))
        .build()
        .unwrap();
    let cmds = ParallelCmds::new(vec![producer, consumer]).unwrap();

    // The pipe linking the two is no file: the set's external surface is
    // just the final destination.
    assert!(cmds.input_files().is_empty());
    assert_eq!(cmds.output_files().into_iter().collect::<Vec<_>>(), [dst]);
}
