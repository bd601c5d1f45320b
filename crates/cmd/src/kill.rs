// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide registry of live children, used to cascade SIGTERM.
//!
//! Children spawned into their own sessions survive the death of the
//! supervisor unless something forwards the signal. The first registered
//! child installs a SIGTERM handler that sends SIGTERM to every live child's
//! process group and then exits the process with `-signum`.

use parking_lot::Mutex;
use std::sync::{Arc, Once, Weak};

static CHILDREN: Mutex<Vec<Weak<ChildGuard>>> = Mutex::new(Vec::new());
static INSTALL_HANDLER: Once = Once::new();

/// Process-group handle for one spawned child.
///
/// The child's pid doubles as its process-group id because commands are
/// spawned via setsid.
#[derive(Debug)]
pub(crate) struct ChildGuard {
    pgid: libc::pid_t,
}

impl ChildGuard {
    /// SIGTERM the child's whole process group.
    pub(crate) fn terminate_group(&self) {
        // The group only exists once the child's setsid has run; in the
        // window before that the child has no descendants, so signalling it
        // directly is sufficient.
        // SAFETY: sending signals to a stale id fails with ESRCH, nothing
        // worse.
        unsafe {
            if libc::killpg(self.pgid, libc::SIGTERM) == -1 {
                libc::kill(self.pgid, libc::SIGTERM);
            }
        }
    }
}

/// Track a spawned child. The returned guard keeps it visible to the SIGTERM
/// handler; the entry dies with the guard (dropped on join or terminate).
pub(crate) fn register(pid: u32) -> Arc<ChildGuard> {
    INSTALL_HANDLER.call_once(|| {
        // SAFETY: the handler only walks the registry under try_lock, sends
        // signals, and _exits; no allocation, no blocking.
        let result =
            unsafe { signal_hook::low_level::register(libc::SIGTERM, || cascade(libc::SIGTERM)) };
        match result {
            Ok(_) => tracing::debug!("installed SIGTERM cascade handler"),
            Err(error) => {
                tracing::warn!(error = %error, "failed to install SIGTERM cascade handler");
            }
        }
    });

    let guard = Arc::new(ChildGuard {
        pgid: pid as libc::pid_t,
    });
    let mut children = CHILDREN.lock();
    children.retain(|weak| weak.strong_count() > 0);
    children.push(Arc::downgrade(&guard));
    guard
}

fn cascade(signum: i32) {
    // A signal handler must not block: if the signal lands inside
    // register()'s short critical section, the cascade is skipped rather
    // than risking a deadlock on the interrupted thread's lock.
    if let Some(children) = CHILDREN.try_lock() {
        for weak in children.iter() {
            if let Some(guard) = weak.upgrade() {
                guard.terminate_group();
            }
        }
    }
    signal_hook::low_level::exit(-signum);
}

#[cfg(test)]
pub(crate) fn live_children() -> usize {
    CHILDREN
        .lock()
        .iter()
        .filter(|weak| weak.strong_count() > 0)
        .count()
}

#[cfg(test)]
#[path = "kill_tests.rs"]
mod tests;
