//! Process-wide registry of spawned agent PIDs.
//!
//! Signal handling consults this table: the CLI refuses to exit on a first
//! Ctrl+C while children are alive, and explicit shutdown paths can deliver
//! SIGTERM to everything still registered. Children run in their own process
//! group, so a terminal SIGINT never reaches them directly.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use tracing::warn;

fn table() -> &'static Mutex<HashSet<u32>> {
    static TABLE: OnceLock<Mutex<HashSet<u32>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Record a live child PID.
pub fn register(pid: u32) {
    if let Ok(mut set) = table().lock() {
        set.insert(pid);
    }
}

/// Remove a PID after the child exits.
pub fn unregister(pid: u32) {
    if let Ok(mut set) = table().lock() {
        set.remove(&pid);
    }
}

/// Number of children currently registered.
pub fn live_count() -> usize {
    table().lock().map(|set| set.len()).unwrap_or(0)
}

/// Snapshot of registered PIDs.
pub fn live_pids() -> Vec<u32> {
    table()
        .lock()
        .map(|set| set.iter().copied().collect())
        .unwrap_or_default()
}

/// Send SIGTERM to every registered child. Registration is left to the
/// exit-path bookkeeping of each runner.
#[cfg(unix)]
pub fn terminate_all() {
    for pid in live_pids() {
        // SAFETY: pid came from a Child handle we spawned; SIGTERM on an
        // owned subprocess is safe. A stale pid yields ESRCH, which is fine.
        #[allow(clippy::cast_possible_wrap)]
        let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if ret != 0 {
            warn!(pid, "failed to SIGTERM child");
        }
    }
}

#[cfg(not(unix))]
pub fn terminate_all() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_unregister_tracks_count() {
        let before = live_count();
        register(900_001);
        register(900_002);
        assert_eq!(live_count(), before + 2);
        assert!(live_pids().contains(&900_001));

        unregister(900_001);
        unregister(900_002);
        assert_eq!(live_count(), before);
    }

    #[test]
    fn double_register_is_single_entry() {
        let before = live_count();
        register(900_003);
        register(900_003);
        assert_eq!(live_count(), before + 1);
        unregister(900_003);
    }
}
