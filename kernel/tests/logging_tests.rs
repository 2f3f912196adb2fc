//! Log output of the task layer, read back from the capture ring.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tasklab::TaskId;

/// The capture ring is process-wide; tests reading it take turns.
static SERIAL: Mutex<()> = Mutex::new(());

static CONSOLE_LINES: AtomicUsize = AtomicUsize::new(0);

fn count_line(line: &str) {
    assert!(line.ends_with('\n'));
    CONSOLE_LINES.fetch_add(1, Ordering::Relaxed);
}

#[test]
fn test_lifecycle_events_are_logged() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut booted = common::boot_cpus(2);
    let log = tasklab::logger::captured();
    assert!(log.contains("[ INFO] tasklab::process::creation: cpu 0 online: task 0"));
    assert!(log.contains("cpu 1 online: task 1"));

    // Corrupt the parent's stack so the next fork fails loudly
    let machine = booted.manager.machine();
    let root = booted.manager.address_space_root_of(TaskId::new(0)).unwrap();
    let hole = booted.manager.config().user_stack_bottom();
    machine.drop_mapping(root, hole).unwrap();
    assert!(booted.manager.fork(0, &mut booted.frames[0]).is_err());

    let child = common::fork_onto(&mut booted, 1, 1);
    booted
        .manager
        .kill(1, child, &mut booted.frames[1])
        .unwrap();

    let log = tasklab::logger::captured();
    assert!(log.contains("[ERROR]"));
    assert!(log.contains("AddressSpaceCorrupt: Parent stack page"));
    assert!(log.contains(&format!("fork: task 1 -> child {} on cpu 1", child)));
    assert!(log.contains(&format!("task {} killed on cpu 1", child)));
}

#[test]
fn test_console_sink_and_task_dump() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let booted = common::boot_cpus(1);
    assert!(tasklab::logger::set_console(count_line));
    assert!(!tasklab::logger::set_console(count_line));

    tasklab::logger::clear_captured();
    booted.manager.debug_tasks();
    let log = tasklab::logger::captured();
    assert!(log.contains("=== tasks (1 live) ==="));
    assert!(log.contains("state: Running"));
    assert!(CONSOLE_LINES.load(Ordering::Relaxed) >= 2);
}
