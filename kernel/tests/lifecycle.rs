//! Process lifecycle integration tests
//!
//! Drives the create/wait/exit protocol and demand paging through the
//! public surface only, over the in-memory collaborators. The inline
//! scheduler runs every child to completion inside `create`, which is
//! the harshest interleaving for the handshake: all outcomes are already
//! final by the time the parent looks.

use cerulean_kernel::mm::USER_STACK_TOP;
use cerulean_kernel::testing::{harness, sample_executable, ElfBuilder, MmuEvent};
use cerulean_kernel::{KernelError, LoadMode, Pid, VirtualAddress, PAGE_SIZE};

const ENTRY: u64 = 0x40_0000;

// ===== Creation and handoff =====

#[test]
fn test_create_runs_the_child_to_user_mode() {
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("app", sample_executable(ENTRY));

    let pid = bench.manager.create("app", "alpha beta").unwrap();
    assert!(pid.0 > bench.init.0);
    assert_eq!(bench.manager.process_count(), 2);

    let regs = bench.user_mode.last().unwrap();
    assert_eq!(regs.entry.as_u64(), ENTRY);
    let sp = regs.stack_pointer.as_u64();
    assert_eq!(sp % 8, 0);
    assert!(sp < USER_STACK_TOP);
    assert!(sp >= USER_STACK_TOP - PAGE_SIZE as u64);
}

#[test]
fn test_create_needs_a_calling_process() {
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("app", sample_executable(ENTRY));

    let err = bench
        .scheduler
        .run_as(Pid(55), || bench.manager.create("app", ""))
        .unwrap_err();
    assert!(matches!(err, KernelError::ProcessNotFound { .. }));
    assert_eq!(bench.manager.process_count(), 1);
}

#[test]
fn test_spawn_failure_rolls_everything_back() {
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("app", sample_executable(ENTRY));
    bench.scheduler.fail_next_spawn();

    let err = bench.manager.create("app", "").unwrap_err();
    assert!(matches!(err, KernelError::SpawnFailed { .. }));
    assert_eq!(bench.manager.process_count(), 1);
    assert!(!bench.fs.write_denied("app"));
    assert_eq!(bench.fs.open_handles(), 0);

    // The rollback leaves the manager usable; a retry succeeds.
    bench.manager.create("app", "").unwrap();
}

// ===== Wait and exit =====

#[test]
fn test_exit_status_round_trips_through_wait() {
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("app", sample_executable(ENTRY));

    let pid = bench.manager.create("app", "").unwrap();
    bench.scheduler.run_as(pid, || bench.manager.exit(42));

    assert_eq!(bench.manager.wait(pid), 42);
    assert_eq!(bench.manager.process_count(), 1);
}

#[test]
fn test_wait_collects_each_child_once() {
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("app", sample_executable(ENTRY));

    let pid = bench.manager.create("app", "").unwrap();
    bench.scheduler.run_as(pid, || bench.manager.exit(7));

    assert_eq!(bench.manager.wait(pid), 7);
    assert_eq!(bench.manager.wait(pid), -1);
}

#[test]
fn test_wait_rejects_strangers() {
    let bench = harness(LoadMode::Eager, 8);
    assert_eq!(bench.manager.wait(Pid(1234)), -1);
}

#[test]
fn test_write_denial_spans_the_child_lifetime() {
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("app", sample_executable(ENTRY));

    let pid = bench.manager.create("app", "").unwrap();
    assert!(bench.fs.write_denied("app"));
    assert_eq!(bench.fs.open_handles(), 1);

    bench.scheduler.run_as(pid, || bench.manager.exit(0));
    assert!(!bench.fs.write_denied("app"));
    assert_eq!(bench.fs.open_handles(), 0);

    assert_eq!(bench.manager.wait(pid), 0);
}

#[test]
fn test_exit_deactivates_the_root_before_destroying_it() {
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("app", sample_executable(ENTRY));

    let pid = bench.manager.create("app", "").unwrap();
    bench.scheduler.run_as(pid, || bench.manager.exit(0));

    let events = bench.mmu.events();
    let deactivated = events
        .iter()
        .position(|event| *event == MmuEvent::Activated(None))
        .unwrap();
    let destroyed = events
        .iter()
        .position(|event| matches!(event, MmuEvent::DestroyedRoot(_)))
        .unwrap();
    assert!(deactivated < destroyed);

    assert_eq!(bench.mmu.root_count(), 0);
    assert_eq!(bench.frames.live(), 0);
}

// ===== Load failures =====

#[test]
fn test_failed_load_surfaces_to_the_parent() {
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("bad", vec![0u8; 64]);

    let err = bench.manager.create("bad", "").unwrap_err();
    let KernelError::LoadFailed { pid } = err else {
        panic!("unexpected error {:?}", err);
    };

    // The child never reached user mode and holds nothing.
    assert!(bench.user_mode.entries().is_empty());
    assert!(!bench.fs.write_denied("bad"));
    assert_eq!(bench.frames.live(), 0);
    assert_eq!(bench.mmu.root_count(), 0);

    // The failed child is still waitable, as a failure.
    assert_eq!(bench.manager.wait(Pid(pid)), -1);
    assert_eq!(bench.manager.process_count(), 1);
}

#[test]
fn test_load_failure_midway_releases_the_frames() {
    // Second segment claims more file bytes than the image holds, so
    // the first segment's pages are already mapped when the load dies.
    let code: Vec<u8> = (1..=16u8).collect();
    let image = ElfBuilder::new(ENTRY)
        .segment(ENTRY, &code, 16, false)
        .raw_phdr(1, 5, 63 * PAGE_SIZE as u64, 0x50_0000, 64, 64)
        .build();
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("app", image);

    let err = bench.manager.create("app", "").unwrap_err();
    assert!(matches!(err, KernelError::LoadFailed { .. }));
    assert_eq!(bench.frames.live(), 0);
    assert_eq!(bench.mmu.root_count(), 0);
}

// ===== Demand paging =====

#[test]
fn test_demand_mode_materializes_on_fault() {
    let bench = harness(LoadMode::Demand, 8);
    bench.fs.insert("app", sample_executable(ENTRY));

    let pid = bench.manager.create("app", "").unwrap();
    // Only the stack page exists so far; the code page waits for its
    // first fault, read through the still-open executable handle.
    assert_eq!(bench.frames.live(), 1);
    assert_eq!(bench.fs.open_handles(), 1);

    bench.scheduler.run_as(pid, || {
        bench
            .manager
            .handle_fault(VirtualAddress::new(ENTRY + 3))
            .unwrap();
    });
    assert_eq!(bench.frames.live(), 2);

    // Faulting the same page again is a no-op success.
    bench.scheduler.run_as(pid, || {
        bench.manager.handle_fault(VirtualAddress::new(ENTRY)).unwrap();
    });
    assert_eq!(bench.frames.live(), 2);

    // A fault outside every registration is a genuine violation.
    bench.scheduler.run_as(pid, || {
        let err = bench
            .manager
            .handle_fault(VirtualAddress::new(0x9999_0000))
            .unwrap_err();
        assert!(matches!(err, KernelError::UnmappedPage { .. }));
    });

    bench.scheduler.run_as(pid, || bench.manager.exit(0));
    assert_eq!(bench.frames.live(), 0);
    assert_eq!(bench.fs.open_handles(), 0);
    assert_eq!(bench.manager.wait(pid), 0);
}

#[test]
fn test_demand_paging_evicts_under_pressure() {
    let bench = harness(LoadMode::Demand, 2);
    let code: Vec<u8> = (1..=16u8).collect();
    let image = ElfBuilder::new(ENTRY)
        .segment(ENTRY, &code, 2 * PAGE_SIZE as u64, true)
        .build();
    bench.fs.insert("app", image);

    let pid = bench.manager.create("app", "").unwrap();
    assert_eq!(bench.frames.live(), 1); // just the stack

    let first = VirtualAddress::new(ENTRY);
    let second = VirtualAddress::new(ENTRY + PAGE_SIZE as u64);
    bench.scheduler.run_as(pid, || {
        bench.manager.handle_fault(first).unwrap();
        bench.manager.handle_fault(second).unwrap();
    });
    // Two frames exist in total, so the second fault pushed the first
    // page out to swap.
    assert_eq!(bench.frames.live(), 2);
    assert_eq!(bench.swap.live_slots(), 1);

    // Faulting the evicted page back swaps the other one out.
    bench
        .scheduler
        .run_as(pid, || bench.manager.handle_fault(first).unwrap());
    assert_eq!(bench.swap.live_slots(), 1);

    // Exit returns both the frames and the outstanding slot.
    bench.scheduler.run_as(pid, || bench.manager.exit(0));
    assert_eq!(bench.frames.live(), 0);
    assert_eq!(bench.swap.live_slots(), 0);
    assert_eq!(bench.manager.wait(pid), 0);
}

// ===== Orphans and zombies =====

#[test]
fn test_orphans_reap_themselves() {
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("app", sample_executable(ENTRY));
    bench.fs.insert("worker", sample_executable(ENTRY));

    let parent = bench.manager.create("app", "").unwrap();
    let child = bench
        .scheduler
        .run_as(parent, || bench.manager.create("worker", "").unwrap());
    assert_eq!(bench.manager.process_count(), 3);

    // The parent exits without waiting; the running child keeps going.
    bench.scheduler.run_as(parent, || bench.manager.exit(0));
    assert_eq!(bench.manager.wait(parent), 0);
    assert_eq!(bench.manager.process_count(), 2);

    // Nobody is left to wait for the child, so its exit reaps it.
    bench.scheduler.run_as(child, || bench.manager.exit(5));
    assert_eq!(bench.manager.process_count(), 1);
    assert_eq!(bench.frames.live(), 0);
}

#[test]
fn test_parent_exit_reaps_its_zombies() {
    let bench = harness(LoadMode::Eager, 8);
    bench.fs.insert("app", sample_executable(ENTRY));
    bench.fs.insert("worker", sample_executable(ENTRY));

    let parent = bench.manager.create("app", "").unwrap();
    let child = bench
        .scheduler
        .run_as(parent, || bench.manager.create("worker", "").unwrap());
    bench.scheduler.run_as(child, || bench.manager.exit(9));
    // The child is a zombie only its parent could have collected.
    assert_eq!(bench.manager.process_count(), 3);

    bench.scheduler.run_as(parent, || bench.manager.exit(0));
    assert_eq!(bench.manager.process_count(), 2);

    assert_eq!(bench.manager.wait(parent), 0);
    assert_eq!(bench.manager.process_count(), 1);
}
