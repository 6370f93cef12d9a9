//! Batch scheduling and interrupt dispatch: writeback-done reaping, the
//! polling emulator, unrecoverable-error recovery and root hub routing.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use support::*;
use ohcid::usb::{Direction, Speed, TransferType};
use syscall::error::{Error, EIO};

#[test]
fn scheduling_a_control_batch_nudges_the_controller() {
    let hc = boot();
    let (batch, state) = MockBatch::new(1, TransferType::Control);
    hc.hc.schedule(Box::new(batch)).unwrap();

    assert!(state.committed.load(Ordering::Relaxed));
    assert_eq!(hc.hc.pending_count(), 1);
    assert_ne!(peek(hc.base, REG_COMMAND_STATUS) & CS_CLF, 0);
    assert_eq!(peek(hc.base, REG_COMMAND_STATUS) & CS_BLF, 0);
}

#[test]
fn scheduling_a_bulk_batch_sets_the_bulk_nudge() {
    let hc = boot();
    let (batch, _state) = MockBatch::new(1, TransferType::Bulk);
    hc.hc.schedule(Box::new(batch)).unwrap();
    assert_ne!(peek(hc.base, REG_COMMAND_STATUS) & CS_BLF, 0);
}

#[test]
fn writeback_done_reaps_only_complete_batches() {
    let hc = boot();
    let (done, done_state) = MockBatch::new(1, TransferType::Control);
    let (open, open_state) = MockBatch::new(2, TransferType::Bulk);
    hc.hc.schedule(Box::new(done)).unwrap();
    hc.hc.schedule(Box::new(open)).unwrap();
    done_state.complete.store(true, Ordering::Relaxed);

    hc.hc.interrupt(INT_WDH);

    assert!(done_state.finished.load(Ordering::Relaxed));
    assert!(!open_state.finished.load(Ordering::Relaxed));
    assert_eq!(hc.hc.pending_count(), 1);

    // the straggler is reaped once it completes
    open_state.complete.store(true, Ordering::Relaxed);
    hc.hc.interrupt(INT_WDH);
    assert!(open_state.finished.load(Ordering::Relaxed));
    assert_eq!(hc.hc.pending_count(), 0);
}

#[test]
fn empty_and_sf_only_status_are_no_ops() {
    let hc = boot();
    let (batch, state) = MockBatch::new(1, TransferType::Control);
    hc.hc.schedule(Box::new(batch)).unwrap();
    state.complete.store(true, Ordering::Relaxed);

    hc.hc.interrupt(0);
    hc.hc.interrupt(INT_SF);

    assert!(!state.finished.load(Ordering::Relaxed));
    assert_eq!(hc.hc.pending_count(), 1);
    assert_eq!(hc.rh.interrupts.load(Ordering::Relaxed), 0);
}

#[test]
fn root_hub_status_change_is_delegated() {
    let hc = boot();
    hc.hc.interrupt(INT_RHSC);
    assert_eq!(hc.rh.interrupts.load(Ordering::Relaxed), 1);
}

#[test]
fn unrecoverable_error_restarts_the_controller() {
    let hc = boot();
    hc.hc
        .add_endpoint(1, 0, Speed::Full, TransferType::Control, Direction::Both, 64, 0, 0)
        .unwrap();
    let (batch, state) = MockBatch::new(1, TransferType::Control);
    hc.hc.schedule(Box::new(batch)).unwrap();

    // wipe what a controller-side reset would wipe
    poke(hc.base, REG_CONTROL_HEAD, 0);
    poke(hc.base, REG_INTERRUPT_ENABLE, 0);

    hc.hc.interrupt(INT_UE);

    let control = peek(hc.base, REG_CONTROL);
    assert_eq!(control & CTRL_HCFS_MASK, CTRL_HCFS_OPERATIONAL);
    assert_eq!(control & CTRL_LIST_ENABLES, CTRL_LIST_ENABLES);
    assert_eq!(peek(hc.base, REG_INTERRUPT_ENABLE), 0x8000_0053);
    assert_eq!(
        peek(hc.base, REG_CONTROL_HEAD),
        hc.hc.list_head_physical(TransferType::Control)
    );

    // the schedule survived structurally, and pending batches still stand
    let head = hc.hc.list_head_physical(TransferType::Control);
    assert_eq!(walk_addresses(head, 0), vec![1]);
    assert_eq!(hc.hc.pending_count(), 1);
    assert!(!state.finished.load(Ordering::Relaxed));
}

#[test]
fn polling_samples_and_dispatches() {
    let hc = boot();
    let (batch, state) = MockBatch::new(1, TransferType::Control);
    hc.hc.schedule(Box::new(batch)).unwrap();
    state.complete.store(true, Ordering::Relaxed);

    // nothing pending in the status register: nothing happens
    poke(hc.base, REG_INTERRUPT_STATUS, 0);
    hc.hc.poll();
    assert!(!state.finished.load(Ordering::Relaxed));
    assert_eq!(hc.rh.interrupts.load(Ordering::Relaxed), 0);

    // WDH | RHSC: both branches dispatch off one sample
    poke(hc.base, REG_INTERRUPT_STATUS, INT_WDH | INT_RHSC);
    hc.hc.poll();
    assert!(state.finished.load(Ordering::Relaxed));
    assert_eq!(hc.rh.interrupts.load(Ordering::Relaxed), 1);
    assert_eq!(hc.hc.pending_count(), 0);
}

#[test]
fn polling_emulator_runs_until_stopped() {
    let hc = boot();
    let (batch, state) = MockBatch::new(1, TransferType::Control);
    hc.hc.schedule(Box::new(batch)).unwrap();
    state.complete.store(true, Ordering::Relaxed);

    let stop = AtomicBool::new(false);
    thread::scope(|scope| {
        scope.spawn(|| hc.hc.run_polling(&stop));
        poke(hc.base, REG_INTERRUPT_STATUS, INT_WDH);
        // bounded worst-case latency: one polling interval
        thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::Relaxed);
    });
    assert!(state.finished.load(Ordering::Relaxed));
}

#[test]
fn register_hub_binds_address_and_endpoint_zero() {
    let hc = boot();
    hc.hc.register_hub(7, |_| Ok(())).unwrap();

    let address = hc.rh.address.lock().unwrap().expect("no hub address");
    let (ep, _) = hc.hc.get_endpoint(address, 0, Direction::Both).unwrap();
    assert_eq!(ep.max_packet_size, 64);
    assert_eq!(ep.transfer_type, TransferType::Control);

    // batches for the hub go to the collaborator, not the schedule
    let (batch, _state) = MockBatch::new(address, TransferType::Control);
    hc.hc.schedule(Box::new(batch)).unwrap();
    assert_eq!(hc.rh.requests.load(Ordering::Relaxed), 1);
    assert_eq!(hc.hc.pending_count(), 0);
}

#[test]
fn failed_hub_announcement_rolls_everything_back() {
    let hc = boot();
    let err = hc
        .hc
        .register_hub(7, |_| Err(Error::new(EIO)))
        .unwrap_err();
    assert_eq!(err, Error::new(EIO));

    let address = hc.rh.address.lock().unwrap().expect("address was assigned");
    // endpoint zero was torn down and the address released
    assert!(hc.hc.get_endpoint(address, 0, Direction::Both).is_none());
    assert_eq!(
        walk_addresses(hc.hc.list_head_physical(TransferType::Control), 0),
        vec![]
    );

    // a later registration succeeds with a fresh address
    hc.hc.register_hub(7, |_| Ok(())).unwrap();
    let second = hc.rh.address.lock().unwrap().expect("no hub address");
    assert_ne!(second, address);
    assert!(hc.hc.get_endpoint(second, 0, Direction::Both).is_some());
}
