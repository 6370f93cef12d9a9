//! Shared harness for the end-to-end tests: a register window in ordinary
//! memory, a service thread standing in for the controller side of it, and
//! mock collaborators.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use common::dma::physical_to_virtual;
use ohcid::ohci::ed::EndpointDescriptor;
use ohcid::ohci::{InterruptMethod, Ohci, RootHub, TransferBatch};
use ohcid::usb::{Address, TransferType};

pub const REG_REVISION: usize = 0x00;
pub const REG_CONTROL: usize = 0x04;
pub const REG_COMMAND_STATUS: usize = 0x08;
pub const REG_INTERRUPT_STATUS: usize = 0x0C;
pub const REG_INTERRUPT_ENABLE: usize = 0x10;
pub const REG_HCCA: usize = 0x18;
pub const REG_CONTROL_HEAD: usize = 0x20;
pub const REG_CONTROL_CURRENT: usize = 0x24;
pub const REG_BULK_HEAD: usize = 0x28;
pub const REG_BULK_CURRENT: usize = 0x2C;
pub const REG_FM_INTERVAL: usize = 0x34;
pub const REG_PERIODIC_START: usize = 0x40;
pub const REG_LEGACY_CONTROL: usize = 0x100;

pub const CTRL_LIST_ENABLES: u32 = 0b1111 << 2;
pub const CTRL_CLE: u32 = 1 << 4;
pub const CTRL_BLE: u32 = 1 << 5;
pub const CTRL_HCFS_MASK: u32 = 0b11 << 6;
pub const CTRL_HCFS_OPERATIONAL: u32 = 2 << 6;
pub const CTRL_IR: u32 = 1 << 8;
pub const CS_HCR: u32 = 1 << 0;
pub const CS_CLF: u32 = 1 << 1;
pub const CS_BLF: u32 = 1 << 2;
pub const CS_OCR: u32 = 1 << 3;
pub const INT_SO: u32 = 1 << 0;
pub const INT_WDH: u32 = 1 << 1;
pub const INT_SF: u32 = 1 << 2;
pub const INT_UE: u32 = 1 << 4;
pub const INT_RHSC: u32 = 1 << 6;

/// 0x200 bytes: the OHCI block plus the legacy emulation register.
pub const WINDOW_SIZE: usize = 0x200;

pub fn reg_window() -> usize {
    let window: Box<[u32]> = vec![0u32; WINDOW_SIZE / 4].into_boxed_slice();
    Box::leak(window).as_mut_ptr() as usize
}

pub fn peek(base: usize, offset: usize) -> u32 {
    unsafe { ((base + offset) as *const u32).read_volatile() }
}

pub fn poke(base: usize, offset: usize, value: u32) {
    unsafe { ((base + offset) as *mut u32).write_volatile(value) }
}

/// Services the controller side of a register window: completes the
/// self-clearing reset and answers ownership change requests the way SMM
/// firmware would.
pub struct FakeController {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    pub ownership_changes: Arc<AtomicUsize>,
}

impl FakeController {
    pub fn spawn(base: usize) -> FakeController {
        let stop = Arc::new(AtomicBool::new(false));
        let ownership_changes = Arc::new(AtomicUsize::new(0));
        let thread_stop = Arc::clone(&stop);
        let thread_changes = Arc::clone(&ownership_changes);
        let thread = thread::spawn(move || {
            let command_status =
                unsafe { AtomicU32::from_ptr((base + REG_COMMAND_STATUS) as *mut u32) };
            let control = unsafe { AtomicU32::from_ptr((base + REG_CONTROL) as *mut u32) };
            while !thread_stop.load(Ordering::Relaxed) {
                let cs = command_status.load(Ordering::Relaxed);
                if cs & CS_HCR != 0 {
                    command_status.fetch_and(!CS_HCR, Ordering::Relaxed);
                }
                if cs & CS_OCR != 0 && control.load(Ordering::Relaxed) & CTRL_IR != 0 {
                    control.fetch_and(!CTRL_IR, Ordering::Relaxed);
                    command_status.fetch_and(!CS_OCR, Ordering::Relaxed);
                    thread_changes.fetch_add(1, Ordering::Relaxed);
                }
                thread::sleep(Duration::from_micros(100));
            }
        });
        FakeController {
            stop,
            thread: Some(thread),
            ownership_changes,
        }
    }
}

impl Drop for FakeController {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[derive(Default)]
pub struct MockRootHub {
    pub regs_base: AtomicUsize,
    pub address: Mutex<Option<Address>>,
    pub interrupts: AtomicUsize,
    pub requests: AtomicUsize,
}

/// Newtype around the shared mock so `RootHub` (a foreign trait) can be
/// implemented for it without running afoul of the orphan rules, which
/// reject a direct `impl RootHub for Arc<MockRootHub>` in this test crate.
#[derive(Clone, Default)]
pub struct SharedRootHub(pub Arc<MockRootHub>);

impl RootHub for SharedRootHub {
    fn init(&self, regs_base: usize) {
        self.0.regs_base.store(regs_base, Ordering::Relaxed);
    }

    fn address(&self) -> Option<Address> {
        *self.0.address.lock().unwrap()
    }

    fn set_address(&self, address: Address) {
        *self.0.address.lock().unwrap() = Some(address);
    }

    fn request(&self, _batch: Box<dyn TransferBatch>) {
        self.0.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn interrupt(&self) {
        self.0.interrupts.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct BatchState {
    pub committed: AtomicBool,
    pub complete: AtomicBool,
    pub finished: AtomicBool,
}

pub struct MockBatch {
    pub state: Arc<BatchState>,
    pub address: Address,
    pub transfer_type: TransferType,
}

impl MockBatch {
    pub fn new(address: Address, transfer_type: TransferType) -> (MockBatch, Arc<BatchState>) {
        let state = Arc::new(BatchState::default());
        (
            MockBatch {
                state: Arc::clone(&state),
                address,
                transfer_type,
            },
            state,
        )
    }
}

impl TransferBatch for MockBatch {
    fn address(&self) -> Address {
        self.address
    }

    fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    fn commit(&mut self) {
        self.state.committed.store(true, Ordering::Relaxed);
    }

    fn is_complete(&self) -> bool {
        self.state.complete.load(Ordering::Relaxed)
    }

    fn finish(self: Box<Self>) {
        self.state.finished.store(true, Ordering::Relaxed);
    }
}

/// An operational controller over a fresh window, cold-start path.
pub struct TestHc {
    pub hc: Ohci,
    pub base: usize,
    pub rh: Arc<MockRootHub>,
    pub fake: FakeController,
}

pub fn boot() -> TestHc {
    common::setup_logging("ohcid-tests", log::LevelFilter::Debug);
    let base = reg_window();
    poke(base, REG_REVISION, 0x10);
    poke(base, REG_FM_INTERVAL, 0x2EDF);
    let fake = FakeController::spawn(base);
    let rh = Arc::new(MockRootHub::default());
    let hc = Ohci::new(
        base,
        WINDOW_SIZE,
        InterruptMethod::Polling,
        Box::new(SharedRootHub(Arc::clone(&rh))),
    )
    .expect("controller bring-up failed");
    TestHc { hc, base, rh, fake }
}

pub fn ed_at(physical: u32) -> &'static EndpointDescriptor {
    let virt = physical_to_virtual(physical as usize).expect("dangling ED pointer");
    unsafe { &*(virt as *const EndpointDescriptor) }
}

/// Follows next-ED links from the list head at `head`, returning the device
/// address of every ED until a null link or `stop`.
pub fn walk_addresses(head: u32, stop: u32) -> Vec<u8> {
    let mut seen = Vec::new();
    let mut current = ed_at(head).next();
    while current != 0 && current != stop {
        let ed = ed_at(current);
        seen.push(ed.device_address());
        current = ed.next();
    }
    seen
}

/// The 32 interrupt head slots of the controller's HCCA.
pub fn hcca_interrupt_slots(hc: &Ohci) -> Vec<u32> {
    let virt = physical_to_virtual(hc.hcca_physical() as usize).expect("HCCA not allocated");
    (0..32)
        .map(|slot| unsafe { (virt as *const u32).add(slot).read_volatile() })
        .collect()
}
