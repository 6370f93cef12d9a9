//! The OHCI host controller instance
//!
//! The controller is driven through two channels: a small register window,
//! and the schedule structures in DMA memory that the window publishes. A
//! single guard serializes the schedule lists, the pending batch set and the
//! schedule-enable register writes against concurrent submitters; the
//! handoff and bring-up spin loops run before the instance is ever shared,
//! so they may sleep freely.

use core::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use common::dma::Dma;
use common::io::{Io, Mmio};
use common::timeout::Timeout;
use log::{debug, error, info, warn};
use syscall::error::{Error, Result, EIO, ENOENT, EOVERFLOW};

pub mod batch;
pub mod ed;
pub mod endpoint_list;
pub mod hcca;
pub mod irq;
pub mod regs;
pub mod root_hub;

pub use batch::TransferBatch;
pub use root_hub::RootHub;

use self::endpoint_list::{EdNode, EndpointList};
use self::hcca::Hcca;
use self::regs::{
    FunctionalState, Interrupt, OhciRegs, CS_BLF, CS_CLF, CS_HCR, CS_OCR, CTRL_BLE, CTRL_CLE,
    CTRL_IE, CTRL_IR, CTRL_PLE, FMI_FI_MASK, LEGACY_A20_STATE, LEGACY_REGS_OFFSET, REVISION_LEGACY,
    REVISION_MASK, USED_INTERRUPTS,
};
use crate::usb::{
    Address, AddressKeeper, DeviceHandle, Direction, Endpoint, EndpointManager, Speed,
    TransferType, BANDWIDTH_AVAILABLE_USB11,
};

/// How device interrupts reach the driver.
pub enum InterruptMethod {
    /// The kernel wakes the driver task after the program from
    /// [`irq::irq_commands`] accepted the interrupt.
    Irq,
    /// No routable interrupt line; run [`Ohci::run_polling`] on a task.
    Polling,
}

/// The control register bits gating traversal of a schedule. The periodic
/// lists are enabled and disabled as a pair.
fn list_enable_bits(transfer_type: TransferType) -> u32 {
    match transfer_type {
        TransferType::Control => CTRL_CLE,
        TransferType::Bulk => CTRL_BLE,
        TransferType::Isochronous | TransferType::Interrupt => CTRL_PLE | CTRL_IE,
    }
}

struct Inner {
    regs: &'static mut OhciRegs,
    base: usize,
    reg_size: usize,
    hcca: Dma<Hcca>,
    lists: [EndpointList; 4],
    pending: Vec<Box<dyn TransferBatch>>,
    manager: EndpointManager,
    keeper: AddressKeeper,
}

/// One OHCI host controller.
pub struct Ohci {
    inner: Mutex<Inner>,
    rh: Box<dyn RootHub>,
    interrupt_method: InterruptMethod,
}

unsafe impl Send for Ohci {}
unsafe impl Sync for Ohci {}

impl Ohci {
    /// Takes over the controller whose registers are mapped at `address` and
    /// brings it to the operational state.
    ///
    /// Builds the schedule memory, runs the firmware handoff, hands the
    /// register window to the root hub collaborator and starts the
    /// controller. Fails with `EOVERFLOW` when the mapped window cannot hold
    /// the register block, and with `ENOMEM` when the DMA allocations fail.
    pub fn new(
        address: usize,
        reg_size: usize,
        interrupt_method: InterruptMethod,
        root_hub: Box<dyn RootHub>,
    ) -> Result<Ohci> {
        if reg_size < mem::size_of::<OhciRegs>() {
            error!("register window of {:#x} bytes is too small", reg_size);
            return Err(Error::new(EOVERFLOW));
        }
        let regs = unsafe { &mut *(address as *mut OhciRegs) };

        let revision = regs.revision.read() & REVISION_MASK;
        info!("OHCI revision {}.{}", revision >> 4, revision & 0xF);

        let mut lists = [
            EndpointList::new(TransferType::Isochronous)?,
            EndpointList::new(TransferType::Interrupt)?,
            EndpointList::new(TransferType::Control)?,
            EndpointList::new(TransferType::Bulk)?,
        ];
        // Periodic traversal runs on from the interrupt EDs into the
        // isochronous ones.
        let isochronous_head = lists[TransferType::Isochronous as usize].head_physical();
        lists[TransferType::Interrupt as usize].set_next(isochronous_head);

        let mut hcca = Hcca::new()?;
        hcca.fill_interrupt_table(lists[TransferType::Interrupt as usize].head_physical());

        let mut inner = Inner {
            regs,
            base: address,
            reg_size,
            hcca,
            lists,
            pending: Vec::new(),
            manager: EndpointManager::new(BANDWIDTH_AVAILABLE_USB11),
            keeper: AddressKeeper::new(),
        };

        inner.gain_control();
        root_hub.init(address);
        inner.start()?;

        Ok(Ohci {
            inner: Mutex::new(inner),
            rh: root_hub,
            interrupt_method,
        })
    }

    /// Whether the instance was created without a routable interrupt line
    /// and needs [`Ohci::run_polling`] on a task of its own.
    pub fn needs_polling(&self) -> bool {
        matches!(self.interrupt_method, InterruptMethod::Polling)
    }

    /// Registers the root hub with the address keeper and endpoint zero, and
    /// announces it to the framework through `announce`.
    ///
    /// Every step rolls the earlier ones back on failure: a failed
    /// `announce` tears the endpoint down and releases the address again.
    pub fn register_hub<F>(&self, handle: DeviceHandle, announce: F) -> Result<()>
    where
        F: FnOnce(Address) -> Result<()>,
    {
        let address = {
            let mut inner = self.inner.lock().unwrap();
            let address = inner.keeper.get_free_address(Speed::Full).map_err(|err| {
                error!("failed to allocate the root hub address: {}", err);
                err
            })?;
            if let Err(err) = inner.keeper.bind(address, handle) {
                inner.keeper.release(address);
                return Err(err);
            }
            address
        };
        self.rh.set_address(address);

        if let Err(err) = self.add_endpoint(
            address,
            0,
            Speed::Full,
            TransferType::Control,
            Direction::Both,
            64,
            0,
            0,
        ) {
            error!("failed to add root hub endpoint 0: {}", err);
            self.inner.lock().unwrap().keeper.release(address);
            return Err(err);
        }

        if let Err(err) = announce(address) {
            error!("failed to announce the root hub: {}", err);
            let _ = self.remove_endpoint(address, 0, Direction::Both);
            self.inner.lock().unwrap().keeper.release(address);
            return Err(err);
        }
        Ok(())
    }

    /// Creates the hardware ED for an endpoint, registers it and links it
    /// into the schedule matching its transfer type.
    ///
    /// `bandwidth` is the per-frame byte reservation for periodic endpoint
    /// types; registration fails with `ENOSPC` once the frame budget is
    /// spent. `interval` is carried for diagnostics only, the flat schedule
    /// lists serve every interrupt endpoint each frame.
    pub fn add_endpoint(
        &self,
        address: Address,
        endpoint: u8,
        speed: Speed,
        transfer_type: TransferType,
        direction: Direction,
        max_packet_size: u16,
        bandwidth: usize,
        interval: u32,
    ) -> Result<()> {
        let ep = Endpoint {
            address,
            endpoint,
            direction,
            transfer_type,
            speed,
            max_packet_size,
        };
        debug!(
            "adding endpoint {}:{} {:?} {:?} mps {} interval {}",
            address, endpoint, direction, transfer_type, max_packet_size, interval
        );

        let node = EdNode::new(ep)?;
        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;
        inner.manager.register(ep, bandwidth)?;
        inner.with_list_quiesced(transfer_type, |list| {
            list.insert(node);
        });
        Ok(())
    }

    /// Unlinks an endpoint's ED from its schedule and unregisters it.
    pub fn remove_endpoint(&self, address: Address, endpoint: u8, direction: Direction) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;
        let ep = match inner.manager.get(address, endpoint, direction) {
            Some((ep, _)) => *ep,
            None => {
                error!("endpoint unregister failed: no such endpoint");
                return Err(Error::new(ENOENT));
            }
        };
        let transfer_type = ep.transfer_type;
        if inner.lists[transfer_type as usize].contains(address, endpoint, direction) {
            inner.with_list_quiesced(transfer_type, |list| {
                list.remove(address, endpoint, direction);
            });
        } else {
            warn!("endpoint without a hardware descriptor");
        }
        inner.manager.unregister(address, endpoint, direction)
    }

    /// Looks an endpoint up in the registrar; returns the endpoint and its
    /// bandwidth reservation.
    pub fn get_endpoint(
        &self,
        address: Address,
        endpoint: u8,
        direction: Direction,
    ) -> Option<(Endpoint, usize)> {
        let inner = self.inner.lock().unwrap();
        inner
            .manager
            .get(address, endpoint, direction)
            .map(|(ep, bandwidth)| (*ep, bandwidth))
    }

    /// Physical address of the ED serving an endpoint, for batch
    /// implementations that link their TDs into its queue.
    pub fn endpoint_ed_physical(
        &self,
        address: Address,
        endpoint: u8,
        direction: Direction,
    ) -> Option<u32> {
        let inner = self.inner.lock().unwrap();
        let (ep, _) = inner.manager.get(address, endpoint, direction)?;
        inner.lists[ep.transfer_type as usize].ed_physical(address, endpoint, direction)
    }

    /// Adds a transfer batch to the schedule.
    ///
    /// Batches addressed to the root hub are answered synchronously by the
    /// collaborator. Everything else enters the pending set and is committed
    /// to its ED; the control and bulk schedules get their list-filled nudge,
    /// the periodic schedules are walked every frame anyway.
    pub fn schedule(&self, batch: Box<dyn TransferBatch>) -> Result<()> {
        if self.rh.address() == Some(batch.address()) {
            self.rh.request(batch);
            return Ok(());
        }

        let mut inner = self.inner.lock().unwrap();
        let transfer_type = batch.transfer_type();
        let index = inner.pending.len();
        inner.pending.push(batch);
        inner.pending[index].commit();
        match transfer_type {
            TransferType::Control => inner.regs.command_status.writef(CS_CLF, true),
            TransferType::Bulk => inner.regs.command_status.writef(CS_BLF, true),
            _ => {}
        }
        Ok(())
    }

    /// Handles an interrupt, given the latched status register value.
    ///
    /// Errors inside dispatch never propagate: they are logged, and an
    /// unrecoverable error restarts the controller.
    pub fn interrupt(&self, status: u32) {
        let status = Interrupt::from_bits_truncate(status);
        if status.difference(Interrupt::SF).is_empty() {
            return;
        }
        debug!("interrupt, status {:#x}", status.bits());

        if status.contains(Interrupt::SO) {
            warn!("scheduling overrun");
        }

        if status.contains(Interrupt::RHSC) {
            self.rh.interrupt();
        }

        if status.contains(Interrupt::WDH) {
            let mut inner = self.inner.lock().unwrap();
            debug!("done queue head {:#x}", inner.hcca.done_head());
            let mut index = 0;
            while index < inner.pending.len() {
                if inner.pending[index].is_complete() {
                    let batch = inner.pending.remove(index);
                    batch.finish();
                } else {
                    index += 1;
                }
            }
        }

        if status.contains(Interrupt::UE) {
            error!("unrecoverable error, restarting the controller");
            let mut inner = self.inner.lock().unwrap();
            if let Err(err) = inner.start() {
                error!("controller restart failed: {}", err);
            }
        }
    }

    /// One pass of the interrupt emulator: sample the status register,
    /// write-clear it, dispatch.
    pub fn poll(&self) {
        let status = {
            let mut inner = self.inner.lock().unwrap();
            let status = inner.regs.interrupt_status.read();
            inner.regs.interrupt_status.write(status);
            status
        };
        self.interrupt(status);
    }

    /// The interrupt emulator for platforms that cannot route the device's
    /// interrupt line: polls the status register every 10 ms until `stop` is
    /// raised. Worst-case completion latency equals the polling interval.
    pub fn run_polling(&self, stop: &AtomicBool) {
        info!("started the interrupt emulator");
        while !stop.load(Ordering::Relaxed) {
            self.poll();
            thread::sleep(Duration::from_millis(10));
        }
        info!("stopped the interrupt emulator");
    }

    /// Physical address of the HCCA, as published to the controller.
    pub fn hcca_physical(&self) -> u32 {
        self.inner.lock().unwrap().hcca.physical() as u32
    }

    /// Physical head of a schedule list, as published to the controller.
    pub fn list_head_physical(&self, transfer_type: TransferType) -> u32 {
        self.inner.lock().unwrap().lists[transfer_type as usize].head_physical()
    }

    /// Number of batches awaiting completion.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    /// Current frame number, as written back by the controller.
    pub fn frame_number(&self) -> u16 {
        self.inner.lock().unwrap().hcca.frame_number()
    }
}

impl Inner {
    /// Runs `mutate` on a schedule list inside an enable-toggle window.
    ///
    /// The matching enable bits are cleared first, so the controller cannot
    /// be mid-traversal of a node being relinked, and re-set afterwards,
    /// handing the coherent list back. Control and bulk mutations also zero
    /// the list-current register so the controller re-reads the head.
    fn with_list_quiesced<R>(
        &mut self,
        transfer_type: TransferType,
        mutate: impl FnOnce(&mut EndpointList) -> R,
    ) -> R {
        let bits = list_enable_bits(transfer_type);
        self.regs.control.writef(bits, false);
        let result = mutate(&mut self.lists[transfer_type as usize]);
        match transfer_type {
            TransferType::Control => self.regs.control_current.write(0),
            TransferType::Bulk => self.regs.bulk_current.write(0),
            _ => {}
        }
        self.regs.control.writef(bits, true);
        result
    }

    /// Wrests the controller from whatever owned it before the driver
    /// (OHCI section 5.1.1.3).
    fn gain_control(&mut self) {
        debug!("requesting OHCI control");

        if self.regs.revision.readf(REVISION_LEGACY) {
            // Shut down legacy keyboard/mouse emulation, keeping only the
            // gate-A20 state. Clearing that bit reboots some boards.
            if self.reg_size >= LEGACY_REGS_OFFSET + mem::size_of::<u32>() {
                let emulation =
                    unsafe { &mut *((self.base + LEGACY_REGS_OFFSET) as *mut Mmio<u32>) };
                debug!("legacy emulation register: {:#x}", emulation.read());
                let a20 = emulation.read() & LEGACY_A20_STATE;
                emulation.write(a20);
            } else {
                warn!("window too small for the legacy emulation register");
            }
        }

        // Interrupt routing enabled: an SMM driver owns the device. Request
        // an ownership change and wait it out; the SMM driver has to answer.
        if self.regs.control.readf(CTRL_IR) {
            debug!("SMM driver active, requesting ownership change");
            self.regs.command_status.writef(CS_OCR, true);
            while self.regs.control.readf(CTRL_IR) {
                thread::sleep(Duration::from_millis(1));
            }
            info!("ownership taken over from SMM");
            self.regs.set_functional_state(FunctionalState::Reset);
            thread::sleep(Duration::from_millis(50));
            return;
        }

        match self.regs.functional_state() {
            // Fresh power-on; the USB spec wants reset held for 50 ms.
            FunctionalState::Reset => {
                debug!("controller found in reset state");
                thread::sleep(Duration::from_millis(50));
            }
            FunctionalState::Operational => {
                info!("BIOS driver left the controller operational");
            }
            state => {
                debug!("BIOS driver left the controller in {:?}, resuming", state);
                self.regs.set_functional_state(FunctionalState::Resume);
                thread::sleep(Duration::from_millis(20));
            }
        }
    }

    /// Brings the controller to the operational state (OHCI section 5.1.1.4).
    /// Also the recovery path after an unrecoverable error.
    fn start(&mut self) -> Result<()> {
        // The controller reset wipes fm_interval; keep the calibrated value.
        let fm_interval = self.regs.fm_interval.read();

        self.regs.command_status.write(CS_HCR);
        let deadline = Timeout::from_millis(50);
        let mut elapsed_us = 0;
        while self.regs.command_status.readf(CS_HCR) {
            if deadline.run().is_err() {
                error!("controller reset did not complete");
                return Err(Error::new(EIO));
            }
            thread::sleep(Duration::from_micros(10));
            elapsed_us += 10;
        }
        debug!("controller reset complete in ~{} us", elapsed_us);

        // The controller wakes up suspended; it must reach the operational
        // state within 2 ms, so no detours past suspend from here on.
        self.regs.fm_interval.write(fm_interval);

        self.regs.hcca.write(self.hcca.physical() as u32);
        self.regs
            .bulk_head
            .write(self.lists[TransferType::Bulk as usize].head_physical());
        self.regs
            .control_head
            .write(self.lists[TransferType::Control as usize].head_physical());

        self.regs
            .control
            .writef(CTRL_PLE | CTRL_IE | CTRL_CLE | CTRL_BLE, true);

        self.regs.interrupt_enable.write(USED_INTERRUPTS.bits());
        self.regs
            .interrupt_enable
            .write((USED_INTERRUPTS | Interrupt::MIE).bits());

        let frame_interval = fm_interval & FMI_FI_MASK;
        self.regs.periodic_start.write(frame_interval / 10 * 9);

        self.regs.set_functional_state(FunctionalState::Operational);
        debug!(
            "controller up and running, control {:#x}",
            self.regs.control.read()
        );
        Ok(())
    }
}
