use bitflags::bitflags;
use common::io::{Io, Mmio};
use static_assertions::const_assert_eq;

/// The memory-mapped OHCI operational registers (OHCI section 7).
///
/// The controller updates several of these on its own while running, so the
/// window must only ever be accessed through the volatile [`Mmio`] cells.
#[repr(C, packed)]
pub struct OhciRegs {
    /// BCD revision of the implemented OHCI release; bit 8 flags the
    /// presence of the legacy emulation registers.
    pub revision: Mmio<u32>,
    /// Schedule enables, the functional state field and interrupt routing.
    pub control: Mmio<u32>,
    /// Controller reset, the list-filled nudges and the ownership change
    /// request.
    pub command_status: Mmio<u32>,
    /// Pending interrupt causes, write-1-to-clear.
    pub interrupt_status: Mmio<u32>,
    /// Interrupt enable mask, write-1-to-set.
    pub interrupt_enable: Mmio<u32>,
    /// Interrupt enable mask, write-1-to-clear.
    pub interrupt_disable: Mmio<u32>,
    /// Physical address of the HCCA block.
    pub hcca: Mmio<u32>,
    /// ED the controller is currently processing on the periodic list.
    pub period_current: Mmio<u32>,
    /// Physical head of the control ED list.
    pub control_head: Mmio<u32>,
    /// ED the controller is currently processing on the control list.
    pub control_current: Mmio<u32>,
    /// Physical head of the bulk ED list.
    pub bulk_head: Mmio<u32>,
    /// ED the controller is currently processing on the bulk list.
    pub bulk_current: Mmio<u32>,
    /// Last completed TD written back; mirrored into the HCCA on WDH.
    pub done_head: Mmio<u32>,
    /// Frame interval and the largest data packet per frame. The FI field
    /// carries a vendor-calibrated value that a controller reset clears.
    pub fm_interval: Mmio<u32>,
    /// Bit time remaining in the current frame.
    pub fm_remaining: Mmio<u32>,
    /// Full 32-bit frame counter; the HCCA carries its low half.
    pub fm_number: Mmio<u32>,
    /// Bit time within a frame at which the periodic lists take priority.
    pub periodic_start: Mmio<u32>,
    /// Largest packet the controller will start without a full frame left.
    pub ls_threshold: Mmio<u32>,
    /// Root hub descriptor A: port count and power switching modes.
    pub rh_descriptor_a: Mmio<u32>,
    /// Root hub descriptor B: per-port power switching and device removal.
    pub rh_descriptor_b: Mmio<u32>,
    /// Root hub status and global power control.
    pub rh_status: Mmio<u32>,
    /// Per-port status and control, one register per downstream port.
    pub rh_port_status: [Mmio<u32>; 15],
}

const_assert_eq!(core::mem::size_of::<OhciRegs>(), 0x90);

bitflags! {
    /// Bits shared by the interrupt status, enable and disable registers
    /// (OHCI section 7.2).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Interrupt: u32 {
        /// Scheduling overrun.
        const SO = 1 << 0;
        /// Writeback done head: retired TDs were flushed to the HCCA.
        const WDH = 1 << 1;
        /// Start of frame.
        const SF = 1 << 2;
        /// Resume detected on the bus.
        const RD = 1 << 3;
        /// Unrecoverable error; the controller stopped itself.
        const UE = 1 << 4;
        /// Frame number overflow.
        const FNO = 1 << 5;
        /// Root hub status change.
        const RHSC = 1 << 6;
        /// Ownership change (SMM handshake).
        const OC = 1 << 30;
        /// Master interrupt enable; gates delivery of all the others.
        const MIE = 1 << 31;
    }
}

/// The causes the driver handles. SF fires every millisecond and is left
/// masked; everything else the hardware can deliver is noise to us.
pub const USED_INTERRUPTS: Interrupt = Interrupt::SO
    .union(Interrupt::WDH)
    .union(Interrupt::UE)
    .union(Interrupt::RHSC);

/// control: periodic list enable
pub const CTRL_PLE: u32 = 1 << 2;
/// control: isochronous enable
pub const CTRL_IE: u32 = 1 << 3;
/// control: control list enable
pub const CTRL_CLE: u32 = 1 << 4;
/// control: bulk list enable
pub const CTRL_BLE: u32 = 1 << 5;
/// control: interrupt routing; set while SMM owns the controller
pub const CTRL_IR: u32 = 1 << 8;

const CTRL_HCFS_SHIFT: u8 = 6;
const CTRL_HCFS_MASK: u32 = 0b11 << CTRL_HCFS_SHIFT;

/// command_status: host controller reset, self-clearing
pub const CS_HCR: u32 = 1 << 0;
/// command_status: control list filled
pub const CS_CLF: u32 = 1 << 1;
/// command_status: bulk list filled
pub const CS_BLF: u32 = 1 << 2;
/// command_status: ownership change request
pub const CS_OCR: u32 = 1 << 3;

/// revision: legacy emulation registers are present
pub const REVISION_LEGACY: u32 = 1 << 8;
pub const REVISION_MASK: u32 = 0xFF;

/// fm_interval: the frame interval field, in bit times
pub const FMI_FI_MASK: u32 = 0x3FFF;

/// Offset of the legacy emulation control register (HceControl) from the
/// register base. Vendor extension territory past the OHCI block proper.
pub const LEGACY_REGS_OFFSET: usize = 0x100;
/// HceControl: emulated gate-A20 state. Must survive the legacy shutdown;
/// clearing it reboots some boards.
pub const LEGACY_A20_STATE: u32 = 1 << 8;

/// The 2-bit host controller functional state field of the control register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionalState {
    Reset = 0,
    Resume = 1,
    Operational = 2,
    Suspend = 3,
}

impl FunctionalState {
    fn from_control(value: u32) -> FunctionalState {
        match (value & CTRL_HCFS_MASK) >> CTRL_HCFS_SHIFT {
            0 => FunctionalState::Reset,
            1 => FunctionalState::Resume,
            2 => FunctionalState::Operational,
            _ => FunctionalState::Suspend,
        }
    }
}

impl OhciRegs {
    pub fn functional_state(&self) -> FunctionalState {
        FunctionalState::from_control(self.control.read())
    }

    /// Replaces the HCFS field, leaving the rest of the control register
    /// untouched.
    pub fn set_functional_state(&mut self, state: FunctionalState) {
        let value = self.control.read() & !CTRL_HCFS_MASK;
        self.control
            .write(value | ((state as u32) << CTRL_HCFS_SHIFT));
    }
}
