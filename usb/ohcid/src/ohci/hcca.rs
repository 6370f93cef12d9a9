use common::dma::Dma;
use common::io::{Io, Mmio};
use static_assertions::const_assert_eq;
use syscall::error::Result;

/// Number of entries in the HCCA interrupt head table. The controller picks
/// the entry matching the low five bits of the frame number.
pub const INTERRUPT_TABLE_SIZE: usize = 32;

/// The Host Controller Communication Area (OHCI section 4.4).
///
/// A 256-byte block owned by the driver but continuously written by the
/// controller: the frame number and the done queue head are controller
/// output, the interrupt head table is driver output.
#[repr(C, packed)]
pub struct Hcca {
    interrupt_table: [Mmio<u32>; INTERRUPT_TABLE_SIZE],
    frame_number: Mmio<u16>,
    _pad: Mmio<u16>,
    done_head: Mmio<u32>,
    _reserved: [u8; 120],
}

const_assert_eq!(core::mem::size_of::<Hcca>(), 256);

impl Hcca {
    pub fn new() -> Result<Dma<Hcca>> {
        Ok(unsafe { Dma::zeroed()?.assume_init() })
    }

    /// Points every interrupt slot at the head of the interrupt ED list.
    pub fn fill_interrupt_table(&mut self, head: u32) {
        for slot in self.interrupt_table.iter_mut() {
            slot.write(head);
        }
    }

    pub fn interrupt_head(&self, slot: usize) -> u32 {
        self.interrupt_table[slot].read()
    }

    /// Low half of the frame counter, updated by the controller each frame.
    pub fn frame_number(&self) -> u16 {
        self.frame_number.read()
    }

    /// Head of the done queue, flushed by the controller before it raises
    /// WDH. Bit 0 flags further unserviced interrupt causes.
    pub fn done_head(&self) -> u32 {
        self.done_head.read()
    }
}
