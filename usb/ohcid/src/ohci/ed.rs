use common::io::{Io, Mmio};
use static_assertions::const_assert_eq;

use crate::usb::{Direction, Endpoint, Speed, TransferType};

const STATUS_FA_MASK: u32 = 0x7F;
const STATUS_EN_SHIFT: u8 = 7;
const STATUS_EN_MASK: u32 = 0xF << STATUS_EN_SHIFT;
const STATUS_D_SHIFT: u8 = 11;
const STATUS_D_MASK: u32 = 0b11 << STATUS_D_SHIFT;
/// Direction field: take the direction from each TD (control endpoints).
const STATUS_D_FROM_TD: u32 = 0;
const STATUS_D_OUT: u32 = 1;
const STATUS_D_IN: u32 = 2;
/// Low speed device.
const STATUS_S_FLAG: u32 = 1 << 13;
/// Isochronous TD format.
const STATUS_F_FLAG: u32 = 1 << 15;
const STATUS_MPS_SHIFT: u8 = 16;
const STATUS_MPS_MASK: u32 = 0x7FF << STATUS_MPS_SHIFT;

/// ED and TD pointers are 16-byte aligned; the low bits carry flags.
const ED_PTR_MASK: u32 = 0xFFFF_FFF0;

/// A hardware endpoint descriptor (OHCI section 4.2).
///
/// While an ED is linked into a schedule the controller traverses, its next
/// pointer must stay valid and every surviving ED must remain reachable from
/// the controller's position; the schedule lists uphold that by only
/// mutating links inside an enable-toggle window.
#[repr(C, packed)]
pub struct EndpointDescriptor {
    status: Mmio<u32>,
    td_tail: Mmio<u32>,
    td_head: Mmio<u32>,
    next_ed: Mmio<u32>,
}

const_assert_eq!(core::mem::size_of::<EndpointDescriptor>(), 16);

impl EndpointDescriptor {
    /// Programs the control word from a logical endpoint.
    pub fn init(&mut self, ep: &Endpoint) {
        let direction = match ep.direction {
            Direction::In => STATUS_D_IN,
            Direction::Out => STATUS_D_OUT,
            Direction::Both => STATUS_D_FROM_TD,
        };
        let mut status = (u32::from(ep.address) & STATUS_FA_MASK)
            | ((u32::from(ep.endpoint) << STATUS_EN_SHIFT) & STATUS_EN_MASK)
            | ((direction << STATUS_D_SHIFT) & STATUS_D_MASK)
            | ((u32::from(ep.max_packet_size) << STATUS_MPS_SHIFT) & STATUS_MPS_MASK);
        if ep.speed == Speed::Low {
            status |= STATUS_S_FLAG;
        }
        if ep.transfer_type == TransferType::Isochronous {
            status |= STATUS_F_FLAG;
        }
        self.status.write(status);
    }

    /// Makes the TD queue empty: head and tail both point at `td`, the
    /// placeholder descriptor transfers are later linked in front of.
    pub fn set_td_queue(&mut self, td: u32) {
        self.td_tail.write(td & ED_PTR_MASK);
        self.td_head.write(td & ED_PTR_MASK);
    }

    pub fn next(&self) -> u32 {
        self.next_ed.read()
    }

    pub fn set_next(&mut self, ed: u32) {
        self.next_ed.write(ed);
    }

    pub fn device_address(&self) -> u8 {
        (self.status.read() & STATUS_FA_MASK) as u8
    }

    pub fn endpoint_number(&self) -> u8 {
        ((self.status.read() & STATUS_EN_MASK) >> STATUS_EN_SHIFT) as u8
    }

    pub fn max_packet_size(&self) -> u16 {
        ((self.status.read() & STATUS_MPS_MASK) >> STATUS_MPS_SHIFT) as u16
    }
}
