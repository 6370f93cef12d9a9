//! USB primitives shared between the controller core and its collaborators.

pub mod address_keeper;
pub mod endpoint_manager;

pub use address_keeper::AddressKeeper;
pub use endpoint_manager::{EndpointManager, BANDWIDTH_AVAILABLE_USB11};

/// USB device address, 1..=127 once assigned. Address 0 is the default
/// address new devices answer on.
pub type Address = u8;

/// Opaque handle of the framework device bound to an address.
pub type DeviceHandle = usize;

/// Bus speed of a USB 1.1 device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Speed {
    Low,
    Full,
}

/// Endpoint data direction. Control endpoints carry both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    In,
    Out,
    Both,
}

impl Direction {
    /// `Both` acts as a wildcard on either side of the comparison.
    pub fn matches(self, other: Direction) -> bool {
        self == other || self == Direction::Both || other == Direction::Both
    }
}

/// USB transfer types, in the order the controller schedules are indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum TransferType {
    Isochronous = 0,
    Interrupt = 1,
    Control = 2,
    Bulk = 3,
}

impl TransferType {
    pub const ALL: [TransferType; 4] = [
        TransferType::Isochronous,
        TransferType::Interrupt,
        TransferType::Control,
        TransferType::Bulk,
    ];

    /// Periodic endpoints reserve frame bandwidth when registered.
    pub fn is_periodic(self) -> bool {
        matches!(self, TransferType::Isochronous | TransferType::Interrupt)
    }
}

/// One logical USB endpoint as the host controller sees it.
#[derive(Clone, Copy, Debug)]
pub struct Endpoint {
    pub address: Address,
    pub endpoint: u8,
    pub direction: Direction,
    pub transfer_type: TransferType,
    pub speed: Speed,
    pub max_packet_size: u16,
}

impl Endpoint {
    pub fn matches(&self, address: Address, endpoint: u8, direction: Direction) -> bool {
        self.address == address && self.endpoint == endpoint && self.direction.matches(direction)
    }
}
