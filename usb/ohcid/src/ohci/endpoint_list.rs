use common::dma::Dma;
use log::trace;
use syscall::error::Result;

use super::ed::EndpointDescriptor;
use crate::usb::{Address, Direction, Endpoint, TransferType};

/// One schedule node: the hardware ED plus the placeholder TD that keeps its
/// transfer queue in the empty state until a batch links real TDs in.
pub struct EdNode {
    ep: Endpoint,
    ed: Dma<EndpointDescriptor>,
    _placeholder_td: Dma<[u32; 4]>,
}

impl EdNode {
    pub fn new(ep: Endpoint) -> Result<EdNode> {
        let placeholder: Dma<[u32; 4]> = unsafe { Dma::zeroed()?.assume_init() };
        let mut ed: Dma<EndpointDescriptor> = unsafe { Dma::zeroed()?.assume_init() };
        ed.init(&ep);
        ed.set_td_queue(placeholder.physical() as u32);
        Ok(EdNode {
            ep,
            ed,
            _placeholder_td: placeholder,
        })
    }
}

/// One per-transfer-type ED schedule.
///
/// The sentinel head ED always exists and its physical address is what gets
/// published to the controller (and, for the interrupt list, into the HCCA
/// slots). The logical node sequence shadows the physical chain hanging off
/// the sentinel. Callers serialize access and wrap every mutation in the
/// enable-toggle protocol; nothing here touches the control register.
pub struct EndpointList {
    transfer_type: TransferType,
    head: Dma<EndpointDescriptor>,
    nodes: Vec<EdNode>,
}

impl EndpointList {
    pub fn new(transfer_type: TransferType) -> Result<EndpointList> {
        let head = unsafe { Dma::zeroed()?.assume_init() };
        Ok(EndpointList {
            transfer_type,
            head,
            nodes: Vec::new(),
        })
    }

    /// Physical address of the sentinel head ED.
    pub fn head_physical(&self) -> u32 {
        self.head.physical() as u32
    }

    /// Chains this list's traversal into another list: the controller walks
    /// on into `head` after the last ED here.
    pub fn set_next(&mut self, head: u32) {
        self.head.set_next(head);
    }

    /// Links a node at the logical end of the list. The new ED inherits the
    /// predecessor's next pointer first, so a chained next list stays
    /// reachable throughout.
    pub fn insert(&mut self, mut node: EdNode) -> u32 {
        let physical = node.ed.physical() as u32;
        {
            let last_ed = match self.nodes.last_mut() {
                Some(last) => &mut last.ed,
                None => &mut self.head,
            };
            node.ed.set_next(last_ed.next());
            last_ed.set_next(physical);
        }
        trace!(
            "{:?} list: ED {:#x} for {}:{} linked",
            self.transfer_type,
            physical,
            node.ep.address,
            node.ep.endpoint
        );
        self.nodes.push(node);
        physical
    }

    /// Unlinks the ED registered for the tuple; false if there is none.
    pub fn remove(&mut self, address: Address, endpoint: u8, direction: Direction) -> bool {
        let Some(index) = self.position(address, endpoint, direction) else {
            return false;
        };
        let next = self.nodes[index].ed.next();
        match index {
            0 => self.head.set_next(next),
            previous => self.nodes[previous - 1].ed.set_next(next),
        }
        let node = self.nodes.remove(index);
        trace!(
            "{:?} list: ED {:#x} for {}:{} unlinked",
            self.transfer_type,
            node.ed.physical(),
            address,
            endpoint
        );
        true
    }

    pub fn contains(&self, address: Address, endpoint: u8, direction: Direction) -> bool {
        self.position(address, endpoint, direction).is_some()
    }

    /// Physical address of the ED serving the tuple, for collaborators that
    /// link TDs into its queue.
    pub fn ed_physical(&self, address: Address, endpoint: u8, direction: Direction) -> Option<u32> {
        self.position(address, endpoint, direction)
            .map(|index| self.nodes[index].ed.physical() as u32)
    }

    fn position(&self, address: Address, endpoint: u8, direction: Direction) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| node.ep.matches(address, endpoint, direction))
    }
}
