use super::batch::TransferBatch;
use crate::usb::Address;

/// The root hub collaborator.
///
/// The port emulation state machine lives outside the core; the controller
/// only routes work its way: batches addressed to the hub, and root hub
/// status change interrupts.
pub trait RootHub: Send + Sync {
    /// Called once during controller bring-up, before the schedule runs,
    /// with the virtual base address of the mapped register window. The hub
    /// owns the root-hub register block at its fixed offsets within it.
    fn init(&self, regs_base: usize);

    /// The hub's assigned device address, once registration gave it one.
    fn address(&self) -> Option<Address>;

    /// Stores the address assigned during hub registration.
    fn set_address(&self, address: Address);

    /// Handles a batch addressed to the hub. Synchronous: the batch is
    /// answered from port state, no hardware transfer happens.
    fn request(&self, batch: Box<dyn TransferBatch>);

    /// A root hub status change interrupt arrived.
    fn interrupt(&self);
}
