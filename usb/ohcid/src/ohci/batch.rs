use crate::usb::{Address, TransferType};

/// One in-flight unit of transfer work, bound to a single endpoint.
///
/// Batches are built by the consuming framework; the core only moves them
/// through their lifecycle: appended to the pending set, committed to
/// hardware, observed complete on a writeback-done interrupt, finished.
pub trait TransferBatch: Send {
    /// Address of the device the batch targets.
    fn address(&self) -> Address;

    /// Transfer type of the endpoint the batch targets.
    fn transfer_type(&self) -> TransferType;

    /// Links the batch's TDs into its endpoint's ED queue. Called with the
    /// controller guard held, right after the batch entered the pending set.
    fn commit(&mut self);

    /// Whether the controller has retired all of the batch's TDs.
    fn is_complete(&self) -> bool;

    /// Runs the completion callback. Called with the controller guard held:
    /// the callback must be bounded, must not block and must not call back
    /// into the scheduler for the same controller.
    fn finish(self: Box<Self>);
}
