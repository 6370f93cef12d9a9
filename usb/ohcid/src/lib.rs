//! The Open Host Controller Interface (OHCI) host controller core
//!
//! This crate implements the schedule and interrupt machinery for driving a
//! PCI OHCI device, the USB 1.1 host controller interface.
//!
//! OHCI hardware is programmed almost entirely through shared memory: the
//! driver builds chains of endpoint descriptors (EDs) and transfer
//! descriptors (TDs) in DMA-visible memory, publishes their physical
//! addresses through a small register window, and the controller walks the
//! chains on its own, writing results back into the Host Controller
//! Communication Area (HCCA) and raising an interrupt when work retires.
//!
//! The crate covers taking ownership of the controller from firmware
//! (SMM/BIOS), bringing it to the operational state, maintaining the four
//! per-transfer-type endpoint schedules while the controller is walking
//! them, scheduling transfer batches, and dispatching interrupts. The outer
//! daemon surface -- PCI handshake, scheme handling, task spawning -- belongs
//! to the consuming driver framework, as do the root-hub port state machine
//! and the transfer-descriptor formats; those collaborate through the
//! [`ohci::RootHub`] and [`ohci::TransferBatch`] traits.
//!
//! The relevant standard is the
//! [OHCI Specification for USB, release 1.0a](https://composter.com.ua/documents/OHCI_Specification_Rev.1.0a.pdf),
//! referenced throughout as "OHCI"; chapter 5.1.1.3 describes the ownership
//! handshake and chapter 5.1.1.4 the operational bring-up this crate
//! implements.

pub mod ohci;
pub mod usb;
