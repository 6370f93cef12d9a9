use std::collections::BTreeMap;

use log::debug;
use syscall::error::{Error, Result, ENOENT, ENOSPC};

use super::{Address, DeviceHandle, Speed};

const LAST_ADDRESS: Address = 127;

struct DeviceSlot {
    speed: Speed,
    handle: Option<DeviceHandle>,
}

/// Allocates USB device addresses and remembers which framework device each
/// one is bound to.
pub struct AddressKeeper {
    last: Address,
    devices: BTreeMap<Address, DeviceSlot>,
}

impl AddressKeeper {
    pub fn new() -> Self {
        AddressKeeper {
            last: 0,
            devices: BTreeMap::new(),
        }
    }

    /// Grants the next unused address, rotating past the previous grant so
    /// freshly released addresses rest before reuse.
    pub fn get_free_address(&mut self, speed: Speed) -> Result<Address> {
        let mut candidate = self.last;
        for _ in 0..LAST_ADDRESS {
            candidate = candidate % LAST_ADDRESS + 1;
            if !self.devices.contains_key(&candidate) {
                self.devices.insert(
                    candidate,
                    DeviceSlot {
                        speed,
                        handle: None,
                    },
                );
                self.last = candidate;
                debug!("assigned USB address {} ({:?})", candidate, speed);
                return Ok(candidate);
            }
        }
        Err(Error::new(ENOSPC))
    }

    /// Associates a framework device handle with a granted address.
    pub fn bind(&mut self, address: Address, handle: DeviceHandle) -> Result<()> {
        match self.devices.get_mut(&address) {
            Some(slot) => {
                slot.handle = Some(handle);
                Ok(())
            }
            None => Err(Error::new(ENOENT)),
        }
    }

    /// Returns an address to the free pool. Unknown addresses are ignored.
    pub fn release(&mut self, address: Address) {
        self.devices.remove(&address);
    }

    pub fn speed(&self, address: Address) -> Option<Speed> {
        self.devices.get(&address).map(|slot| slot.speed)
    }
}
