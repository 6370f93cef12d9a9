use log::debug;
use syscall::error::{Error, Result, EEXIST, ENOENT, ENOSPC};

use super::{Address, Direction, Endpoint};

/// Bytes per frame available to periodic transfers on a USB 1.1 bus: 90 % of
/// a 1500-byte full-speed frame, the rest stays reserved for control and
/// bulk traffic.
pub const BANDWIDTH_AVAILABLE_USB11: usize = 1500 * 9 / 10;

/// Registry of active endpoints and their periodic bandwidth reservations.
pub struct EndpointManager {
    free_bandwidth: usize,
    endpoints: Vec<(Endpoint, usize)>,
}

impl EndpointManager {
    pub fn new(available_bandwidth: usize) -> Self {
        EndpointManager {
            free_bandwidth: available_bandwidth,
            endpoints: Vec::new(),
        }
    }

    /// Registers an endpoint, reserving `bandwidth` bytes per frame for
    /// periodic transfer types.
    pub fn register(&mut self, endpoint: Endpoint, bandwidth: usize) -> Result<()> {
        if self
            .find(endpoint.address, endpoint.endpoint, endpoint.direction)
            .is_some()
        {
            return Err(Error::new(EEXIST));
        }
        if endpoint.transfer_type.is_periodic() {
            if bandwidth > self.free_bandwidth {
                return Err(Error::new(ENOSPC));
            }
            self.free_bandwidth -= bandwidth;
        }
        debug!(
            "registered endpoint {}:{} {:?}, {} free bandwidth",
            endpoint.address, endpoint.endpoint, endpoint.transfer_type, self.free_bandwidth
        );
        self.endpoints.push((endpoint, bandwidth));
        Ok(())
    }

    /// Removes an endpoint, returning its reservation to the pool.
    pub fn unregister(&mut self, address: Address, endpoint: u8, direction: Direction) -> Result<()> {
        let index = self
            .find(address, endpoint, direction)
            .ok_or(Error::new(ENOENT))?;
        let (endpoint, bandwidth) = self.endpoints.remove(index);
        if endpoint.transfer_type.is_periodic() {
            self.free_bandwidth += bandwidth;
        }
        Ok(())
    }

    pub fn get(&self, address: Address, endpoint: u8, direction: Direction) -> Option<(&Endpoint, usize)> {
        let index = self.find(address, endpoint, direction)?;
        let (endpoint, bandwidth) = &self.endpoints[index];
        Some((endpoint, *bandwidth))
    }

    pub fn free_bandwidth(&self) -> usize {
        self.free_bandwidth
    }

    fn find(&self, address: Address, endpoint: u8, direction: Direction) -> Option<usize> {
        self.endpoints
            .iter()
            .position(|(ep, _)| ep.matches(address, endpoint, direction))
    }
}
