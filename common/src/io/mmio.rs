use core::mem::MaybeUninit;
use core::ops::{BitAnd, BitOr, Not};
use core::ptr;

use crate::io::Io;

/// A memory-mapped register cell.
///
/// All accesses are volatile, so the compiler neither elides nor reorders
/// them with respect to each other. The type is packed so that register
/// blocks can be described with packed structs matching the hardware layout
/// exactly; the mapped window itself provides the real alignment.
#[repr(packed)]
pub struct Mmio<T> {
    value: MaybeUninit<T>,
}

impl<T> Mmio<T> {
    pub fn zeroed() -> Self {
        Mmio {
            value: MaybeUninit::zeroed(),
        }
    }
}

impl<T> Io for Mmio<T>
where
    T: Copy + PartialEq + BitAnd<Output = T> + BitOr<Output = T> + Not<Output = T>,
{
    type Value = T;

    fn read(&self) -> T {
        unsafe { ptr::read_volatile(ptr::addr_of!(self.value).cast::<T>()) }
    }

    fn write(&mut self, value: T) {
        unsafe { ptr::write_volatile(ptr::addr_of_mut!(self.value).cast::<T>(), value) }
    }
}
