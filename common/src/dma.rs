use std::mem::{self, size_of, MaybeUninit};
use std::ops::{Deref, DerefMut};
use std::ptr;

use syscall::error::Result;
use syscall::PAGE_SIZE;

#[cfg(target_os = "redox")]
mod platform {
    use libredox::call::MmapArgs;
    use libredox::{flag, Fd};
    use syscall::error::{Error, Result, EINVAL};
    use syscall::PAGE_SIZE;

    use crate::MemoryType;

    const DMA_MEMTY: MemoryType = {
        if cfg!(any(target_arch = "x86", target_arch = "x86_64")) {
            // x86 keeps caches coherent with DMA traffic
            MemoryType::Writeback
        } else {
            MemoryType::Uncacheable
        }
    };

    pub fn alloc_and_map(length: usize) -> Result<(usize, *mut ())> {
        assert_eq!(length % PAGE_SIZE, 0);
        let ty = match DMA_MEMTY {
            MemoryType::Writeback => "wb",
            MemoryType::Uncacheable => "uc",
            MemoryType::WriteCombining => "wc",
        };
        unsafe {
            let fd = Fd::open(
                &format!("memory:zeroed@{ty}?phys_contiguous"),
                flag::O_CLOEXEC,
                0,
            )
            .map_err(|_| Error::new(EINVAL))?;
            let virt = libredox::call::mmap(MmapArgs {
                fd: fd.raw(),
                offset: 0,
                addr: core::ptr::null_mut(),
                length,
                flags: flag::MAP_PRIVATE,
                prot: flag::PROT_READ | flag::PROT_WRITE,
            })
            .map_err(|_| Error::new(EINVAL))?;
            let phys = syscall::virttophys(virt as usize)?;
            Ok((phys, virt as *mut ()))
        }
    }

    pub unsafe fn unmap(virt: *mut (), length: usize) {
        let _ = libredox::call::munmap(virt, length);
    }
}

// Hosted backend: DMA memory becomes page-aligned heap memory, and the
// "physical" addresses are stable handles from a 32-bit range tracked in a
// registry. This lets schedule structures be built and walked by physical
// pointer under `cargo test` on any platform.
#[cfg(not(target_os = "redox"))]
mod platform {
    use std::alloc::{alloc_zeroed, dealloc, Layout};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use syscall::error::{Error, Result, EINVAL, ENOMEM};
    use syscall::PAGE_SIZE;

    struct Region {
        virt: usize,
        length: usize,
    }

    static REGIONS: Mutex<BTreeMap<usize, Region>> = Mutex::new(BTreeMap::new());
    static NEXT_PHYS: AtomicUsize = AtomicUsize::new(0x0100_0000);

    pub fn alloc_and_map(length: usize) -> Result<(usize, *mut ())> {
        assert_eq!(length % PAGE_SIZE, 0);
        let layout = Layout::from_size_align(length, PAGE_SIZE).map_err(|_| Error::new(EINVAL))?;
        let virt = unsafe { alloc_zeroed(layout) };
        if virt.is_null() {
            return Err(Error::new(ENOMEM));
        }
        let phys = NEXT_PHYS.fetch_add(length, Ordering::Relaxed);
        REGIONS.lock().unwrap().insert(
            phys,
            Region {
                virt: virt as usize,
                length,
            },
        );
        Ok((phys, virt as *mut ()))
    }

    pub unsafe fn unmap(virt: *mut (), length: usize) {
        let mut regions = REGIONS.lock().unwrap();
        regions.retain(|_, region| region.virt != virt as usize);
        drop(regions);
        let layout = Layout::from_size_align(length, PAGE_SIZE).unwrap();
        dealloc(virt.cast(), layout);
    }

    /// Translates a fake physical address back to the backing heap address,
    /// so tests can follow pointers the way the controller would.
    pub fn physical_to_virtual(phys: usize) -> Option<*mut u8> {
        let regions = REGIONS.lock().unwrap();
        let (&base, region) = regions.range(..=phys).next_back()?;
        if phys < base + region.length {
            Some((region.virt + (phys - base)) as *mut u8)
        } else {
            None
        }
    }
}

#[cfg(not(target_os = "redox"))]
pub use platform::physical_to_virtual;

/// An owned, physically contiguous, device-visible allocation.
///
/// The driver side reads and writes it through `Deref`; the device reaches
/// it through [`Dma::physical`]. Allocations are page-aligned and start out
/// zeroed.
pub struct Dma<T: ?Sized> {
    phys: usize,
    aligned_len: usize,
    virt: *mut T,
}

impl<T> Dma<T> {
    pub fn new(value: T) -> Result<Self> {
        unsafe {
            let mut zeroed = Self::zeroed()?;
            zeroed.as_mut_ptr().write(value);
            Ok(zeroed.assume_init())
        }
    }

    pub fn zeroed() -> Result<Dma<MaybeUninit<T>>> {
        let aligned_len = size_of::<T>().next_multiple_of(PAGE_SIZE);
        let (phys, virt) = platform::alloc_and_map(aligned_len)?;
        Ok(Dma {
            phys,
            virt: virt.cast(),
            aligned_len,
        })
    }
}

impl<T> Dma<MaybeUninit<T>> {
    pub unsafe fn assume_init(self) -> Dma<T> {
        let Dma {
            phys,
            aligned_len,
            virt,
        } = self;
        mem::forget(self);

        Dma {
            phys,
            aligned_len,
            virt: virt.cast(),
        }
    }
}

impl<T: ?Sized> Dma<T> {
    pub fn physical(&self) -> usize {
        self.phys
    }
}

impl<T: ?Sized> Deref for Dma<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.virt }
    }
}

impl<T: ?Sized> DerefMut for Dma<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.virt }
    }
}

impl<T: ?Sized> Drop for Dma<T> {
    fn drop(&mut self) {
        unsafe {
            ptr::drop_in_place(self.virt);
            platform::unmap(self.virt as *mut (), self.aligned_len);
        }
    }
}
