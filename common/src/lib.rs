pub mod dma;
pub mod io;
pub mod logger;
pub mod timeout;

pub use logger::{output_level, setup_logging};

/// Caching behavior requested for device-shared memory.
#[derive(Clone, Copy, Debug, Default)]
pub enum MemoryType {
    #[default]
    Writeback,
    Uncacheable,
    WriteCombining,
}
