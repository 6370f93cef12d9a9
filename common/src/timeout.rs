use std::{
    thread,
    time::{Duration, Instant},
};

/// Deadline for register spin loops.
///
/// `run` yields instead of sleeping: platform sleeps are only evaluated on
/// timer ticks, which is far too coarse for registers that settle within
/// microseconds.
pub struct Timeout {
    instant: Instant,
    duration: Duration,
}

impl Timeout {
    #[inline]
    pub fn new(duration: Duration) -> Self {
        Self {
            instant: Instant::now(),
            duration,
        }
    }

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        Self::new(Duration::from_micros(micros))
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    #[inline]
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Yields once; `Err(())` when the deadline has passed.
    #[inline]
    pub fn run(&self) -> Result<(), ()> {
        if self.instant.elapsed() < self.duration {
            thread::yield_now();
            Ok(())
        } else {
            Err(())
        }
    }
}
