//! Process-local single-flight guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vfs_core::{Error, Result};

/// Allows at most one holder at a time; a second caller fails fast.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    running: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the flag or fail with `AlreadyScanning`. Released on guard drop.
    pub fn try_acquire(&self) -> Result<SingleFlightGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyScanning)?;
        Ok(SingleFlightGuard {
            running: Arc::clone(&self.running),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of one flight.
#[derive(Debug)]
pub struct SingleFlightGuard {
    running: Arc<AtomicBool>,
}

impl Drop for SingleFlightGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().unwrap();
        assert!(flight.is_running());
        assert!(matches!(flight.try_acquire(), Err(Error::AlreadyScanning)));

        drop(guard);
        assert!(!flight.is_running());
        assert!(flight.try_acquire().is_ok());
    }

    #[test]
    fn test_clones_share_the_flag() {
        let flight = SingleFlight::new();
        let other = flight.clone();
        let _guard = flight.try_acquire().unwrap();
        assert!(other.try_acquire().is_err());
    }
}
