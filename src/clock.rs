//! Time sources.
//!
//! Code crash if there is a physical inconsistency (unrecoverable state).

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Get the current Unix timestamp in seconds.
    fn now(&self) -> u64;
}

/// System clock using the OS time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_secs()
    }
}

#[cfg(test)]
pub struct FixedClock {
    timestamp: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp: std::sync::atomic::AtomicU64::new(timestamp),
        }
    }

    /// Move the clock to `timestamp`.
    pub fn set(&self, timestamp: u64) {
        self.timestamp
            .store(timestamp, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.timestamp.load(std::sync::atomic::Ordering::SeqCst)
    }
}
