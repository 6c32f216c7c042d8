//! Memory accounting for buffering operators

use crate::error::{QueryError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory pool for tracking memory usage
#[derive(Debug)]
pub struct MemoryPool {
    /// Maximum memory allowed
    max_memory: usize,
    /// Current memory usage
    used: AtomicUsize,
    /// High-water mark of `used`
    peak: AtomicUsize,
}

impl MemoryPool {
    pub fn new(max_memory: usize) -> Self {
        Self {
            max_memory,
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Create a pool with no limit
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    fn try_add(&self, size: usize) -> Result<()> {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let new_usage = current
                .checked_add(size)
                .filter(|n| *n <= self.max_memory)
                .ok_or_else(|| {
                    QueryError::ResourceExhausted(format!(
                        "cannot reserve {} bytes: {} of {} in use",
                        size, current, self.max_memory
                    ))
                })?;

            match self.used.compare_exchange_weak(
                current,
                new_usage,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(new_usage, Ordering::Relaxed);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Try to reserve `size` bytes
    pub fn try_allocate(self: &Arc<Self>, size: usize) -> Result<MemoryReservation> {
        self.try_add(size)?;
        Ok(MemoryReservation {
            pool: Arc::clone(self),
            size,
        })
    }

    /// Empty reservation that can grow later
    pub fn reservation(self: &Arc<Self>) -> MemoryReservation {
        MemoryReservation {
            pool: Arc::clone(self),
            size: 0,
        }
    }

    /// Current memory usage
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Highest usage seen so far
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Maximum memory
    pub fn max(&self) -> usize {
        self.max_memory
    }

    /// Available memory
    pub fn available(&self) -> usize {
        self.max_memory.saturating_sub(self.used())
    }

    fn release(&self, size: usize) {
        self.used.fetch_sub(size, Ordering::SeqCst);
    }
}

/// RAII guard for memory reservation
///
/// Owns a handle to its pool so it can live inside operator state; dropping
/// the state returns the bytes.
#[derive(Debug)]
pub struct MemoryReservation {
    pool: Arc<MemoryPool>,
    size: usize,
}

impl MemoryReservation {
    /// Size of this reservation
    pub fn size(&self) -> usize {
        self.size
    }

    /// Grow the reservation by `additional` bytes, failing past the pool limit
    pub fn try_grow(&mut self, additional: usize) -> Result<()> {
        self.pool.try_add(additional)?;
        self.size += additional;
        Ok(())
    }

    /// Resize to `new_size`, failing if growing exceeds the pool limit
    pub fn try_resize(&mut self, new_size: usize) -> Result<()> {
        if new_size > self.size {
            self.try_grow(new_size - self.size)
        } else {
            self.pool.release(self.size - new_size);
            self.size = new_size;
            Ok(())
        }
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.pool.release(self.size);
    }
}

/// Shared memory pool
pub type SharedMemoryPool = Arc<MemoryPool>;

/// Create a shared memory pool; `None` means unbounded
pub fn create_memory_pool(max_memory: Option<usize>) -> SharedMemoryPool {
    Arc::new(max_memory.map(MemoryPool::new).unwrap_or_else(MemoryPool::unbounded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pool() {
        let pool = create_memory_pool(Some(1000));

        assert_eq!(pool.used(), 0);
        assert_eq!(pool.available(), 1000);

        let r1 = pool.try_allocate(500).unwrap();
        assert_eq!(pool.used(), 500);
        assert_eq!(pool.available(), 500);

        let r2 = pool.try_allocate(400).unwrap();
        assert_eq!(pool.used(), 900);

        // This should fail
        assert!(matches!(
            pool.try_allocate(200),
            Err(QueryError::ResourceExhausted(_))
        ));

        drop(r1);
        assert_eq!(pool.used(), 400);

        drop(r2);
        assert_eq!(pool.used(), 0);
        assert_eq!(pool.peak(), 900);
    }

    #[test]
    fn test_resize_reservation() {
        let pool = create_memory_pool(Some(1000));

        let mut r = pool.reservation();
        r.try_grow(100).unwrap();
        assert_eq!(pool.used(), 100);

        r.try_resize(600).unwrap();
        assert_eq!(pool.used(), 600);
        assert!(r.try_resize(1200).is_err());
        assert_eq!(r.size(), 600);

        r.try_resize(50).unwrap();
        assert_eq!(pool.used(), 50);

        drop(r);
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_unbounded_pool() {
        let pool = create_memory_pool(None);
        let _r = pool.try_allocate(1 << 40).unwrap();
        assert_eq!(pool.max(), usize::MAX);
    }
}
