//! Reusable result buffers
//!
//! Lanes append every [`OpResult`] to a buffer that the reporter swaps out each
//! interval. Recycling those buffers keeps allocation churn flat at high call
//! rates. The pool is a cache, not a queue: an empty pool hands out a freshly
//! allocated buffer and a full pool drops released ones.

use parking_lot::Mutex;

use crate::operation::OpResult;

/// Default pre-sized capacity of each buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// Idle buffers kept per pool
const MAX_IDLE: usize = 256;

/// Buffer of results owned by one lane between drains
pub type ResultBuffer = Vec<OpResult>;

/// Free list of pre-sized result buffers
#[derive(Debug)]
pub struct ResultPool {
    capacity: usize,
    idle: Mutex<Vec<ResultBuffer>>,
}

impl ResultPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Get an empty buffer, recycled when one is available
    pub fn acquire(&self) -> ResultBuffer {
        self.idle
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.capacity))
    }

    /// Clear `buffer` and keep it for a later `acquire`
    pub fn release(&self, mut buffer: ResultBuffer) {
        buffer.clear();
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE {
            idle.push(buffer);
        }
    }

    /// Buffers currently waiting for reuse
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ResultPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_is_empty_and_presized() {
        let pool = ResultPool::new(64);
        let buffer = pool.acquire();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 64);
    }

    #[test]
    fn test_release_clears_and_recycles() {
        let pool = ResultPool::new(8);
        let mut buffer = pool.acquire();
        buffer.push(OpResult::default());
        buffer.push(OpResult::default());
        pool.release(buffer);
        assert_eq!(pool.idle(), 1);

        let recycled = pool.acquire();
        assert!(recycled.is_empty());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_idle_is_bounded() {
        let pool = ResultPool::new(1);
        for _ in 0..MAX_IDLE + 10 {
            pool.release(Vec::new());
        }
        assert_eq!(pool.idle(), MAX_IDLE);
    }
}
