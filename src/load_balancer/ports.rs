//! Contiguous backend port allocation.
//!
//! A backend worker group is addressed as a fixed offset range, so its ports
//! are handed out as one block of consecutive integers and taken back one by
//! one as workers die.
//!
//! `free` accepts ports outside the declared range. Such a port joins the
//! free set and is handed out like any other, in ascending order.

use std::collections::BTreeSet;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("cannot allocate zero ports")]
    InvalidArgument,

    #[error("no run of {requested} consecutive free ports")]
    Exhausted { requested: usize },
}

/// A bounded pool of TCP ports.
#[derive(Debug)]
pub struct PortPool {
    low: u16,
    high: u16,
    free: Mutex<BTreeSet<u16>>,
}

impl PortPool {
    /// Pool over `[low, high]`, all free. The bounds are swapped if reversed.
    pub fn new(low: u16, high: u16) -> Self {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Self {
            low,
            high,
            free: Mutex::new((low..=high).collect()),
        }
    }

    pub fn low(&self) -> u16 {
        self.low
    }

    pub fn high(&self) -> u16 {
        self.high
    }

    /// Allocate the lowest run of `n` consecutive free ports.
    ///
    /// Nothing is allocated on failure.
    pub fn alloc(&self, n: usize) -> Result<Vec<u16>, PortError> {
        if n == 0 {
            return Err(PortError::InvalidArgument);
        }

        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        let start = first_run(&free, n).ok_or(PortError::Exhausted { requested: n })?;

        let ports: Vec<u16> = (0..n).map(|i| start + i as u16).collect();
        for port in &ports {
            free.remove(port);
        }

        tracing::debug!(
            first = start,
            count = n,
            remaining = free.len(),
            "Allocated ports"
        );
        Ok(ports)
    }

    /// Mark `port` free. Freeing a free port is a no-op.
    pub fn free(&self, port: u16) {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.insert(port) && !(self.low..=self.high).contains(&port) {
            tracing::debug!(port, low = self.low, high = self.high, "Freed port outside pool range");
        }
    }

    /// Ports currently free, including freed ports outside the range.
    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_free(&self, port: u16) -> bool {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).contains(&port)
    }
}

/// Lowest port starting `n` consecutive members of `free`.
fn first_run(free: &BTreeSet<u16>, n: usize) -> Option<u16> {
    let mut start: Option<u16> = None;
    let mut prev: Option<u16> = None;
    let mut len = 0usize;

    for &port in free {
        match prev {
            Some(p) if p.checked_add(1) == Some(port) => len += 1,
            _ => {
                start = Some(port);
                len = 1;
            }
        }
        if len == n {
            return start;
        }
        prev = Some(port);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_invalid() {
        let pool = PortPool::new(1, 10);
        assert_eq!(pool.alloc(0), Err(PortError::InvalidArgument));
        pool.alloc(10).unwrap();
        assert_eq!(pool.alloc(0), Err(PortError::InvalidArgument));
    }

    #[test]
    fn allocates_ascending_blocks() {
        let pool = PortPool::new(1, 10);
        assert_eq!(pool.alloc(1).unwrap(), vec![1]);
        assert_eq!(pool.alloc(9).unwrap(), (2..=10).collect::<Vec<_>>());
        assert_eq!(pool.alloc(1), Err(PortError::Exhausted { requested: 1 }));
    }

    #[test]
    fn large_blocks_fill_the_range() {
        let pool = PortPool::new(1, 100);
        let a = pool.alloc(64).unwrap();
        assert_eq!((a[0], a[63]), (1, 64));
        let b = pool.alloc(36).unwrap();
        assert_eq!((b[0], b[35]), (65, 100));
        assert!(pool.alloc(1).is_err());

        pool.free(11);
        assert_eq!(pool.alloc(1).unwrap(), vec![11]);
        assert!(pool.alloc(1).is_err());
    }

    #[test]
    fn freed_port_outside_range_is_reissued() {
        let pool = PortPool::new(1, 10);
        assert_eq!(pool.alloc(10).unwrap(), (1..=10).collect::<Vec<_>>());
        pool.free(11);
        assert_eq!(pool.alloc(1).unwrap(), vec![11]);
    }

    #[test]
    fn block_allocation_is_all_or_nothing() {
        let pool = PortPool::new(1, 10);
        pool.alloc(10).unwrap();
        pool.free(3);
        pool.free(5);
        pool.free(6);

        assert_eq!(pool.alloc(3), Err(PortError::Exhausted { requested: 3 }));
        assert_eq!(pool.available(), 3);
        assert!(pool.is_free(3) && pool.is_free(5) && pool.is_free(6));

        // The first run long enough wins, not the first free port.
        assert_eq!(pool.alloc(2).unwrap(), vec![5, 6]);
        assert_eq!(pool.alloc(1).unwrap(), vec![3]);
    }

    #[test]
    fn free_is_idempotent() {
        let pool = PortPool::new(1, 3);
        pool.free(2);
        pool.free(2);
        assert_eq!(pool.available(), 3);

        assert_eq!(pool.alloc(3).unwrap(), vec![1, 2, 3]);
        pool.free(2);
        pool.free(2);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn freed_ports_can_bridge_the_range_end() {
        let pool = PortPool::new(1, 4);
        pool.alloc(2).unwrap();
        pool.free(5);
        pool.free(6);
        assert_eq!(pool.alloc(4).unwrap(), vec![3, 4, 5, 6]);
    }
}
