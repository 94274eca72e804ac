use crate::error::{MqttError, Result};
use std::collections::HashSet;

/// Allocates the non-zero u16 packet identifiers that tie requests to
/// their acknowledgments. Identifiers stay reserved until released, so
/// a wrapped counter can never hand out an id that is still in flight.
#[derive(Debug)]
pub struct PacketIdAllocator {
    next: u16,
    in_use: HashSet<u16>,
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketIdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 1,
            in_use: HashSet::new(),
        }
    }

    /// # Errors
    /// Returns [`MqttError::PacketIdExhausted`] when all 65535
    /// identifiers are in flight.
    pub fn allocate(&mut self) -> Result<u16> {
        if self.in_use.len() >= usize::from(u16::MAX) {
            return Err(MqttError::PacketIdExhausted);
        }

        loop {
            let candidate = self.next;
            self.next = if self.next == u16::MAX { 1 } else { self.next + 1 };
            if self.in_use.insert(candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Marks an identifier as reserved, for session resumption where
    /// ids were assigned before the restart.
    pub fn reserve(&mut self, id: u16) {
        if id != 0 {
            self.in_use.insert(id);
        }
    }

    pub fn release(&mut self, id: u16) {
        self.in_use.remove(&id);
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_use.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_sequentially_from_one() {
        let mut allocator = PacketIdAllocator::new();
        assert_eq!(allocator.allocate().unwrap(), 1);
        assert_eq!(allocator.allocate().unwrap(), 2);
        assert_eq!(allocator.allocate().unwrap(), 3);
    }

    #[test]
    fn test_wraps_to_one_skipping_zero() {
        let mut allocator = PacketIdAllocator::new();
        allocator.next = u16::MAX;
        assert_eq!(allocator.allocate().unwrap(), u16::MAX);
        assert_eq!(allocator.allocate().unwrap(), 1);
    }

    #[test]
    fn test_skips_reserved_ids_on_wrap() {
        let mut allocator = PacketIdAllocator::new();
        let first = allocator.allocate().unwrap();
        assert_eq!(first, 1);

        allocator.next = u16::MAX;
        assert_eq!(allocator.allocate().unwrap(), u16::MAX);
        // 1 is still in flight, so the wrap lands on 2.
        assert_eq!(allocator.allocate().unwrap(), 2);
    }

    #[test]
    fn test_release_makes_id_reusable() {
        let mut allocator = PacketIdAllocator::new();
        let id = allocator.allocate().unwrap();
        allocator.release(id);
        assert_eq!(allocator.in_flight(), 0);

        allocator.next = id;
        assert_eq!(allocator.allocate().unwrap(), id);
    }

    #[test]
    fn test_exhaustion() {
        let mut allocator = PacketIdAllocator::new();
        for _ in 0..u16::MAX {
            allocator.allocate().unwrap();
        }
        assert!(matches!(
            allocator.allocate(),
            Err(MqttError::PacketIdExhausted)
        ));
    }

    #[test]
    fn test_reserve_ignores_zero() {
        let mut allocator = PacketIdAllocator::new();
        allocator.reserve(0);
        assert_eq!(allocator.in_flight(), 0);
        allocator.reserve(7);
        assert_eq!(allocator.in_flight(), 1);
    }
}
