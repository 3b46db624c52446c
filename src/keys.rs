// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::error::Error;

/// Number of hardware key entries shared by all interfaces on one device.
pub const MAX_KEY_SLOTS: usize = 16;

/// Fixed-capacity pool of firmware key entries.
///
/// Slots are identified by index; allocation takes the first free slot.
/// The pool tracks occupancy only; key material lives with the caller.
#[derive(Debug)]
pub struct KeySlotPool {
    used: [bool; MAX_KEY_SLOTS],
}

impl KeySlotPool {
    pub fn new() -> Self {
        Self { used: [false; MAX_KEY_SLOTS] }
    }

    /// Allocates the first free slot.
    pub fn alloc(&mut self) -> Result<usize, Error> {
        match self.used.iter().position(|used| !used) {
            Some(idx) => {
                self.used[idx] = true;
                Ok(idx)
            }
            None => Err(Error::NoFreeKeySlot),
        }
    }

    /// Releases a previously allocated slot. An out-of-range or free index
    /// is a caller bug and is rejected rather than ignored.
    pub fn release(&mut self, idx: usize) -> Result<(), Error> {
        if idx >= MAX_KEY_SLOTS || !self.used[idx] {
            return Err(Error::InvalidKeySlot(idx));
        }
        self.used[idx] = false;
        Ok(())
    }

    /// Frees every slot. Used when the last interface goes away.
    pub fn release_all(&mut self) {
        self.used = [false; MAX_KEY_SLOTS];
    }

    pub fn used_count(&self) -> usize {
        self.used.iter().filter(|u| **u).count()
    }
}

impl Default for KeySlotPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn alloc_until_exhausted() {
        let mut pool = KeySlotPool::new();
        for expected in 0..MAX_KEY_SLOTS {
            assert_eq!(pool.alloc().unwrap(), expected);
        }
        assert_matches!(pool.alloc(), Err(Error::NoFreeKeySlot));
        // Pool unchanged by the failed allocation.
        assert_eq!(pool.used_count(), MAX_KEY_SLOTS);
    }

    #[test]
    fn release_reuses_lowest_slot() {
        let mut pool = KeySlotPool::new();
        let a = pool.alloc().unwrap();
        let _b = pool.alloc().unwrap();
        pool.release(a).unwrap();
        assert_eq!(pool.alloc().unwrap(), a);
    }

    #[test]
    fn release_invalid_index_rejected() {
        let mut pool = KeySlotPool::new();
        assert_matches!(pool.release(MAX_KEY_SLOTS), Err(Error::InvalidKeySlot(_)));
        // Double release is also a bug.
        let idx = pool.alloc().unwrap();
        pool.release(idx).unwrap();
        assert_matches!(pool.release(idx), Err(Error::InvalidKeySlot(_)));
    }

    #[test]
    fn release_all() {
        let mut pool = KeySlotPool::new();
        for _ in 0..4 {
            pool.alloc().unwrap();
        }
        pool.release_all();
        assert_eq!(pool.used_count(), 0);
    }
}
