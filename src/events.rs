// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Asynchronous firmware event records and the shared queue the bottom
//! half appends them to.

use crate::iface::IfaceId;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// One asynchronous indication from firmware.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Firmware-side error indication; carried for diagnostics only.
    Error(u32),
    /// Beacons from the joined BSS stopped arriving.
    BssLost { beacon_miss: u8 },
    /// Beacons resumed before the loss was confirmed.
    BssRegained,
    Radar,
    /// Signal sample; raw RSSI (signed) or RCPI (unsigned) depending on the
    /// interface's configured report mode.
    RcpiRssi(u8),
    /// Bitmap of AP peer links firmware declared inactive.
    Inactivity { link_map: u32 },
    /// Firmware could not honor the committed power-save mode.
    PsModeError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub iface: IfaceId,
    pub kind: EventKind,
}

/// Arrival-ordered queue of firmware events.
///
/// Producers push under the internal lock; the dispatcher detaches the
/// whole backlog in O(1) and processes it without holding the lock, so a
/// slow handler never blocks the interrupt-adjacent producer.
pub struct EventQueue {
    inner: Mutex<VecDeque<EventRecord>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self { inner: Mutex::new(VecDeque::new()) }
    }

    pub fn push(&self, record: EventRecord) {
        self.inner.lock().push_back(record);
    }

    /// Detaches the entire backlog, preserving arrival order.
    pub fn detach_all(&self) -> VecDeque<EventRecord> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Drops queued events, optionally only those of one interface.
    pub fn clear(&self, iface: Option<IfaceId>) {
        let mut queue = self.inner.lock();
        match iface {
            Some(id) => queue.retain(|rec| rec.iface != id),
            None => queue.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detach_preserves_arrival_order() {
        let queue = EventQueue::new();
        queue.push(EventRecord { iface: 0, kind: EventKind::BssLost { beacon_miss: 4 } });
        queue.push(EventRecord { iface: 1, kind: EventKind::Radar });
        queue.push(EventRecord { iface: 0, kind: EventKind::BssRegained });

        let batch: Vec<_> = queue.detach_all().into();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].kind, EventKind::BssLost { beacon_miss: 4 });
        assert_eq!(batch[1].kind, EventKind::Radar);
        assert_eq!(batch[2].kind, EventKind::BssRegained);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_scoped_to_iface() {
        let queue = EventQueue::new();
        queue.push(EventRecord { iface: 0, kind: EventKind::Radar });
        queue.push(EventRecord { iface: 1, kind: EventKind::Radar });
        queue.clear(Some(0));
        let batch = queue.detach_all();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].iface, 1);
    }
}
